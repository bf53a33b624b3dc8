//! Benchmarks for plane fitting and residual statistics.
//!
//! Run with: cargo bench -p align-plane

#![allow(missing_docs, clippy::cast_possible_truncation, clippy::expect_used)]

use align_plane::Plane;
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use nalgebra::Point3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

// =============================================================================
// Test Data Generation
// =============================================================================

/// Noisy points on the plane z = 0.1 x - 0.2 y + 1.
fn create_noisy_plane(n: usize) -> Vec<Point3<f64>> {
    let mut rng = StdRng::seed_from_u64(42);
    let noise = Normal::new(0.0, 0.005).expect("valid std dev");
    (0..n)
        .map(|_| {
            let x: f64 = rng.gen_range(-5.0..5.0);
            let y: f64 = rng.gen_range(-5.0..5.0);
            Point3::new(x, y, 0.1 * x - 0.2 * y + 1.0 + noise.sample(&mut rng))
        })
        .collect()
}

// =============================================================================
// Plane Benchmarks
// =============================================================================

fn bench_plane(c: &mut Criterion) {
    let mut group = c.benchmark_group("Plane");

    for &n in &[1_000usize, 10_000, 100_000] {
        let points = create_noisy_plane(n);
        let indices: Vec<usize> = (0..n).collect();

        group.throughput(Throughput::Elements(n as u64));

        group.bench_with_input(BenchmarkId::new("fit", n), &n, |b, _| {
            b.iter(|| Plane::fit(black_box(&points), black_box(&indices)));
        });

        if let Ok(plane) = Plane::fit(&points, &indices) {
            group.bench_with_input(BenchmarkId::new("residual_std_dev", n), &n, |b, _| {
                b.iter(|| plane.residual_std_dev(black_box(&points), black_box(&indices)));
            });
        }
    }

    group.finish();
}

// =============================================================================
// Criterion Setup
// =============================================================================

criterion_group!(benches, bench_plane);
criterion_main!(benches);
