//! Batch alignment of many sources against one target.
//!
//! A run loads every object, segments the target and all sources
//! concurrently, then aligns each source against the shared, read-only
//! target in parallel. A failing source is reported and the batch goes on;
//! only configuration errors and target failures abort the run.

use std::fmt;
use std::io::{self, Write};
use std::time::{Duration, Instant};

use align_cloud::KdNeighbors;
use align_plane::SegmentedPlane;
use align_registration::{Confidence, PlaneRegistration, PlaneScene, register_planes_indexed};
use align_types::{IndexedMesh, PointCloud, RigidTransform, VertexColor};
use nalgebra::{Point3, Vector3};
use rand::Rng;
use rayon::prelude::*;
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::metrics::{random_transform, rotation_error_deg, translation_error};
use crate::object::AlignObject;
use crate::palette::{ALIGNED_COLOR, SOURCE_COLOR, TARGET_COLOR};
use crate::sink::ExportSink;

#[derive(Debug)]
struct SourceEntry {
    object: Box<dyn AlignObject>,
    ground_truth: Option<RigidTransform>,
}

/// Points and merged patches of one segmented object.
struct Prepared {
    points: Vec<Point3<f64>>,
    patches: Vec<SegmentedPlane>,
    elapsed: Duration,
}

/// One target and the sources to align against it.
///
/// # Example
///
/// ```no_run
/// use align_pipeline::{AlignmentBatch, CloudObject, PipelineConfig, SceneFile};
/// use rand::SeedableRng;
///
/// let mut batch = AlignmentBatch::new(CloudObject::from_file(SceneFile::new("room.ply")));
/// batch.add_source(CloudObject::from_file(SceneFile::new("room.ply")), None);
/// batch
///     .apply_random_transforms(&mut rand::rngs::StdRng::seed_from_u64(1), 1.0)
///     .unwrap();
///
/// let report = batch.run(&PipelineConfig::default()).unwrap();
/// println!("{report}");
/// ```
#[derive(Debug)]
pub struct AlignmentBatch {
    target: Box<dyn AlignObject>,
    sources: Vec<SourceEntry>,
}

impl AlignmentBatch {
    /// Creates a batch with no sources.
    #[must_use]
    pub fn new(target: impl AlignObject + 'static) -> Self {
        Self {
            target: Box::new(target),
            sources: Vec::new(),
        }
    }

    /// Adds a source. `ground_truth` is the transform that moved it away
    /// from the target frame, when known.
    pub fn add_source(
        &mut self,
        source: impl AlignObject + 'static,
        ground_truth: Option<RigidTransform>,
    ) {
        self.sources.push(SourceEntry {
            object: Box::new(source),
            ground_truth,
        });
    }

    /// The target object.
    #[must_use]
    pub fn target(&self) -> &dyn AlignObject {
        &*self.target
    }

    /// Number of sources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Whether the batch has no sources.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Ground truth recorded for source `index`.
    #[must_use]
    pub fn ground_truth(&self, index: usize) -> Option<RigidTransform> {
        self.sources.get(index).and_then(|entry| entry.ground_truth)
    }

    /// Loads every source and moves it by a random rigid transform, which
    /// becomes its ground truth. Rotations are uniform; translation
    /// components lie in `[-max_translation, max_translation]`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Configuration`] for a negative or
    /// non-finite bound, or the load error of the first failing source.
    pub fn apply_random_transforms<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        max_translation: f64,
    ) -> PipelineResult<()> {
        if !(max_translation.is_finite() && max_translation >= 0.0) {
            return Err(PipelineError::Configuration(format!(
                "max_translation must be non-negative, got {max_translation}"
            )));
        }
        for entry in &mut self.sources {
            entry.object.load()?;
            let truth = random_transform(rng, max_translation);
            entry.object.transform(&truth)?;
            info!(
                object = entry.object.name(),
                rotation_deg = truth.rotation_angle().to_degrees(),
                shift = truth.translation.norm(),
                "applied random transform"
            );
            entry.ground_truth = Some(truth);
        }
        Ok(())
    }

    /// Runs the whole pipeline.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the target cannot
    /// be loaded or segmented, or a source hits a configuration error.
    /// Every other source failure is reported as
    /// [`SourceOutcome::Unaligned`].
    pub fn run(&mut self, config: &PipelineConfig) -> PipelineResult<BatchReport> {
        config.validate()?;
        let started = Instant::now();

        self.target.load()?;
        let load_errors: Vec<Option<PipelineError>> = self
            .sources
            .iter_mut()
            .map(|entry| {
                let error = entry.object.load().err();
                if let Some(error) = &error {
                    warn!(object = entry.object.name(), %error, "source failed to load");
                }
                error
            })
            .collect();

        let Self { target, sources } = self;
        let (target_prepared, source_prepared) = rayon::join(
            || prepare(&mut **target, config),
            || {
                sources
                    .par_iter_mut()
                    .zip(load_errors.into_par_iter())
                    .map(|(entry, load_error)| match load_error {
                        Some(error) => Err(error),
                        None => prepare(&mut *entry.object, config),
                    })
                    .collect::<Vec<_>>()
            },
        );

        let target_prepared = target_prepared.inspect_err(|error| {
            warn!(object = target.name(), %error, "target preparation failed");
        })?;
        let mut prepared = Vec::with_capacity(source_prepared.len());
        for result in source_prepared {
            match result {
                Err(error) if error.is_configuration() => return Err(error),
                other => prepared.push(other),
            }
        }

        let index = KdNeighbors::new(&target_prepared.points);
        let target_scene = PlaneScene::new(&target_prepared.points, &target_prepared.patches);
        let outcomes: Vec<SourceOutcome> = sources
            .par_iter()
            .zip(prepared.into_par_iter())
            .map(|(entry, prepared)| {
                let result = prepared.and_then(|source| {
                    align_source(entry, &source, &target_scene, &index, config)
                });
                match result {
                    Ok(report) => SourceOutcome::Aligned(Box::new(report)),
                    Err(error) => {
                        warn!(object = entry.object.name(), %error, "source left unaligned");
                        SourceOutcome::Unaligned {
                            name: entry.object.name().to_string(),
                            error,
                        }
                    }
                }
            })
            .collect();

        let report = BatchReport {
            target_name: target.name().to_string(),
            target_points: target_prepared.points.len(),
            target_planes: target_prepared.patches.len(),
            target_elapsed: target_prepared.elapsed,
            outcomes,
        };
        info!(
            aligned = report.aligned_count(),
            unaligned = report.unaligned_count(),
            elapsed = ?started.elapsed(),
            "batch finished"
        );
        Ok(report)
    }

    /// Exports the target and every loaded source in their current pose.
    ///
    /// # Errors
    ///
    /// Returns the first sink error.
    pub fn export_objects(&self, sink: &mut dyn ExportSink) -> PipelineResult<()> {
        if self.target.is_loaded() {
            self.target.save(sink, TARGET_COLOR)?;
        }
        for entry in self.sources.iter().filter(|e| e.object.is_loaded()) {
            entry.object.save(sink, SOURCE_COLOR)?;
        }
        Ok(())
    }
}

fn prepare(object: &mut dyn AlignObject, config: &PipelineConfig) -> PipelineResult<Prepared> {
    let start = Instant::now();
    object.preprocess(config)?;
    let segmentation = object.segment(config)?;
    let points = object.points()?;
    info!(
        object = object.name(),
        points = points.len(),
        planes = segmentation.patches.len(),
        discarded = segmentation.stats.discarded_patches,
        "segmented object"
    );
    Ok(Prepared {
        points,
        patches: segmentation.patches,
        elapsed: start.elapsed(),
    })
}

fn align_source(
    entry: &SourceEntry,
    source: &Prepared,
    target: &PlaneScene<'_>,
    index: &KdNeighbors,
    config: &PipelineConfig,
) -> PipelineResult<AlignmentReport> {
    let start = Instant::now();
    let registration = register_planes_indexed(
        &PlaneScene::new(&source.points, &source.patches),
        target,
        index,
        &config.registration,
    )?;

    let mut aligned = entry.object.boxed_clone();
    aligned.transform(&registration.transform)?;

    let moved: Vec<Point3<f64>> = registration
        .pairs
        .iter()
        .map(|pair| {
            registration
                .transform
                .transform_point(&source.patches[pair.source].centroid())
        })
        .collect();
    let matched: Vec<Point3<f64>> = registration
        .pairs
        .iter()
        .map(|pair| target.patches[pair.target].centroid())
        .collect();
    let pair_distances: Vec<f64> = moved
        .iter()
        .zip(&matched)
        .map(|(a, b)| (a - b).norm())
        .collect();
    let source_center = mean_point(&moved);
    let target_center = mean_point(&matched);

    let report = AlignmentReport {
        name: entry.object.name().to_string(),
        mean_pair_distance: mean(&pair_distances),
        pair_distances,
        source_center,
        target_center,
        center_offset: (source_center - target_center).norm(),
        rotation_error_deg: entry
            .ground_truth
            .map(|truth| rotation_error_deg(&registration.transform, &truth)),
        translation_error: entry
            .ground_truth
            .map(|truth| translation_error(&registration.transform, &truth)),
        source_points: source.points.len(),
        target_points: target.points.len(),
        source_planes: source.patches.len(),
        target_planes: target.patches.len(),
        elapsed: source.elapsed + start.elapsed(),
        registration,
        aligned,
    };
    info!(
        object = %report.name,
        pairs = report.registration.pairs.len(),
        confidence = ?report.registration.confidence,
        mean_pair_distance = report.mean_pair_distance,
        rotation_error_deg = ?report.rotation_error_deg,
        "aligned source"
    );
    Ok(report)
}

#[allow(clippy::cast_precision_loss)]
fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

#[allow(clippy::cast_precision_loss)]
fn mean_point(points: &[Point3<f64>]) -> Point3<f64> {
    if points.is_empty() {
        return Point3::origin();
    }
    let sum: Vector3<f64> = points.iter().map(|p| p.coords).sum();
    Point3::from(sum / points.len() as f64)
}

/// Alignment of one source.
#[derive(Debug)]
pub struct AlignmentReport {
    /// Source name.
    pub name: String,
    /// Staged registration result.
    pub registration: PlaneRegistration,
    /// Distance between each matched source centroid, after alignment, and
    /// its target centroid.
    pub pair_distances: Vec<f64>,
    /// Mean of `pair_distances`.
    pub mean_pair_distance: f64,
    /// Center of the aligned matched source centroids.
    pub source_center: Point3<f64>,
    /// Center of the matched target centroids.
    pub target_center: Point3<f64>,
    /// Distance between the two centers.
    pub center_offset: f64,
    /// Rotation error in degrees, when the ground truth is known.
    pub rotation_error_deg: Option<f64>,
    /// Translation error, when the ground truth is known.
    pub translation_error: Option<f64>,
    /// Source point count.
    pub source_points: usize,
    /// Target point count.
    pub target_points: usize,
    /// Planes segmented from the source.
    pub source_planes: usize,
    /// Planes segmented from the target.
    pub target_planes: usize,
    /// Segmentation plus alignment time for this source.
    pub elapsed: Duration,
    /// Copy of the source moved into the target frame.
    pub aligned: Box<dyn AlignObject>,
}

impl AlignmentReport {
    /// The source-to-target transform.
    #[must_use]
    pub const fn transform(&self) -> &RigidTransform {
        &self.registration.transform
    }

    /// Confidence of the registration.
    #[must_use]
    pub const fn confidence(&self) -> Confidence {
        self.registration.confidence
    }
}

/// What happened to one source.
#[derive(Debug)]
pub enum SourceOutcome {
    /// The source was aligned.
    Aligned(Box<AlignmentReport>),
    /// The source could not be loaded, segmented or matched.
    Unaligned {
        /// Source name.
        name: String,
        /// Why it failed.
        error: PipelineError,
    },
}

impl SourceOutcome {
    /// Source name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Aligned(report) => &report.name,
            Self::Unaligned { name, .. } => name,
        }
    }

    /// The report of an aligned source.
    #[must_use]
    pub fn report(&self) -> Option<&AlignmentReport> {
        match self {
            Self::Aligned(report) => Some(&**report),
            Self::Unaligned { .. } => None,
        }
    }
}

/// Result of [`AlignmentBatch::run`].
#[derive(Debug)]
pub struct BatchReport {
    /// Target name.
    pub target_name: String,
    /// Target point count.
    pub target_points: usize,
    /// Planes segmented from the target.
    pub target_planes: usize,
    /// Target segmentation time.
    pub target_elapsed: Duration,
    /// One outcome per source, in insertion order.
    pub outcomes: Vec<SourceOutcome>,
}

impl BatchReport {
    /// Number of aligned sources.
    #[must_use]
    pub fn aligned_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.report().is_some()).count()
    }

    /// Number of unaligned sources.
    #[must_use]
    pub fn unaligned_count(&self) -> usize {
        self.outcomes.len() - self.aligned_count()
    }

    /// Writes the human-readable summary.
    ///
    /// # Errors
    ///
    /// Returns any error from the writer.
    pub fn write_summary<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        write!(writer, "{self}")
    }

    /// Exports every aligned copy as `<name>_aligned`.
    ///
    /// # Errors
    ///
    /// Returns the first sink error.
    pub fn export_aligned(&self, sink: &mut dyn ExportSink) -> PipelineResult<()> {
        let mut renamed = Suffixed {
            inner: sink,
            suffix: "_aligned",
        };
        for report in self.outcomes.iter().filter_map(SourceOutcome::report) {
            report.aligned.save(&mut renamed, ALIGNED_COLOR)?;
        }
        Ok(())
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "target {}: {} points, {} planes ({:.2?})",
            self.target_name, self.target_points, self.target_planes, self.target_elapsed
        )?;
        for outcome in &self.outcomes {
            match outcome {
                SourceOutcome::Aligned(report) => {
                    write!(
                        f,
                        "  {}: aligned, {} points, {} planes, {} pairs, mean pair distance {:.4}, center offset {:.4}, {:?}",
                        report.name,
                        report.source_points,
                        report.source_planes,
                        report.registration.pairs.len(),
                        report.mean_pair_distance,
                        report.center_offset,
                        report.confidence(),
                    )?;
                    if let (Some(rotation), Some(translation)) =
                        (report.rotation_error_deg, report.translation_error)
                    {
                        write!(f, ", error {rotation:.3} deg / {translation:.4}")?;
                    }
                    writeln!(f, " ({:.2?})", report.elapsed)?;
                }
                SourceOutcome::Unaligned { name, error } => {
                    writeln!(f, "  {name}: unaligned, {error}")?;
                }
            }
        }
        writeln!(
            f,
            "{} of {} sources aligned",
            self.aligned_count(),
            self.outcomes.len()
        )
    }
}

/// Forwards exports under a suffixed name.
struct Suffixed<'a> {
    inner: &'a mut dyn ExportSink,
    suffix: &'a str,
}

impl ExportSink for Suffixed<'_> {
    fn export_cloud(
        &mut self,
        name: &str,
        cloud: &PointCloud,
        color: VertexColor,
    ) -> PipelineResult<()> {
        self.inner
            .export_cloud(&format!("{name}{}", self.suffix), cloud, color)
    }

    fn export_mesh(
        &mut self,
        name: &str,
        mesh: &IndexedMesh,
        color: VertexColor,
    ) -> PipelineResult<()> {
        self.inner
            .export_mesh(&format!("{name}{}", self.suffix), mesh, color)
    }
}
