//! API Regression Tests for the align crate ecosystem
//!
//! These tests pin the public API across the align-* crates. They are
//! organized in tiers that follow the processing order:
//!
//! - Tier 1: Foundation (align-types)
//! - Tier 2: Planes (align-plane)
//! - Tier 3: Cloud preparation and segmentation (align-cloud, align-segment)
//! - Tier 4: Registration (align-registration)
//! - Tier 5: Pipeline (align-pipeline)
//!
//! A failure after an API change marks a breaking change.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::cast_precision_loss)]

use align::{cloud, pipeline, plane, prelude::*, registration, segment, types};

/// Points on the `c[axis] = 0` face of a box corner, sampled on a
/// low-discrepancy sequence.
fn face(axis: usize, size_u: f64, size_v: f64, n: u32) -> Vec<Point3<f64>> {
    (0..n)
        .map(|i| {
            let t = f64::from(i);
            let mut c = [0.0; 3];
            c[(axis + 1) % 3] = (t * 0.618_034).fract() * size_u;
            c[(axis + 2) % 3] = (t * 0.414_214).fract() * size_v;
            Point3::new(c[0], c[1], c[2])
        })
        .collect()
}

/// Faces as one point list plus one patch per face.
fn faces(sizes: &[(f64, f64)], n: u32) -> (Vec<Point3<f64>>, Vec<SegmentedPlane>) {
    let mut points = Vec::new();
    let mut groups = Vec::new();
    for (axis, &(u, v)) in sizes.iter().enumerate() {
        let start = points.len();
        points.extend(face(axis, u, v, n));
        groups.push((start..points.len()).collect::<Vec<_>>());
    }
    let patches = groups
        .into_iter()
        .map(|g| SegmentedPlane::from_indices(&points, g).unwrap())
        .collect();
    (points, patches)
}

// =============================================================================
// TIER 1: Foundation
// =============================================================================

mod tier1_foundation {
    use super::*;

    #[test]
    fn rigid_transform_composition() {
        let a = RigidTransform::from_translation(Vector3::new(1.0, 0.0, 0.0));
        let b = RigidTransform::from_rotation(types::UnitQuaternion::from_euler_angles(
            0.0,
            0.0,
            std::f64::consts::FRAC_PI_2,
        ));
        // `a.compose(&b)` applies `b` first.
        let p = a.compose(&b).transform_point(&Point3::new(1.0, 0.0, 0.0));
        assert!((p - Point3::new(1.0, 1.0, 0.0)).norm() < 1e-12);

        let round = a.compose(&b).inverse().compose(&a.compose(&b));
        assert!(round.is_identity(1e-12));
    }

    #[test]
    fn matrix_round_trip() {
        let t = RigidTransform::new(
            types::UnitQuaternion::from_euler_angles(0.3, 0.2, 0.1),
            Vector3::new(1.0, 2.0, 3.0),
        );
        let back = RigidTransform::from_matrix4(&t.to_matrix4());
        assert!(back.inverse().compose(&t).is_identity(1e-9));
    }

    #[test]
    fn cloud_transform_rotates_normals() {
        let mut cloud = PointCloud::new();
        let mut point = CloudPoint::new(Point3::new(1.0, 0.0, 0.0));
        point.normal = Some(Vector3::x());
        cloud.push(point);

        let quarter = RigidTransform::from_rotation(types::UnitQuaternion::from_euler_angles(
            0.0,
            0.0,
            std::f64::consts::FRAC_PI_2,
        ));
        cloud.transform(&quarter);
        let normal = cloud.points[0].normal.unwrap();
        assert!((normal - Vector3::y()).norm() < 1e-12);
        assert!(cloud.has_normals());
    }

    #[test]
    fn mesh_construction() {
        let mesh = IndexedMesh::from_parts(
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
            ],
            vec![[0, 1, 2]],
        );
        assert_eq!(mesh.vertex_count(), 3);
        assert_eq!(mesh.face_count(), 1);
        assert!((mesh.face_area(0) - 0.5).abs() < 1e-12);
        assert!((mesh.face_normal(0).unwrap() - Vector3::z()).norm() < 1e-12);
    }
}

// =============================================================================
// TIER 2: Planes
// =============================================================================

mod tier2_planes {
    use super::*;

    #[test]
    fn coplanar_fit_has_zero_residual() {
        let points = face(2, 2.0, 1.0, 50);
        let indices: Vec<usize> = (0..points.len()).collect();
        let fitted = Plane::fit(&points, &indices).unwrap();

        assert!(fitted.residual_std_dev(&points, &indices) < 1e-12);
        assert!((fitted.normal().norm() - 1.0).abs() < 1e-12);
        for p in &points {
            assert!(fitted.distance_to(p) < 1e-12);
        }
    }

    #[test]
    fn degenerate_fits_are_errors() {
        let collinear: Vec<Point3<f64>> = (0..10)
            .map(|i| Point3::new(f64::from(i), 0.0, 0.0))
            .collect();
        let indices: Vec<usize> = (0..10).collect();
        assert!(matches!(
            Plane::fit(&collinear, &indices),
            Err(plane::PlaneError::DegeneratePlaneFit { .. })
        ));
        assert!(matches!(
            Plane::fit(&collinear, &[0, 1]),
            Err(plane::PlaneError::DegeneratePlaneFit { points: 2, .. })
        ));
    }

    #[test]
    fn segmented_plane_descriptor() {
        let points = face(0, 1.0, 2.0, 100);
        let patch = SegmentedPlane::from_indices(&points, (0..100).collect()).unwrap();
        assert_eq!(patch.len(), 100);
        assert!(patch.normal().x.abs() > 1.0 - 1e-9);
        assert!(patch.extent() > 1.0);
    }
}

// =============================================================================
// TIER 3: Cloud preparation and segmentation
// =============================================================================

mod tier3_segmentation {
    use super::*;

    fn corner() -> (PointCloud, KdNeighbors) {
        let mut cloud = pipeline::box_corner(
            &pipeline::BoxCornerParams::new()
                .with_points_per_face(1500)
                .with_inlier_ratio(1.0)
                .with_seed(21),
        )
        .unwrap();
        let index = KdNeighbors::new(&cloud.positions());
        estimate_normals(&mut cloud, &index, &NormalParams::default()).unwrap();
        (cloud, index)
    }

    #[test]
    fn normals_and_curvature_for_every_point() {
        let (cloud, index) = corner();
        assert_eq!(index.len(), cloud.len());
        assert!(cloud.has_normals());
        assert!(cloud.points.iter().all(|p| p.curvature.is_some()));
    }

    #[test]
    fn segmentation_is_repeatable() {
        let (cloud, index) = corner();
        let a = segment_cloud(&cloud, &index, SegmentParams::default()).unwrap();
        let b = segment_cloud(&cloud, &index, SegmentParams::default()).unwrap();

        assert!(a.patches.len() >= 3);
        assert_eq!(a.patches.len(), b.patches.len());
        for (pa, pb) in a.patches.iter().zip(&b.patches) {
            assert_eq!(pa.indices, pb.indices);
        }
    }

    #[test]
    fn merging_reaches_a_fixpoint() {
        let (cloud, index) = corner();
        let positions = cloud.positions();
        let segmentation = segment_cloud(&cloud, &index, SegmentParams::default()).unwrap();
        let merger = PlaneMerger::new(MergeParams::default()).unwrap();

        let once = merger
            .merge_by_proximity(&positions, &index, segmentation.patches)
            .unwrap();
        let twice = merger
            .merge_by_proximity(&positions, &index, once.clone())
            .unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn invalid_parameters_are_configuration_errors() {
        let err = NormalParams::new()
            .with_neighborhood(cloud::Neighborhood::Nearest(1))
            .validate()
            .unwrap_err();
        assert!(matches!(err, cloud::CloudError::InvalidParameter { .. }));

        let err = PlaneMerger::new(MergeParams::new().with_max_angle(-1.0)).unwrap_err();
        assert!(err.is_configuration());

        let (cloud, index) = corner();
        let err = PlaneSegmenter::for_cloud(
            &cloud,
            &index,
            SegmentParams::new().with_max_seed_curvature(0.0),
        )
        .err()
        .unwrap();
        assert!(matches!(err, segment::SegmentError::NoEligibleSeeds { .. }));
    }
}

// =============================================================================
// TIER 4: Registration
// =============================================================================

mod tier4_registration {
    use super::*;

    const SIZES: [(f64, f64); 3] = [(1.0, 2.0), (2.0, 3.0), (3.0, 1.0)];

    fn truth() -> RigidTransform {
        RigidTransform::new(
            types::UnitQuaternion::from_euler_angles(-0.4, 0.7, 2.0),
            Vector3::new(-2.0, 0.5, 1.5),
        )
    }

    /// The scene moved by `truth()`, with the same patch memberships.
    fn moved_scene(
        points: &[Point3<f64>],
        patches: &[SegmentedPlane],
    ) -> (Vec<Point3<f64>>, Vec<SegmentedPlane>) {
        let moved: Vec<Point3<f64>> = points.iter().map(|p| truth().transform_point(p)).collect();
        let moved_patches = patches
            .iter()
            .map(|p| SegmentedPlane::from_indices(&moved, p.indices.clone()).unwrap())
            .collect();
        (moved, moved_patches)
    }

    #[test]
    fn box_corner_is_recovered() {
        let (points, patches) = faces(&SIZES, 300);
        let (moved, moved_patches) = moved_scene(&points, &patches);

        let result = register_planes(
            &PlaneScene::new(&points, &patches),
            &PlaneScene::new(&moved, &moved_patches),
            &RegistrationParams::default(),
        )
        .unwrap();

        assert_eq!(result.pairs.len(), 3);
        assert_eq!(result.confidence, Confidence::Full);
        assert!(result.transform.inverse().compose(&truth()).rotation_angle() < 1e-6);
        assert!((result.transform.translation - truth().translation).norm() < 1e-6);
        let icp = result.icp.unwrap();
        assert!(icp.error_history.windows(2).all(|w| w[1] <= w[0]));
    }

    #[test]
    fn two_planes_are_insufficient() {
        let (points, patches) = faces(&SIZES[..2], 300);
        let (moved, moved_patches) = moved_scene(&points, &patches);
        let err = register_planes(
            &PlaneScene::new(&points, &patches),
            &PlaneScene::new(&moved, &moved_patches),
            &RegistrationParams::default(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            registration::RegistrationError::InsufficientCorrespondences { required: 3, .. }
        ));
    }

    #[test]
    fn empty_scenes_are_rejected() {
        let (points, patches) = faces(&SIZES, 50);
        let err = register_planes(
            &PlaneScene::new(&points, &patches),
            &PlaneScene::new(&[], &[]),
            &RegistrationParams::default(),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            registration::RegistrationError::EmptyTargetMesh
        ));
    }
}

// =============================================================================
// TIER 5: Pipeline
// =============================================================================

mod tier5_pipeline {
    use super::*;
    use pipeline::{ExportSink, RecordingSink};

    #[test]
    fn config_presets_validate() {
        for config in [
            PipelineConfig::default(),
            PipelineConfig::fine(),
            PipelineConfig::coarse(),
        ] {
            assert!(config.validate().is_ok());
        }
    }

    #[test]
    fn ply_directory_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = PlyDirectory::new(dir.path());
        let cloud = PointCloud::from_positions(&face(2, 1.0, 1.0, 20));
        sink.export_cloud("scan", &cloud, pipeline::TARGET_COLOR)
            .unwrap();

        let mut object = CloudObject::from_file(SceneFile::new(sink.path_for("scan")));
        assert_eq!(object.name(), "scan");
        object.load().unwrap();
        let loaded = object.points().unwrap();
        assert_eq!(loaded.len(), 20);
        for (a, b) in loaded.iter().zip(cloud.positions()) {
            assert!((a - b).norm() < 1e-9);
        }
    }

    #[test]
    fn objects_export_with_display_colors() {
        let mut object = MeshObject::from_mesh(
            "tri",
            IndexedMesh::from_parts(
                vec![
                    Point3::new(0.0, 0.0, 0.0),
                    Point3::new(1.0, 0.0, 0.0),
                    Point3::new(0.0, 1.0, 0.0),
                ],
                vec![[0, 1, 2]],
            ),
        );
        object.load().unwrap();

        let mut sink = RecordingSink::new();
        object.save(&mut sink, pipeline::SOURCE_COLOR).unwrap();
        assert_eq!(sink.exports[0].name, "tri");
        assert_eq!(sink.exports[0].color, pipeline::SOURCE_COLOR);
    }

    #[test]
    fn error_metrics() {
        let truth = RigidTransform::new(
            types::UnitQuaternion::from_euler_angles(0.1, 0.0, 0.0),
            Vector3::new(0.0, 0.0, 1.0),
        );
        assert!(pipeline::rotation_error_deg(&truth.inverse(), &truth) < 1e-9);
        assert!(pipeline::translation_error(&RigidTransform::identity(), &truth) > 0.99);
    }
}
