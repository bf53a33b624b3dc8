//! Alignable objects: point clouds and meshes behind one interface.

use std::fmt;
use std::sync::Arc;

use align_cloud::{KdNeighbors, estimate_normals, voxel_downsample};
use align_plane::SegmentedPlane;
use align_segment::{PlaneMerger, Segmentation, segment_cloud, segment_mesh};
use align_types::{IndexedMesh, PointCloud, RigidTransform, VertexColor};
use nalgebra::Point3;
use tracing::{debug, info};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::loader::{CloudLoader, MeshLoader, SceneFile};
use crate::palette::{colorize_cloud, colorize_mesh};
use crate::sink::ExportSink;

/// Something that can be loaded, segmented into planes and moved.
///
/// Operations other than [`load`](Self::load) and [`name`](Self::name)
/// fail with [`PipelineError::NotLoaded`] until the object is loaded.
pub trait AlignObject: Send + Sync + fmt::Debug {
    /// Display name, also used for exports.
    fn name(&self) -> &str;

    /// Loads the data. Loading an already loaded object does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::LoadFailure`] if the loader fails or yields
    /// no points.
    fn load(&mut self) -> PipelineResult<()>;

    /// Whether [`load`](Self::load) has succeeded.
    fn is_loaded(&self) -> bool;

    /// Prepares the data for segmentation.
    ///
    /// # Errors
    ///
    /// Returns an error if the object is not loaded or preparation fails.
    fn preprocess(&mut self, config: &PipelineConfig) -> PipelineResult<()>;

    /// Segments the object into merged planar patches.
    ///
    /// # Errors
    ///
    /// Returns an error if the object is not loaded or segmentation fails.
    fn segment(&mut self, config: &PipelineConfig) -> PipelineResult<Segmentation>;

    /// Moves the object rigidly.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::NotLoaded`] if there is nothing to move.
    fn transform(&mut self, transform: &RigidTransform) -> PipelineResult<()>;

    /// Point or vertex positions; patch indices refer to this slice.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::NotLoaded`] before loading.
    fn points(&self) -> PipelineResult<Vec<Point3<f64>>>;

    /// Sends the object to `sink` with a display color.
    ///
    /// # Errors
    ///
    /// Returns an error if the object is not loaded or the sink fails.
    fn save(&self, sink: &mut dyn ExportSink, color: VertexColor) -> PipelineResult<()>;

    /// Colors the data by patch membership.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::NotLoaded`] before loading.
    fn colorize(&mut self, patches: &[SegmentedPlane]) -> PipelineResult<()>;

    /// Clones the object, loaded data included.
    fn boxed_clone(&self) -> Box<dyn AlignObject>;
}

impl Clone for Box<dyn AlignObject> {
    fn clone(&self) -> Self {
        self.boxed_clone()
    }
}

fn not_loaded(name: &str) -> PipelineError {
    PipelineError::NotLoaded {
        object: name.to_string(),
    }
}

fn load_failure(name: &str, reason: impl fmt::Display) -> PipelineError {
    PipelineError::LoadFailure {
        object: name.to_string(),
        reason: reason.to_string(),
    }
}

/// A point cloud object.
///
/// # Example
///
/// ```
/// use align_pipeline::{AlignObject, CloudObject};
/// use align_types::{Point3, PointCloud};
///
/// let cloud = PointCloud::from_positions(&[Point3::origin(), Point3::new(1.0, 0.0, 0.0)]);
/// let mut object = CloudObject::from_cloud("scan", cloud);
/// assert!(!object.is_loaded());
/// object.load().unwrap();
/// assert_eq!(object.points().unwrap().len(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct CloudObject {
    name: String,
    loader: Arc<dyn CloudLoader>,
    cloud: Option<PointCloud>,
    // Built over the current positions; dropped whenever they move.
    index: Option<Arc<KdNeighbors>>,
}

impl CloudObject {
    /// Creates an unloaded object backed by `loader`.
    #[must_use]
    pub fn new(name: impl Into<String>, loader: impl CloudLoader + 'static) -> Self {
        Self {
            name: name.into(),
            loader: Arc::new(loader),
            cloud: None,
            index: None,
        }
    }

    /// An object that loads a copy of `cloud`.
    #[must_use]
    pub fn from_cloud(name: impl Into<String>, cloud: PointCloud) -> Self {
        Self::new(name, cloud)
    }

    /// An object read from a PLY or XYZ file, named after the file stem.
    #[must_use]
    pub fn from_file(file: SceneFile) -> Self {
        Self::new(file.stem(), file)
    }

    /// The loaded cloud, if any.
    #[must_use]
    pub fn cloud(&self) -> Option<&PointCloud> {
        self.cloud.as_ref()
    }

    fn loaded(&self) -> PipelineResult<&PointCloud> {
        self.cloud.as_ref().ok_or_else(|| not_loaded(&self.name))
    }

    /// Whether a neighbor index over the current positions is cached.
    #[must_use]
    pub fn has_index(&self) -> bool {
        self.index.is_some()
    }
}

impl AlignObject for CloudObject {
    fn name(&self) -> &str {
        &self.name
    }

    fn load(&mut self) -> PipelineResult<()> {
        if self.cloud.is_some() {
            return Ok(());
        }
        let cloud = self
            .loader
            .load_cloud()
            .map_err(|e| load_failure(&self.name, e))?;
        if cloud.is_empty() {
            return Err(load_failure(&self.name, "no points"));
        }
        info!(object = %self.name, points = cloud.len(), "loaded point cloud");
        self.cloud = Some(cloud);
        Ok(())
    }

    fn is_loaded(&self) -> bool {
        self.cloud.is_some()
    }

    fn preprocess(&mut self, config: &PipelineConfig) -> PipelineResult<()> {
        let cloud = self.cloud.as_mut().ok_or_else(|| not_loaded(&self.name))?;
        self.index = None;
        if let Some(leaf) = config.voxel_leaf {
            let before = cloud.len();
            *cloud = voxel_downsample(cloud, leaf)?;
            debug!(object = %self.name, before, after = cloud.len(), "voxel downsampled");
        }
        let index = Arc::new(KdNeighbors::new(&cloud.positions()));
        estimate_normals(cloud, &*index, &config.normals)?;
        self.index = Some(index);
        Ok(())
    }

    fn segment(&mut self, config: &PipelineConfig) -> PipelineResult<Segmentation> {
        let cloud = self.cloud.as_mut().ok_or_else(|| not_loaded(&self.name))?;
        let positions = cloud.positions();
        let index = Arc::clone(
            self.index
                .get_or_insert_with(|| Arc::new(KdNeighbors::new(&positions))),
        );
        if cloud
            .points
            .iter()
            .any(|p| p.normal.is_none() || p.curvature.is_none())
        {
            estimate_normals(cloud, &*index, &config.normals)?;
        }

        let mut segmentation = segment_cloud(cloud, &*index, config.segment)?;
        let before = segmentation.patches.len();
        let merger = PlaneMerger::new(config.merge)?;
        segmentation.patches =
            merger.merge_by_proximity(&positions, &*index, segmentation.patches)?;
        segmentation.stats.patches = segmentation.patches.len();
        debug!(
            object = %self.name,
            segmented = before,
            merged = segmentation.patches.len(),
            "segmented point cloud"
        );
        Ok(segmentation)
    }

    fn transform(&mut self, transform: &RigidTransform) -> PipelineResult<()> {
        let cloud = self.cloud.as_mut().ok_or_else(|| not_loaded(&self.name))?;
        cloud.transform(transform);
        self.index = None;
        Ok(())
    }

    fn points(&self) -> PipelineResult<Vec<Point3<f64>>> {
        Ok(self.loaded()?.positions())
    }

    fn save(&self, sink: &mut dyn ExportSink, color: VertexColor) -> PipelineResult<()> {
        sink.export_cloud(&self.name, self.loaded()?, color)
    }

    fn colorize(&mut self, patches: &[SegmentedPlane]) -> PipelineResult<()> {
        let cloud = self.cloud.as_mut().ok_or_else(|| not_loaded(&self.name))?;
        colorize_cloud(cloud, patches);
        Ok(())
    }

    fn boxed_clone(&self) -> Box<dyn AlignObject> {
        Box::new(self.clone())
    }
}

/// A triangle mesh object. Patches are sets of vertex indices.
#[derive(Debug, Clone)]
pub struct MeshObject {
    name: String,
    loader: Arc<dyn MeshLoader>,
    mesh: Option<IndexedMesh>,
}

impl MeshObject {
    /// Creates an unloaded object backed by `loader`.
    #[must_use]
    pub fn new(name: impl Into<String>, loader: impl MeshLoader + 'static) -> Self {
        Self {
            name: name.into(),
            loader: Arc::new(loader),
            mesh: None,
        }
    }

    /// An object that loads a copy of `mesh`.
    #[must_use]
    pub fn from_mesh(name: impl Into<String>, mesh: IndexedMesh) -> Self {
        Self::new(name, mesh)
    }

    /// An object read from a PLY file, named after the file stem.
    #[must_use]
    pub fn from_file(file: SceneFile) -> Self {
        Self::new(file.stem(), file)
    }

    /// The loaded mesh, if any.
    #[must_use]
    pub fn mesh(&self) -> Option<&IndexedMesh> {
        self.mesh.as_ref()
    }

    fn loaded(&self) -> PipelineResult<&IndexedMesh> {
        self.mesh.as_ref().ok_or_else(|| not_loaded(&self.name))
    }
}

impl AlignObject for MeshObject {
    fn name(&self) -> &str {
        &self.name
    }

    fn load(&mut self) -> PipelineResult<()> {
        if self.mesh.is_some() {
            return Ok(());
        }
        let mesh = self
            .loader
            .load_mesh()
            .map_err(|e| load_failure(&self.name, e))?;
        if mesh.vertices.is_empty() {
            return Err(load_failure(&self.name, "no vertices"));
        }
        info!(
            object = %self.name,
            vertices = mesh.vertex_count(),
            faces = mesh.face_count(),
            "loaded mesh"
        );
        self.mesh = Some(mesh);
        Ok(())
    }

    fn is_loaded(&self) -> bool {
        self.mesh.is_some()
    }

    fn preprocess(&mut self, _config: &PipelineConfig) -> PipelineResult<()> {
        self.loaded().map(|_| ())
    }

    fn segment(&mut self, config: &PipelineConfig) -> PipelineResult<Segmentation> {
        let mesh = self.loaded()?;
        let mut segmentation = segment_mesh(mesh, config.segment)?;
        let before = segmentation.patches.len();
        let merger = PlaneMerger::new(config.merge)?;
        segmentation.patches = merger.merge_shared_points(&mesh.vertices, segmentation.patches);
        segmentation.stats.patches = segmentation.patches.len();
        debug!(
            object = %self.name,
            segmented = before,
            merged = segmentation.patches.len(),
            "segmented mesh"
        );
        Ok(segmentation)
    }

    fn transform(&mut self, transform: &RigidTransform) -> PipelineResult<()> {
        let mesh = self.mesh.as_mut().ok_or_else(|| not_loaded(&self.name))?;
        mesh.transform(transform);
        Ok(())
    }

    fn points(&self) -> PipelineResult<Vec<Point3<f64>>> {
        Ok(self.loaded()?.vertices.clone())
    }

    fn save(&self, sink: &mut dyn ExportSink, color: VertexColor) -> PipelineResult<()> {
        sink.export_mesh(&self.name, self.loaded()?, color)
    }

    fn colorize(&mut self, patches: &[SegmentedPlane]) -> PipelineResult<()> {
        let mesh = self.mesh.as_mut().ok_or_else(|| not_loaded(&self.name))?;
        colorize_mesh(mesh, patches);
        Ok(())
    }

    fn boxed_clone(&self) -> Box<dyn AlignObject> {
        Box::new(self.clone())
    }
}
