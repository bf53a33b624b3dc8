//! Export sinks for visualization.
//!
//! A sink receives finished objects with a display color and never feeds
//! anything back into the pipeline.

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use align_types::{IndexedMesh, PointCloud, VertexColor};
use tracing::debug;

use crate::error::PipelineResult;
use crate::ply::write_ply;

/// Receives objects for display or storage.
pub trait ExportSink {
    /// Exports a point cloud. Points without their own color take `color`.
    ///
    /// # Errors
    ///
    /// Returns an error if the sink cannot store the object.
    fn export_cloud(
        &mut self,
        name: &str,
        cloud: &PointCloud,
        color: VertexColor,
    ) -> PipelineResult<()>;

    /// Exports a mesh. Without per-vertex colors the mesh takes `color`.
    ///
    /// # Errors
    ///
    /// Returns an error if the sink cannot store the object.
    fn export_mesh(&mut self, name: &str, mesh: &IndexedMesh, color: VertexColor)
    -> PipelineResult<()>;
}

/// Writes every export as `<dir>/<name>.ply`.
#[derive(Debug, Clone)]
pub struct PlyDirectory {
    dir: PathBuf,
}

impl PlyDirectory {
    /// Exports into `dir`, which is created on first use.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path an export named `name` is written to.
    #[must_use]
    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.ply"))
    }

    fn write(
        &self,
        name: &str,
        positions: &[nalgebra::Point3<f64>],
        colors: &[VertexColor],
        faces: &[[u32; 3]],
    ) -> PipelineResult<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(name);
        let mut writer = BufWriter::new(File::create(&path)?);
        write_ply(&mut writer, positions, colors, faces)?;
        debug!(path = %path.display(), vertices = positions.len(), "exported PLY");
        Ok(())
    }

    /// The export directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ExportSink for PlyDirectory {
    fn export_cloud(
        &mut self,
        name: &str,
        cloud: &PointCloud,
        color: VertexColor,
    ) -> PipelineResult<()> {
        let colors: Vec<VertexColor> = cloud
            .points
            .iter()
            .map(|p| p.color.unwrap_or(color))
            .collect();
        self.write(name, &cloud.positions(), &colors, &[])
    }

    fn export_mesh(
        &mut self,
        name: &str,
        mesh: &IndexedMesh,
        color: VertexColor,
    ) -> PipelineResult<()> {
        let colors = if mesh.colors.len() == mesh.vertices.len() {
            mesh.colors.clone()
        } else {
            vec![color; mesh.vertices.len()]
        };
        self.write(name, &mesh.vertices, &colors, &mesh.faces)
    }
}

/// Kind of an exported object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    /// A point cloud.
    Cloud,
    /// A triangle mesh.
    Mesh,
}

/// One export seen by a [`RecordingSink`].
#[derive(Debug, Clone, PartialEq)]
pub struct ExportRecord {
    /// Export name.
    pub name: String,
    /// Object kind.
    pub kind: ExportKind,
    /// Number of points or vertices.
    pub vertex_count: usize,
    /// Display color passed with the export.
    pub color: VertexColor,
}

/// Keeps a record of every export and stores nothing.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    /// Exports in arrival order.
    pub exports: Vec<ExportRecord>,
}

impl RecordingSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ExportSink for RecordingSink {
    fn export_cloud(
        &mut self,
        name: &str,
        cloud: &PointCloud,
        color: VertexColor,
    ) -> PipelineResult<()> {
        self.exports.push(ExportRecord {
            name: name.to_string(),
            kind: ExportKind::Cloud,
            vertex_count: cloud.len(),
            color,
        });
        Ok(())
    }

    fn export_mesh(
        &mut self,
        name: &str,
        mesh: &IndexedMesh,
        color: VertexColor,
    ) -> PipelineResult<()> {
        self.exports.push(ExportRecord {
            name: name.to_string(),
            kind: ExportKind::Mesh,
            vertex_count: mesh.vertex_count(),
            color,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::{CloudLoader, MeshLoader, SceneFile};
    use nalgebra::Point3;
    use tempfile::tempdir;

    #[test]
    fn ply_directory_writes_loadable_files() {
        let dir = tempdir().unwrap();
        let mut sink = PlyDirectory::new(dir.path().join("out"));

        let mut cloud = PointCloud::from_positions(&[
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.5, 0.25),
        ]);
        cloud.points[1].color = Some(VertexColor::new(1, 2, 3));
        sink.export_cloud("cloud", &cloud, VertexColor::new(9, 9, 9))
            .unwrap();

        let loaded = SceneFile::new(sink.path_for("cloud")).load_cloud().unwrap();
        assert_eq!(loaded.positions(), cloud.positions());
        assert_eq!(loaded.points[0].color, Some(VertexColor::new(9, 9, 9)));
        assert_eq!(loaded.points[1].color, Some(VertexColor::new(1, 2, 3)));

        let mesh = IndexedMesh::from_parts(
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
            ],
            vec![[0, 1, 2]],
        );
        sink.export_mesh("mesh", &mesh, VertexColor::new(200, 0, 0))
            .unwrap();
        let loaded = SceneFile::new(sink.path_for("mesh")).load_mesh().unwrap();
        assert_eq!(loaded.faces, mesh.faces);
        assert_eq!(loaded.colors, vec![VertexColor::new(200, 0, 0); 3]);
    }

    #[test]
    fn recording_sink_keeps_order() {
        let mut sink = RecordingSink::new();
        let cloud = PointCloud::from_positions(&[Point3::origin()]);
        sink.export_cloud("a", &cloud, VertexColor::WHITE).unwrap();
        sink.export_mesh("b", &IndexedMesh::new(), VertexColor::WHITE)
            .unwrap();

        let names: Vec<_> = sink.exports.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["a", "b"]);
        assert_eq!(sink.exports[0].kind, ExportKind::Cloud);
        assert_eq!(sink.exports[1].vertex_count, 0);
    }
}
