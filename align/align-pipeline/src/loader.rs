//! Sources of point clouds and meshes.
//!
//! The pipeline only consumes the [`CloudLoader`] and [`MeshLoader`]
//! traits. In-memory clouds and meshes load as copies of themselves;
//! [`SceneFile`] reads PLY and XYZ files.

use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use align_types::{CloudPoint, IndexedMesh, PointCloud, VertexColor};
use nalgebra::{Point3, Vector3};

use crate::error::{PipelineError, PipelineResult};
use crate::ply::read_ply;

/// Produces a point cloud.
pub trait CloudLoader: Send + Sync + fmt::Debug {
    /// Loads the cloud.
    ///
    /// # Errors
    ///
    /// Returns an error if the data cannot be read or parsed.
    fn load_cloud(&self) -> PipelineResult<PointCloud>;
}

/// Produces a triangle mesh.
pub trait MeshLoader: Send + Sync + fmt::Debug {
    /// Loads the mesh.
    ///
    /// # Errors
    ///
    /// Returns an error if the data cannot be read or parsed.
    fn load_mesh(&self) -> PipelineResult<IndexedMesh>;
}

impl CloudLoader for PointCloud {
    fn load_cloud(&self) -> PipelineResult<PointCloud> {
        Ok(self.clone())
    }
}

impl MeshLoader for IndexedMesh {
    fn load_mesh(&self) -> PipelineResult<IndexedMesh> {
        Ok(self.clone())
    }
}

/// Supported scene file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneFormat {
    /// Polygon File Format, ASCII or binary.
    Ply,
    /// Whitespace-separated `x y z [nx ny nz] [r g b]` lines.
    Xyz,
}

impl SceneFormat {
    /// Detects the format from a file extension.
    ///
    /// # Example
    ///
    /// ```
    /// use align_pipeline::SceneFormat;
    ///
    /// assert_eq!(SceneFormat::from_extension("PLY"), Some(SceneFormat::Ply));
    /// assert_eq!(SceneFormat::from_extension("pts"), Some(SceneFormat::Xyz));
    /// assert_eq!(SceneFormat::from_extension("obj"), None);
    /// ```
    #[must_use]
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "ply" => Some(Self::Ply),
            "xyz" | "txt" | "pts" => Some(Self::Xyz),
            _ => None,
        }
    }

    /// Detects the format from a file path.
    #[must_use]
    pub fn from_path<P: AsRef<Path>>(path: P) -> Option<Self> {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }
}

/// A scan stored on disk; the format follows the extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneFile {
    path: PathBuf,
}

impl SceneFile {
    /// Refers to the file at `path`. Nothing is read until loading.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File stem, used as the object name.
    #[must_use]
    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .map_or_else(|| self.path.display().to_string(), |s| s.to_string_lossy().into_owned())
    }

    fn format(&self) -> PipelineResult<SceneFormat> {
        SceneFormat::from_path(&self.path).ok_or_else(|| {
            PipelineError::invalid_content(format!(
                "unsupported file format: {}",
                self.path.display()
            ))
        })
    }
}

impl CloudLoader for SceneFile {
    fn load_cloud(&self) -> PipelineResult<PointCloud> {
        match self.format()? {
            SceneFormat::Xyz => load_xyz(&self.path),
            SceneFormat::Ply => {
                let data = read_ply(&self.path)?;
                let points = data
                    .positions
                    .into_iter()
                    .zip(data.normals)
                    .zip(data.colors)
                    .map(|((position, normal), color)| CloudPoint {
                        position,
                        normal,
                        curvature: None,
                        color,
                    })
                    .collect();
                Ok(PointCloud { points })
            }
        }
    }
}

impl MeshLoader for SceneFile {
    fn load_mesh(&self) -> PipelineResult<IndexedMesh> {
        match self.format()? {
            SceneFormat::Xyz => Err(PipelineError::invalid_content(format!(
                "{} holds points only, not a mesh",
                self.path.display()
            ))),
            SceneFormat::Ply => {
                let data = read_ply(&self.path)?;
                let colors = if data.colors.iter().all(Option::is_some) {
                    data.colors.into_iter().flatten().collect()
                } else {
                    Vec::new()
                };
                Ok(IndexedMesh {
                    vertices: data.positions,
                    colors,
                    faces: data.faces,
                })
            }
        }
    }
}

fn load_xyz(path: &Path) -> PipelineResult<PointCloud> {
    let reader = BufReader::new(File::open(path)?);
    let mut cloud = PointCloud::new();

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with("//") {
            continue;
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 3 {
            continue;
        }
        let coord = |i: usize| {
            parts[i].parse::<f64>().map_err(|_| {
                PipelineError::invalid_content(format!(
                    "line {}: invalid coordinate {}",
                    line_no + 1,
                    parts[i]
                ))
            })
        };
        let mut point = CloudPoint::new(Point3::new(coord(0)?, coord(1)?, coord(2)?));

        // Columns 3..6 hold either a unit normal or an 8-bit color.
        point.normal = parts.get(3..6).and_then(parse_unit_normal);
        let color_start = if point.normal.is_some() { 6 } else { 3 };
        point.color = parts
            .get(color_start..color_start + 3)
            .and_then(parse_color);

        cloud.push(point);
    }

    Ok(cloud)
}

/// Largest deviation from unit length for a column triple read as a normal.
const NORMAL_LENGTH_TOLERANCE: f64 = 0.01;

fn parse_unit_normal(columns: &[&str]) -> Option<Vector3<f64>> {
    let mut n = [0.0; 3];
    for (value, column) in n.iter_mut().zip(columns) {
        *value = column.parse::<f64>().ok()?;
    }
    let normal = Vector3::from(n);
    ((normal.norm() - 1.0).abs() <= NORMAL_LENGTH_TOLERANCE).then(|| normal.normalize())
}

fn parse_color(columns: &[&str]) -> Option<VertexColor> {
    let mut rgb = [0u8; 3];
    for (value, column) in rgb.iter_mut().zip(columns) {
        *value = column.parse::<u8>().ok()?;
    }
    Some(VertexColor::new(rgb[0], rgb[1], rgb[2]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ply::write_ply;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn xyz_with_comments_normals_and_colors() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("scan.xyz");
        let mut file = File::create(&path).unwrap();
        writeln!(file, "# header").unwrap();
        writeln!(file, "// another comment").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "0 0 0").unwrap();
        writeln!(file, "1 2 3 0 0 1").unwrap();
        writeln!(file, "4 5 6 10 20 30").unwrap();
        drop(file);

        let cloud = SceneFile::new(&path).load_cloud().unwrap();
        assert_eq!(cloud.len(), 3);
        assert_eq!(cloud.points[1].normal, Some(Vector3::z()));
        assert_eq!(cloud.points[2].normal, None);
        assert_eq!(cloud.points[2].color, Some(VertexColor::new(10, 20, 30)));
    }

    #[test]
    fn xyz_normals_are_unit_length_or_ignored() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("normals.xyz");
        std::fs::write(
            &path,
            "0 0 0 0.577 0.577 0.577 200 100 50\n\
             1 0 0 0.2 0.3 0.4\n\
             2 0 0 0 2 0\n",
        )
        .unwrap();

        let cloud = SceneFile::new(&path).load_cloud().unwrap();
        let normal = cloud.points[0].normal.unwrap();
        assert!((normal.norm() - 1.0).abs() < 1e-12);
        assert!((normal.x - normal.z).abs() < 1e-12);
        assert_eq!(cloud.points[0].color, Some(VertexColor::new(200, 100, 50)));

        // Neither a unit vector nor a color.
        assert_eq!(cloud.points[1].normal, None);
        assert_eq!(cloud.points[1].color, None);

        // Integers off the unit sphere read as a color.
        assert_eq!(cloud.points[2].normal, None);
        assert_eq!(cloud.points[2].color, Some(VertexColor::new(0, 2, 0)));
    }

    #[test]
    fn bad_coordinate_is_reported() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.xyz");
        std::fs::write(&path, "0 0 zero\n").unwrap();

        let err = SceneFile::new(&path).load_cloud().unwrap_err();
        assert!(matches!(err, PipelineError::InvalidContent { .. }));
    }

    #[test]
    fn ply_loads_as_cloud_and_mesh() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tri.ply");
        let positions = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        let mut file = File::create(&path).unwrap();
        write_ply(&mut file, &positions, &[], &[[0, 1, 2]]).unwrap();
        drop(file);

        let source = SceneFile::new(&path);
        assert_eq!(source.stem(), "tri");
        assert_eq!(source.load_cloud().unwrap().positions(), positions);
        let mesh = source.load_mesh().unwrap();
        assert_eq!(mesh.faces, vec![[0, 1, 2]]);
        assert!(mesh.colors.is_empty());
    }

    #[test]
    fn unsupported_format_and_xyz_mesh_fail() {
        let err = SceneFile::new("scan.obj").load_cloud().unwrap_err();
        assert!(matches!(err, PipelineError::InvalidContent { .. }));
        let err = SceneFile::new("scan.xyz").load_mesh().unwrap_err();
        assert!(matches!(err, PipelineError::InvalidContent { .. }));
    }

    #[test]
    fn in_memory_objects_load_as_copies() {
        let cloud = PointCloud::from_positions(&[Point3::new(1.0, 2.0, 3.0)]);
        assert_eq!(cloud.load_cloud().unwrap(), cloud);
    }
}
