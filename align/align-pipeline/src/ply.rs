//! PLY support for loaders and export sinks.
//!
//! Reads ASCII and binary PLY through ply-rs. Vertex positions are
//! required; normals (`nx ny nz`), colors (`red green blue`) and faces are
//! picked up when present. Polygons are fan-triangulated.
//!
//! Writing is ASCII with double-precision positions, so a saved object
//! loads back bit for bit.

use std::fs::File;
use std::io::{BufReader, Write};
use std::path::Path;

use align_types::VertexColor;
use nalgebra::{Point3, Vector3};
use ply_rs::parser::Parser;
use ply_rs::ply::{
    Addable, DefaultElement, ElementDef, Encoding, Ply, Property, PropertyDef, PropertyType,
    ScalarType,
};
use ply_rs::writer::Writer;

use crate::error::{PipelineError, PipelineResult};

/// Vertex and face data of a PLY file.
#[derive(Debug, Clone, Default)]
pub(crate) struct PlyData {
    pub positions: Vec<Point3<f64>>,
    pub normals: Vec<Option<Vector3<f64>>>,
    pub colors: Vec<Option<VertexColor>>,
    pub faces: Vec<[u32; 3]>,
}

pub(crate) fn read_ply(path: &Path) -> PipelineResult<PlyData> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);

    let parser = Parser::<DefaultElement>::new();
    let header = parser
        .read_header(&mut reader)
        .map_err(|e| PipelineError::invalid_content(format!("failed to parse PLY header: {e}")))?;
    let payload = parser
        .read_payload(&mut reader, &header)
        .map_err(|e| PipelineError::invalid_content(format!("failed to read PLY payload: {e}")))?;

    let mut data = PlyData::default();
    if let Some(vertices) = payload.get("vertex") {
        data.positions.reserve(vertices.len());
        for (i, element) in vertices.iter().enumerate() {
            let coord = |key: &str| {
                float_property(element, key).ok_or_else(|| {
                    PipelineError::invalid_content(format!("vertex {i} has no {key} coordinate"))
                })
            };
            data.positions.push(Point3::new(coord("x")?, coord("y")?, coord("z")?));

            data.normals.push(
                match (
                    float_property(element, "nx"),
                    float_property(element, "ny"),
                    float_property(element, "nz"),
                ) {
                    (Some(x), Some(y), Some(z)) => Some(Vector3::new(x, y, z)),
                    _ => None,
                },
            );
            data.colors.push(
                match (
                    color_property(element, "red"),
                    color_property(element, "green"),
                    color_property(element, "blue"),
                ) {
                    (Some(r), Some(g), Some(b)) => Some(VertexColor::new(r, g, b)),
                    _ => None,
                },
            );
        }
    }

    if let Some(faces) = payload.get("face") {
        data.faces.reserve(faces.len());
        for (f, element) in faces.iter().enumerate() {
            let indices = index_list(element)
                .ok_or_else(|| PipelineError::invalid_content(format!("face {f} has bad indices")))?;
            if let Some(&bad) = indices
                .iter()
                .find(|&&v| v as usize >= data.positions.len())
            {
                return Err(PipelineError::invalid_content(format!(
                    "face {f} references vertex {bad} of {}",
                    data.positions.len()
                )));
            }
            for k in 1..indices.len().saturating_sub(1) {
                data.faces.push([indices[0], indices[k], indices[k + 1]]);
            }
        }
    }

    Ok(data)
}

fn float_property(element: &DefaultElement, key: &str) -> Option<f64> {
    match element.get(key)? {
        Property::Float(v) => Some(f64::from(*v)),
        Property::Double(v) => Some(*v),
        _ => None,
    }
}

fn color_property(element: &DefaultElement, key: &str) -> Option<u8> {
    match element.get(key)? {
        Property::UChar(v) => Some(*v),
        _ => None,
    }
}

/// Face indices, or `None` if any index is negative.
fn index_list(element: &DefaultElement) -> Option<Vec<u32>> {
    for key in ["vertex_indices", "vertex_index"] {
        if let Some(prop) = element.get(key) {
            return match prop {
                Property::ListInt(v) => v.iter().map(|&i| u32::try_from(i).ok()).collect(),
                Property::ListUInt(v) => Some(v.clone()),
                Property::ListUChar(v) => Some(v.iter().map(|&i| u32::from(i)).collect()),
                Property::ListUShort(v) => Some(v.iter().map(|&i| u32::from(i)).collect()),
                Property::ListShort(v) => v.iter().map(|&i| u32::try_from(i).ok()).collect(),
                _ => None,
            };
        }
    }
    None
}

/// Writes positions, optional per-vertex colors and optional faces as
/// ASCII PLY. `colors` is either empty or one color per position.
pub(crate) fn write_ply<W: Write>(
    writer: &mut W,
    positions: &[Point3<f64>],
    colors: &[VertexColor],
    faces: &[[u32; 3]],
) -> PipelineResult<()> {
    let with_colors = !colors.is_empty();
    if with_colors && colors.len() != positions.len() {
        return Err(PipelineError::invalid_content(format!(
            "{} colors for {} vertices",
            colors.len(),
            positions.len()
        )));
    }

    let mut ply = Ply::<DefaultElement>::new();
    ply.header.encoding = Encoding::Ascii;
    ply.header
        .comments
        .push("Generated by align-pipeline".to_string());

    let mut vertex_def = ElementDef::new("vertex".to_string());
    for key in ["x", "y", "z"] {
        vertex_def.properties.add(PropertyDef::new(
            key.to_string(),
            PropertyType::Scalar(ScalarType::Double),
        ));
    }
    if with_colors {
        for key in ["red", "green", "blue"] {
            vertex_def.properties.add(PropertyDef::new(
                key.to_string(),
                PropertyType::Scalar(ScalarType::UChar),
            ));
        }
    }
    vertex_def.count = positions.len();
    ply.header.elements.add(vertex_def);

    let mut vertex_elements = Vec::with_capacity(positions.len());
    for (i, p) in positions.iter().enumerate() {
        let mut element = DefaultElement::new();
        element.insert("x".to_string(), Property::Double(p.x));
        element.insert("y".to_string(), Property::Double(p.y));
        element.insert("z".to_string(), Property::Double(p.z));
        if let Some(c) = colors.get(i) {
            element.insert("red".to_string(), Property::UChar(c.r));
            element.insert("green".to_string(), Property::UChar(c.g));
            element.insert("blue".to_string(), Property::UChar(c.b));
        }
        vertex_elements.push(element);
    }
    ply.payload.insert("vertex".to_string(), vertex_elements);

    if !faces.is_empty() {
        let mut face_def = ElementDef::new("face".to_string());
        face_def.properties.add(PropertyDef::new(
            "vertex_indices".to_string(),
            PropertyType::List(ScalarType::UChar, ScalarType::Int),
        ));
        face_def.count = faces.len();
        ply.header.elements.add(face_def);

        let mut face_elements = Vec::with_capacity(faces.len());
        for face in faces {
            let indices = face
                .iter()
                .map(|&v| i32::try_from(v))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|_| PipelineError::invalid_content("vertex index exceeds PLY int range"))?;
            let mut element = DefaultElement::new();
            element.insert("vertex_indices".to_string(), Property::ListInt(indices));
            face_elements.push(element);
        }
        ply.payload.insert("face".to_string(), face_elements);
    }

    Writer::new()
        .write_ply(writer, &mut ply)
        .map_err(|e| PipelineError::invalid_content(format!("failed to write PLY: {e}")))?;
    Ok(())
}
