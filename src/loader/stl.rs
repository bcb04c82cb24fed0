//! STL triangle soup, binary and ASCII
//!
//! STL carries no material. The parsed graph holds one colorless placeholder
//! for its single mesh, which the material engine always synthesizes.

use log::{debug, warn};

use super::{fetch::ResourceResolver, Loader, ModelFormat};
use crate::{
    error::{ViewerError, ViewerResult},
    scene::{Geometry, Material, Mesh, SceneGraph, SceneNode, Side},
};

const HEADER_LEN: usize = 80;
const FACET_LEN: usize = 50;

#[derive(Debug, Default, Clone, Copy)]
pub struct StlLoader;

impl Loader for StlLoader {
    fn parse(&self, bytes: &[u8], _resolver: &dyn ResourceResolver) -> ViewerResult<SceneGraph> {
        let (name, facets) = if is_binary(bytes) {
            ("stl".to_string(), parse_binary(bytes)?)
        } else if bytes.trim_ascii_start().starts_with(b"solid") {
            parse_ascii(bytes)?
        } else {
            // Binary files whose header claims a different count
            ("stl".to_string(), parse_binary(bytes)?)
        };
        if facets.is_empty() {
            return Err(ViewerError::parse(ModelFormat::Stl, "no facets"));
        }
        debug!("STL '{}' with {} facets", name, facets.len());

        let mut positions = Vec::with_capacity(facets.len() * 3);
        let mut normals = Vec::with_capacity(facets.len() * 3);
        for facet in &facets {
            let normal = flat_normal(facet);
            for vertex in &facet.vertices {
                positions.push(*vertex);
                normals.push(normal);
            }
        }
        let geometry = Geometry::new(positions, Vec::new()).with_normals(normals);

        let mut graph = SceneGraph::new(ModelFormat::Stl);
        let material = graph
            .add_material(Material::new(format!("{}_material", name)).with_side(Side::Double));
        graph
            .root
            .add_child(SceneNode::new(name).with_mesh(Mesh::new(geometry, Some(material))));
        Ok(graph)
    }
}

struct Facet {
    normal: [f32; 3],
    vertices: [[f32; 3]; 3],
}

/// Uses the stored normal unless it is zero, which many exporters write
fn flat_normal(facet: &Facet) -> [f32; 3] {
    let n = facet.normal;
    let len = (n[0] * n[0] + n[1] * n[1] + n[2] * n[2]).sqrt();
    if len > 1e-6 && len.is_finite() {
        return [n[0] / len, n[1] / len, n[2] / len];
    }
    let [a, b, c] = facet.vertices;
    let e1 = [b[0] - a[0], b[1] - a[1], b[2] - a[2]];
    let e2 = [c[0] - a[0], c[1] - a[1], c[2] - a[2]];
    let cross = [
        e1[1] * e2[2] - e1[2] * e2[1],
        e1[2] * e2[0] - e1[0] * e2[2],
        e1[0] * e2[1] - e1[1] * e2[0],
    ];
    let len = (cross[0] * cross[0] + cross[1] * cross[1] + cross[2] * cross[2]).sqrt();
    if len > 0.0 {
        [cross[0] / len, cross[1] / len, cross[2] / len]
    } else {
        [0.0, 1.0, 0.0]
    }
}

fn is_binary(bytes: &[u8]) -> bool {
    if bytes.len() < HEADER_LEN + 4 {
        return false;
    }
    let count = u32::from_le_bytes([bytes[80], bytes[81], bytes[82], bytes[83]]) as usize;
    count
        .checked_mul(FACET_LEN)
        .and_then(|n| n.checked_add(HEADER_LEN + 4))
        == Some(bytes.len())
}

fn read_f32(data: &[u8], offset: usize) -> f32 {
    f32::from_le_bytes([data[offset], data[offset + 1], data[offset + 2], data[offset + 3]])
}

fn read_vec3(data: &[u8], offset: usize) -> [f32; 3] {
    [
        read_f32(data, offset),
        read_f32(data, offset + 4),
        read_f32(data, offset + 8),
    ]
}

fn parse_binary(data: &[u8]) -> ViewerResult<Vec<Facet>> {
    if data.len() < HEADER_LEN + 4 {
        return Err(ViewerError::parse(
            ModelFormat::Stl,
            "file too small for header and triangle count",
        ));
    }
    let count = u32::from_le_bytes([data[80], data[81], data[82], data[83]]) as usize;
    let expected = count
        .checked_mul(FACET_LEN)
        .and_then(|n| n.checked_add(HEADER_LEN + 4))
        .ok_or_else(|| ViewerError::parse(ModelFormat::Stl, "triangle count overflows"))?;
    if data.len() < expected {
        return Err(ViewerError::parse(
            ModelFormat::Stl,
            format!(
                "truncated: expected {} bytes for {} triangles, got {}",
                expected,
                count,
                data.len()
            ),
        ));
    }
    if data.len() > expected {
        warn!("STL has {} trailing bytes", data.len() - expected);
    }

    let mut facets = Vec::with_capacity(count);
    let mut offset = HEADER_LEN + 4;
    for _ in 0..count {
        let normal = read_vec3(data, offset);
        let vertices = [
            read_vec3(data, offset + 12),
            read_vec3(data, offset + 24),
            read_vec3(data, offset + 36),
        ];
        facets.push(Facet { normal, vertices });
        offset += FACET_LEN;
    }
    Ok(facets)
}

fn bad_ascii(message: &str) -> ViewerError {
    ViewerError::parse(ModelFormat::Stl, message.to_string())
}

fn next_f32<'a>(tokens: &mut impl Iterator<Item = &'a str>) -> ViewerResult<f32> {
    tokens
        .next()
        .and_then(|t| t.parse::<f32>().ok())
        .ok_or_else(|| bad_ascii("expected a number"))
}

fn next_vec3<'a>(tokens: &mut impl Iterator<Item = &'a str>) -> ViewerResult<[f32; 3]> {
    Ok([next_f32(tokens)?, next_f32(tokens)?, next_f32(tokens)?])
}

fn parse_ascii(data: &[u8]) -> ViewerResult<(String, Vec<Facet>)> {
    let text = std::str::from_utf8(data)
        .map_err(|e| ViewerError::parse(ModelFormat::Stl, format!("invalid ASCII STL: {}", e)))?;
    let mut tokens = text.split_whitespace().peekable();

    let mut name = "stl".to_string();
    let mut facets = Vec::new();
    while let Some(token) = tokens.next() {
        match token {
            "solid" => {
                if let Some(&label) = tokens.peek() {
                    if label != "facet" {
                        name = label.to_string();
                        tokens.next();
                    }
                }
            }
            "facet" => {
                if tokens.next() != Some("normal") {
                    return Err(bad_ascii("expected 'normal' after 'facet'"));
                }
                let normal = next_vec3(&mut tokens)?;
                let mut vertices = [[0.0f32; 3]; 3];
                let mut seen = 0;
                while let Some(token) = tokens.next() {
                    match token {
                        "vertex" => {
                            if seen == 3 {
                                return Err(bad_ascii("facet has more than three vertices"));
                            }
                            vertices[seen] = next_vec3(&mut tokens)?;
                            seen += 1;
                        }
                        "endfacet" => break,
                        _ => {}
                    }
                }
                if seen != 3 {
                    return Err(bad_ascii("facet does not have three vertices"));
                }
                facets.push(Facet { normal, vertices });
            }
            _ => {}
        }
    }
    Ok((name, facets))
}
