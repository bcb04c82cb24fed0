//! glTF 2.0, both JSON (`.gltf`) and binary (`.glb`)

use std::collections::HashSet;

use base64::Engine as _;
use cgmath::Matrix4;
use gltf::{buffer, image, material::AlphaMode, mesh::Mode};
use log::{debug, warn};

use super::{
    fetch::ResourceResolver,
    texture::{decode_texture, resolve_texture},
    Loader, ModelFormat,
};
use crate::{
    error::{ViewerError, ViewerResult},
    scene::{
        Geometry, MapSlot, Material, MaterialId, Mesh, SceneGraph, SceneNode, Side, Texture,
        TextureId,
    },
};

const MAX_NODE_DEPTH: usize = 256;

#[derive(Debug, Clone, Copy)]
pub struct GltfLoader {
    format: ModelFormat,
}

impl GltfLoader {
    /// `format` is recorded on the graph, the container is sniffed from the bytes
    pub fn new(format: ModelFormat) -> Self {
        Self { format }
    }
}

impl Loader for GltfLoader {
    fn parse(&self, bytes: &[u8], resolver: &dyn ResourceResolver) -> ViewerResult<SceneGraph> {
        let gltf = gltf::Gltf::from_slice(bytes)
            .map_err(|e| ViewerError::parse(self.format, e.to_string()))?;
        let buffers = self.load_buffers(&gltf, resolver)?;

        let mut graph = SceneGraph::new(self.format);
        for image in gltf.document.images() {
            let texture = load_image(&image, &buffers, resolver);
            graph.add_texture(texture);
        }
        for material in gltf.document.materials() {
            graph.add_material(convert_material(&material));
        }

        let scene = gltf
            .document
            .default_scene()
            .or_else(|| gltf.document.scenes().next());
        let roots: Vec<gltf::Node<'_>> = match scene {
            Some(scene) => scene.nodes().collect(),
            // Scene-less files still carry their node list
            None => gltf
                .document
                .nodes()
                .filter(|node| node_is_root(&gltf.document, node))
                .collect(),
        };
        let mut walk = NodeWalk::default();
        for node in roots {
            if let Some(converted) = self.convert_node(&node, &buffers, &graph, &mut walk)? {
                graph.root.add_child(converted);
            }
        }

        debug!(
            "{}: {} meshes, {} materials, {} images",
            self.format,
            graph.mesh_count(),
            graph.materials.len(),
            graph.textures.len()
        );
        Ok(graph)
    }
}

impl GltfLoader {
    fn load_buffers(
        &self,
        gltf: &gltf::Gltf,
        resolver: &dyn ResourceResolver,
    ) -> ViewerResult<Vec<Vec<u8>>> {
        let mut data = Vec::new();
        for buffer in gltf.buffers() {
            let bytes = match buffer.source() {
                buffer::Source::Bin => gltf.blob.clone().ok_or_else(|| {
                    ViewerError::parse(self.format, "binary chunk referenced but missing")
                })?,
                buffer::Source::Uri(uri) if uri.starts_with("data:") => decode_data_uri(uri)
                    .ok_or_else(|| ViewerError::parse(self.format, "malformed data URI buffer"))?,
                buffer::Source::Uri(uri) => resolver.resolve(uri)?,
            };
            if bytes.len() < buffer.length() {
                return Err(ViewerError::parse(
                    self.format,
                    format!(
                        "buffer {} has {} bytes, {} declared",
                        buffer.index(),
                        bytes.len(),
                        buffer.length()
                    ),
                ));
            }
            data.push(bytes);
        }
        Ok(data)
    }

    /// Converts `node` and its subtree, `None` when it was already converted
    /// under another parent
    fn convert_node(
        &self,
        node: &gltf::Node<'_>,
        buffers: &[Vec<u8>],
        graph: &SceneGraph,
        walk: &mut NodeWalk,
    ) -> ViewerResult<Option<SceneNode>> {
        if walk.ancestors.contains(&node.index()) {
            return Err(ViewerError::parse(
                self.format,
                format!("node cycle through node {}", node.index()),
            ));
        }
        if walk.ancestors.len() >= MAX_NODE_DEPTH {
            return Err(ViewerError::parse(self.format, "node hierarchy too deep"));
        }
        if !walk.visited.insert(node.index()) {
            warn!("Node {} has more than one parent, keeping the first", node.index());
            return Ok(None);
        }

        let name = node
            .name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("node_{}", node.index()));
        let mut out = SceneNode::new(name).with_transform(Matrix4::from(node.transform().matrix()));

        if let Some(mesh) = node.mesh() {
            for primitive in mesh.primitives() {
                if primitive.mode() != Mode::Triangles {
                    warn!(
                        "Skipping {:?} primitive {} of mesh {}",
                        primitive.mode(),
                        primitive.index(),
                        mesh.index()
                    );
                    continue;
                }
                let Some(geometry) = self.read_primitive(&primitive, buffers)? else {
                    continue;
                };
                // Out of range means the default material
                let material = primitive
                    .material()
                    .index()
                    .filter(|&i| i < graph.materials.len())
                    .map(MaterialId);
                let label = format!(
                    "{}_{}",
                    mesh.name().unwrap_or("mesh"),
                    primitive.index()
                );
                out.add_child(SceneNode::new(label).with_mesh(Mesh::new(geometry, material)));
            }
        }

        walk.ancestors.push(node.index());
        for child in node.children() {
            if let Some(converted) = self.convert_node(&child, buffers, graph, walk)? {
                out.add_child(converted);
            }
        }
        walk.ancestors.pop();
        Ok(Some(out))
    }

    fn read_primitive(
        &self,
        primitive: &gltf::Primitive<'_>,
        buffers: &[Vec<u8>],
    ) -> ViewerResult<Option<Geometry>> {
        let reader = primitive.reader(|b| buffers.get(b.index()).map(|d| d.as_slice()));
        let Some(positions) = reader.read_positions() else {
            warn!("Primitive {} has no positions", primitive.index());
            return Ok(None);
        };
        let positions: Vec<[f32; 3]> = positions.collect();
        let indices: Vec<u32> = reader
            .read_indices()
            .map(|i| i.into_u32().collect())
            .unwrap_or_default();

        let mut geometry = Geometry::new(positions, indices);
        if let Some(normals) = reader.read_normals() {
            geometry = geometry.with_normals(normals.collect());
        }
        if let Some(uvs) = reader.read_tex_coords(0) {
            geometry = geometry.with_uvs(uvs.into_f32().collect());
        }
        geometry
            .validate()
            .map_err(|e| ViewerError::parse(self.format, e))?;
        Ok(Some(geometry))
    }
}

/// Hierarchy traversal state, glTF nodes form a forest
#[derive(Debug, Default)]
struct NodeWalk {
    ancestors: Vec<usize>,
    visited: HashSet<usize>,
}

fn node_is_root(document: &gltf::Document, node: &gltf::Node<'_>) -> bool {
    !document
        .nodes()
        .any(|parent| parent.children().any(|c| c.index() == node.index()))
}

fn decode_data_uri(uri: &str) -> Option<Vec<u8>> {
    let (header, payload) = uri.strip_prefix("data:")?.split_once(',')?;
    if !header.ends_with(";base64") {
        return None;
    }
    base64::engine::general_purpose::STANDARD.decode(payload).ok()
}

fn load_image(
    image: &image::Image<'_>,
    buffers: &[Vec<u8>],
    resolver: &dyn ResourceResolver,
) -> Texture {
    match image.source() {
        image::Source::View { view, .. } => {
            let label = image
                .name()
                .map(str::to_string)
                .unwrap_or_else(|| format!("embedded_{}", image.index()));
            let bytes = buffers
                .get(view.buffer().index())
                .and_then(|b| b.get(view.offset()..view.offset() + view.length()));
            match bytes {
                Some(bytes) => decode_texture(&label, bytes),
                None => {
                    warn!("Image view for '{}' is out of range", label);
                    Texture::unresolved(label)
                }
            }
        }
        image::Source::Uri { uri, .. } if uri.starts_with("data:") => match decode_data_uri(uri) {
            Some(bytes) => decode_texture(&format!("data_uri_{}", image.index()), &bytes),
            None => Texture::unresolved(format!("data_uri_{}", image.index())),
        },
        image::Source::Uri { uri, .. } => resolve_texture(resolver, uri),
    }
}

fn texture_id(texture: gltf::Texture<'_>) -> TextureId {
    TextureId(texture.source().index())
}

fn convert_material(material: &gltf::Material<'_>) -> Material {
    let name = material
        .name()
        .map(str::to_string)
        .unwrap_or_else(|| format!("material_{}", material.index().unwrap_or(0)));
    let pbr = material.pbr_metallic_roughness();
    let [r, g, b, a] = pbr.base_color_factor();
    let [er, eg, eb] = material.emissive_factor();

    let mut out = Material::new(name)
        .with_color(r, g, b)
        .with_metallic(pbr.metallic_factor())
        .with_roughness(pbr.roughness_factor())
        .with_emission(er, eg, eb)
        .with_side(if material.double_sided() {
            Side::Double
        } else {
            Side::Front
        });
    if material.alpha_mode() == AlphaMode::Blend {
        out = out.with_opacity(a);
    }

    if let Some(info) = pbr.base_color_texture() {
        out = out.with_map(MapSlot::Albedo, texture_id(info.texture()));
    }
    if let Some(info) = pbr.metallic_roughness_texture() {
        let id = texture_id(info.texture());
        out = out.with_map(MapSlot::Metalness, id).with_map(MapSlot::Roughness, id);
    }
    if let Some(normal) = material.normal_texture() {
        out = out.with_map(MapSlot::Normal, texture_id(normal.texture()));
    }
    if let Some(occlusion) = material.occlusion_texture() {
        out = out.with_map(MapSlot::AmbientOcclusion, texture_id(occlusion.texture()));
    }
    if let Some(info) = material.emissive_texture() {
        out = out.with_map(MapSlot::Emissive, texture_id(info.texture()));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::fetch::NoResources;

    /// One triangle with an embedded buffer and a red, double-sided material
    fn triangle_gltf(material: &str) -> String {
        let mut buffer = Vec::new();
        for v in [[0.0f32, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]] {
            for c in v {
                buffer.extend_from_slice(&c.to_le_bytes());
            }
        }
        for i in [0u16, 1, 2] {
            buffer.extend_from_slice(&i.to_le_bytes());
        }
        let encoded = base64::engine::general_purpose::STANDARD.encode(&buffer);
        format!(
            r#"{{
  "asset": {{ "version": "2.0" }},
  "scene": 0,
  "scenes": [{{ "nodes": [0] }}],
  "nodes": [{{ "name": "parent", "translation": [0, 0, 5], "children": [1] }}, {{ "name": "tri", "mesh": 0 }}],
  "meshes": [{{ "name": "tri", "primitives": [{{ "attributes": {{ "POSITION": 0 }}, "indices": 1, "material": 0 }}] }}],
  "materials": [{material}],
  "buffers": [{{ "byteLength": 42, "uri": "data:application/octet-stream;base64,{encoded}" }}],
  "bufferViews": [
    {{ "buffer": 0, "byteOffset": 0, "byteLength": 36 }},
    {{ "buffer": 0, "byteOffset": 36, "byteLength": 6 }}
  ],
  "accessors": [
    {{ "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3", "min": [0, 0, 0], "max": [1, 1, 0] }},
    {{ "bufferView": 1, "componentType": 5123, "count": 3, "type": "SCALAR" }}
  ]
}}"#
        )
    }

    #[test]
    fn embedded_triangle_loads_with_hierarchy() {
        let json = triangle_gltf(
            r#"{ "name": "red", "doubleSided": true, "pbrMetallicRoughness": { "baseColorFactor": [1, 0, 0, 1] } }"#,
        );
        let graph = GltfLoader::new(ModelFormat::Gltf)
            .parse(json.as_bytes(), &NoResources)
            .unwrap();

        assert_eq!(graph.mesh_count(), 1);
        assert_eq!(graph.face_count(), 1);
        assert_eq!(graph.materials[0].base_color, Some([1.0, 0.0, 0.0]));
        assert_eq!(graph.materials[0].side, Side::Double);

        let parent = &graph.root.children[0];
        assert_eq!(parent.name, "parent");
        assert_eq!(parent.transform.w.z, 5.0);
        graph.root.for_each_mesh(&mut |mesh, world| {
            assert_eq!(mesh.material, Some(MaterialId(0)));
            assert_eq!(world.w.z, 5.0);
        });
    }

    #[test]
    fn blend_mode_carries_opacity() {
        let json = triangle_gltf(
            r#"{ "alphaMode": "BLEND", "pbrMetallicRoughness": { "baseColorFactor": [1, 1, 1, 0.25] } }"#,
        );
        let graph = GltfLoader::new(ModelFormat::Gltf)
            .parse(json.as_bytes(), &NoResources)
            .unwrap();
        assert!(graph.materials[0].transparent);
        assert_eq!(graph.materials[0].opacity, 0.25);
    }

    #[test]
    fn external_buffer_without_resolver_is_fetch_error() {
        let mut json = triangle_gltf("{}");
        let start = json.find("data:").unwrap();
        let end = start + json[start..].find('"').unwrap();
        json.replace_range(start..end, "tri.bin");
        let err = GltfLoader::new(ModelFormat::Gltf)
            .parse(json.as_bytes(), &NoResources)
            .unwrap_err();
        assert!(matches!(err, ViewerError::FetchError(_)));
    }

    #[test]
    fn garbage_is_parse_error() {
        let err = GltfLoader::new(ModelFormat::Glb)
            .parse(b"glTF\x02\x00\x00\x00garbage", &NoResources)
            .unwrap_err();
        assert!(matches!(err, ViewerError::ParseError { format: ModelFormat::Glb, .. }));
    }

    #[test]
    fn cyclic_hierarchy_is_parse_error() {
        let json = r#"{
  "asset": { "version": "2.0" },
  "scenes": [{ "nodes": [0] }],
  "nodes": [{ "children": [1] }, { "children": [0] }]
}"#;
        let err = GltfLoader::new(ModelFormat::Gltf)
            .parse(json.as_bytes(), &NoResources)
            .unwrap_err();
        assert!(matches!(err, ViewerError::ParseError { format: ModelFormat::Gltf, .. }));
    }

    #[test]
    fn runaway_nesting_is_parse_error() {
        let nodes: Vec<String> = (0..MAX_NODE_DEPTH + 1)
            .map(|i| format!(r#"{{ "children": [{}] }}"#, i + 1))
            .chain(std::iter::once("{}".to_string()))
            .collect();
        let json = format!(
            r#"{{ "asset": {{ "version": "2.0" }}, "scenes": [{{ "nodes": [0] }}], "nodes": [{}] }}"#,
            nodes.join(",")
        );
        let err = GltfLoader::new(ModelFormat::Gltf)
            .parse(json.as_bytes(), &NoResources)
            .unwrap_err();
        assert!(err.to_string().contains("too deep"));
    }

    #[test]
    fn shared_child_is_converted_once() {
        let json = r#"{
  "asset": { "version": "2.0" },
  "scenes": [{ "nodes": [0, 1] }],
  "nodes": [{ "name": "a", "children": [2] }, { "name": "b", "children": [2] }, { "name": "shared" }]
}"#;
        let graph = GltfLoader::new(ModelFormat::Gltf)
            .parse(json.as_bytes(), &NoResources)
            .unwrap();
        assert_eq!(graph.root.children.len(), 2);
        assert_eq!(graph.root.children[0].children.len(), 1);
        assert!(graph.root.children[1].children.is_empty());
    }

    #[test]
    fn data_uris_decode() {
        assert_eq!(
            decode_data_uri("data:application/gltf-buffer;base64,AQID"),
            Some(vec![1, 2, 3])
        );
        assert_eq!(decode_data_uri("data:text/plain,hello"), None);
    }
}
