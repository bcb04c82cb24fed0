//! Autodesk FBX, binary container versions 7100 to 7700
//!
//! The record tree is walked for `Model` hierarchy, `Geometry` meshes,
//! `Material` colors and `Texture`/`Video` images, all wired together through
//! the `Connections` section. Deformers, poses and animation stacks are read
//! but not interpreted.

pub mod records;

use std::{
    collections::{HashMap, HashSet},
    ops::Range,
};

use cgmath::{Deg, Matrix4, Vector3};
use log::{debug, warn};

use super::{
    fetch::ResourceResolver,
    texture::{decode_texture, resolve_texture},
    Loader, ModelFormat,
};
use crate::{
    error::{ViewerError, ViewerResult},
    scene::{
        Geometry, MapSlot, Material, MaterialId, Mesh, SceneGraph, SceneNode, Texture, TextureId,
    },
};
use records::{is_binary_fbx, parse_document, Property, Record};

const SUPPORTED_VERSIONS: std::ops::RangeInclusive<u32> = 7100..=7700;

#[derive(Debug, Default, Clone, Copy)]
pub struct FbxLoader;

impl Loader for FbxLoader {
    fn parse(&self, bytes: &[u8], resolver: &dyn ResourceResolver) -> ViewerResult<SceneGraph> {
        if !is_binary_fbx(bytes) {
            let message = if bytes.trim_ascii_start().starts_with(b";") {
                "ASCII FBX is not supported, re-export as binary"
            } else {
                "missing binary FBX header"
            };
            return Err(fbx_error(message));
        }
        let document = parse_document(bytes).map_err(fbx_error)?;
        if !SUPPORTED_VERSIONS.contains(&document.version) {
            warn!("FBX version {} is outside the tested range", document.version);
        }
        let objects = document
            .record("Objects")
            .ok_or_else(|| fbx_error("missing Objects section"))?;
        let connections = document
            .record("Connections")
            .map(read_connections)
            .unwrap_or_default();

        let graph = SceneBuilder::new(objects, connections, resolver).build();
        debug!(
            "FBX {}: {} meshes, {} materials, {} textures",
            document.version,
            graph.mesh_count(),
            graph.materials.len(),
            graph.textures.len()
        );
        Ok(graph)
    }
}

fn fbx_error(message: impl Into<String>) -> ViewerError {
    ViewerError::parse(ModelFormat::Fbx, message)
}

#[derive(Debug, Clone, PartialEq)]
struct Connection {
    child: i64,
    parent: i64,
    /// Target property for object-to-property links
    property: Option<String>,
}

fn read_connections(section: &Record) -> Vec<Connection> {
    section
        .children_named("C")
        .filter_map(|c| {
            let kind = c.prop(0)?.as_str()?;
            let child = c.prop(1)?.as_i64()?;
            let parent = c.prop(2)?.as_i64()?;
            let property = match kind {
                "OP" => c.prop(3).and_then(Property::as_str).map(str::to_string),
                _ => None,
            };
            Some(Connection {
                child,
                parent,
                property,
            })
        })
        .collect()
}

fn object_id(record: &Record) -> Option<i64> {
    record.prop(0)?.as_i64()
}

/// Object names are stored as `Name\0\x01Class`
fn object_name(record: &Record) -> String {
    let raw = record.prop(1).and_then(Property::as_str).unwrap_or("");
    let name = raw.split("\x00\x01").next().unwrap_or(raw);
    let name = name.rsplit("::").next().unwrap_or(name);
    if name.is_empty() {
        record.name.clone()
    } else {
        name.to_string()
    }
}

fn object_class(record: &Record) -> &str {
    record.prop(2).and_then(Property::as_str).unwrap_or("")
}

fn property70<'a>(record: &'a Record, name: &str) -> Option<&'a Record> {
    record
        .child("Properties70")?
        .children_named("P")
        .find(|p| p.prop(0).and_then(Property::as_str) == Some(name))
}

fn property70_f64(record: &Record, name: &str) -> Option<f64> {
    property70(record, name)?.prop(4)?.as_f64()
}

fn property70_vec3(record: &Record, name: &str) -> Option<[f64; 3]> {
    let p = property70(record, name)?;
    Some([p.prop(4)?.as_f64()?, p.prop(5)?.as_f64()?, p.prop(6)?.as_f64()?])
}

fn to_vector(v: [f64; 3]) -> Vector3<f32> {
    Vector3::new(v[0] as f32, v[1] as f32, v[2] as f32)
}

/// Euler XYZ in degrees, X applied first
fn rotation(degrees: [f64; 3]) -> Matrix4<f32> {
    Matrix4::from_angle_z(Deg(degrees[2] as f32))
        * Matrix4::from_angle_y(Deg(degrees[1] as f32))
        * Matrix4::from_angle_x(Deg(degrees[0] as f32))
}

fn scaling(scale: [f64; 3]) -> Matrix4<f32> {
    Matrix4::from_nonuniform_scale(scale[0] as f32, scale[1] as f32, scale[2] as f32)
}

fn local_transform(model: &Record) -> Matrix4<f32> {
    let translation = property70_vec3(model, "Lcl Translation").unwrap_or([0.0; 3]);
    let pre_rotation = property70_vec3(model, "PreRotation").unwrap_or([0.0; 3]);
    let lcl_rotation = property70_vec3(model, "Lcl Rotation").unwrap_or([0.0; 3]);
    let lcl_scaling = property70_vec3(model, "Lcl Scaling").unwrap_or([1.0; 3]);
    Matrix4::from_translation(to_vector(translation))
        * rotation(pre_rotation)
        * rotation(lcl_rotation)
        * scaling(lcl_scaling)
}

/// Offset applied to a model's geometry but not inherited by its children
fn geometric_transform(model: &Record) -> Matrix4<f32> {
    let translation = property70_vec3(model, "GeometricTranslation").unwrap_or([0.0; 3]);
    let rot = property70_vec3(model, "GeometricRotation").unwrap_or([0.0; 3]);
    let scale = property70_vec3(model, "GeometricScaling").unwrap_or([1.0; 3]);
    Matrix4::from_translation(to_vector(translation)) * rotation(rot) * scaling(scale)
}

fn map_slot(property: &str) -> Option<MapSlot> {
    let slot = match property {
        "DiffuseColor" | "Diffuse" | "Maya|baseColor" | "Maya|TEX_color_map" => MapSlot::Albedo,
        "NormalMap" | "Maya|normalCamera" | "Maya|TEX_normal_map" => MapSlot::Normal,
        "Bump" => MapSlot::Bump,
        "SpecularColor" | "SpecularFactor" => MapSlot::Specular,
        "ShininessExponent" | "Maya|specularRoughness" | "Maya|TEX_roughness_map" => {
            MapSlot::Roughness
        }
        "Maya|metalness" | "Maya|TEX_metallic_map" => MapSlot::Metalness,
        "EmissiveColor" | "EmissiveFactor" => MapSlot::Emissive,
        "TransparentColor" | "TransparencyFactor" => MapSlot::Alpha,
        "AmbientColor" | "Maya|TEX_ao_map" => MapSlot::AmbientOcclusion,
        "ReflectionColor" => MapSlot::Environment,
        _ => return None,
    };
    Some(slot)
}

/// Polygon mesh with attributes expanded to one entry per polygon vertex
#[derive(Debug, Default)]
struct PolygonMesh {
    control_points: Vec<[f32; 3]>,
    /// Control point index of each polygon vertex
    corners: Vec<usize>,
    /// Corner ranges of each polygon
    polygons: Vec<Range<usize>>,
    normals: Option<Vec<[f32; 3]>>,
    uvs: Option<Vec<[f32; 2]>>,
    /// Model material slot of each polygon
    polygon_materials: Vec<usize>,
}

impl PolygonMesh {
    fn from_record(geometry: &Record) -> Result<Self, String> {
        let vertices = geometry
            .child_value("Vertices")
            .and_then(Property::to_f64_vec)
            .ok_or("geometry has no Vertices")?;
        let polygon_index = geometry
            .child_value("PolygonVertexIndex")
            .and_then(Property::to_i32_vec)
            .ok_or("geometry has no PolygonVertexIndex")?;

        let control_points: Vec<[f32; 3]> = vertices
            .chunks_exact(3)
            .map(|v| [v[0] as f32, v[1] as f32, v[2] as f32])
            .collect();

        // A negative index closes its polygon and encodes `-(index + 1)`
        let mut corners = Vec::with_capacity(polygon_index.len());
        let mut polygons = Vec::new();
        let mut start = 0;
        for &raw in &polygon_index {
            let (index, closes) = if raw < 0 {
                ((!raw) as usize, true)
            } else {
                (raw as usize, false)
            };
            if index >= control_points.len() {
                return Err(format!(
                    "polygon index {} out of range for {} vertices",
                    index,
                    control_points.len()
                ));
            }
            corners.push(index);
            if closes {
                polygons.push(start..corners.len());
                start = corners.len();
            }
        }

        let mut mesh = Self {
            control_points,
            corners,
            polygons,
            ..Default::default()
        };
        mesh.normals = geometry
            .child("LayerElementNormal")
            .and_then(|layer| mesh.layer_values::<3>(layer, "Normals", "NormalsIndex"));
        mesh.uvs = geometry
            .child("LayerElementUV")
            .and_then(|layer| mesh.layer_values::<2>(layer, "UV", "UVIndex"))
            // FBX puts the texture origin bottom-left
            .map(|uvs| uvs.into_iter().map(|[u, v]| [u, 1.0 - v]).collect());
        mesh.polygon_materials = mesh.material_slots(geometry.child("LayerElementMaterial"));
        Ok(mesh)
    }

    fn polygon_of_corner(&self) -> Vec<usize> {
        let mut owner = vec![0; self.corners.len()];
        for (p, range) in self.polygons.iter().enumerate() {
            for corner in range.clone() {
                owner[corner] = p;
            }
        }
        owner
    }

    /// Expands a layer element to one value per polygon vertex
    fn layer_values<const N: usize>(
        &self,
        layer: &Record,
        data_name: &str,
        index_name: &str,
    ) -> Option<Vec<[f32; N]>> {
        let data: Vec<[f32; N]> = layer
            .child_value(data_name)?
            .to_f64_vec()?
            .chunks_exact(N)
            .map(|c| std::array::from_fn(|i| c[i] as f32))
            .collect();
        let mapping = layer
            .child_value("MappingInformationType")
            .and_then(Property::as_str)
            .unwrap_or("ByPolygonVertex");
        let indexed = layer
            .child_value("ReferenceInformationType")
            .and_then(Property::as_str)
            .map(|r| r != "Direct")
            .unwrap_or(false);
        let indices = if indexed {
            layer.child_value(index_name)?.to_i32_vec()?
        } else {
            Vec::new()
        };

        let owners = self.polygon_of_corner();
        let mut values = Vec::with_capacity(self.corners.len());
        for (corner, &control_point) in self.corners.iter().enumerate() {
            let key = match mapping {
                "ByPolygonVertex" => corner,
                "ByVertice" | "ByVertex" | "ByControlPoint" => control_point,
                "ByPolygon" => owners[corner],
                "AllSame" => 0,
                other => {
                    warn!("Unsupported FBX {} mapping '{}'", data_name, other);
                    return None;
                }
            };
            let index = if indexed {
                usize::try_from(*indices.get(key)?).ok()?
            } else {
                key
            };
            match data.get(index) {
                Some(value) => values.push(*value),
                None => {
                    warn!("FBX {} layer is shorter than its mapping", data_name);
                    return None;
                }
            }
        }
        Some(values)
    }

    fn material_slots(&self, layer: Option<&Record>) -> Vec<usize> {
        let count = self.polygons.len();
        let Some(layer) = layer else {
            return vec![0; count];
        };
        let mapping = layer
            .child_value("MappingInformationType")
            .and_then(Property::as_str)
            .unwrap_or("AllSame");
        let slots = layer
            .child_value("Materials")
            .and_then(Property::to_i32_vec)
            .unwrap_or_default();
        match mapping {
            "ByPolygon" if slots.len() >= count => {
                slots[..count].iter().map(|&s| s.max(0) as usize).collect()
            }
            _ => vec![slots.first().copied().unwrap_or(0).max(0) as usize; count],
        }
    }

    /// Fan-triangulates polygons into one geometry per material slot
    fn into_geometries(self) -> Vec<(usize, Geometry)> {
        let mut slots: Vec<usize> = self.polygon_materials.clone();
        slots.sort_unstable();
        slots.dedup();

        let mut out = Vec::with_capacity(slots.len());
        for slot in slots {
            let mut positions = Vec::new();
            let mut normals = Vec::new();
            let mut uvs = Vec::new();
            let mut indices = Vec::new();
            for (polygon, range) in self.polygons.iter().enumerate() {
                if self.polygon_materials[polygon] != slot || range.len() < 3 {
                    continue;
                }
                let base = positions.len() as u32;
                for corner in range.clone() {
                    positions.push(self.control_points[self.corners[corner]]);
                    if let Some(n) = &self.normals {
                        normals.push(n[corner]);
                    }
                    if let Some(t) = &self.uvs {
                        uvs.push(t[corner]);
                    }
                }
                for i in 1..(range.len() as u32 - 1) {
                    indices.extend_from_slice(&[base, base + i, base + i + 1]);
                }
            }
            if indices.is_empty() {
                continue;
            }
            let geometry = Geometry::new(positions, indices)
                .with_normals(normals)
                .with_uvs(uvs);
            out.push((slot, geometry));
        }
        out
    }
}

struct SceneBuilder<'a> {
    objects: HashMap<i64, &'a Record>,
    /// Object ids in file order
    order: Vec<i64>,
    connections: Vec<Connection>,
    resolver: &'a dyn ResourceResolver,
    graph: SceneGraph,
    materials: HashMap<i64, MaterialId>,
    textures: HashMap<i64, TextureId>,
    geometries: HashMap<i64, Vec<(usize, Geometry)>>,
}

impl<'a> SceneBuilder<'a> {
    fn new(
        objects: &'a Record,
        connections: Vec<Connection>,
        resolver: &'a dyn ResourceResolver,
    ) -> Self {
        let mut map = HashMap::new();
        let mut order = Vec::new();
        for record in &objects.children {
            if let Some(id) = object_id(record) {
                map.insert(id, record);
                order.push(id);
            }
        }
        Self {
            objects: map,
            order,
            connections,
            resolver,
            graph: SceneGraph::new(ModelFormat::Fbx),
            materials: HashMap::new(),
            textures: HashMap::new(),
            geometries: HashMap::new(),
        }
    }

    fn is_kind(&self, id: i64, kind: &str) -> bool {
        self.objects.get(&id).is_some_and(|r| r.name == kind)
    }

    /// Ids of `kind` objects connected below `parent`, in connection order
    fn children_of(&self, parent: i64, kind: &str) -> Vec<i64> {
        self.connections
            .iter()
            .filter(|c| c.parent == parent && self.is_kind(c.child, kind))
            .map(|c| c.child)
            .collect()
    }

    fn build(mut self) -> SceneGraph {
        let models: Vec<i64> = self
            .order
            .iter()
            .copied()
            .filter(|&id| self.is_kind(id, "Model"))
            .collect();
        let roots: Vec<i64> = models
            .iter()
            .copied()
            .filter(|&id| {
                !self
                    .connections
                    .iter()
                    .any(|c| c.child == id && c.property.is_none() && self.is_kind(c.parent, "Model"))
            })
            .collect();

        let mut visited = HashSet::new();
        for id in roots {
            if let Some(node) = self.build_model(id, &mut visited) {
                self.graph.root.add_child(node);
            }
        }
        self.graph
    }

    fn build_model(&mut self, id: i64, visited: &mut HashSet<i64>) -> Option<SceneNode> {
        if !visited.insert(id) {
            warn!("FBX model {} is connected in a cycle", id);
            return None;
        }
        let record = *self.objects.get(&id)?;
        let name = object_name(record);
        let mut node = SceneNode::new(name.clone()).with_transform(local_transform(record));

        let material_ids: Vec<MaterialId> = self
            .children_of(id, "Material")
            .into_iter()
            .map(|m| self.material(m))
            .collect();

        let geometric = geometric_transform(record);
        let mut mesh_index = 0;
        for geometry_id in self.children_of(id, "Geometry") {
            for (slot, geometry) in self.geometry(geometry_id) {
                let material = material_ids.get(slot).copied();
                node.add_child(
                    SceneNode::new(format!("{}_{}", name, mesh_index))
                        .with_transform(geometric)
                        .with_mesh(Mesh::new(geometry, material)),
                );
                mesh_index += 1;
            }
        }

        for child in self.children_of(id, "Model") {
            if let Some(child_node) = self.build_model(child, visited) {
                node.add_child(child_node);
            }
        }
        Some(node)
    }

    fn geometry(&mut self, id: i64) -> Vec<(usize, Geometry)> {
        if let Some(cached) = self.geometries.get(&id) {
            return cached.clone();
        }
        let parts = match self.objects.get(&id) {
            Some(record) if object_class(record) == "Mesh" => {
                match PolygonMesh::from_record(record) {
                    Ok(mesh) => mesh.into_geometries(),
                    Err(e) => {
                        warn!("Skipping FBX geometry '{}': {}", object_name(record), e);
                        Vec::new()
                    }
                }
            }
            Some(record) => {
                debug!("Ignoring FBX {} geometry '{}'", object_class(record), object_name(record));
                Vec::new()
            }
            None => Vec::new(),
        };
        self.geometries.insert(id, parts.clone());
        parts
    }

    fn material(&mut self, id: i64) -> MaterialId {
        if let Some(&existing) = self.materials.get(&id) {
            return existing;
        }
        let mut material = match self.objects.get(&id) {
            Some(record) => convert_material(record),
            None => Material::default(),
        };

        let links: Vec<(i64, String)> = self
            .connections
            .iter()
            .filter(|c| c.parent == id && self.is_kind(c.child, "Texture"))
            .filter_map(|c| c.property.clone().map(|p| (c.child, p)))
            .collect();
        for (texture, property) in links {
            match map_slot(&property) {
                Some(slot) => {
                    let texture_id = self.texture(texture);
                    material = material.with_map(slot, texture_id);
                }
                None => debug!("Ignoring texture on FBX material property '{}'", property),
            }
        }

        let material_id = self.graph.add_material(material);
        self.materials.insert(id, material_id);
        material_id
    }

    fn texture(&mut self, id: i64) -> TextureId {
        if let Some(&existing) = self.textures.get(&id) {
            return existing;
        }
        let texture = match self.objects.get(&id) {
            Some(&record) => self.load_texture(id, record),
            None => Texture::unresolved(format!("texture_{}", id)),
        };
        let texture_id = self.graph.add_texture(texture);
        self.textures.insert(id, texture_id);
        texture_id
    }

    fn load_texture(&self, id: i64, record: &Record) -> Texture {
        let reference = texture_reference(record);

        // Embedded image content wins over the file reference
        for video in self.children_of(id, "Video") {
            let content = self
                .objects
                .get(&video)
                .and_then(|v| v.child_value("Content"))
                .and_then(Property::as_bytes)
                .filter(|bytes| !bytes.is_empty());
            if let Some(bytes) = content {
                return decode_texture(&reference, bytes);
            }
        }
        resolve_texture(self.resolver, &reference)
    }
}

/// Prefers the relative file name, exporters store absolute paths of the authoring machine
fn texture_reference(record: &Record) -> String {
    let pick = |name: &str| {
        record
            .child_value(name)
            .and_then(Property::as_str)
            .filter(|s| !s.is_empty())
            .map(|s| s.replace('\\', "/"))
    };
    if let Some(relative) = pick("RelativeFilename") {
        return relative;
    }
    match pick("FileName") {
        Some(absolute) => absolute
            .rsplit('/')
            .next()
            .unwrap_or(&absolute)
            .to_string(),
        None => object_name(record),
    }
}

fn convert_material(record: &Record) -> Material {
    let mut material = Material::new(object_name(record));
    if let Some([r, g, b]) =
        property70_vec3(record, "DiffuseColor").or_else(|| property70_vec3(record, "Diffuse"))
    {
        material = material.with_color(r as f32, g as f32, b as f32);
    }
    if let Some([r, g, b]) = property70_vec3(record, "EmissiveColor") {
        material = material.with_emission(r as f32, g as f32, b as f32);
    }
    if let Some(opacity) = property70_f64(record, "Opacity") {
        material = material.with_opacity(opacity as f32);
    } else if let Some(transparency) = property70_f64(record, "TransparencyFactor") {
        if transparency > 0.0 {
            material = material.with_opacity(1.0 - transparency as f32);
        }
    }
    if let Some(shininess) =
        property70_f64(record, "ShininessExponent").or_else(|| property70_f64(record, "Shininess"))
    {
        // Convert shininess to roughness
        material = material.with_roughness(1.0 - (shininess as f32 / 128.0).clamp(0.0, 1.0));
    }
    material
}
