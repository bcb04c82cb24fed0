//! GPU copy of a prepared scene
//!
//! Meshes are flattened into world space at upload time, so drawing needs no
//! per-node transforms. Every mesh also gets a deduplicated edge list for the
//! wireframe pipeline. A [`GpuScene`] is tied to the session's scene epoch and
//! replaced when that epoch changes.

use std::collections::HashSet;

use cgmath::{InnerSpace, Matrix, Matrix3, Matrix4, SquareMatrix, Vector3, Vector4};
use log::{debug, info};
use wgpu::util::DeviceExt;

use super::vertex::ModelVertex;
use crate::{
    gfx::resources::{GpuMaterial, MaterialBindings, TextureResource},
    materials::PreparedScene,
    scene::{node::calculate_vertex_normals, Geometry, MapSlot, Material},
};

/// Uploaded buffers of one mesh
pub struct GpuMesh {
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
    pub edge_buffer: wgpu::Buffer,
    pub index_count: u32,
    pub edge_count: u32,
    /// Index into [`GpuScene::materials`]
    pub material: usize,
}

pub struct GpuScene {
    epoch: u64,
    pub meshes: Vec<GpuMesh>,
    pub materials: Vec<GpuMaterial>,
    textures: Vec<Option<TextureResource>>,
    /// Bound by meshes whose material id dangles
    fallback_material: GpuMaterial,
}

impl GpuScene {
    pub fn upload(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        scene: &PreparedScene,
        epoch: u64,
        bindings: &MaterialBindings,
        white: &TextureResource,
    ) -> Self {
        let graph = scene.graph();

        let textures: Vec<Option<TextureResource>> = graph
            .textures
            .iter()
            .map(|texture| TextureResource::from_model_texture(device, queue, texture))
            .collect();

        let materials: Vec<GpuMaterial> = graph
            .materials
            .iter()
            .map(|material| {
                let albedo = material
                    .map(MapSlot::Albedo)
                    .and_then(|id| textures.get(id.0))
                    .and_then(Option::as_ref);
                GpuMaterial::new(device, bindings, material, albedo, white)
            })
            .collect();
        let fallback_material =
            GpuMaterial::new(device, bindings, &Material::default(), None, white);

        let mut meshes = Vec::new();
        graph.root.for_each_mesh(&mut |mesh, world| {
            if mesh.geometry.indices.is_empty() {
                return;
            }
            let (vertices, edges) = build_mesh_data(&mesh.geometry, world);
            let material = mesh
                .material
                .map(|id| id.0)
                .filter(|&index| index < materials.len())
                .unwrap_or(materials.len());

            let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Model Vertex Buffer"),
                contents: bytemuck::cast_slice(&vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });
            let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Model Index Buffer"),
                contents: bytemuck::cast_slice(&mesh.geometry.indices),
                usage: wgpu::BufferUsages::INDEX,
            });
            let edge_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Model Edge Buffer"),
                contents: bytemuck::cast_slice(&edges),
                usage: wgpu::BufferUsages::INDEX,
            });

            meshes.push(GpuMesh {
                vertex_buffer,
                index_buffer,
                edge_buffer,
                index_count: mesh.geometry.indices.len() as u32,
                edge_count: edges.len() as u32,
                material,
            });
        });

        info!(
            "Uploaded scene epoch {}: {} meshes, {} materials, {} textures",
            epoch,
            meshes.len(),
            materials.len(),
            textures.iter().flatten().count()
        );

        Self {
            epoch,
            meshes,
            materials,
            textures,
            fallback_material,
        }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Bind group for a mesh's material
    pub fn material_bind_group(&self, mesh: &GpuMesh) -> &wgpu::BindGroup {
        self.materials
            .get(mesh.material)
            .unwrap_or(&self.fallback_material)
            .bind_group()
    }

    /// Frees every buffer and texture of this scene
    pub fn destroy(self) {
        debug!("Releasing GPU resources of scene epoch {}", self.epoch);
        for mesh in &self.meshes {
            mesh.vertex_buffer.destroy();
            mesh.index_buffer.destroy();
            mesh.edge_buffer.destroy();
        }
        for material in &self.materials {
            material.destroy();
        }
        self.fallback_material.destroy();
        for texture in self.textures.iter().flatten() {
            texture.destroy();
        }
    }
}

/// World-space vertices and a line-list of unique triangle edges
pub fn build_mesh_data(geometry: &Geometry, world: &Matrix4<f32>) -> (Vec<ModelVertex>, Vec<u32>) {
    let computed;
    let normals = match &geometry.normals {
        Some(normals) if normals.len() == geometry.positions.len() => normals,
        _ => {
            computed = calculate_vertex_normals(&geometry.positions, &geometry.indices);
            &computed
        }
    };

    let linear = Matrix3::from_cols(world.x.truncate(), world.y.truncate(), world.z.truncate());
    let normal_matrix = linear.invert().map(|m| m.transpose()).unwrap_or(linear);

    let vertices = geometry
        .positions
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let position = *world * Vector4::new(p[0], p[1], p[2], 1.0);
            let n = normals[i];
            let normal = normal_matrix * Vector3::new(n[0], n[1], n[2]);
            let normal = if normal.magnitude2() > f32::EPSILON {
                normal.normalize()
            } else {
                Vector3::unit_y()
            };
            let uv = geometry
                .uvs
                .as_ref()
                .and_then(|uvs| uvs.get(i).copied())
                .unwrap_or([0.0, 0.0]);
            ModelVertex {
                position: [position.x, position.y, position.z],
                normal: normal.into(),
                uv,
            }
        })
        .collect();

    (vertices, triangle_edges(&geometry.indices))
}

fn triangle_edges(indices: &[u32]) -> Vec<u32> {
    let mut seen = HashSet::new();
    let mut edges = Vec::new();
    for triangle in indices.chunks_exact(3) {
        for (a, b) in [
            (triangle[0], triangle[1]),
            (triangle[1], triangle[2]),
            (triangle[2], triangle[0]),
        ] {
            if seen.insert((a.min(b), a.max(b))) {
                edges.push(a);
                edges.push(b);
            }
        }
    }
    edges
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn quad() -> Geometry {
        Geometry::new(
            vec![
                [0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [1.0, 1.0, 0.0],
                [0.0, 1.0, 0.0],
            ],
            vec![0, 1, 2, 0, 2, 3],
        )
    }

    #[test]
    fn vertices_are_baked_into_world_space() {
        let world = Matrix4::from_translation(Vector3::new(0.0, 0.0, 2.0)) * Matrix4::from_scale(2.0);
        let (vertices, _) = build_mesh_data(&quad(), &world);
        assert_eq!(vertices.len(), 4);
        assert_eq!(vertices[2].position, [2.0, 2.0, 2.0]);
        assert_relative_eq!(vertices[2].normal[2], 1.0, epsilon = 1e-5);
        assert_eq!(vertices[0].uv, [0.0, 0.0]);
    }

    #[test]
    fn shared_edges_are_emitted_once() {
        let (_, edges) = build_mesh_data(&quad(), &Matrix4::identity());
        // Two triangles sharing the diagonal give five unique edges
        assert_eq!(edges.len(), 10);
    }

    #[test]
    fn mirrored_transform_keeps_unit_normals() {
        let world = Matrix4::from_nonuniform_scale(-1.0, 3.0, 1.0);
        let (vertices, _) = build_mesh_data(&quad(), &world);
        for vertex in vertices {
            let n = Vector3::from(vertex.normal);
            assert_relative_eq!(n.magnitude(), 1.0, epsilon = 1e-5);
        }
    }
}
