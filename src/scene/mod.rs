//! # Scene Graph Module
//!
//! CPU-side representation of a loaded model: a tree of [`SceneNode`]s, some
//! carrying a [`Mesh`], plus the material and texture arenas the meshes point
//! into.
//!
//! A freshly parsed [`SceneGraph`] moves through two consuming stages before
//! it can be shown:
//!
//! - [`normalize`] scales and centers it, producing a [`NormalizedScene`]
//! - [`crate::materials::MaterialEngine`] repairs its shading, producing a
//!   [`crate::materials::PreparedScene`]
//!
//! Because each stage takes ownership, a graph cannot be normalized twice or
//! attached before both stages ran.

pub mod bounds;
pub mod material;
pub mod node;
pub mod normalize;
pub mod summary;

pub use bounds::{Aabb, BoundingSphere, BoundingVolume};
pub use material::{MapSlot, Material, MaterialId, Side, Texture, TextureId};
pub use node::{Geometry, Mesh, SceneNode};
pub use normalize::{normalize, NormalizeOptions, NormalizedScene};
pub use summary::ModelSummary;

use crate::loader::ModelFormat;

/// A parsed model with its material and texture arenas
#[derive(Debug, Clone, PartialEq)]
pub struct SceneGraph {
    pub root: SceneNode,
    pub materials: Vec<Material>,
    pub textures: Vec<Texture>,
    pub format: ModelFormat,
}

impl SceneGraph {
    pub fn new(format: ModelFormat) -> Self {
        Self {
            root: SceneNode::new("root"),
            materials: Vec::new(),
            textures: Vec::new(),
            format,
        }
    }

    pub fn add_material(&mut self, material: Material) -> MaterialId {
        self.materials.push(material);
        MaterialId(self.materials.len() - 1)
    }

    pub fn add_texture(&mut self, texture: Texture) -> TextureId {
        self.textures.push(texture);
        TextureId(self.textures.len() - 1)
    }

    pub fn material(&self, id: MaterialId) -> Option<&Material> {
        self.materials.get(id.0)
    }

    pub fn material_mut(&mut self, id: MaterialId) -> Option<&mut Material> {
        self.materials.get_mut(id.0)
    }

    pub fn texture(&self, id: TextureId) -> Option<&Texture> {
        self.textures.get(id.0)
    }

    pub fn mesh_count(&self) -> usize {
        self.root.mesh_count()
    }

    pub fn vertex_count(&self) -> usize {
        let mut count = 0;
        self.root
            .for_each_mesh(&mut |mesh, _| count += mesh.geometry.vertex_count());
        count
    }

    pub fn face_count(&self) -> usize {
        let mut count = 0;
        self.root
            .for_each_mesh(&mut |mesh, _| count += mesh.geometry.triangle_count());
        count
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::cube_graph;

    #[test]
    fn counts_cover_whole_tree() {
        let graph = cube_graph(2.0, [0.0; 3]);
        assert_eq!(graph.mesh_count(), 1);
        assert_eq!(graph.vertex_count(), 8);
        assert_eq!(graph.face_count(), 12);
    }
}
