//! Bounding geometry for scene graphs
//!
//! Axis-aligned boxes are computed from world-space vertex positions and a
//! bounding sphere is derived from each box for camera framing.

use cgmath::{InnerSpace, Matrix4, Point3, Transform, Vector3};

use super::node::SceneNode;

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vector3<f32>,
    pub max: Vector3<f32>,
}

impl Aabb {
    pub fn new(min: Vector3<f32>, max: Vector3<f32>) -> Self {
        Self { min, max }
    }

    /// An inverted box that any point expands
    pub fn empty() -> Self {
        Self {
            min: Vector3::new(f32::MAX, f32::MAX, f32::MAX),
            max: Vector3::new(f32::MIN, f32::MIN, f32::MIN),
        }
    }

    /// Creates a box enclosing all vertices, `None` when there are none
    pub fn from_vertices(vertices: &[[f32; 3]]) -> Option<Self> {
        let mut aabb = Self::empty();
        for v in vertices {
            aabb.expand(Vector3::new(v[0], v[1], v[2]));
        }
        (!aabb.is_empty()).then_some(aabb)
    }

    pub fn expand(&mut self, point: Vector3<f32>) {
        self.min.x = self.min.x.min(point.x);
        self.min.y = self.min.y.min(point.y);
        self.min.z = self.min.z.min(point.z);
        self.max.x = self.max.x.max(point.x);
        self.max.y = self.max.y.max(point.y);
        self.max.z = self.max.z.max(point.z);
    }

    pub fn union(&self, other: &Aabb) -> Aabb {
        let mut merged = *self;
        merged.expand(other.min);
        merged.expand(other.max);
        merged
    }

    /// True while no point has been added
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    pub fn size(&self) -> Vector3<f32> {
        self.max - self.min
    }

    pub fn center(&self) -> Vector3<f32> {
        (self.min + self.max) * 0.5
    }

    /// Largest of width, height and depth
    pub fn max_dimension(&self) -> f32 {
        let size = self.size();
        size.x.max(size.y).max(size.z)
    }

    /// Box of the eight corners after applying `matrix`
    pub fn transformed(&self, matrix: &Matrix4<f32>) -> Aabb {
        let mut out = Aabb::empty();
        for i in 0..8 {
            let corner = Point3::new(
                if i & 1 == 0 { self.min.x } else { self.max.x },
                if i & 2 == 0 { self.min.y } else { self.max.y },
                if i & 4 == 0 { self.min.z } else { self.max.z },
            );
            let p = matrix.transform_point(corner);
            out.expand(Vector3::new(p.x, p.y, p.z));
        }
        out
    }
}

/// Sphere enclosing a bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingSphere {
    pub center: Vector3<f32>,
    pub radius: f32,
}

impl BoundingSphere {
    pub fn from_aabb(aabb: &Aabb) -> Self {
        Self {
            center: aabb.center(),
            radius: aabb.size().magnitude() * 0.5,
        }
    }
}

/// Box plus derived sphere, always recomputed together
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingVolume {
    pub aabb: Aabb,
    pub sphere: BoundingSphere,
}

impl BoundingVolume {
    pub fn from_aabb(aabb: Aabb) -> Self {
        Self {
            aabb,
            sphere: BoundingSphere::from_aabb(&aabb),
        }
    }

    /// Computes the world-space volume of every mesh below `root`
    ///
    /// Transforms are composed from the root down and every vertex is
    /// transformed individually, so rotated children produce a tight box.
    pub fn of_node(root: &SceneNode) -> Option<Self> {
        let mut aabb = Aabb::empty();
        root.for_each_mesh(&mut |mesh, world| {
            for p in &mesh.geometry.positions {
                let wp = world.transform_point(Point3::new(p[0], p[1], p[2]));
                aabb.expand(Vector3::new(wp.x, wp.y, wp.z));
            }
        });
        (!aabb.is_empty()).then(|| Self::from_aabb(aabb))
    }

    pub fn dimensions(&self) -> [f32; 3] {
        let size = self.aabb.size();
        [size.x, size.y, size.z]
    }

    /// True when the volume can be used for framing
    pub fn is_degenerate(&self) -> bool {
        let max_dim = self.aabb.max_dimension();
        !max_dim.is_finite() || max_dim <= f32::EPSILON || !self.sphere.radius.is_finite()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::node::{Geometry, Mesh};
    use approx::assert_relative_eq;

    #[test]
    fn test_aabb_creation() {
        let vertices = vec![[0.0, 0.0, 0.0], [1.0, 1.0, 1.0], [-1.0, -1.0, -1.0]];
        let aabb = Aabb::from_vertices(&vertices).unwrap();

        assert_eq!(aabb.min, Vector3::new(-1.0, -1.0, -1.0));
        assert_eq!(aabb.max, Vector3::new(1.0, 1.0, 1.0));
        assert_eq!(aabb.max_dimension(), 2.0);
    }

    #[test]
    fn empty_vertex_list_has_no_box() {
        assert!(Aabb::from_vertices(&[]).is_none());
        assert!(Aabb::empty().is_empty());
    }

    #[test]
    fn sphere_encloses_box_corners() {
        let aabb = Aabb::new(Vector3::new(-1.0, -1.0, -1.0), Vector3::new(1.0, 1.0, 1.0));
        let sphere = BoundingSphere::from_aabb(&aabb);
        assert_relative_eq!(sphere.radius, 3.0f32.sqrt(), epsilon = 1e-6);
        assert_eq!(sphere.center, Vector3::new(0.0, 0.0, 0.0));
    }

    #[test]
    fn node_volume_composes_child_transforms() {
        let geometry = Geometry::new(vec![[0.0, 0.0, 0.0], [1.0, 1.0, 1.0], [1.0, 0.0, 0.0]], vec![0, 1, 2]);
        let child = SceneNode::new("child")
            .with_transform(Matrix4::from_translation(Vector3::new(10.0, 0.0, 0.0)))
            .with_mesh(Mesh::new(geometry, None));
        let root = SceneNode::new("root")
            .with_transform(Matrix4::from_scale(2.0))
            .with_child(child);

        let volume = BoundingVolume::of_node(&root).unwrap();
        assert_relative_eq!(volume.aabb.min.x, 20.0, epsilon = 1e-5);
        assert_relative_eq!(volume.aabb.max.x, 22.0, epsilon = 1e-5);
        assert_relative_eq!(volume.aabb.max.y, 2.0, epsilon = 1e-5);
    }
}
