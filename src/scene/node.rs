use cgmath::{Matrix4, SquareMatrix};

use super::{bounds::Aabb, material::MaterialId};

/// CPU-side geometry of one mesh
///
/// Triangles are always indexed; loaders that produce triangle soup get
/// sequential indices.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Geometry {
    pub positions: Vec<[f32; 3]>,
    pub normals: Option<Vec<[f32; 3]>>,
    pub uvs: Option<Vec<[f32; 2]>>,
    pub indices: Vec<u32>,
    /// Local-space box, `None` until computed
    pub bounds: Option<Aabb>,
}

impl Geometry {
    /// Creates geometry from positions and triangle indices
    ///
    /// Empty `indices` means the positions are already a triangle list.
    pub fn new(positions: Vec<[f32; 3]>, indices: Vec<u32>) -> Self {
        let indices = if indices.is_empty() {
            (0..positions.len() as u32).collect()
        } else {
            indices
        };
        Self {
            positions,
            normals: None,
            uvs: None,
            indices,
            bounds: None,
        }
    }

    /// Attaches per-vertex normals, ignored unless there is one per position
    pub fn with_normals(mut self, normals: Vec<[f32; 3]>) -> Self {
        if normals.len() == self.positions.len() {
            self.normals = Some(normals);
        }
        self
    }

    /// Attaches per-vertex texture coordinates, ignored unless there is one per position
    pub fn with_uvs(mut self, uvs: Vec<[f32; 2]>) -> Self {
        if uvs.len() == self.positions.len() {
            self.uvs = Some(uvs);
        }
        self
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Checks that indices form whole triangles inside the vertex range
    pub fn validate(&self) -> Result<(), String> {
        if self.indices.len() % 3 != 0 {
            return Err(format!(
                "index count {} is not a multiple of 3",
                self.indices.len()
            ));
        }
        let count = self.positions.len() as u32;
        if let Some(bad) = self.indices.iter().find(|&&i| i >= count) {
            return Err(format!("index {} out of range for {} vertices", bad, count));
        }
        Ok(())
    }

    /// Recomputes normals and bounds where missing, returns true if anything changed
    pub fn ensure_normals_and_bounds(&mut self) -> bool {
        let mut repaired = false;
        if self.normals.is_none() {
            self.normals = Some(calculate_vertex_normals(&self.positions, &self.indices));
            repaired = true;
        }
        if self.bounds.is_none() {
            self.bounds = Aabb::from_vertices(&self.positions);
            repaired = true;
        }
        repaired
    }
}

/// Averages face normals onto vertices
pub fn calculate_vertex_normals(positions: &[[f32; 3]], indices: &[u32]) -> Vec<[f32; 3]> {
    let mut normals = vec![[0.0f32; 3]; positions.len()];

    for triangle in indices.chunks_exact(3) {
        let (i0, i1, i2) = (
            triangle[0] as usize,
            triangle[1] as usize,
            triangle[2] as usize,
        );
        if i0 >= positions.len() || i1 >= positions.len() || i2 >= positions.len() {
            continue;
        }
        let (v0, v1, v2) = (positions[i0], positions[i1], positions[i2]);

        let edge1 = [v1[0] - v0[0], v1[1] - v0[1], v1[2] - v0[2]];
        let edge2 = [v2[0] - v0[0], v2[1] - v0[1], v2[2] - v0[2]];

        // Unnormalized cross product weights larger faces more
        let face_normal = [
            edge1[1] * edge2[2] - edge1[2] * edge2[1],
            edge1[2] * edge2[0] - edge1[0] * edge2[2],
            edge1[0] * edge2[1] - edge1[1] * edge2[0],
        ];

        for &vertex_idx in &[i0, i1, i2] {
            normals[vertex_idx][0] += face_normal[0];
            normals[vertex_idx][1] += face_normal[1];
            normals[vertex_idx][2] += face_normal[2];
        }
    }

    for normal in normals.iter_mut() {
        let length = (normal[0].powi(2) + normal[1].powi(2) + normal[2].powi(2)).sqrt();
        if length > 0.0 {
            normal[0] /= length;
            normal[1] /= length;
            normal[2] /= length;
        } else {
            *normal = [0.0, 1.0, 0.0];
        }
    }

    normals
}

/// Geometry plus the material it is drawn with
#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    pub geometry: Geometry,
    pub material: Option<MaterialId>,
}

impl Mesh {
    pub fn new(geometry: Geometry, material: Option<MaterialId>) -> Self {
        Self { geometry, material }
    }
}

/// A transformable node of the scene tree
#[derive(Debug, Clone, PartialEq)]
pub struct SceneNode {
    pub name: String,
    /// Local transform relative to the parent
    pub transform: Matrix4<f32>,
    pub mesh: Option<Mesh>,
    pub children: Vec<SceneNode>,
}

impl SceneNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transform: Matrix4::identity(),
            mesh: None,
            children: Vec::new(),
        }
    }

    pub fn with_transform(mut self, transform: Matrix4<f32>) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_mesh(mut self, mesh: Mesh) -> Self {
        self.mesh = Some(mesh);
        self
    }

    pub fn with_child(mut self, child: SceneNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn add_child(&mut self, child: SceneNode) {
        self.children.push(child);
    }

    /// Visits every mesh with its composed world transform
    pub fn for_each_mesh<F>(&self, f: &mut F)
    where
        F: FnMut(&Mesh, &Matrix4<f32>),
    {
        self.visit_meshes(Matrix4::identity(), f);
    }

    fn visit_meshes<F>(&self, parent: Matrix4<f32>, f: &mut F)
    where
        F: FnMut(&Mesh, &Matrix4<f32>),
    {
        let world = parent * self.transform;
        if let Some(mesh) = &self.mesh {
            f(mesh, &world);
        }
        for child in &self.children {
            child.visit_meshes(world, f);
        }
    }

    pub fn for_each_mesh_mut<F>(&mut self, f: &mut F)
    where
        F: FnMut(&mut Mesh),
    {
        if let Some(mesh) = self.mesh.as_mut() {
            f(mesh);
        }
        for child in self.children.iter_mut() {
            child.for_each_mesh_mut(f);
        }
    }

    pub fn mesh_count(&self) -> usize {
        let mut count = 0;
        self.for_each_mesh(&mut |_, _| count += 1);
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn triangle_soup_gets_sequential_indices() {
        let geometry = Geometry::new(vec![[0.0; 3], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]], Vec::new());
        assert_eq!(geometry.indices, vec![0, 1, 2]);
        assert_eq!(geometry.triangle_count(), 1);
    }

    #[test]
    fn normals_point_out_of_ccw_triangle() {
        let positions = vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
        let normals = calculate_vertex_normals(&positions, &[0, 1, 2]);
        for n in normals {
            assert_eq!(n, [0.0, 0.0, 1.0]);
        }
    }

    #[test]
    fn mismatched_normals_are_dropped() {
        let geometry = Geometry::new(vec![[0.0; 3]; 3], vec![0, 1, 2]).with_normals(vec![[0.0; 3]]);
        assert!(geometry.normals.is_none());
    }

    #[test]
    fn ensure_normals_and_bounds_repairs_once() {
        let mut geometry = Geometry::new(vec![[0.0; 3], [2.0, 0.0, 0.0], [0.0, 2.0, 0.0]], vec![0, 1, 2]);
        assert!(geometry.ensure_normals_and_bounds());
        assert!(!geometry.ensure_normals_and_bounds());
        assert_eq!(geometry.bounds.unwrap().max_dimension(), 2.0);
    }

    #[test]
    fn validate_rejects_out_of_range_indices() {
        let geometry = Geometry::new(vec![[0.0; 3]; 3], vec![0, 1, 3]);
        assert!(geometry.validate().is_err());
    }

    #[test]
    fn mesh_count_walks_children() {
        let mesh = Mesh::new(Geometry::new(vec![[0.0; 3]; 3], vec![]), None);
        let root = SceneNode::new("root")
            .with_mesh(mesh.clone())
            .with_child(SceneNode::new("a").with_child(SceneNode::new("b").with_mesh(mesh)));
        assert_eq!(root.mesh_count(), 2);
    }
}
