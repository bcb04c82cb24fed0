use std::fmt;

use crate::loader::ModelFormat;

/// Catalog metadata derived from a loaded model
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSummary {
    pub format: ModelFormat,
    pub mesh_count: usize,
    pub vertex_count: usize,
    pub face_count: usize,
    pub material_count: usize,
    pub texture_count: usize,
    /// Width, height, depth in the model's authored units
    pub dimensions: [f32; 3],
    /// Width, height, depth after normalization
    pub normalized_dimensions: [f32; 3],
    /// Uniform scale applied by normalization
    pub scale: f32,
}

impl fmt::Display for ModelSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} meshes, {} vertices, {} faces",
            self.mesh_count, self.vertex_count, self.face_count
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_lists_counts() {
        let summary = ModelSummary {
            format: ModelFormat::Glb,
            mesh_count: 3,
            vertex_count: 24,
            face_count: 12,
            material_count: 1,
            texture_count: 0,
            dimensions: [2.0, 2.0, 2.0],
            normalized_dimensions: [5.0, 5.0, 5.0],
            scale: 2.5,
        };
        assert_eq!(summary.to_string(), "3 meshes, 24 vertices, 12 faces");
    }
}
