//! Canonical scale and centering
//!
//! Uploaded models arrive in unknown units, so every graph is uniformly
//! scaled until its largest dimension equals the canonical size and then
//! translated so its box center sits at the origin.

use cgmath::{Matrix4, Vector3};
use log::{debug, info, warn};

use super::{bounds::BoundingVolume, SceneGraph};
use crate::{
    config::CANONICAL_SIZE,
    error::{ViewerError, ViewerResult},
};

/// Parameters of the normalization pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizeOptions {
    /// Largest dimension after scaling
    pub target_size: f32,
    /// Fixed scale that replaces the fitted one
    pub scale_override: Option<f32>,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            target_size: CANONICAL_SIZE,
            scale_override: None,
        }
    }
}

/// A graph that has been scaled and centered exactly once
#[derive(Debug, Clone)]
pub struct NormalizedScene {
    graph: SceneGraph,
    bounds: BoundingVolume,
    original_bounds: BoundingVolume,
    scale: f32,
}

impl NormalizedScene {
    pub fn graph(&self) -> &SceneGraph {
        &self.graph
    }

    pub(crate) fn graph_mut(&mut self) -> &mut SceneGraph {
        &mut self.graph
    }

    /// Bounding volume after scale and translation
    pub fn bounds(&self) -> &BoundingVolume {
        &self.bounds
    }

    /// Bounding volume in the model's authored units
    pub fn original_bounds(&self) -> &BoundingVolume {
        &self.original_bounds
    }

    /// Uniform scale factor that was applied
    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub(crate) fn into_parts(self) -> (SceneGraph, BoundingVolume, BoundingVolume, f32) {
        (self.graph, self.bounds, self.original_bounds, self.scale)
    }
}

/// Scales `graph` to the canonical footprint and centers it at the origin
///
/// Fails with [`ViewerError::EmptyGeometry`] when the model has no vertices
/// or a zero largest dimension, so no infinite or NaN scale is ever produced.
pub fn normalize(mut graph: SceneGraph, options: &NormalizeOptions) -> ViewerResult<NormalizedScene> {
    let original_bounds = BoundingVolume::of_node(&graph.root).ok_or(ViewerError::EmptyGeometry)?;
    let max_dim = original_bounds.aabb.max_dimension();
    if !max_dim.is_finite() || max_dim <= f32::EPSILON {
        warn!("Model has degenerate extent (max dimension {})", max_dim);
        return Err(ViewerError::EmptyGeometry);
    }

    let scale = match options.scale_override {
        Some(s) if s.is_finite() && s > 0.0 => s,
        Some(s) => {
            warn!("Ignoring invalid model scale override {}", s);
            options.target_size / max_dim
        }
        None => options.target_size / max_dim,
    };

    // Scale about the origin, then move the scaled center onto it
    let center = original_bounds.aabb.center();
    let offset: Vector3<f32> = -center * scale;
    graph.root.transform =
        Matrix4::from_translation(offset) * Matrix4::from_scale(scale) * graph.root.transform;

    let bounds = BoundingVolume::of_node(&graph.root).ok_or(ViewerError::EmptyGeometry)?;
    if bounds.is_degenerate() {
        return Err(ViewerError::EmptyGeometry);
    }

    debug!(
        "Normalized bounds: min {:?} max {:?} radius {:.3}",
        bounds.aabb.min, bounds.aabb.max, bounds.sphere.radius
    );
    info!(
        "Normalized model: max dimension {:.4} -> {:.4} (scale {:.4})",
        max_dim,
        bounds.aabb.max_dimension(),
        scale
    );

    Ok(NormalizedScene {
        graph,
        bounds,
        original_bounds,
        scale,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{
        test_support::{cube_geometry, cube_graph},
        Geometry, Mesh, SceneNode,
    };
    use approx::assert_relative_eq;

    #[test]
    fn two_unit_cube_scales_to_canonical_size() {
        let normalized = normalize(cube_graph(2.0, [0.0; 3]), &NormalizeOptions::default()).unwrap();
        assert_relative_eq!(normalized.scale(), CANONICAL_SIZE / 2.0, epsilon = 1e-6);
        assert_relative_eq!(
            normalized.bounds().aabb.max_dimension(),
            CANONICAL_SIZE,
            epsilon = 1e-4
        );
    }

    #[test]
    fn off_center_model_is_centered() {
        let normalized =
            normalize(cube_graph(0.01, [100.0, -40.0, 3.0]), &NormalizeOptions::default()).unwrap();
        let center = normalized.bounds().aabb.center();
        assert_relative_eq!(center.x, 0.0, epsilon = 1e-3);
        assert_relative_eq!(center.y, 0.0, epsilon = 1e-3);
        assert_relative_eq!(center.z, 0.0, epsilon = 1e-3);
        assert_relative_eq!(normalized.bounds().sphere.center.x, 0.0, epsilon = 1e-3);
    }

    #[test]
    fn nested_transforms_are_respected() {
        let mut graph = SceneGraph::new(crate::loader::ModelFormat::Gltf);
        graph.root.add_child(
            SceneNode::new("scaled")
                .with_transform(Matrix4::from_nonuniform_scale(10.0, 1.0, 1.0))
                .with_mesh(Mesh::new(cube_geometry(1.0, [0.0; 3]), None)),
        );
        let normalized = normalize(graph, &NormalizeOptions::default()).unwrap();
        let size = normalized.bounds().aabb.size();
        assert_relative_eq!(size.x, CANONICAL_SIZE, epsilon = 1e-4);
        assert_relative_eq!(size.y, CANONICAL_SIZE / 10.0, epsilon = 1e-4);
        assert_relative_eq!(normalized.original_bounds().aabb.size().x, 10.0, epsilon = 1e-4);
    }

    #[test]
    fn zero_extent_fails_with_empty_geometry() {
        let mut graph = SceneGraph::new(crate::loader::ModelFormat::Stl);
        let point = Geometry::new(vec![[1.0, 1.0, 1.0]; 3], vec![0, 1, 2]);
        graph
            .root
            .add_child(SceneNode::new("point").with_mesh(Mesh::new(point, None)));
        let err = normalize(graph, &NormalizeOptions::default()).unwrap_err();
        assert_eq!(err, ViewerError::EmptyGeometry);
    }

    #[test]
    fn graph_without_meshes_fails_with_empty_geometry() {
        let graph = SceneGraph::new(crate::loader::ModelFormat::Obj);
        assert_eq!(
            normalize(graph, &NormalizeOptions::default()).unwrap_err(),
            ViewerError::EmptyGeometry
        );
    }

    #[test]
    fn scale_override_bypasses_fit() {
        let options = NormalizeOptions {
            scale_override: Some(3.0),
            ..Default::default()
        };
        let normalized = normalize(cube_graph(2.0, [1.0, 1.0, 1.0]), &options).unwrap();
        assert_relative_eq!(normalized.scale(), 3.0);
        assert_relative_eq!(normalized.bounds().aabb.max_dimension(), 6.0, epsilon = 1e-4);
    }
}
