//! Core rendering functionality
//!
//! Handles render pipelines, the GPU copy of the loaded model, and frame rendering.

pub mod gpu_scene;
pub mod pipeline_manager;
pub mod render_engine;
pub mod vertex;

// Re-export main types
pub use gpu_scene::{build_mesh_data, GpuMesh, GpuScene};
pub use pipeline_manager::{PipelineConfig, PipelineManager};
pub use render_engine::RenderEngine;
pub use vertex::ModelVertex;
