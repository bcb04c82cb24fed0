//! GPU resource management
//!
//! Handles textures, buffers, and bind groups for rendering.

pub mod global_bindings;
pub mod material;
pub mod texture_resource;

// Re-export main types
pub use global_bindings::{global_content, GlobalBindings, GlobalUBO, GlobalUBOContent, LightConfig};
pub use material::{GpuMaterial, MaterialBindings, MaterialUniform};
pub use texture_resource::TextureResource;
