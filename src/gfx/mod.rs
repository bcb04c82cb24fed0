//! # Graphics Module
//!
//! Everything that touches the GPU or the orbit view of the model.
//!
//! - **Camera System** ([`camera`]) - adaptive framing of the loaded model and
//!   a damped orbit camera with pointer controls
//! - **Rendering Pipeline** ([`rendering`]) - solid and wireframe passes over
//!   world-space mesh buffers
//! - **Resource Management** ([`resources`]) - global uniforms, materials and
//!   textures on the GPU
//!
//! The [`RenderEngine`] reads a [`crate::viewer::ViewerSession`] each frame and
//! re-uploads only when the session's scene epoch changes.

pub mod camera;
pub mod rendering;
pub mod resources;

// Re-export commonly used types
pub use camera::orbit_camera::OrbitCamera;
pub use rendering::render_engine::RenderEngine;
