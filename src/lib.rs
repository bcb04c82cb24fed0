//! Haggis Viewer
//!
//! An interactive 3D model viewer built on wgpu and winit. Arbitrary glTF,
//! GLB, OBJ, FBX and STL files are loaded off the render thread, scaled and
//! centered to a canonical size, given visible materials when their own are
//! missing or broken, and framed by a camera that adapts to the model's
//! shape.
//!
//! The pipeline a model moves through:
//!
//! - [`loader`] fetches bytes and parses them into a [`scene::SceneGraph`]
//! - [`scene::normalize`] rescales and recenters it
//! - [`materials::MaterialEngine`] repairs shading
//! - [`gfx::camera::frame_model`] computes the home pose
//! - [`viewer::ViewerSession`] ties it together behind a status state machine
//!
//! [`app::ViewerApp`] hosts a session in a desktop window.

pub mod app;
pub mod config;
pub mod error;
pub mod gfx;
pub mod loader;
pub mod materials;
pub mod scene;
pub mod ui;
pub mod viewer;
pub mod wgpu_utils;

pub use gfx::camera;

// Re-export main types for convenience
pub use app::ViewerApp;
pub use config::{DragPolicy, ViewerConfig};
pub use error::{ViewerError, ViewerResult};
pub use loader::{LoadRequest, ModelFormat, ModelSource};
pub use viewer::{SessionStatus, ViewerSession};
