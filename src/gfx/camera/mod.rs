pub mod camera_controller;
pub mod camera_utils;
pub mod framing;
pub mod orbit_camera;

// Re-export main types
pub use camera_controller::{CameraController, PointerInput};
pub use camera_utils::{Camera, CameraUniform};
pub use framing::{frame_model, FramingInput, HomePose, SizeCategory};
pub use orbit_camera::OrbitCamera;
