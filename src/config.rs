//! Viewer configuration surface
//!
//! Everything the host application can tune about a viewer instance. Values
//! are plain data with sensible defaults and chained `with_*` setters.

use cgmath::Vector3;

/// Target maximum dimension every normalized model is scaled to
pub const CANONICAL_SIZE: f32 = 5.0;

/// Default angular speed of auto-rotate in radians per second (one turn in ~30s)
pub const DEFAULT_AUTO_ROTATE_SPEED: f32 = std::f32::consts::TAU / 30.0;

/// How pointer drags interact with auto-rotate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DragPolicy {
    /// Auto-rotate keeps running while the user drags
    #[default]
    Independent,
    /// Auto-rotate pauses while a drag is in progress and resumes on release
    SuspendWhileDragging,
}

/// Configuration for a single viewer instance
#[derive(Debug, Clone, PartialEq)]
pub struct ViewerConfig {
    /// Canvas width in physical pixels
    pub width: u32,
    /// Canvas height in physical pixels
    pub height: u32,
    /// Whether auto-rotate starts enabled
    pub auto_rotate: bool,
    /// Auto-rotate angular speed in radians per second
    pub auto_rotate_speed: f32,
    /// Whether the controls panel is drawn
    pub show_controls: bool,
    /// Clear color as linear RGB
    pub background_color: [f32; 3],
    /// Fixed uniform scale that bypasses canonical auto-scaling
    pub model_scale: Option<f32>,
    /// Initial camera position that replaces the adaptive home position
    pub camera_position: Option<Vector3<f32>>,
    /// Vertical field of view in degrees
    pub fov_degrees: f32,
    /// Fraction of pending orbit motion applied per 60Hz frame, 0 disables damping
    pub damping: f32,
    pub drag_policy: DragPolicy,
    /// Whether the coordinate readout starts enabled
    pub show_coordinates: bool,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            width: 1200,
            height: 800,
            auto_rotate: false,
            auto_rotate_speed: DEFAULT_AUTO_ROTATE_SPEED,
            show_controls: true,
            background_color: [0.1, 0.12, 0.15],
            model_scale: None,
            camera_position: None,
            fov_degrees: 75.0,
            damping: 0.1,
            drag_policy: DragPolicy::Independent,
            show_coordinates: false,
        }
    }
}

impl ViewerConfig {
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width.max(1);
        self.height = height.max(1);
        self
    }

    pub fn with_auto_rotate(mut self, enabled: bool) -> Self {
        self.auto_rotate = enabled;
        self
    }

    pub fn with_auto_rotate_speed(mut self, radians_per_second: f32) -> Self {
        self.auto_rotate_speed = radians_per_second;
        self
    }

    pub fn with_controls(mut self, show: bool) -> Self {
        self.show_controls = show;
        self
    }

    pub fn with_background(mut self, r: f32, g: f32, b: f32) -> Self {
        self.background_color = [r, g, b];
        self
    }

    /// Uses a fixed model scale instead of fitting to [`CANONICAL_SIZE`]
    pub fn with_model_scale(mut self, scale: f32) -> Self {
        self.model_scale = Some(scale);
        self
    }

    pub fn with_camera_position(mut self, position: Vector3<f32>) -> Self {
        self.camera_position = Some(position);
        self
    }

    pub fn with_fov(mut self, degrees: f32) -> Self {
        self.fov_degrees = degrees.clamp(10.0, 120.0);
        self
    }

    pub fn with_damping(mut self, damping: f32) -> Self {
        self.damping = damping.clamp(0.0, 1.0);
        self
    }

    pub fn with_drag_policy(mut self, policy: DragPolicy) -> Self {
        self.drag_policy = policy;
        self
    }

    pub fn with_coordinates(mut self, show: bool) -> Self {
        self.show_coordinates = show;
        self
    }

    /// Canvas aspect ratio (width / height)
    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height.max(1) as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_surface() {
        let config = ViewerConfig::default();
        assert!(!config.auto_rotate);
        assert!(!config.show_coordinates);
        assert!(config.show_controls);
        assert_eq!(config.model_scale, None);
        assert_eq!(config.drag_policy, DragPolicy::Independent);
    }

    #[test]
    fn builder_clamps_degenerate_sizes() {
        let config = ViewerConfig::default().with_size(0, 0);
        assert_eq!((config.width, config.height), (1, 1));
        assert_eq!(config.aspect(), 1.0);
    }
}
