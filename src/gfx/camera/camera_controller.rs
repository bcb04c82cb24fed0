use winit::{
    dpi::PhysicalPosition,
    event::{DeviceEvent, ElementState, MouseScrollDelta},
};

use super::orbit_camera::OrbitCamera;

/// Pointer gesture independent of the windowing backend
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerInput {
    DragStart,
    DragEnd,
    /// Pointer motion in pixels
    DragMove { dx: f32, dy: f32 },
    /// Wheel or pinch, positive zooms in
    Scroll(f32),
}

impl PointerInput {
    /// Translates a raw device event; motion is only reported while `dragging`
    pub fn from_device_event(event: &DeviceEvent, dragging: bool) -> Option<Self> {
        match event {
            DeviceEvent::Button {
                button: 0, // Left Mouse Button
                state,
            } => Some(match state {
                ElementState::Pressed => Self::DragStart,
                ElementState::Released => Self::DragEnd,
            }),
            DeviceEvent::MouseWheel { delta } => {
                let steps = match delta {
                    MouseScrollDelta::LineDelta(_, scroll) => *scroll,
                    // Roughly one wheel notch per 50 pixels on touchpads
                    MouseScrollDelta::PixelDelta(PhysicalPosition { y, .. }) => *y as f32 / 50.0,
                };
                Some(Self::Scroll(steps))
            }
            DeviceEvent::MouseMotion { delta } if dragging => Some(Self::DragMove {
                dx: delta.0 as f32,
                dy: delta.1 as f32,
            }),
            _ => None,
        }
    }
}

/// Turns pointer gestures into orbit and zoom on an [`OrbitCamera`]
#[derive(Debug, Clone)]
pub struct CameraController {
    /// Radians per pixel of drag
    pub rotate_speed: f32,
    /// Zoom steps per scroll unit
    pub zoom_speed: f32,
    is_dragging: bool,
}

impl Default for CameraController {
    fn default() -> Self {
        Self::new(0.005, 1.0)
    }
}

impl CameraController {
    pub fn new(rotate_speed: f32, zoom_speed: f32) -> Self {
        Self {
            rotate_speed,
            zoom_speed,
            is_dragging: false,
        }
    }

    /// Applies `input` to `camera`, returning whether the view changed
    pub fn apply(&mut self, input: PointerInput, camera: &mut OrbitCamera) -> bool {
        match input {
            PointerInput::DragStart => {
                self.is_dragging = true;
                false
            }
            PointerInput::DragEnd => {
                self.is_dragging = false;
                false
            }
            PointerInput::DragMove { dx, dy } => {
                if !self.is_dragging {
                    return false;
                }
                camera.orbit(-dx * self.rotate_speed, dy * self.rotate_speed);
                true
            }
            PointerInput::Scroll(steps) => {
                camera.zoom(steps * self.zoom_speed);
                true
            }
        }
    }

    /// Forgets an in-progress drag, e.g. after focus loss or a new load
    pub fn cancel_drag(&mut self) {
        self.is_dragging = false;
    }

    pub fn is_dragging(&self) -> bool {
        self.is_dragging
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::Vector3;

    fn camera() -> OrbitCamera {
        OrbitCamera::new(10.0, 0.3, 0.5, Vector3::new(0.0, 0.0, 0.0), 1.0)
    }

    #[test]
    fn motion_without_drag_is_ignored() {
        let mut controller = CameraController::default();
        let mut camera = camera();
        let yaw = camera.yaw;
        assert!(!controller.apply(PointerInput::DragMove { dx: 40.0, dy: 0.0 }, &mut camera));
        assert_eq!(camera.yaw, yaw);
    }

    #[test]
    fn drag_orbits_until_released() {
        let mut controller = CameraController::default();
        let mut camera = camera();
        let yaw = camera.yaw;
        controller.apply(PointerInput::DragStart, &mut camera);
        assert!(controller.is_dragging());
        assert!(controller.apply(PointerInput::DragMove { dx: -40.0, dy: 0.0 }, &mut camera));
        assert!((camera.yaw - (yaw + 0.2)).abs() < 1e-5);

        controller.apply(PointerInput::DragEnd, &mut camera);
        assert!(!controller.is_dragging());
    }

    #[test]
    fn scroll_zooms_in() {
        let mut controller = CameraController::default();
        let mut camera = camera();
        controller.apply(PointerInput::Scroll(2.0), &mut camera);
        assert!(camera.distance < 10.0);
    }

    #[test]
    fn translates_raw_device_events() {
        let press = DeviceEvent::Button {
            button: 0,
            state: ElementState::Pressed,
        };
        assert_eq!(
            PointerInput::from_device_event(&press, false),
            Some(PointerInput::DragStart)
        );
        let motion = DeviceEvent::MouseMotion { delta: (3.0, 4.0) };
        assert_eq!(PointerInput::from_device_event(&motion, false), None);
        assert_eq!(
            PointerInput::from_device_event(&motion, true),
            Some(PointerInput::DragMove { dx: 3.0, dy: 4.0 })
        );
        let wheel = DeviceEvent::MouseWheel {
            delta: MouseScrollDelta::LineDelta(0.0, 1.0),
        };
        assert_eq!(
            PointerInput::from_device_event(&wheel, false),
            Some(PointerInput::Scroll(1.0))
        );
    }
}
