use super::{
    camera_utils::{convert_matrix4_to_array, Camera, CameraUniform},
    framing::{orbit_position, HomePose, PITCH_LIMIT},
};
use cgmath::*;

#[rustfmt::skip]
pub const OPENGL_TO_WGPU_MATRIX: cgmath::Matrix4<f32> = cgmath::Matrix4::new(
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.5,
    0.0, 0.0, 0.0, 1.0,
);

/// Remaining orbit velocity below which damping stops
const VELOCITY_EPSILON: f32 = 1e-5;

#[derive(Debug, Clone, Copy)]
pub struct OrbitCamera {
    pub distance: f32,
    pub pitch: f32,
    pub yaw: f32,
    pub eye: Vector3<f32>,
    pub target: Vector3<f32>,
    pub up: Vector3<f32>,
    pub bounds: OrbitCameraBounds,
    pub aspect: f32,
    pub fovy: Rad<f32>,
    pub znear: f32,
    pub zfar: f32,
    /// Fraction of pending orbit motion applied per 60Hz frame, 0 disables damping
    pub damping: f32,
    pending_yaw: f32,
    pending_pitch: f32,
    pub uniform: CameraUniform,
}

impl Camera for OrbitCamera {
    fn build_view_projection_matrix(&self) -> Matrix4<f32> {
        let eye = Point3::from_vec(self.eye);
        let target = Point3::from_vec(self.target);
        let view = Matrix4::look_at_rh(eye, target, self.up);
        let proj =
            OPENGL_TO_WGPU_MATRIX * perspective(self.fovy, self.aspect, self.znear, self.zfar);
        proj * view
    }
}

impl OrbitCamera {
    pub fn new(distance: f32, pitch: f32, yaw: f32, target: Vector3<f32>, aspect: f32) -> Self {
        let mut camera = Self {
            distance,
            pitch,
            yaw,
            eye: Vector3::zero(), // Will be auto-calculted in `update()` nevertheless.
            target,
            up: Vector3::unit_y(),
            bounds: OrbitCameraBounds::default(),
            aspect,
            fovy: Deg(75.0).into(),
            znear: 0.1,
            zfar: 1000.0,
            damping: 0.0,
            pending_yaw: 0.0,
            pending_pitch: 0.0,
            uniform: CameraUniform::default(),
        };
        camera.update();
        camera
    }

    /// Camera placed at `pose` with its zoom bounds and clip planes
    pub fn from_home(pose: &HomePose, fov_degrees: f32, aspect: f32) -> Self {
        let mut camera = Self::new(pose.distance, pose.pitch, pose.yaw, pose.target, aspect);
        camera.fovy = Deg(fov_degrees).into();
        camera.apply_home(pose);
        camera
    }

    /// Moves exactly to `pose`, dropping any pending orbit motion
    pub fn apply_home(&mut self, pose: &HomePose) {
        self.bounds.min_distance = Some(pose.min_distance);
        self.bounds.max_distance = Some(pose.max_distance);
        self.znear = pose.znear;
        self.zfar = pose.zfar;
        self.target = pose.target;
        self.distance = pose.distance;
        self.pitch = pose.pitch.clamp(self.bounds.min_pitch, self.bounds.max_pitch);
        self.yaw = pose.yaw;
        self.pending_yaw = 0.0;
        self.pending_pitch = 0.0;
        self.update();
    }

    pub fn set_distance(&mut self, distance: f32) {
        self.distance = distance.clamp(
            self.bounds.min_distance.unwrap_or(f32::EPSILON),
            self.bounds.max_distance.unwrap_or(f32::MAX),
        );
        self.update();
    }

    /// Scales distance by `0.9^steps`; positive steps zoom in
    pub fn zoom(&mut self, steps: f32) {
        self.set_distance(self.distance * 0.9f32.powf(steps));
    }

    pub fn set_pitch(&mut self, pitch: f32) {
        self.pitch = pitch.clamp(self.bounds.min_pitch, self.bounds.max_pitch);
        self.update();
    }

    pub fn add_pitch(&mut self, delta: f32) {
        self.set_pitch(self.pitch + delta);
    }

    pub fn set_yaw(&mut self, yaw: f32) {
        let mut bounded_yaw = yaw;
        if let Some(min_yaw) = self.bounds.min_yaw {
            bounded_yaw = bounded_yaw.clamp(min_yaw, f32::MAX);
        }
        if let Some(max_yaw) = self.bounds.max_yaw {
            bounded_yaw = bounded_yaw.clamp(f32::MIN, max_yaw);
        }
        self.yaw = bounded_yaw.rem_euclid(std::f32::consts::TAU);
        self.update();
    }

    pub fn add_yaw(&mut self, delta: f32) {
        self.set_yaw(self.yaw + delta);
    }

    /// Queues an orbit; applied immediately without damping, eased in otherwise
    pub fn orbit(&mut self, delta_yaw: f32, delta_pitch: f32) {
        if self.damping <= 0.0 {
            self.add_yaw(delta_yaw);
            self.add_pitch(delta_pitch);
        } else {
            self.pending_yaw += delta_yaw;
            self.pending_pitch += delta_pitch;
        }
    }

    /// Advances damped orbit motion by `dt` seconds
    pub fn update_motion(&mut self, dt: f32) {
        if self.pending_yaw.abs() < VELOCITY_EPSILON && self.pending_pitch.abs() < VELOCITY_EPSILON
        {
            self.pending_yaw = 0.0;
            self.pending_pitch = 0.0;
            return;
        }
        let frames = (dt * 60.0).max(0.0);
        let fraction = 1.0 - (1.0 - self.damping.clamp(0.0, 1.0)).powf(frames);
        let yaw = self.pending_yaw * fraction;
        let pitch = self.pending_pitch * fraction;
        self.pending_yaw -= yaw;
        self.pending_pitch -= pitch;
        self.add_yaw(yaw);
        self.add_pitch(pitch);
    }

    pub fn is_moving(&self) -> bool {
        self.pending_yaw != 0.0 || self.pending_pitch != 0.0
    }

    /// Updates the camera after changing `distance`, `pitch` or `yaw`.
    fn update(&mut self) {
        self.eye = orbit_position(self.target, self.distance, self.yaw, self.pitch);
    }

    pub fn resize_projection(&mut self, width: u32, height: u32) {
        self.aspect = width.max(1) as f32 / height.max(1) as f32;
    }

    pub fn update_view_proj(&mut self) {
        self.uniform.view_position = [self.eye.x, self.eye.y, self.eye.z, 1.0];
        self.uniform.view_proj = convert_matrix4_to_array(self.build_view_projection_matrix());
    }
}

#[derive(Debug, Clone, Copy)]
pub struct OrbitCameraBounds {
    pub min_distance: Option<f32>,
    pub max_distance: Option<f32>,
    pub min_pitch: f32,
    pub max_pitch: f32,
    pub min_yaw: Option<f32>,
    pub max_yaw: Option<f32>,
}

impl Default for OrbitCameraBounds {
    fn default() -> Self {
        Self {
            min_distance: None,
            max_distance: None,
            min_pitch: -PITCH_LIMIT,
            max_pitch: PITCH_LIMIT,
            min_yaw: None,
            max_yaw: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        gfx::camera::framing::{frame_model, FramingInput},
        scene::{Aabb, BoundingVolume},
    };
    use approx::assert_relative_eq;

    fn home() -> HomePose {
        let bounds = BoundingVolume::from_aabb(Aabb::new(
            Vector3::new(-2.5, -2.5, -2.5),
            Vector3::new(2.5, 2.5, 2.5),
        ));
        frame_model(&FramingInput::new(&bounds, 4.0 / 3.0, 75.0, 1))
    }

    #[test]
    fn reset_restores_home_after_orbit_and_zoom() {
        let pose = home();
        let mut camera = OrbitCamera::from_home(&pose, 75.0, 4.0 / 3.0);
        camera.orbit(1.3, -0.4);
        camera.zoom(5.0);
        assert!((camera.eye - pose.position).magnitude() > 0.1);

        camera.apply_home(&pose);
        assert_relative_eq!(camera.eye.x, pose.position.x, epsilon = 1e-5);
        assert_relative_eq!(camera.eye.y, pose.position.y, epsilon = 1e-5);
        assert_relative_eq!(camera.eye.z, pose.position.z, epsilon = 1e-5);
        assert_eq!(camera.distance, pose.distance);
    }

    #[test]
    fn pitch_cannot_pass_the_poles() {
        let mut camera = OrbitCamera::from_home(&home(), 75.0, 1.0);
        camera.orbit(0.0, 10.0);
        assert!(camera.pitch < std::f32::consts::FRAC_PI_2);
        camera.orbit(0.0, -20.0);
        assert!(camera.pitch > -std::f32::consts::FRAC_PI_2);
    }

    #[test]
    fn zoom_is_clamped_to_home_bounds() {
        let pose = home();
        let mut camera = OrbitCamera::from_home(&pose, 75.0, 1.0);
        camera.zoom(1000.0);
        assert_relative_eq!(camera.distance, pose.min_distance);
        camera.zoom(-1000.0);
        assert_relative_eq!(camera.distance, pose.max_distance);
    }

    #[test]
    fn damped_orbit_eases_to_the_full_delta() {
        let mut camera = OrbitCamera::from_home(&home(), 75.0, 1.0);
        camera.damping = 0.1;
        let start = camera.yaw;
        camera.orbit(0.5, 0.0);
        camera.update_motion(1.0 / 60.0);
        assert_relative_eq!(camera.yaw, start + 0.05, epsilon = 1e-5);
        for _ in 0..600 {
            camera.update_motion(1.0 / 60.0);
        }
        assert_relative_eq!(camera.yaw, start + 0.5, epsilon = 1e-3);
        assert!(!camera.is_moving());
    }

    #[test]
    fn overhead_override_yields_a_finite_view() {
        let framed = home();
        let pose = HomePose::from_position(Vector3::new(0.0, 10.0, 0.0), &framed);
        let mut camera = OrbitCamera::from_home(&pose, 75.0, 4.0 / 3.0);
        camera.update_view_proj();
        assert!(camera
            .uniform
            .view_proj
            .iter()
            .flatten()
            .all(|v| v.is_finite()));
        assert_relative_eq!(camera.eye.y, pose.position.y, epsilon = 1e-5);
    }

    #[test]
    fn resize_only_touches_aspect() {
        let mut camera = OrbitCamera::from_home(&home(), 75.0, 4.0 / 3.0);
        let eye = camera.eye;
        camera.resize_projection(1920, 1080);
        assert_relative_eq!(camera.aspect, 16.0 / 9.0);
        assert_eq!(camera.eye, eye);
    }
}
