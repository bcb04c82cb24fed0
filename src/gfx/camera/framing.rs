//! Adaptive home pose
//!
//! Derives where the camera starts, and where reset returns it, from the
//! normalized model's bounds, the viewport and a complexity signal. The
//! calculation is pure: identical inputs always produce an identical pose.

use cgmath::{InnerSpace, Vector3};

use crate::scene::{BoundingSphere, BoundingVolume};

/// Mesh count at which the complexity signal saturates
pub const COMPLEXITY_CAP: usize = 50;
pub const MIN_ELEVATION_DEGREES: f32 = 12.0;
pub const MAX_ELEVATION_DEGREES: f32 = 40.0;
/// Largest elevation a camera may take, short of the poles where the view
/// direction meets the up vector
pub const PITCH_LIMIT: f32 = std::f32::consts::FRAC_PI_2 - 0.01;
const MIN_ELONGATION: f32 = 1.0;
const MAX_ELONGATION: f32 = 4.0;

/// Size class of a model, thresholded on its largest dimension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeCategory {
    Small,
    Medium,
    Large,
}

impl SizeCategory {
    pub fn from_max_dimension(max_dim: f32) -> Self {
        if max_dim < 2.0 {
            Self::Small
        } else if max_dim > 10.0 {
            Self::Large
        } else {
            Self::Medium
        }
    }

    /// Padding around the bounding sphere, more for small models
    fn radius_multiplier(self) -> f32 {
        match self {
            Self::Small => 1.5,
            Self::Medium => 1.25,
            Self::Large => 1.1,
        }
    }

    fn distance_factor(self) -> f32 {
        match self {
            Self::Small => 1.15,
            Self::Medium => 1.0,
            Self::Large => 0.9,
        }
    }
}

/// Everything the home pose depends on
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FramingInput {
    pub sphere: BoundingSphere,
    /// Width, height, depth of the bounding box
    pub dimensions: [f32; 3],
    /// Viewport width over height
    pub aspect: f32,
    /// Vertical field of view in degrees
    pub fov_degrees: f32,
    pub mesh_count: usize,
}

impl FramingInput {
    pub fn new(bounds: &BoundingVolume, aspect: f32, fov_degrees: f32, mesh_count: usize) -> Self {
        Self {
            sphere: bounds.sphere,
            dimensions: bounds.dimensions(),
            aspect,
            fov_degrees,
            mesh_count,
        }
    }

    pub fn max_dimension(&self) -> f32 {
        self.dimensions.iter().copied().fold(0.0, f32::max)
    }

    /// Mesh count mapped to `[0, 1]`
    pub fn complexity(&self) -> f32 {
        self.mesh_count.min(COMPLEXITY_CAP) as f32 / COMPLEXITY_CAP as f32
    }
}

/// Stored camera pose that reset returns to
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HomePose {
    pub position: Vector3<f32>,
    pub target: Vector3<f32>,
    pub distance: f32,
    /// Azimuth around the vertical axis, radians
    pub yaw: f32,
    /// Elevation above the horizontal plane, radians
    pub pitch: f32,
    pub min_distance: f32,
    pub max_distance: f32,
    pub znear: f32,
    pub zfar: f32,
    /// Viewport aspect the pose was computed for
    pub aspect: f32,
}

impl HomePose {
    /// Pose at a fixed position looking at `framed`'s target, keeping its zoom bounds.
    /// Positions straight above or below the target are tilted off the pole.
    pub fn from_position(position: Vector3<f32>, framed: &HomePose) -> Self {
        let offset = position - framed.target;
        let distance = offset.magnitude();
        if !distance.is_finite() || distance <= f32::EPSILON {
            return *framed;
        }
        let pitch = (offset.y / distance)
            .clamp(-1.0, 1.0)
            .asin()
            .clamp(-PITCH_LIMIT, PITCH_LIMIT);
        let yaw = offset.x.atan2(offset.z);
        Self {
            position: orbit_position(framed.target, distance, yaw, pitch),
            distance,
            yaw,
            pitch,
            min_distance: framed.min_distance.min(distance),
            max_distance: framed.max_distance.max(distance),
            zfar: framed.zfar.max(distance * 2.0),
            ..*framed
        }
    }
}

/// Spherical to Cartesian around `target`, y up
pub fn orbit_position(target: Vector3<f32>, distance: f32, yaw: f32, pitch: f32) -> Vector3<f32> {
    Vector3::new(
        distance * yaw.sin() * pitch.cos(),
        distance * pitch.sin(),
        distance * yaw.cos() * pitch.cos(),
    ) + target
}

/// Computes the home pose for `input`
pub fn frame_model(input: &FramingInput) -> HomePose {
    let [width, height, depth] = input.dimensions;
    let category = SizeCategory::from_max_dimension(input.max_dimension());
    let complexity = input.complexity();
    let aspect = if input.aspect.is_finite() && input.aspect > 0.0 {
        input.aspect
    } else {
        1.0
    };

    let reference_radius =
        input.sphere.radius * category.radius_multiplier() * (1.0 + 0.1 * complexity);

    // Fit vertically, or horizontally when the viewport is portrait
    let half_fov = (input.fov_degrees.to_radians() * 0.5).max(1e-3);
    let vertical_fit = reference_radius / half_fov.tan();
    let base_distance = if aspect < 1.0 {
        vertical_fit / aspect
    } else {
        vertical_fit
    };

    let horizontal = width.max(depth);
    let elongation = if horizontal > 0.0 && height > 0.0 {
        (horizontal / height).max(height / horizontal)
    } else {
        MAX_ELONGATION
    }
    .clamp(MIN_ELONGATION, MAX_ELONGATION);
    let multiplier =
        category.distance_factor() * (1.0 - 0.1 * complexity) * (1.0 + 0.1 * (elongation - 1.0));

    let min_distance = 0.5 * reference_radius;
    let max_distance = 10.0 * reference_radius * (1.0 + 0.5 * complexity);
    let distance = (base_distance * multiplier).clamp(min_distance, max_distance);

    let tallness = if horizontal > 0.0 {
        height / horizontal
    } else {
        MAX_ELONGATION
    };
    let elevation = (20.0 + 10.0 * (tallness - 1.0))
        .clamp(MIN_ELEVATION_DEGREES, MAX_ELEVATION_DEGREES)
        .to_radians();

    let azimuth_degrees: f32 = if width > 1.2 * depth {
        30.0
    } else if depth > 1.2 * width {
        55.0
    } else {
        45.0
    };
    let azimuth = azimuth_degrees.to_radians();

    let target = input.sphere.center;
    HomePose {
        position: orbit_position(target, distance, azimuth, elevation),
        target,
        distance,
        yaw: azimuth,
        pitch: elevation,
        min_distance,
        max_distance,
        znear: (reference_radius * 0.01).max(0.01),
        zfar: (max_distance + reference_radius) * 2.0,
        aspect,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::Aabb;
    use approx::assert_relative_eq;

    fn cube_input(size: f32, aspect: f32, mesh_count: usize) -> FramingInput {
        let h = size * 0.5;
        let bounds = BoundingVolume::from_aabb(Aabb::new(
            Vector3::new(-h, -h, -h),
            Vector3::new(h, h, h),
        ));
        FramingInput::new(&bounds, aspect, 75.0, mesh_count)
    }

    #[test]
    fn framing_is_deterministic() {
        let input = cube_input(5.0, 4.0 / 3.0, 10);
        let a = frame_model(&input);
        let b = frame_model(&input);
        assert_eq!(a, b);
    }

    #[test]
    fn canonical_cube_pose_matches_formula() {
        let input = cube_input(5.0, 4.0 / 3.0, 10);
        let pose = frame_model(&input);

        let radius = 5.0 * 3f32.sqrt() * 0.5;
        let reference = radius * 1.25 * 1.02;
        let expected = reference / 37.5f32.to_radians().tan() * 0.98;
        assert_relative_eq!(pose.distance, expected, epsilon = 1e-4);
        assert_relative_eq!(pose.pitch, 20f32.to_radians(), epsilon = 1e-6);
        assert_relative_eq!(pose.yaw, 45f32.to_radians(), epsilon = 1e-6);
        assert_relative_eq!(pose.min_distance, 0.5 * reference, epsilon = 1e-4);
        assert_relative_eq!(pose.max_distance, 10.0 * reference * 1.1, epsilon = 1e-3);
        assert_relative_eq!((pose.position - pose.target).magnitude(), pose.distance, epsilon = 1e-4);
    }

    #[test]
    fn portrait_viewport_backs_off() {
        let landscape = frame_model(&cube_input(5.0, 16.0 / 9.0, 1));
        let portrait = frame_model(&cube_input(5.0, 9.0 / 16.0, 1));
        assert!(portrait.distance > landscape.distance);
        assert_relative_eq!(portrait.distance, landscape.distance * 16.0 / 9.0, epsilon = 1e-3);
    }

    #[test]
    fn size_categories_threshold_on_max_dimension() {
        assert_eq!(SizeCategory::from_max_dimension(1.0), SizeCategory::Small);
        assert_eq!(SizeCategory::from_max_dimension(5.0), SizeCategory::Medium);
        assert_eq!(SizeCategory::from_max_dimension(12.0), SizeCategory::Large);
    }

    #[test]
    fn tall_models_are_viewed_from_higher() {
        let tall = BoundingVolume::from_aabb(Aabb::new(
            Vector3::new(-0.5, -2.5, -0.5),
            Vector3::new(0.5, 2.5, 0.5),
        ));
        let flat = BoundingVolume::from_aabb(Aabb::new(
            Vector3::new(-2.5, -0.1, -2.5),
            Vector3::new(2.5, 0.1, 2.5),
        ));
        let tall_pose = frame_model(&FramingInput::new(&tall, 1.0, 75.0, 1));
        let flat_pose = frame_model(&FramingInput::new(&flat, 1.0, 75.0, 1));
        assert_relative_eq!(tall_pose.pitch, MAX_ELEVATION_DEGREES.to_radians());
        assert_relative_eq!(flat_pose.pitch, MIN_ELEVATION_DEGREES.to_radians());
    }

    #[test]
    fn wide_and_deep_models_prefer_different_azimuths() {
        let wide = BoundingVolume::from_aabb(Aabb::new(
            Vector3::new(-2.5, -1.0, -0.5),
            Vector3::new(2.5, 1.0, 0.5),
        ));
        let deep = BoundingVolume::from_aabb(Aabb::new(
            Vector3::new(-0.5, -1.0, -2.5),
            Vector3::new(0.5, 1.0, 2.5),
        ));
        assert_relative_eq!(
            frame_model(&FramingInput::new(&wide, 1.0, 75.0, 1)).yaw,
            30f32.to_radians()
        );
        assert_relative_eq!(
            frame_model(&FramingInput::new(&deep, 1.0, 75.0, 1)).yaw,
            55f32.to_radians()
        );
    }

    #[test]
    fn complexity_saturates() {
        assert_eq!(cube_input(5.0, 1.0, 500).complexity(), 1.0);
        assert_eq!(cube_input(5.0, 1.0, 25).complexity(), 0.5);
    }

    #[test]
    fn position_override_looks_at_center() {
        let framed = frame_model(&cube_input(5.0, 1.5, 1));
        let pose = HomePose::from_position(Vector3::new(0.0, 0.0, 50.0), &framed);
        assert_relative_eq!(pose.distance, 50.0);
        assert_relative_eq!(pose.yaw, 0.0);
        assert_relative_eq!(pose.pitch, 0.0);
        assert!(pose.max_distance >= 50.0);
        assert_eq!(pose.target, framed.target);
    }

    #[test]
    fn position_override_on_the_vertical_axis_leaves_the_pole() {
        let framed = frame_model(&cube_input(5.0, 1.5, 1));
        let pose = HomePose::from_position(Vector3::new(0.0, 10.0, 0.0), &framed);
        assert_relative_eq!(pose.pitch, PITCH_LIMIT);
        assert_relative_eq!(pose.distance, 10.0);
        assert_relative_eq!((pose.position - pose.target).magnitude(), 10.0, epsilon = 1e-4);
        assert!((pose.position - pose.target).z > 0.0);

        let below = HomePose::from_position(Vector3::new(0.0, -10.0, 0.0), &framed);
        assert_relative_eq!(below.pitch, -PITCH_LIMIT);
    }
}
