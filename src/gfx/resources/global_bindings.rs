//! Global uniform bindings for camera and lighting
//!
//! Manages the uniform buffer and bind group shared by every draw of a
//! frame: the camera matrices and a single directional light.

use crate::{
    gfx::camera::camera_utils::CameraUniform,
    wgpu_utils::{
        binding_builder::{BindGroupBuilder, BindGroupLayoutBuilder, BindGroupLayoutWithDesc},
        binding_types,
        uniform_buffer::UniformBuffer,
    },
};

/// Global uniform buffer content
///
/// MUST match the `Globals` struct in the viewer shader exactly.
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GlobalUBOContent {
    view_position: [f32; 4],
    view_proj: [[f32; 4]; 4],
    /// Direction towards the light, world space
    light_direction: [f32; 3],
    ambient: f32,
    light_color: [f32; 3],
    _padding: f32,
}

/// Directional light attached to the camera
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct LightConfig {
    /// Lift of the light above the eye, as a fraction of the eye distance
    pub elevation: f32,
    pub color: [f32; 3],
    /// Constant term so faces turned away from the light stay visible
    pub ambient: f32,
}

impl Default for LightConfig {
    fn default() -> Self {
        Self {
            elevation: 0.5,
            color: [1.0, 1.0, 1.0],
            ambient: 0.35,
        }
    }
}

/// Type alias for the global uniform buffer
pub type GlobalUBO = UniformBuffer<GlobalUBOContent>;

/// Builds the uniform content for one frame
pub fn global_content(camera: &CameraUniform, light: &LightConfig) -> GlobalUBOContent {
    let [x, y, z, _] = camera.view_position;
    // Light from slightly above the eye so silhouettes read clearly
    let towards = [x, y + light.elevation * (x * x + y * y + z * z).sqrt(), z];
    let length = (towards[0] * towards[0] + towards[1] * towards[1] + towards[2] * towards[2]).sqrt();
    let light_direction = if length > f32::EPSILON {
        [towards[0] / length, towards[1] / length, towards[2] / length]
    } else {
        [0.0, 1.0, 0.0]
    };

    GlobalUBOContent {
        view_position: camera.view_position,
        view_proj: camera.view_proj,
        light_direction,
        ambient: light.ambient,
        light_color: light.color,
        _padding: 0.0,
    }
}

/// Manages the bind group layout and bind group for global uniforms
///
/// Bound to slot 0 in all render pipelines.
pub struct GlobalBindings {
    bind_group_layout: BindGroupLayoutWithDesc,
    bind_group: wgpu::BindGroup,
}

impl GlobalBindings {
    pub fn new(device: &wgpu::Device, ubo: &GlobalUBO) -> Self {
        let bind_group_layout = BindGroupLayoutBuilder::new()
            .next_binding_rendering(binding_types::uniform())
            .create(device, "Globals Bind Group");
        let bind_group = BindGroupBuilder::new(&bind_group_layout)
            .resource(ubo.binding_resource())
            .create(device, "Global Bind Group");

        GlobalBindings {
            bind_group_layout,
            bind_group,
        }
    }

    pub fn bind_group_layout(&self) -> &wgpu::BindGroupLayout {
        &self.bind_group_layout.layout
    }

    pub fn bind_group(&self) -> &wgpu::BindGroup {
        &self.bind_group
    }
}
