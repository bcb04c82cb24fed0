//! GPU side of scene materials
//!
//! Each scene material becomes one uniform buffer plus a bind group holding
//! that buffer, the albedo texture and its sampler. Materials without an
//! albedo map bind a shared white texture.

use wgpu::Device;

use super::texture_resource::TextureResource;
use crate::{
    scene::Material,
    wgpu_utils::{
        binding_builder::{BindGroupBuilder, BindGroupLayoutBuilder, BindGroupLayoutWithDesc},
        binding_types,
        uniform_buffer::UniformBuffer,
    },
};

/// Tint used when a material carries no base color at all
const UNSET_TINT: [f32; 3] = [0.8, 0.8, 0.8];

/// GPU uniform data for materials
///
/// MUST match the `MaterialParams` struct in the viewer shader exactly.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MaterialUniform {
    pub base_color: [f32; 4],
    pub emissive: [f32; 3],
    /// 1.0 when the albedo texture should be sampled
    pub has_albedo: f32,
    pub metallic: f32,
    pub roughness: f32,
    _padding: [f32; 2],
}

impl MaterialUniform {
    pub fn from_material(material: &Material, has_albedo: bool) -> Self {
        let [r, g, b] = material.base_color.unwrap_or(UNSET_TINT);
        Self {
            base_color: [r, g, b, material.opacity],
            emissive: material.emissive,
            has_albedo: if has_albedo { 1.0 } else { 0.0 },
            metallic: material.metallic,
            roughness: material.roughness,
            _padding: [0.0; 2],
        }
    }
}

type MaterialUBO = UniformBuffer<MaterialUniform>;

/// Layout shared by every material bind group
pub struct MaterialBindings {
    bind_group_layout: BindGroupLayoutWithDesc,
}

impl MaterialBindings {
    pub fn new(device: &Device) -> Self {
        let bind_group_layout = BindGroupLayoutBuilder::new()
            .next_binding_fragment(binding_types::uniform())
            .next_binding_fragment(binding_types::texture_2d())
            .next_binding_fragment(binding_types::sampler(wgpu::SamplerBindingType::Filtering))
            .create(device, "Material Bind Group Layout");

        MaterialBindings { bind_group_layout }
    }

    pub fn bind_group_layout(&self) -> &wgpu::BindGroupLayout {
        &self.bind_group_layout.layout
    }
}

/// Uploaded material: its uniform buffer and bind group
pub struct GpuMaterial {
    ubo: MaterialUBO,
    bind_group: wgpu::BindGroup,
}

impl GpuMaterial {
    /// `albedo` is the uploaded albedo map, or `None` to bind `fallback`
    pub fn new(
        device: &Device,
        bindings: &MaterialBindings,
        material: &Material,
        albedo: Option<&TextureResource>,
        fallback: &TextureResource,
    ) -> Self {
        let uniform = MaterialUniform::from_material(material, albedo.is_some());
        let ubo = MaterialUBO::new_with_data(device, &uniform);
        let texture = albedo.unwrap_or(fallback);
        let bind_group = BindGroupBuilder::new(&bindings.bind_group_layout)
            .resource(ubo.binding_resource())
            .texture(&texture.view)
            .sampler(&texture.sampler)
            .create(device, &format!("Material: {}", material.name));

        Self { ubo, bind_group }
    }

    pub fn bind_group(&self) -> &wgpu::BindGroup {
        &self.bind_group
    }

    pub fn destroy(&self) {
        self.ubo.destroy();
    }
}
