//! Texture resource management for wgpu
//!
//! Provides utilities for creating GPU textures, views, and samplers for the
//! depth buffer and for decoded model textures.

use log::warn;

use crate::scene::Texture;

/// GPU texture resource containing texture, view, and sampler
///
/// Bundles the three main components needed for texture operations:
/// - Texture: The actual GPU memory allocation
/// - View: Interface for shader access
/// - Sampler: Filtering and addressing configuration
pub struct TextureResource {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub sampler: wgpu::Sampler,
}

impl TextureResource {
    /// Standard depth buffer format used throughout the viewer
    pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

    /// Creates a depth texture matching the surface configuration
    pub fn create_depth_texture(
        device: &wgpu::Device,
        config: &wgpu::SurfaceConfiguration,
        label: &str,
    ) -> Self {
        let size = wgpu::Extent3d {
            width: config.width.max(1),
            height: config.height.max(1),
            depth_or_array_layers: 1,
        };

        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[Self::DEPTH_FORMAT],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            compare: Some(wgpu::CompareFunction::LessEqual),
            lod_min_clamp: 0.0,
            lod_max_clamp: 100.0,
            ..Default::default()
        });

        Self {
            texture,
            view,
            sampler,
        }
    }

    /// Creates a 2D sRGB texture from raw RGBA8 data
    ///
    /// Model textures repeat, so the sampler wraps in both directions.
    pub fn create_from_rgba_data(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        data: &[u8],
        width: u32,
        height: u32,
        label: &str,
    ) -> Self {
        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };

        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * width),
                rows_per_image: Some(height),
            },
            size,
        );

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some(&format!("{} Sampler", label)),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        Self {
            texture,
            view,
            sampler,
        }
    }

    /// 1x1 white texture bound for materials without an albedo map
    pub fn white(device: &wgpu::Device, queue: &wgpu::Queue) -> Self {
        Self::create_from_rgba_data(device, queue, &[255, 255, 255, 255], 1, 1, "White Texture")
    }

    /// Uploads a decoded model texture, `None` when it never resolved
    ///
    /// Images larger than the device limit are downscaled to fit.
    pub fn from_model_texture(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        texture: &Texture,
    ) -> Option<Self> {
        if !texture.loaded {
            return None;
        }
        let image = image::RgbaImage::from_raw(texture.width, texture.height, texture.pixels.clone())?;
        let limit = device.limits().max_texture_dimension_2d;
        let image = if image.width() > limit || image.height() > limit {
            let scale = limit as f32 / image.width().max(image.height()) as f32;
            let width = ((image.width() as f32 * scale) as u32).clamp(1, limit);
            let height = ((image.height() as f32 * scale) as u32).clamp(1, limit);
            warn!(
                "Downscaling texture {} from {}x{} to {}x{}",
                texture.source,
                image.width(),
                image.height(),
                width,
                height
            );
            image::imageops::resize(&image, width, height, image::imageops::FilterType::Triangle)
        } else {
            image
        };
        Some(Self::create_from_rgba_data(
            device,
            queue,
            image.as_raw(),
            image.width(),
            image.height(),
            &texture.source,
        ))
    }

    pub fn destroy(&self) {
        self.texture.destroy();
    }
}
