//! WGPU-based rendering engine for the model viewer
//!
//! Owns the surface, device and pipelines, mirrors the session's prepared
//! scene on the GPU and draws it once per frame with an optional UI overlay.

use std::sync::Arc;

use log::{info, warn};
use wgpu::{PrimitiveTopology, TextureFormat};

use super::{
    gpu_scene::GpuScene,
    pipeline_manager::{PipelineConfig, PipelineManager},
};
use crate::{
    error::{ViewerError, ViewerResult},
    gfx::resources::{
        global_content, GlobalBindings, GlobalUBO, LightConfig, MaterialBindings, TextureResource,
    },
    viewer::ViewerSession,
};

const SHADER_NAME: &str = "viewer.wgsl";
const SOLID_PIPELINE: &str = "Solid";
const WIREFRAME_PIPELINE: &str = "Wireframe";

/// Core rendering engine managing GPU resources and draw calls
pub struct RenderEngine {
    surface: wgpu::Surface<'static>,
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    config: wgpu::SurfaceConfiguration,
    depth_texture: TextureResource,
    format: TextureFormat,
    pipeline_manager: PipelineManager,
    global_ubo: GlobalUBO,
    global_bindings: GlobalBindings,
    material_bindings: MaterialBindings,
    white_texture: TextureResource,
    light_config: LightConfig,
    gpu_scene: Option<GpuScene>,
}

impl RenderEngine {
    /// Creates a new render engine for the given window
    ///
    /// Fails with [`ViewerError::SetupError`] when no adapter or device is
    /// available.
    pub async fn new(
        window: impl Into<wgpu::SurfaceTarget<'static>>,
        width: u32,
        height: u32,
    ) -> ViewerResult<RenderEngine> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let surface = instance
            .create_surface(window)
            .map_err(|e| ViewerError::SetupError(format!("cannot create surface: {}", e)))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| ViewerError::SetupError(format!("no graphics adapter: {}", e)))?;
        info!("Using adapter {}", adapter.get_info().name);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("WGPU Device"),
                required_features: wgpu::Features::default(),
                required_limits: wgpu::Limits {
                    max_texture_dimension_2d: 4096,
                    ..wgpu::Limits::downlevel_defaults()
                },
                memory_hints: wgpu::MemoryHints::default(),
                trace: wgpu::Trace::Off,
            })
            .await
            .map_err(|e| ViewerError::SetupError(format!("cannot open device: {}", e)))?;
        let device = Arc::new(device);
        let queue = Arc::new(queue);

        let surface_capabilities = surface.get_capabilities(&adapter);
        // Textures are sampled as sRGB, so present through an sRGB target too
        let format = surface_capabilities
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| surface_capabilities.formats.first().copied())
            .ok_or_else(|| ViewerError::SetupError("surface reports no formats".into()))?;
        let alpha_mode = surface_capabilities
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: width.max(1),
            height: height.max(1),
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let depth_texture =
            TextureResource::create_depth_texture(&device, &config, "depth_texture");

        let global_ubo = GlobalUBO::new(&device);
        let global_bindings = GlobalBindings::new(&device, &global_ubo);
        let material_bindings = MaterialBindings::new(&device);
        let white_texture = TextureResource::white(&device, &queue);

        let mut pipeline_manager = PipelineManager::new(device.clone());
        pipeline_manager.load_shader(SHADER_NAME, include_str!("shaders/viewer.wgsl"));

        let layouts = vec![
            global_bindings.bind_group_layout().clone(),
            material_bindings.bind_group_layout().clone(),
        ];
        let base = PipelineConfig::default_with_shader(SHADER_NAME)
            .with_bind_group_layouts(layouts)
            .with_depth_format(TextureResource::DEPTH_FORMAT)
            .with_blended_target(format)
            // Faces are lit from both sides, so nothing is culled
            .with_cull_mode(None);
        pipeline_manager.register_pipeline(
            SOLID_PIPELINE,
            base.clone().with_label("Solid Pipeline"),
        );
        pipeline_manager.register_pipeline(
            WIREFRAME_PIPELINE,
            base.with_label("Wireframe Pipeline")
                .with_primitive_topology(PrimitiveTopology::LineList),
        );
        pipeline_manager.create_all_pipelines()?;

        Ok(RenderEngine {
            surface,
            device,
            queue,
            config,
            depth_texture,
            format,
            pipeline_manager,
            global_ubo,
            global_bindings,
            material_bindings,
            white_texture,
            light_config: LightConfig::default(),
            gpu_scene: None,
        })
    }

    /// Brings the GPU scene in line with the session's scene epoch
    ///
    /// Resources of a replaced or released scene are freed before a new one is
    /// uploaded.
    pub fn sync_scene(&mut self, session: &ViewerSession) {
        let epoch = session.epoch();
        if self.gpu_scene.as_ref().is_some_and(|s| s.epoch() == epoch) {
            return;
        }
        if let Some(old) = self.gpu_scene.take() {
            old.destroy();
        }
        if let Some(scene) = session.scene() {
            self.gpu_scene = Some(GpuScene::upload(
                &self.device,
                &self.queue,
                scene,
                epoch,
                &self.material_bindings,
                &self.white_texture,
            ));
        }
    }

    /// Draws the session's current scene, then runs `ui_callback` on the same frame
    pub fn render_frame<F>(&mut self, session: &ViewerSession, ui_callback: Option<F>)
    where
        F: FnOnce(&wgpu::Device, &wgpu::Queue, &mut wgpu::CommandEncoder, &wgpu::TextureView),
    {
        self.sync_scene(session);
        self.global_ubo.update_content(
            &self.queue,
            global_content(&session.camera().uniform, &self.light_config),
        );

        let surface_texture = match self.surface.get_current_texture() {
            Ok(texture) => texture,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                warn!("Surface lost or outdated, reconfiguring");
                self.surface.configure(&self.device, &self.config);
                return;
            }
            Err(e) => {
                warn!("Skipping frame: {}", e);
                return;
            }
        };
        let surface_texture_view = surface_texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });

        {
            let [r, g, b] = session.config().background_color;
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Model Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &surface_texture_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: r as f64,
                            g: g as f64,
                            b: b as f64,
                            a: 1.0,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_texture.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                occlusion_query_set: None,
                timestamp_writes: None,
            });

            if let (Some(gpu_scene), Some(scene), Some(solid), Some(wireframe)) = (
                &self.gpu_scene,
                session.scene(),
                self.pipeline_manager.pipeline(SOLID_PIPELINE),
                self.pipeline_manager.pipeline(WIREFRAME_PIPELINE),
            ) {
                render_pass.set_bind_group(0, self.global_bindings.bind_group(), &[]);

                for mesh in &gpu_scene.meshes {
                    let as_lines = scene
                        .graph()
                        .materials
                        .get(mesh.material)
                        .is_some_and(|m| m.wireframe);
                    render_pass.set_bind_group(1, gpu_scene.material_bind_group(mesh), &[]);
                    render_pass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
                    if as_lines {
                        render_pass.set_pipeline(wireframe);
                        render_pass
                            .set_index_buffer(mesh.edge_buffer.slice(..), wgpu::IndexFormat::Uint32);
                        render_pass.draw_indexed(0..mesh.edge_count, 0, 0..1);
                    } else {
                        render_pass.set_pipeline(solid);
                        render_pass
                            .set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
                        render_pass.draw_indexed(0..mesh.index_count, 0, 0..1);
                    }
                }
            }
        }

        if let Some(ui_callback) = ui_callback {
            ui_callback(
                &self.device,
                &self.queue,
                &mut encoder,
                &surface_texture_view,
            );
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        surface_texture.present();
    }

    /// Resizes the surface and recreates the depth buffer; zero sizes are ignored
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }

        self.config.width = width;
        self.config.height = height;
        self.surface.configure(&self.device, &self.config);

        self.depth_texture.destroy();
        self.depth_texture =
            TextureResource::create_depth_texture(&self.device, &self.config, "depth_texture");
    }

    /// Frees the GPU copy of the scene without waiting for an epoch change
    pub fn release_scene(&mut self) {
        if let Some(scene) = self.gpu_scene.take() {
            scene.destroy();
        }
    }

    pub fn get_surface_size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.format
    }
}

impl Drop for RenderEngine {
    fn drop(&mut self) {
        self.release_scene();
    }
}
