//! ImGui UI manager for the viewer
//!
//! Handles ImGui integration with wgpu and winit: frame timing, input
//! capture and drawing the overlay on top of the model pass.

use std::time::Instant;

use imgui::{Context, FontConfig, FontSource, MouseCursor};
use imgui_wgpu::{Renderer, RendererConfig};
use imgui_winit_support::{HiDpiMode, WinitPlatform};
use log::{error, warn};
use wgpu::{CommandEncoder, Device, Queue, TextureFormat, TextureView};
use winit::{
    event::{Event, WindowEvent},
    window::{Window, WindowId},
};

/// ImGui UI manager
///
/// Manages ImGui context, platform integration, and rendering pipeline.
pub struct UiManager {
    context: Context,
    platform: WinitPlatform,
    renderer: Renderer,
    last_frame: Instant,
    last_cursor: Option<MouseCursor>,
}

impl UiManager {
    /// Sets up ImGui with locked DPI so scaling stays under our control
    pub fn new(
        device: &Device,
        queue: &Queue,
        output_color_format: TextureFormat,
        window: &Window,
    ) -> Self {
        let mut context = Context::create();
        context.set_ini_filename(None);

        let mut platform = WinitPlatform::new(&mut context);
        platform.attach_window(context.io_mut(), window, HiDpiMode::Locked(1.0));

        let font_size = 18.0;
        context.fonts().add_font(&[FontSource::DefaultFontData {
            config: Some(FontConfig {
                oversample_h: 1,
                pixel_snap_h: true,
                size_pixels: font_size,
                ..Default::default()
            }),
        }]);

        let renderer_config = RendererConfig {
            texture_format: output_color_format,
            ..Default::default()
        };
        let renderer = Renderer::new(&mut context, device, queue, renderer_config);

        Self {
            context,
            platform,
            renderer,
            last_frame: Instant::now(),
            last_cursor: None,
        }
    }

    pub fn update_display_size(&mut self, width: u32, height: u32) {
        self.context.io_mut().display_size = [width as f32, height as f32];
    }

    /// Feeds a window event to ImGui, returning whether the UI captured it
    pub fn handle_window_event(
        &mut self,
        window: &Window,
        window_id: WindowId,
        event: &WindowEvent,
    ) -> bool {
        match event {
            WindowEvent::CursorMoved { .. }
            | WindowEvent::MouseInput { .. }
            | WindowEvent::MouseWheel { .. }
            | WindowEvent::KeyboardInput { .. }
            | WindowEvent::Focused(_) => {
                let wrapped: Event<()> = Event::WindowEvent {
                    window_id,
                    event: event.clone(),
                };
                self.platform
                    .handle_event(self.context.io_mut(), window, &wrapped);
                self.wants_input()
            }
            _ => false,
        }
    }

    /// Whether the last frame's UI wants mouse or keyboard input
    pub fn wants_input(&self) -> bool {
        let io = self.context.io();
        io.want_capture_mouse || io.want_capture_keyboard
    }

    /// Builds this frame's UI; call once per frame before rendering
    pub fn update_logic<F>(&mut self, window: &Window, run_ui: F) -> bool
    where
        F: FnOnce(&imgui::Ui),
    {
        let now = Instant::now();
        self.context
            .io_mut()
            .update_delta_time(now - self.last_frame);
        self.last_frame = now;

        if let Err(e) = self.platform.prepare_frame(self.context.io_mut(), window) {
            warn!("Failed to prepare UI frame: {}", e);
        }

        let ui = self.context.frame();
        run_ui(ui);

        if self.last_cursor != ui.mouse_cursor() {
            self.last_cursor = ui.mouse_cursor();
            self.platform.prepare_render(ui, window);
        }

        self.wants_input()
    }

    /// Draws the UI built by the last [`Self::update_logic`] over `color_attachment`
    pub fn render_display_only(
        &mut self,
        device: &Device,
        queue: &Queue,
        encoder: &mut CommandEncoder,
        color_attachment: &TextureView,
    ) {
        let draw_data = self.context.render();

        if draw_data.display_size[0] <= 0.0 || draw_data.display_size[1] <= 0.0 {
            return;
        }

        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("imgui_render_pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: color_attachment,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load, // Preserve the model pass
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        if let Err(e) = self
            .renderer
            .render(draw_data, queue, device, &mut render_pass)
        {
            error!("Failed to render UI: {}", e);
        }
    }
}
