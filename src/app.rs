//! Desktop host for a [`ViewerSession`]
//!
//! Creates the window and render engine on resume, forwards pointer and
//! keyboard input to the session and drives the update/render loop.

use std::{sync::Arc, time::Instant};

use anyhow::{anyhow, Context};
use log::{error, info};
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::{DeviceEvent, DeviceId, ElementState, KeyEvent, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowAttributes, WindowId},
};

use crate::{
    config::ViewerConfig,
    gfx::{camera::PointerInput, RenderEngine},
    loader::LoadRequest,
    ui::{viewer_overlay, PanelAction, UiManager},
    viewer::ViewerSession,
};

const WINDOW_TITLE: &str = "Haggis Viewer";

pub struct ViewerApp {
    event_loop: Option<EventLoop<()>>,
    app_state: AppState,
}

struct AppState {
    window: Option<Arc<Window>>,
    render_engine: Option<RenderEngine>,
    ui_manager: Option<UiManager>,
    session: ViewerSession,
    pending_load: Option<LoadRequest>,
    setup_error: Option<anyhow::Error>,
}

impl ViewerApp {
    /// Prepares a viewer that loads `request` once its window exists
    pub fn new(config: ViewerConfig, request: LoadRequest) -> anyhow::Result<Self> {
        let event_loop = EventLoop::new().context("failed to create event loop")?;
        Ok(Self {
            event_loop: Some(event_loop),
            app_state: AppState {
                window: None,
                render_engine: None,
                ui_manager: None,
                session: ViewerSession::new(config),
                pending_load: Some(request),
                setup_error: None,
            },
        })
    }

    /// Runs the event loop until the window closes
    pub fn run(mut self) -> anyhow::Result<()> {
        let event_loop = self
            .event_loop
            .take()
            .ok_or_else(|| anyhow!("event loop already consumed"))?;
        event_loop.set_control_flow(ControlFlow::Poll);

        event_loop
            .run_app(&mut self.app_state)
            .context("event loop failed")?;

        match self.app_state.setup_error.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl AppState {
    fn apply_key(&mut self, event_loop: &ActiveEventLoop, key_code: KeyCode) {
        if key_code == KeyCode::Escape {
            event_loop.exit();
            return;
        }
        if let Some(action) = PanelAction::from_key(key_code) {
            action.apply(&mut self.session);
        }
    }

    fn redraw(&mut self) {
        let (Some(window), Some(render_engine)) = (self.window.as_ref(), self.render_engine.as_mut())
        else {
            return;
        };

        self.session.update(Instant::now());

        let mut actions = Vec::new();
        if let Some(ui_manager) = self.ui_manager.as_mut() {
            let session = &self.session;
            ui_manager.update_logic(window, |ui| viewer_overlay(ui, session, &mut actions));
        }
        for action in actions {
            action.apply(&mut self.session);
        }

        match self.ui_manager.as_mut() {
            Some(ui_manager) => render_engine.render_frame(
                &self.session,
                Some(|device: &wgpu::Device,
                      queue: &wgpu::Queue,
                      encoder: &mut wgpu::CommandEncoder,
                      view: &wgpu::TextureView| {
                    ui_manager.render_display_only(device, queue, encoder, view);
                }),
            ),
            None => render_engine.render_frame(
                &self.session,
                None::<fn(&wgpu::Device, &wgpu::Queue, &mut wgpu::CommandEncoder, &wgpu::TextureView)>,
            ),
        }
    }
}

impl ApplicationHandler for AppState {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let config = self.session.config();
        let attributes = WindowAttributes::default()
            .with_title(WINDOW_TITLE)
            .with_inner_size(winit::dpi::LogicalSize::new(config.width, config.height));
        let window = match event_loop.create_window(attributes) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                error!("Failed to create window: {}", e);
                self.setup_error = Some(anyhow!(e).context("failed to create window"));
                event_loop.exit();
                return;
            }
        };

        let (width, height) = window.inner_size().into();
        let renderer = match pollster::block_on(RenderEngine::new(window.clone(), width, height)) {
            Ok(renderer) => renderer,
            Err(e) => {
                error!("{}", e);
                self.setup_error = Some(anyhow!(e));
                event_loop.exit();
                return;
            }
        };

        let mut ui_manager = UiManager::new(
            renderer.device(),
            renderer.queue(),
            renderer.surface_format(),
            &window,
        );
        ui_manager.update_display_size(width, height);

        let title_window = window.clone();
        self.session.set_listener(move |_, text| {
            title_window.set_title(&format!("{} - {}", WINDOW_TITLE, text));
        });
        self.session.resize(width, height);
        if let Some(request) = self.pending_load.take() {
            info!("Loading {}", request.source.key());
            self.session.load(request);
        }

        self.ui_manager = Some(ui_manager);
        self.render_engine = Some(renderer);
        self.window = Some(window);
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, window_id: WindowId, event: WindowEvent) {
        let Some(window) = self.window.clone() else {
            return;
        };

        if let Some(ui_manager) = self.ui_manager.as_mut() {
            if ui_manager.handle_window_event(&window, window_id, &event) {
                return;
            }
        }

        match event {
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(key_code),
                        state: ElementState::Pressed,
                        repeat: false,
                        ..
                    },
                ..
            } => self.apply_key(event_loop, key_code),
            WindowEvent::Focused(false) => {
                self.session.handle_pointer(PointerInput::DragEnd);
            }
            WindowEvent::Resized(PhysicalSize { width, height }) => {
                if width == 0 || height == 0 {
                    return;
                }
                self.session.resize(width, height);
                if let Some(render_engine) = self.render_engine.as_mut() {
                    render_engine.resize(width, height);
                }
                if let Some(ui_manager) = self.ui_manager.as_mut() {
                    ui_manager.update_display_size(width, height);
                }
            }
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::RedrawRequested => self.redraw(),
            _ => (),
        }
    }

    fn device_event(&mut self, _event_loop: &ActiveEventLoop, _device_id: DeviceId, event: DeviceEvent) {
        // Leave the pointer to the UI while it is hovered or focused
        if self.ui_manager.as_ref().is_some_and(|ui| ui.wants_input()) {
            return;
        }
        if let Some(input) = PointerInput::from_device_event(&event, self.session.is_dragging()) {
            self.session.handle_pointer(input);
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.session.dispose();
        if let Some(render_engine) = self.render_engine.as_mut() {
            render_engine.release_scene();
        }
    }
}
