use std::{sync::Arc, time::Instant};

use cgmath::Vector3;
use log::{debug, error, info, warn};
use rand::{rngs::StdRng, SeedableRng};

use super::{
    cache::{AssetCache, AssetKey},
    readout::CoordinateReadout,
    state::SessionStatus,
    task::{LoadTask, TaskPoll},
};
use crate::{
    config::{DragPolicy, ViewerConfig, CANONICAL_SIZE},
    error::ViewerError,
    gfx::camera::{
        frame_model, CameraController, FramingInput, HomePose, OrbitCamera, PointerInput,
    },
    loader::{Fetcher, LoadRequest, StdFetcher},
    materials::{MaterialEngine, PreparedScene},
    scene::{normalize, ModelSummary, NormalizeOptions, SceneGraph},
};

/// Receives every status change together with its display text
pub type StatusListener = Box<dyn FnMut(&SessionStatus, &str)>;

/// Aspect difference below which a stored home pose is still current
const ASPECT_EPSILON: f32 = 1e-4;

/// One viewer instance: the loaded scene, its camera and its controls
///
/// The session is driven from the render loop. [`update`](Self::update)
/// polls the background load, then advances damping, auto-rotate and the
/// coordinate readout; everything else is an immediate state change.
pub struct ViewerSession {
    config: ViewerConfig,
    fetcher: Arc<dyn Fetcher>,
    status: SessionStatus,
    listener: Option<StatusListener>,
    generation: u64,
    task: Option<LoadTask>,
    cache: AssetCache,
    scene: Option<PreparedScene>,
    summary: Option<ModelSummary>,
    epoch: u64,
    camera: OrbitCamera,
    controller: CameraController,
    home: Option<HomePose>,
    aspect: f32,
    auto_rotate: bool,
    wireframe: bool,
    readout: CoordinateReadout,
    last_update: Option<Instant>,
    rng: StdRng,
    disposed: bool,
}

impl ViewerSession {
    pub fn new(config: ViewerConfig) -> Self {
        Self::with_fetcher(config, Arc::new(StdFetcher::new()))
    }

    pub fn with_fetcher(config: ViewerConfig, fetcher: Arc<dyn Fetcher>) -> Self {
        let aspect = config.aspect();
        let mut camera = OrbitCamera::new(
            CANONICAL_SIZE * 2.0,
            0.3,
            0.7,
            Vector3::new(0.0, 0.0, 0.0),
            aspect,
        );
        camera.fovy = cgmath::Deg(config.fov_degrees).into();
        camera.damping = config.damping;
        camera.update_view_proj();

        Self {
            auto_rotate: config.auto_rotate,
            readout: CoordinateReadout::new(config.show_coordinates),
            config,
            fetcher,
            status: SessionStatus::Idle,
            listener: None,
            generation: 0,
            task: None,
            cache: AssetCache::new(),
            scene: None,
            summary: None,
            epoch: 0,
            camera,
            controller: CameraController::default(),
            home: None,
            aspect,
            wireframe: false,
            last_update: None,
            rng: StdRng::from_os_rng(),
            disposed: false,
        }
    }

    /// Seeds the generator behind synthesized material hues
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn set_listener(&mut self, listener: impl FnMut(&SessionStatus, &str) + 'static) {
        self.listener = Some(Box::new(listener));
    }

    /// Starts loading `request`, abandoning any load still in flight
    pub fn load(&mut self, request: LoadRequest) {
        if self.disposed {
            warn!("Ignoring load of {} on a disposed session", request.source);
            return;
        }
        // Dropping the task cancels it and discards any late result
        self.task = None;
        self.generation += 1;
        self.controller.cancel_drag();
        self.set_status(SessionStatus::Initializing);

        let format = match request.format() {
            Ok(format) => format,
            Err(err) => {
                self.fail(err);
                return;
            }
        };

        let key = AssetKey::new(request.source.key(), format);
        let task = match self.cache.get(&key) {
            Some(graph) => Ok(LoadTask::ready(self.generation, key.source, graph)),
            None => LoadTask::spawn(self.generation, request, Arc::clone(&self.fetcher)),
        };
        match task {
            Ok(task) => {
                debug!("Load {} started for {}", self.generation, task.key());
                self.task = Some(task);
            }
            Err(err) => self.fail(err),
        }
    }

    /// Advances the session to `now`; call once per frame before drawing
    pub fn update(&mut self, now: Instant) {
        let dt = self
            .last_update
            .map(|last| now.saturating_duration_since(last).as_secs_f32())
            .unwrap_or(0.0);
        self.last_update = Some(now);

        self.poll_task();

        if self.status.is_ready() {
            self.camera.update_motion(dt);
            let suspended = self.config.drag_policy == DragPolicy::SuspendWhileDragging
                && self.controller.is_dragging();
            if self.auto_rotate && !suspended {
                self.camera.add_yaw(self.config.auto_rotate_speed * dt);
            }
            self.readout.sample(now, self.camera.eye);
        }
        self.camera.update_view_proj();
    }

    fn poll_task(&mut self) {
        let Some(task) = self.task.as_mut() else {
            return;
        };
        match task.poll() {
            TaskPoll::Pending => {
                let progress = task.percent().unwrap_or(0);
                self.set_status(SessionStatus::Loading { progress });
            }
            TaskPoll::Done(result) => {
                let key = task.key().to_string();
                let generation = task.generation();
                self.task = None;
                if generation != self.generation {
                    debug!("Discarding stale result of load {}", generation);
                    return;
                }
                match result {
                    Ok(graph) => {
                        self.set_status(SessionStatus::Loading { progress: 100 });
                        self.cache.insert(AssetKey::new(key, graph.format), graph.clone());
                        self.process(graph);
                    }
                    Err(err) => self.fail(err),
                }
            }
        }
    }

    /// Normalizes, enhances, attaches and frames a freshly parsed graph
    fn process(&mut self, graph: SceneGraph) {
        self.set_status(SessionStatus::Processing);
        let options = NormalizeOptions {
            target_size: CANONICAL_SIZE,
            scale_override: self.config.model_scale,
        };
        let normalized = match normalize(graph, &options) {
            Ok(normalized) => normalized,
            Err(err) => {
                self.fail(err);
                return;
            }
        };
        let mut prepared = MaterialEngine::enhance(normalized, &mut self.rng);
        if self.wireframe {
            for material in &mut prepared.graph.materials {
                material.wireframe = true;
            }
        }

        self.attach(prepared);
        self.home = self.compute_home();
        if let Some(home) = self.home.as_ref() {
            self.camera.apply_home(home);
        }
        self.camera.update_view_proj();
        self.set_status(SessionStatus::Ready);
    }

    fn attach(&mut self, scene: PreparedScene) {
        self.summary = Some(scene.summary());
        self.scene = Some(scene);
        self.epoch += 1;
        info!("Attached scene epoch {}", self.epoch);
    }

    fn release_scene(&mut self) {
        if self.scene.take().is_some() {
            self.epoch += 1;
            debug!("Released scene, epoch {}", self.epoch);
        }
        self.summary = None;
        self.home = None;
    }

    fn fail(&mut self, err: ViewerError) {
        error!("Load {} failed: {}", self.generation, err);
        self.task = None;
        self.release_scene();
        self.controller.cancel_drag();
        self.set_status(SessionStatus::Error(err));
    }

    /// Frames the attached scene for the current aspect
    fn compute_home(&self) -> Option<HomePose> {
        let scene = self.scene.as_ref()?;
        let input = FramingInput::new(
            scene.bounds(),
            self.aspect,
            self.config.fov_degrees,
            scene.graph().mesh_count(),
        );
        let framed = frame_model(&input);
        Some(match self.config.camera_position {
            Some(position) => HomePose::from_position(position, &framed),
            None => framed,
        })
    }

    fn set_status(&mut self, status: SessionStatus) {
        if self.status == status {
            return;
        }
        self.status = status;
        let text = self.status_text();
        info!("Viewer status: {}", text);
        if let Some(listener) = self.listener.as_mut() {
            listener(&self.status, &text);
        }
    }

    /// Orbit and zoom input; ignored unless a scene is ready
    pub fn handle_pointer(&mut self, input: PointerInput) -> bool {
        if !self.status.is_ready() {
            // Releases still end a drag so it cannot stick across loads
            if input == PointerInput::DragEnd {
                self.controller.cancel_drag();
            }
            return false;
        }
        self.controller.apply(input, &mut self.camera)
    }

    pub fn set_wireframe(&mut self, enabled: bool) -> bool {
        if !self.status.is_ready() {
            return false;
        }
        let Some(scene) = self.scene.as_mut() else {
            return false;
        };
        for material in &mut scene.graph.materials {
            material.wireframe = enabled;
        }
        self.wireframe = enabled;
        true
    }

    pub fn toggle_wireframe(&mut self) -> bool {
        self.set_wireframe(!self.wireframe)
    }

    pub fn set_auto_rotate(&mut self, enabled: bool) -> bool {
        if !self.status.is_ready() {
            return false;
        }
        self.auto_rotate = enabled;
        true
    }

    pub fn toggle_auto_rotate(&mut self) -> bool {
        self.set_auto_rotate(!self.auto_rotate)
    }

    /// Returns the camera to its home pose, reframing first if the aspect changed
    pub fn reset_camera(&mut self) -> bool {
        if !self.status.is_ready() {
            return false;
        }
        let home = match self.home {
            Some(home) if (home.aspect - self.aspect).abs() <= ASPECT_EPSILON => home,
            _ => {
                let Some(home) = self.compute_home() else {
                    return false;
                };
                debug!("Recomputed home pose for aspect {:.3}", self.aspect);
                self.home = Some(home);
                home
            }
        };
        self.camera.apply_home(&home);
        self.camera.update_view_proj();
        true
    }

    pub fn set_coordinates(&mut self, enabled: bool) {
        self.readout.set_enabled(enabled);
        if enabled {
            self.readout.sample(Instant::now(), self.camera.eye);
        }
    }

    pub fn toggle_coordinates(&mut self) {
        self.set_coordinates(!self.readout.is_enabled());
    }

    /// Viewport size changed; the model itself is never touched
    pub fn resize(&mut self, width: u32, height: u32) {
        self.config.width = width.max(1);
        self.config.height = height.max(1);
        self.aspect = self.config.aspect();
        self.camera.resize_projection(width, height);
        self.camera.update_view_proj();
    }

    /// Cancels any load, drops the scene and the cache; the session stays inert afterwards
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        if let Some(task) = self.task.take() {
            task.cancel();
        }
        self.generation += 1;
        self.release_scene();
        self.cache.clear();
        self.listener = None;
        self.status = SessionStatus::Idle;
        self.disposed = true;
        info!("Viewer session disposed");
    }

    pub fn status(&self) -> &SessionStatus {
        &self.status
    }

    pub fn status_text(&self) -> String {
        self.status.text(self.summary.as_ref())
    }

    pub fn summary(&self) -> Option<&ModelSummary> {
        self.summary.as_ref()
    }

    pub fn scene(&self) -> Option<&PreparedScene> {
        self.scene.as_ref()
    }

    /// Changes whenever the attached scene is replaced or released
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn camera(&self) -> &OrbitCamera {
        &self.camera
    }

    pub fn home(&self) -> Option<&HomePose> {
        self.home.as_ref()
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn aspect(&self) -> f32 {
        self.aspect
    }

    pub fn is_wireframe(&self) -> bool {
        self.wireframe
    }

    pub fn is_auto_rotating(&self) -> bool {
        self.auto_rotate
    }

    pub fn is_dragging(&self) -> bool {
        self.controller.is_dragging()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn coordinates_text(&self) -> Option<String> {
        self.readout.text()
    }

    pub fn cached_assets(&self) -> usize {
        self.cache.len()
    }
}

impl Drop for ViewerSession {
    fn drop(&mut self) {
        self.dispose();
    }
}
