//! Background fetch and parse
//!
//! A load runs on its own thread and reports back through a oneshot
//! channel that the session polls once per frame, so the render loop never
//! waits on I/O. Dropping or cancelling the task abandons its result.

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    thread,
};

use futures::channel::oneshot;
use log::{debug, warn};

use crate::{
    error::{ViewerError, ViewerResult},
    loader::{load_model, CancellationToken, Fetcher, LoadRequest},
    scene::SceneGraph,
};

/// Outcome of polling a [`LoadTask`]
#[derive(Debug)]
pub enum TaskPoll {
    Pending,
    Done(ViewerResult<SceneGraph>),
}

/// Byte counters shared with the loader thread
#[derive(Debug)]
struct Progress {
    loaded: AtomicU64,
    /// `u64::MAX` while unknown
    total: AtomicU64,
}

impl Progress {
    fn new() -> Self {
        Self {
            loaded: AtomicU64::new(0),
            total: AtomicU64::new(u64::MAX),
        }
    }

    fn percent(&self) -> Option<u8> {
        let total = self.total.load(Ordering::Relaxed);
        if total == u64::MAX || total == 0 {
            return None;
        }
        let loaded = self.loaded.load(Ordering::Relaxed).min(total);
        Some(((loaded as f64 / total as f64) * 100.0).round() as u8)
    }
}

/// One in-flight load, tagged with the session generation that started it
pub struct LoadTask {
    generation: u64,
    key: String,
    cancel: CancellationToken,
    progress: Arc<Progress>,
    receiver: oneshot::Receiver<ViewerResult<SceneGraph>>,
}

impl LoadTask {
    /// Starts fetching and parsing `request` on a loader thread
    pub fn spawn(
        generation: u64,
        request: LoadRequest,
        fetcher: Arc<dyn Fetcher>,
    ) -> ViewerResult<Self> {
        let (sender, receiver) = oneshot::channel();
        let cancel = CancellationToken::new();
        let progress = Arc::new(Progress::new());
        let key = request.source.key();

        let thread_cancel = cancel.clone();
        let thread_progress = Arc::clone(&progress);
        thread::Builder::new()
            .name(format!("model-loader-{}", generation))
            .spawn(move || {
                let report = |loaded: u64, total: Option<u64>| {
                    thread_progress.loaded.store(loaded, Ordering::Relaxed);
                    if let Some(total) = total {
                        thread_progress.total.store(total, Ordering::Relaxed);
                    }
                };
                let result = load_model(&request, fetcher.as_ref(), &thread_cancel, &report);
                if thread_cancel.is_cancelled() {
                    debug!("Load {} finished after cancellation, dropping result", generation);
                    return;
                }
                // The receiver is gone when the session moved on
                let _ = sender.send(result);
            })
            .map_err(|e| ViewerError::SetupError(format!("cannot start loader thread: {}", e)))?;

        Ok(Self {
            generation,
            key,
            cancel,
            progress,
            receiver,
        })
    }

    /// A task that is already complete, used for cache hits
    pub fn ready(generation: u64, key: impl Into<String>, graph: SceneGraph) -> Self {
        let (sender, receiver) = oneshot::channel();
        let _ = sender.send(Ok(graph));
        let progress = Arc::new(Progress::new());
        progress.loaded.store(1, Ordering::Relaxed);
        progress.total.store(1, Ordering::Relaxed);
        Self {
            generation,
            key: key.into(),
            cancel: CancellationToken::new(),
            progress,
            receiver,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Cache key of the requested source
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Download progress, `None` until the total size is known
    pub fn percent(&self) -> Option<u8> {
        self.progress.percent()
    }

    /// Non-blocking check for the loader's result
    pub fn poll(&mut self) -> TaskPoll {
        match self.receiver.try_recv() {
            Ok(Some(result)) => TaskPoll::Done(result),
            Ok(None) => TaskPoll::Pending,
            Err(oneshot::Canceled) => {
                warn!("Loader thread for load {} ended without a result", self.generation);
                TaskPoll::Done(Err(ViewerError::fetch(
                    "loader stopped before producing a result",
                )))
            }
        }
    }

    /// Signals the loader thread to stop at its next checkpoint
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

impl Drop for LoadTask {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::{
        test_support::{cube_stl, MemoryFetcher},
        ModelSource,
    };
    use std::time::{Duration, Instant};

    fn wait(task: &mut LoadTask) -> ViewerResult<SceneGraph> {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if let TaskPoll::Done(result) = task.poll() {
                return result;
            }
            assert!(Instant::now() < deadline, "load task timed out");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn loads_on_a_background_thread() {
        let fetcher = Arc::new(MemoryFetcher::new().with_file("cube.stl", cube_stl()));
        let request = LoadRequest::new(ModelSource::parse("cube.stl"))
            .with_declared_size(cube_stl().len() as u64);
        let mut task = LoadTask::spawn(1, request, fetcher).expect("spawn");
        let graph = wait(&mut task).expect("parsed");
        assert_eq!(graph.face_count(), 12);
        assert_eq!(task.percent(), Some(100));
        assert_eq!(task.generation(), 1);
    }

    #[test]
    fn fetch_errors_come_back_as_results() {
        let fetcher = Arc::new(MemoryFetcher::new());
        let request = LoadRequest::new(ModelSource::parse("absent.stl"));
        let mut task = LoadTask::spawn(1, request, fetcher).expect("spawn");
        assert!(matches!(wait(&mut task), Err(ViewerError::FetchError(_))));
    }

    #[test]
    fn cancelled_task_never_delivers() {
        let (fetcher, gate) = MemoryFetcher::new()
            .with_file("cube.stl", cube_stl())
            .gated();
        let request = LoadRequest::new(ModelSource::parse("cube.stl"));
        let mut task = LoadTask::spawn(1, request, Arc::new(fetcher)).expect("spawn");
        assert!(matches!(task.poll(), TaskPoll::Pending));
        task.cancel();
        drop(gate);
        // The thread drops its sender instead of sending
        let result = wait(&mut task);
        assert!(matches!(result, Err(ViewerError::FetchError(_))));
    }

    #[test]
    fn ready_task_completes_immediately() {
        let graph = crate::scene::test_support::cube_graph(2.0, [0.0; 3]);
        let mut task = LoadTask::ready(3, "cube.obj", graph);
        assert_eq!(task.key(), "cube.obj");
        assert!(matches!(task.poll(), TaskPoll::Done(Ok(_))));
    }
}
