//! Byte transport for model files and the resources they reference

use std::{
    fs::File,
    io::Read,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use log::debug;

use crate::error::{ViewerError, ViewerResult};

/// Bytes read per chunk between progress reports and cancellation checks
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Where a model's bytes come from
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ModelSource {
    Path(PathBuf),
    Url(String),
}

impl ModelSource {
    /// Interprets `source` as an http(s) URL or a local path
    ///
    /// `file://` prefixes are stripped to a path.
    pub fn parse(source: &str) -> Self {
        let lower = source.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            Self::Url(source.to_string())
        } else if lower.starts_with("file://") {
            Self::Path(PathBuf::from(&source["file://".len()..]))
        } else {
            Self::Path(PathBuf::from(source))
        }
    }

    /// Last path segment, without URL query or fragment
    pub fn file_name(&self) -> Option<String> {
        match self {
            Self::Path(path) => path.file_name().map(|n| n.to_string_lossy().into_owned()),
            Self::Url(url) => {
                let path = url.split(['?', '#']).next().unwrap_or(url);
                path.rsplit('/')
                    .next()
                    .filter(|segment| !segment.is_empty() && !segment.contains(':'))
                    .map(str::to_string)
            }
        }
    }

    /// Resolves `reference` against this source's directory
    pub fn join(&self, reference: &str) -> Self {
        let reference = reference.trim_start_matches("./");
        match Self::parse(reference) {
            absolute @ Self::Url(_) => absolute,
            Self::Path(path) if path.is_absolute() => Self::Path(path),
            Self::Path(_) => match self {
                Self::Path(base) => Self::Path(
                    base.parent()
                        .unwrap_or_else(|| Path::new(""))
                        .join(reference),
                ),
                Self::Url(base) => {
                    let path = base.split(['?', '#']).next().unwrap_or(base);
                    let dir = match path.rfind('/') {
                        Some(index) => &path[..=index],
                        None => path,
                    };
                    Self::Url(format!("{}{}", dir, reference))
                }
            },
        }
    }

    /// Key identifying this source in caches and logs
    pub fn key(&self) -> String {
        match self {
            Self::Path(path) => path.to_string_lossy().into_owned(),
            Self::Url(url) => url.clone(),
        }
    }
}

impl std::fmt::Display for ModelSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.key())
    }
}

/// Shared flag telling an in-flight load to stop
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Fails with a fetch error once cancelled
    pub fn check(&self) -> ViewerResult<()> {
        if self.is_cancelled() {
            Err(ViewerError::fetch("load cancelled"))
        } else {
            Ok(())
        }
    }
}

/// Progress callback: bytes loaded so far and the total when known
pub type ProgressFn<'a> = &'a (dyn Fn(u64, Option<u64>) + Send + Sync);

/// Retrieves the bytes behind a [`ModelSource`]
pub trait Fetcher: Send + Sync {
    fn fetch(
        &self,
        source: &ModelSource,
        cancel: &CancellationToken,
        progress: ProgressFn<'_>,
    ) -> ViewerResult<Vec<u8>>;
}

/// Reads local files and, with the `http` feature, downloads URLs
#[derive(Debug, Clone)]
pub struct StdFetcher {
    chunk_size: usize,
}

impl Default for StdFetcher {
    fn default() -> Self {
        Self {
            chunk_size: CHUNK_SIZE,
        }
    }
}

impl StdFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    fn read_chunked<R: Read>(
        &self,
        mut reader: R,
        total: Option<u64>,
        cancel: &CancellationToken,
        progress: ProgressFn<'_>,
    ) -> ViewerResult<Vec<u8>> {
        let mut bytes = Vec::with_capacity(total.unwrap_or(0).min(1 << 28) as usize);
        let mut chunk = vec![0u8; self.chunk_size];
        progress(0, total);
        loop {
            cancel.check()?;
            let read = reader
                .read(&mut chunk)
                .map_err(|e| ViewerError::fetch(e.to_string()))?;
            if read == 0 {
                break;
            }
            bytes.extend_from_slice(&chunk[..read]);
            progress(bytes.len() as u64, total);
        }
        Ok(bytes)
    }

    fn fetch_file(
        &self,
        path: &Path,
        cancel: &CancellationToken,
        progress: ProgressFn<'_>,
    ) -> ViewerResult<Vec<u8>> {
        let file = File::open(path)
            .map_err(|e| ViewerError::fetch(format!("{}: {}", path.display(), e)))?;
        let total = file.metadata().ok().map(|m| m.len());
        debug!("Reading {} ({:?} bytes)", path.display(), total);
        self.read_chunked(file, total, cancel, progress)
    }

    #[cfg(feature = "http")]
    fn fetch_url(
        &self,
        url: &str,
        cancel: &CancellationToken,
        progress: ProgressFn<'_>,
    ) -> ViewerResult<Vec<u8>> {
        let response = reqwest::blocking::get(url).map_err(|e| ViewerError::fetch(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ViewerError::fetch(format!("{} returned HTTP {}", url, status)));
        }
        let total = response.content_length();
        debug!("Downloading {} ({:?} bytes)", url, total);
        self.read_chunked(response, total, cancel, progress)
    }

    #[cfg(not(feature = "http"))]
    fn fetch_url(
        &self,
        url: &str,
        _cancel: &CancellationToken,
        _progress: ProgressFn<'_>,
    ) -> ViewerResult<Vec<u8>> {
        Err(ViewerError::fetch(format!(
            "cannot download {}: built without the http feature",
            url
        )))
    }
}

impl Fetcher for StdFetcher {
    fn fetch(
        &self,
        source: &ModelSource,
        cancel: &CancellationToken,
        progress: ProgressFn<'_>,
    ) -> ViewerResult<Vec<u8>> {
        cancel.check()?;
        match source {
            ModelSource::Path(path) => self.fetch_file(path, cancel, progress),
            ModelSource::Url(url) => self.fetch_url(url, cancel, progress),
        }
    }
}

/// Supplies the bytes of resources a model file references by name
pub trait ResourceResolver {
    fn resolve(&self, reference: &str) -> ViewerResult<Vec<u8>>;
}

/// Resolves references relative to the model's own source
pub struct RelativeResolver<'a> {
    base: &'a ModelSource,
    fetcher: &'a dyn Fetcher,
    cancel: &'a CancellationToken,
}

impl<'a> RelativeResolver<'a> {
    pub fn new(base: &'a ModelSource, fetcher: &'a dyn Fetcher, cancel: &'a CancellationToken) -> Self {
        Self {
            base,
            fetcher,
            cancel,
        }
    }
}

impl ResourceResolver for RelativeResolver<'_> {
    fn resolve(&self, reference: &str) -> ViewerResult<Vec<u8>> {
        let source = self.base.join(reference);
        debug!("Resolving '{}' as {}", reference, source);
        self.fetcher.fetch(&source, self.cancel, &|_, _| {})
    }
}

/// Resolver for self-contained models; every lookup fails
pub struct NoResources;

impl ResourceResolver for NoResources {
    fn resolve(&self, reference: &str) -> ViewerResult<Vec<u8>> {
        Err(ViewerError::fetch(format!("no resource named '{}'", reference)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{io::Write, sync::Mutex};

    #[test]
    fn sources_are_classified() {
        assert_eq!(
            ModelSource::parse("https://cdn.example.com/m/chair.glb"),
            ModelSource::Url("https://cdn.example.com/m/chair.glb".into())
        );
        assert_eq!(
            ModelSource::parse("file:///tmp/chair.obj"),
            ModelSource::Path(PathBuf::from("/tmp/chair.obj"))
        );
        assert_eq!(
            ModelSource::parse("models/chair.obj"),
            ModelSource::Path(PathBuf::from("models/chair.obj"))
        );
    }

    #[test]
    fn url_file_name_drops_query() {
        let source = ModelSource::parse("https://host/files/Robot.GLB?token=abc");
        assert_eq!(source.file_name().as_deref(), Some("Robot.GLB"));
    }

    #[test]
    fn references_join_against_source_directory() {
        let url = ModelSource::parse("https://host/a/b/model.gltf");
        assert_eq!(
            url.join("./textures/wood.png"),
            ModelSource::Url("https://host/a/b/textures/wood.png".into())
        );
        let path = ModelSource::parse("/data/models/chair.obj");
        assert_eq!(
            path.join("chair.mtl"),
            ModelSource::Path(PathBuf::from("/data/models/chair.mtl"))
        );
    }

    #[test]
    fn file_fetch_reports_chunked_progress() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[7u8; 10]).unwrap();
        let source = ModelSource::Path(file.path().to_path_buf());
        let reports = Mutex::new(Vec::new());

        let bytes = StdFetcher::new()
            .with_chunk_size(4)
            .fetch(&source, &CancellationToken::new(), &|loaded, total| {
                reports.lock().unwrap().push((loaded, total))
            })
            .unwrap();

        assert_eq!(bytes.len(), 10);
        let reports = reports.into_inner().unwrap();
        assert_eq!(reports.first(), Some(&(0, Some(10))));
        assert_eq!(reports.last(), Some(&(10, Some(10))));
        assert_eq!(reports.len(), 4);
    }

    #[test]
    fn cancelled_token_stops_fetch() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = StdFetcher::new()
            .fetch(&ModelSource::parse("/nonexistent"), &cancel, &|_, _| {})
            .unwrap_err();
        assert!(matches!(err, ViewerError::FetchError(_)));
    }

    #[test]
    fn missing_file_is_fetch_error() {
        let err = StdFetcher::new()
            .fetch(
                &ModelSource::parse("/definitely/not/here.stl"),
                &CancellationToken::new(),
                &|_, _| {},
            )
            .unwrap_err();
        assert!(matches!(err, ViewerError::FetchError(_)));
    }
}
