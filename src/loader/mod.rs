//! # Format Loader Dispatcher
//!
//! Detects a model's format from its filename, fetches its bytes and parses
//! them into a raw [`SceneGraph`]. Detection happens before any I/O, so an
//! unsupported extension never triggers a fetch.
//!
//! ## Supported formats
//!
//! | Extension | Loader |
//! |-----------|--------|
//! | `.gltf`, `.glb` | [`GltfLoader`] |
//! | `.obj` (+ `.mtl`) | [`ObjLoader`] |
//! | `.fbx` (binary) | [`FbxLoader`] |
//! | `.stl` | [`StlLoader`] |

pub mod fbx;
pub mod fetch;
pub mod gltf;
pub mod obj;
pub mod stl;
pub mod texture;

use std::fmt;

use log::{debug, info};

use crate::{
    error::{ViewerError, ViewerResult},
    scene::SceneGraph,
};
pub use self::fbx::FbxLoader;
pub use self::gltf::GltfLoader;
pub use fetch::{
    CancellationToken, Fetcher, ModelSource, NoResources, ProgressFn, RelativeResolver,
    ResourceResolver, StdFetcher,
};
pub use obj::ObjLoader;
pub use stl::StlLoader;

/// Model container formats the viewer understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelFormat {
    Gltf,
    Glb,
    Obj,
    Fbx,
    Stl,
}

impl ModelFormat {
    pub const ALL: [ModelFormat; 5] = [
        ModelFormat::Gltf,
        ModelFormat::Glb,
        ModelFormat::Obj,
        ModelFormat::Fbx,
        ModelFormat::Stl,
    ];

    /// Maps the filename's extension, case-insensitively
    pub fn from_filename(filename: &str) -> ViewerResult<Self> {
        let name = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
        let extension = match name.rfind('.') {
            Some(index) => name[index + 1..].to_ascii_lowercase(),
            None => String::new(),
        };
        Self::ALL
            .into_iter()
            .find(|format| format.extension() == extension)
            .ok_or(ViewerError::UnsupportedFormat { extension })
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Gltf => "gltf",
            Self::Glb => "glb",
            Self::Obj => "obj",
            Self::Fbx => "fbx",
            Self::Stl => "stl",
        }
    }
}

impl fmt::Display for ModelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Gltf => "glTF",
            Self::Glb => "GLB",
            Self::Obj => "OBJ",
            Self::Fbx => "FBX",
            Self::Stl => "STL",
        })
    }
}

/// What the host asks the viewer to show
#[derive(Debug, Clone, PartialEq)]
pub struct LoadRequest {
    pub source: ModelSource,
    /// Name whose extension selects the format
    pub filename: String,
    /// Byte size known to the host, used when the transport reports none
    pub declared_size: Option<u64>,
}

impl LoadRequest {
    /// Request whose filename is taken from the source itself
    pub fn new(source: ModelSource) -> Self {
        let filename = source.file_name().unwrap_or_default();
        Self {
            source,
            filename,
            declared_size: None,
        }
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = filename.into();
        self
    }

    pub fn with_declared_size(mut self, size: u64) -> Self {
        self.declared_size = Some(size);
        self
    }

    pub fn format(&self) -> ViewerResult<ModelFormat> {
        ModelFormat::from_filename(&self.filename)
    }
}

/// Turns fetched bytes into a raw scene graph
pub trait Loader {
    fn parse(&self, bytes: &[u8], resolver: &dyn ResourceResolver) -> ViewerResult<SceneGraph>;
}

/// Loader selected by [`ModelFormat`]
#[derive(Debug, Clone, Copy)]
pub enum FormatLoader {
    Gltf(GltfLoader),
    Obj(ObjLoader),
    Fbx(FbxLoader),
    Stl(StlLoader),
}

impl FormatLoader {
    pub fn for_format(format: ModelFormat) -> Self {
        match format {
            ModelFormat::Gltf | ModelFormat::Glb => Self::Gltf(GltfLoader::new(format)),
            ModelFormat::Obj => Self::Obj(ObjLoader),
            ModelFormat::Fbx => Self::Fbx(FbxLoader),
            ModelFormat::Stl => Self::Stl(StlLoader),
        }
    }
}

impl Loader for FormatLoader {
    fn parse(&self, bytes: &[u8], resolver: &dyn ResourceResolver) -> ViewerResult<SceneGraph> {
        match self {
            Self::Gltf(loader) => loader.parse(bytes, resolver),
            Self::Obj(loader) => loader.parse(bytes, resolver),
            Self::Fbx(loader) => loader.parse(bytes, resolver),
            Self::Stl(loader) => loader.parse(bytes, resolver),
        }
    }
}

/// Detects, fetches and parses the model named by `request`
///
/// `progress` receives `(bytes_loaded, bytes_total)`; the declared size
/// stands in for the total when the transport does not know it.
pub fn load_model(
    request: &LoadRequest,
    fetcher: &dyn Fetcher,
    cancel: &CancellationToken,
    progress: ProgressFn<'_>,
) -> ViewerResult<SceneGraph> {
    let format = request.format()?;
    info!("Loading {} model from {}", format, request.source);

    let declared = request.declared_size;
    let bytes = fetcher.fetch(&request.source, cancel, &|loaded, total| {
        progress(loaded, total.or(declared))
    })?;
    cancel.check()?;
    debug!("Fetched {} bytes", bytes.len());

    let resolver = RelativeResolver::new(&request.source, fetcher, cancel);
    let graph = FormatLoader::for_format(format).parse(&bytes, &resolver)?;
    if graph.mesh_count() == 0 {
        return Err(ViewerError::parse(format, "no meshes"));
    }
    info!(
        "Parsed {}: {} meshes, {} vertices, {} faces",
        request.filename,
        graph.mesh_count(),
        graph.vertex_count(),
        graph.face_count()
    );
    Ok(graph)
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::{
        collections::HashMap,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Mutex,
        },
    };

    use super::*;

    /// In-memory fetcher, optionally held until released
    #[derive(Default)]
    pub struct MemoryFetcher {
        files: HashMap<String, Vec<u8>>,
        pub calls: AtomicUsize,
        gate: Mutex<Option<std::sync::mpsc::Receiver<()>>>,
    }

    impl MemoryFetcher {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_file(mut self, key: &str, bytes: Vec<u8>) -> Self {
            self.files.insert(key.to_string(), bytes);
            self
        }

        /// Blocks fetches until the returned sender fires or drops
        pub fn gated(self) -> (Self, std::sync::mpsc::Sender<()>) {
            let (tx, rx) = std::sync::mpsc::channel();
            *self.gate.lock().unwrap() = Some(rx);
            (self, tx)
        }
    }

    impl Fetcher for MemoryFetcher {
        fn fetch(
            &self,
            source: &ModelSource,
            cancel: &CancellationToken,
            progress: ProgressFn<'_>,
        ) -> ViewerResult<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = self.gate.lock().unwrap().take() {
                let _ = gate.recv();
            }
            cancel.check()?;
            let bytes = self
                .files
                .get(&source.key())
                .cloned()
                .ok_or_else(|| ViewerError::fetch(format!("{} not found", source)))?;
            let half = bytes.len() as u64 / 2;
            progress(half, None);
            progress(bytes.len() as u64, None);
            Ok(bytes)
        }
    }

    /// ASCII STL cube of edge 2 centered at the origin
    pub fn cube_stl() -> Vec<u8> {
        let c = [
            [-1.0, -1.0, -1.0],
            [1.0, -1.0, -1.0],
            [1.0, 1.0, -1.0],
            [-1.0, 1.0, -1.0],
            [-1.0, -1.0, 1.0],
            [1.0, -1.0, 1.0],
            [1.0, 1.0, 1.0],
            [-1.0, 1.0, 1.0],
        ];
        let faces = [
            [0, 2, 1], [0, 3, 2], [4, 5, 6], [4, 6, 7], [0, 1, 5], [0, 5, 4],
            [3, 6, 2], [3, 7, 6], [0, 4, 7], [0, 7, 3], [1, 2, 6], [1, 6, 5],
        ];
        let mut text = String::from("solid cube\n");
        for face in faces {
            text.push_str("facet normal 0 0 0\nouter loop\n");
            for i in face {
                let [x, y, z] = c[i];
                text.push_str(&format!("vertex {} {} {}\n", x, y, z));
            }
            text.push_str("endloop\nendfacet\n");
        }
        text.push_str("endsolid cube\n");
        text.into_bytes()
    }

    /// OBJ cube of edge 2 with no material library
    pub fn cube_obj() -> Vec<u8> {
        b"o cube\n\
          v -1 -1 -1\nv 1 -1 -1\nv 1 1 -1\nv -1 1 -1\n\
          v -1 -1 1\nv 1 -1 1\nv 1 1 1\nv -1 1 1\n\
          f 1 3 2\nf 1 4 3\nf 5 6 7\nf 5 7 8\nf 1 2 6\nf 1 6 5\n\
          f 4 7 3\nf 4 8 7\nf 1 5 8\nf 1 8 4\nf 2 3 7\nf 2 7 6\n"
            .to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::{test_support::*, *};
    use std::sync::{atomic::Ordering, Mutex};

    #[test]
    fn extensions_map_case_insensitively() {
        assert_eq!(ModelFormat::from_filename("Robot.GLB"), Ok(ModelFormat::Glb));
        assert_eq!(ModelFormat::from_filename("scene.gltf"), Ok(ModelFormat::Gltf));
        assert_eq!(ModelFormat::from_filename("dir.v2/chair.Obj"), Ok(ModelFormat::Obj));
        assert_eq!(ModelFormat::from_filename("rig.fbx"), Ok(ModelFormat::Fbx));
        assert_eq!(ModelFormat::from_filename("part.STL"), Ok(ModelFormat::Stl));
    }

    #[test]
    fn unknown_extension_is_named() {
        assert_eq!(
            ModelFormat::from_filename("model.xyz"),
            Err(ViewerError::UnsupportedFormat {
                extension: "xyz".to_string()
            })
        );
        assert_eq!(
            ModelFormat::from_filename("README"),
            Err(ViewerError::UnsupportedFormat {
                extension: String::new()
            })
        );
    }

    #[test]
    fn unsupported_format_never_fetches() {
        let fetcher = MemoryFetcher::new().with_file("model.xyz", vec![1, 2, 3]);
        let request = LoadRequest::new(ModelSource::parse("model.xyz"));
        let err = load_model(&request, &fetcher, &CancellationToken::new(), &|_, _| {}).unwrap_err();
        assert!(matches!(err, ViewerError::UnsupportedFormat { .. }));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn declared_size_fills_missing_total() {
        let fetcher = MemoryFetcher::new().with_file("cube.stl", cube_stl());
        let request = LoadRequest::new(ModelSource::parse("cube.stl")).with_declared_size(1000);
        let totals = Mutex::new(Vec::new());
        let graph = load_model(&request, &fetcher, &CancellationToken::new(), &|_, total| {
            totals.lock().unwrap().push(total)
        })
        .unwrap();
        assert_eq!(graph.face_count(), 12);
        assert!(totals.into_inner().unwrap().iter().all(|t| *t == Some(1000)));
    }

    #[test]
    fn filename_overrides_source_name() {
        let fetcher = MemoryFetcher::new().with_file("blob/1234", cube_obj());
        let request = LoadRequest::new(ModelSource::parse("blob/1234")).with_filename("cube.obj");
        let graph = load_model(&request, &fetcher, &CancellationToken::new(), &|_, _| {}).unwrap();
        assert_eq!(graph.format, ModelFormat::Obj);
        assert_eq!(graph.face_count(), 12);
    }

    #[test]
    fn graph_without_meshes_is_parse_error() {
        let fetcher = MemoryFetcher::new().with_file("empty.obj", b"# nothing here\n".to_vec());
        let request = LoadRequest::new(ModelSource::parse("empty.obj"));
        let err = load_model(&request, &fetcher, &CancellationToken::new(), &|_, _| {}).unwrap_err();
        assert_eq!(err, ViewerError::parse(ModelFormat::Obj, "no meshes"));
    }

    #[test]
    fn fetch_failure_is_fetch_error() {
        let request = LoadRequest::new(ModelSource::parse("missing.glb"));
        let err = load_model(&request, &MemoryFetcher::new(), &CancellationToken::new(), &|_, _| {})
            .unwrap_err();
        assert!(matches!(err, ViewerError::FetchError(_)));
    }
}
