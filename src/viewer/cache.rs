use std::collections::{HashMap, VecDeque};

use log::debug;

use crate::{loader::ModelFormat, scene::SceneGraph};

/// Graphs kept before the least recently used one is evicted
pub const DEFAULT_CACHE_CAPACITY: usize = 4;

/// A source parsed as a particular format
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssetKey {
    pub source: String,
    pub format: ModelFormat,
}

impl AssetKey {
    pub fn new(source: impl Into<String>, format: ModelFormat) -> Self {
        Self {
            source: source.into(),
            format,
        }
    }
}

/// LRU cache of parsed graphs for one session
///
/// Entries are raw loader output. A hit is handed out as a clone so the
/// normalizer and material engine always mutate the session's own copy.
#[derive(Debug)]
pub struct AssetCache {
    entries: HashMap<AssetKey, SceneGraph>,
    /// Front is the least recently used
    lru_order: VecDeque<AssetKey>,
    capacity: usize,
}

impl Default for AssetCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CACHE_CAPACITY)
    }
}

impl AssetCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache holding at most `capacity` graphs, 0 disables caching
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            lru_order: VecDeque::new(),
            capacity,
        }
    }

    pub fn get(&mut self, key: &AssetKey) -> Option<SceneGraph> {
        let hit = self.entries.get(key).cloned()?;
        self.touch(key);
        debug!("Asset cache hit for {} as {}", key.source, key.format);
        Some(hit)
    }

    pub fn insert(&mut self, key: AssetKey, graph: SceneGraph) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.insert(key.clone(), graph).is_some() {
            self.touch(&key);
            return;
        }
        self.lru_order.push_back(key);
        while self.entries.len() > self.capacity {
            let Some(oldest) = self.lru_order.pop_front() else {
                break;
            };
            debug!("Evicting {} from the asset cache", oldest.source);
            self.entries.remove(&oldest);
        }
    }

    fn touch(&mut self, key: &AssetKey) {
        self.lru_order.retain(|k| k != key);
        self.lru_order.push_back(key.clone());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.lru_order.clear();
    }
}
