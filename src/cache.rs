use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::paths;

/// Per-input cache for a transformation engine.
///
/// Keys are canonical absolute input paths, so `src/a.js` and
/// `./src/../src/a.js` seen from the same `cwd` share a slot. The cache
/// belongs to one transform instance and is emptied when its stream is
/// flushed.
#[derive(Debug)]
pub struct BundleCache<T> {
    slots: HashMap<PathBuf, T>,
}

impl<T> Default for BundleCache<T> {
    fn default() -> Self {
        Self { slots: HashMap::new() }
    }
}

impl<T: Clone> BundleCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Canonical key for `input` as seen from `cwd`.
    pub fn key(cwd: &Path, input: &Path) -> PathBuf {
        paths::resolve(cwd, input)
    }

    pub fn get(&self, key: &Path) -> Option<T> {
        self.slots.get(key).cloned()
    }

    pub fn insert(&mut self, key: PathBuf, value: T) {
        self.slots.insert(key, value);
    }

    /// Forget the artifact for `key`. Returns whether one was held.
    pub fn invalidate(&mut self, key: &Path) -> bool {
        self.slots.remove(key).is_some()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
