//! Bridge to an external module bundler.
//!
//! The bundler itself is supplied by the caller through [`Bundler`]. This
//! module only decides what to ask it for, keeps its per-input cache, and
//! turns its chunks back into entries.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::cache::BundleCache;
use crate::entry::{Entry, EntryInfo};
use crate::error::PipesetError;
use crate::paths;
use crate::traits::Transform;

pub const PLUGIN_NAME: &str = "pipeset-bundle";

/// Computes a string from an entry's location.
pub type Resolve = Box<dyn Fn(&EntryInfo) -> String + Send + Sync>;

/// One requested output of a bundle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputOptions {
    /// Emit the chunk as a new entry named after this file. Without it the
    /// chunk replaces the input entry.
    pub file: Option<String>,

    /// Module name, required by some formats.
    pub name: Option<String>,

    /// AMD module id. Defaults to `name`.
    pub amd_id: Option<String>,

    pub format: Option<String>,

    pub sourcemap: bool,
}

impl OutputOptions {
    fn injects_entry(&self) -> bool {
        self.file.is_some()
    }
}

/// What the bundler is asked to produce for one input.
#[derive(Debug, Clone)]
pub struct BundleRequest<C> {
    /// Input module, as resolved for the engine (relative to `cwd` unless a
    /// resolver said otherwise).
    pub input: PathBuf,

    pub cwd: PathBuf,

    /// Artifact returned by the previous bundle of the same input.
    pub cache: Option<C>,

    pub outputs: Vec<OutputOptions>,
}

/// Generated code for one [`OutputOptions`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Chunk {
    pub code: String,
    pub map:  Option<String>,
}

/// The bundler's answer: one chunk per requested output, in order.
#[derive(Debug, Clone)]
pub struct Bundle<C> {
    pub chunks: Vec<Chunk>,
    pub cache:  Option<C>,
}

/// An external module bundler.
#[async_trait]
pub trait Bundler: Send + Sync {
    /// Incremental state carried between bundles of the same input.
    type Cache: Clone + Send + Sync + 'static;

    async fn bundle(&self, request: BundleRequest<Self::Cache>) -> anyhow::Result<Bundle<Self::Cache>>;
}

// ---------------------------------------------------------------------------
// BundleTransform
// ---------------------------------------------------------------------------

/// A [`Transform`] that replaces each input module with its bundle(s).
pub struct BundleTransform<B: Bundler> {
    bundler:             B,
    outputs:             Vec<OutputOptions>,
    resolve_input:       Option<Resolve>,
    resolve_output_name: Option<Resolve>,
    resolve_output_amd:  Option<Resolve>,
    use_cache:           bool,
    cache:               BundleCache<B::Cache>,
}

impl<B: Bundler> BundleTransform<B> {
    pub fn new(bundler: B) -> Self {
        Self {
            bundler,
            outputs:             vec![OutputOptions::default()],
            resolve_input:       None,
            resolve_output_name: None,
            resolve_output_amd:  None,
            use_cache:           true,
            cache:               BundleCache::new(),
        }
    }

    /// Replace the requested outputs.
    ///
    /// Outputs naming a `file` each add an entry. Of those that don't, only
    /// the last one is kept; it rewrites the input entry and is generated
    /// first.
    pub fn outputs(mut self, outputs: impl IntoIterator<Item = OutputOptions>) -> Self {
        self.outputs = filter_outputs(outputs.into_iter().collect());
        self
    }

    pub fn resolve_input(mut self, f: impl Fn(&EntryInfo) -> String + Send + Sync + 'static) -> Self {
        self.resolve_input = Some(Box::new(f));
        self
    }

    pub fn resolve_output_name(mut self, f: impl Fn(&EntryInfo) -> String + Send + Sync + 'static) -> Self {
        self.resolve_output_name = Some(Box::new(f));
        self
    }

    pub fn resolve_output_amd(mut self, f: impl Fn(&EntryInfo) -> String + Send + Sync + 'static) -> Self {
        self.resolve_output_amd = Some(Box::new(f));
        self
    }

    /// Reuse the previous artifact of an input when bundling it again.
    /// Enabled by default.
    pub fn cache(mut self, yes: bool) -> Self {
        self.use_cache = yes;
        self
    }

    /// Inputs currently holding a cached artifact.
    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    fn resolve_outputs(&self, info: &EntryInfo) -> Vec<OutputOptions> {
        self.outputs
            .iter()
            .cloned()
            .map(|mut opts| {
                if opts.name.is_none() {
                    opts.name = self.resolve_output_name.as_ref().map(|f| f(info));
                }
                if opts.amd_id.is_none() {
                    opts.amd_id = match &self.resolve_output_amd {
                        Some(f) => Some(f(info)),
                        None => opts.name.clone(),
                    };
                }
                opts
            })
            .collect()
    }
}

#[async_trait]
impl<B: Bundler> Transform for BundleTransform<B> {
    async fn transform(&mut self, entry: Entry) -> Result<Vec<Entry>, PipesetError> {
        // Directories and unread files have nothing to bundle.
        if entry.is_null() {
            return Ok(vec![entry]);
        }

        let info = entry.info();
        let input = match &self.resolve_input {
            Some(f) => PathBuf::from(f(&info)),
            None => paths::relative(&info.cwd, &info.path),
        };
        let key = BundleCache::<B::Cache>::key(&info.cwd, &input);
        let outputs = self.resolve_outputs(&info);

        let request = BundleRequest {
            input,
            cwd: info.cwd.clone(),
            cache: if self.use_cache { self.cache.get(&key) } else { None },
            outputs: outputs.clone(),
        };

        let bundle = match self.bundler.bundle(request).await {
            Ok(bundle) => bundle,
            Err(source) => {
                if self.use_cache {
                    self.cache.invalidate(&key);
                }
                return Err(PipesetError::Engine {
                    plugin: PLUGIN_NAME,
                    path: entry.path,
                    source,
                });
            }
        };

        if self.use_cache {
            if let Some(artifact) = bundle.cache {
                self.cache.insert(key, artifact);
            }
        }

        if bundle.chunks.len() > outputs.len() {
            warn!(
                path = %info.path.display(),
                extra = bundle.chunks.len() - outputs.len(),
                "ignoring chunks beyond the requested outputs"
            );
        }

        let produced: Vec<Entry> = outputs
            .iter()
            .zip(bundle.chunks)
            .map(|(opts, chunk)| {
                let mut target = match &opts.file {
                    Some(file) => Entry::new(&info.cwd, &info.base, info.base.join(file_name(file))),
                    None => entry.clone(),
                };
                target.contents = Some(chunk.code.into_bytes());
                target.source_map = chunk.map;
                target
            })
            .collect();

        debug!(path = %info.path.display(), outputs = produced.len(), "bundled");
        Ok(produced)
    }

    async fn flush(&mut self) -> Result<Vec<Entry>, PipesetError> {
        self.cache.clear();
        Ok(Vec::new())
    }
}

fn file_name(file: &str) -> &std::ffi::OsStr {
    Path::new(file)
        .file_name()
        .unwrap_or_else(|| std::ffi::OsStr::new(file))
}

/// Keep every output naming a file, plus the last one that doesn't, which
/// goes first.
fn filter_outputs(outputs: Vec<OutputOptions>) -> Vec<OutputOptions> {
    let mut rewrite = None;
    let mut kept: Vec<OutputOptions> = Vec::with_capacity(outputs.len());
    for opts in outputs {
        if opts.injects_entry() {
            kept.push(opts);
        } else {
            rewrite = Some(opts);
        }
    }
    if let Some(opts) = rewrite {
        kept.insert(0, opts);
    }
    kept
}
