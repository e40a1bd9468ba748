use std::collections::HashSet;
use std::path::{Path, PathBuf};

use futures::stream::{self, StreamExt};
use globset::{GlobBuilder, GlobMatcher, GlobSet, GlobSetBuilder};
use ignore::{DirEntry, WalkBuilder};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;

use crate::entry::{Entry, EntryKind};
use crate::error::PipesetError;
use crate::paths;
use crate::traits::{EntryStream, Source};

/// Entries a [`GlobSource`] walks ahead of its reader.
pub const SOURCE_BUFFER: usize = 64;

/// Receives walked entries. Returns `false` once nobody is listening.
type Emit<'a> = dyn FnMut(Entry) -> bool + 'a;

// ---------------------------------------------------------------------------
// SrcOptions
// ---------------------------------------------------------------------------

/// How a [`GlobSource`] resolves and reads its matches.
#[derive(Debug, Clone)]
pub struct SrcOptions {
    /// Directory relative globs are resolved from. Defaults to the process
    /// working directory.
    pub cwd: Option<PathBuf>,

    /// Overrides the glob parent as every entry's `base`.
    pub base: Option<PathBuf>,

    /// Load file contents into [`Entry::contents`].
    pub read: bool,

    /// Do not fail when a singular (non-glob) path matches nothing.
    pub allow_empty: bool,
}

impl Default for SrcOptions {
    fn default() -> Self {
        Self {
            cwd:         None,
            base:        None,
            read:        true,
            allow_empty: false,
        }
    }
}

// ---------------------------------------------------------------------------
// GlobSource
// ---------------------------------------------------------------------------

/// Enumerates the files and directories matched by a list of globs.
///
/// Created via [`pipeset::src()`](crate::src). Globs starting with `!`
/// exclude what the others match. Symlinks are reported but never
/// descended into; entries come out sorted by path within each glob, and an
/// entry matched by several globs is only produced once.
#[derive(Debug, Clone)]
pub struct GlobSource {
    globs:   Vec<String>,
    options: SrcOptions,
}

impl GlobSource {
    pub fn new<I, S>(globs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            globs:   globs.into_iter().map(Into::into).collect(),
            options: SrcOptions::default(),
        }
    }

    pub fn options(mut self, options: SrcOptions) -> Self {
        self.options = options;
        self
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.options.cwd = Some(cwd.into());
        self
    }

    pub fn base(mut self, base: impl Into<PathBuf>) -> Self {
        self.options.base = Some(base.into());
        self
    }

    pub fn read(mut self, yes: bool) -> Self {
        self.options.read = yes;
        self
    }

    pub fn allow_empty(mut self, yes: bool) -> Self {
        self.options.allow_empty = yes;
        self
    }

    pub fn globs(&self) -> &[String] {
        &self.globs
    }

    /// Walk synchronously, stopping after the first error.
    pub fn walk(&self) -> Vec<Result<Entry, PipesetError>> {
        let mut out = Vec::new();
        let walked = self.walk_into(&mut |entry: Entry| {
            out.push(Ok(entry));
            true
        });
        if let Err(err) = walked {
            out.push(Err(err));
        }
        out
    }

    /// Walk into a bounded channel. Blocks while the channel is full and
    /// stops as soon as the receiver is gone.
    fn walk_to(&self, tx: &mpsc::Sender<Result<Entry, PipesetError>>) {
        let walked = self.walk_into(&mut |entry: Entry| tx.blocking_send(Ok(entry)).is_ok());
        if let Err(err) = walked {
            let _ = tx.blocking_send(Err(err));
        }
    }

    fn walk_into(&self, emit: &mut Emit<'_>) -> Result<(), PipesetError> {
        let process_cwd = std::env::current_dir().map_err(|e| PipesetError::io(".", e))?;
        let cwd = match &self.options.cwd {
            Some(cwd) => paths::resolve(&process_cwd, cwd),
            None => process_cwd,
        };
        let cwd_str = cwd.to_string_lossy().into_owned();

        let (negatives, positives): (Vec<&String>, Vec<&String>) =
            self.globs.iter().partition(|g| g.starts_with('!'));

        let mut excluded = GlobSetBuilder::new();
        for glob in &negatives {
            let pattern = absolute_pattern(&cwd_str, &glob[1..]);
            excluded.add(compile(&pattern, glob)?.glob().clone());
        }
        let excluded = excluded.build().map_err(|source| PipesetError::InvalidGlob {
            glob: negatives.iter().map(|g| g.as_str()).collect::<Vec<_>>().join(", "),
            source,
        })?;

        let mut seen = HashSet::new();
        for glob in positives {
            let pattern = absolute_pattern(&cwd_str, glob);
            let matcher = compile(&pattern, glob)?;
            let root = PathBuf::from(glob_parent(&pattern));
            let base = match &self.options.base {
                Some(base) => paths::resolve(&cwd, base),
                None => root.clone(),
            };

            let scan = Scan {
                cwd: &cwd,
                base: &base,
                matcher: &matcher,
                excluded: &excluded,
                read: self.options.read,
            };
            let Some(matched) = scan.walk(&root, max_depth(&pattern), &mut seen, &mut *emit)? else {
                debug!(glob = %glob, "reader went away; walk stopped");
                return Ok(());
            };
            debug!(glob = %glob, matched, "glob resolved");

            if matched == 0 && !is_magic(glob) && !self.options.allow_empty {
                return Err(PipesetError::NoMatch(glob.clone()));
            }
        }
        Ok(())
    }
}

impl Source for GlobSource {
    /// Nothing is walked until the stream is first polled. The walker then
    /// runs on the blocking pool at most [`SOURCE_BUFFER`] entries ahead of
    /// the reader, and stops when the stream is dropped.
    fn open(&self) -> EntryStream {
        let source = self.clone();
        stream::once(async move {
            let (tx, rx) = mpsc::channel(SOURCE_BUFFER);
            let walker = tokio::task::spawn_blocking(move || source.walk_to(&tx));

            // A panicking walker drops the sender; report it after whatever
            // it produced.
            let tail = stream::once(async move {
                let failed: Option<Result<Entry, PipesetError>> = match walker.await {
                    Ok(()) => None,
                    Err(join) => Some(Err(PipesetError::Walk(join.to_string()))),
                };
                failed
            })
            .filter_map(|item| async move { item });

            ReceiverStream::new(rx).chain(tail)
        })
        .flatten()
        .boxed()
    }
}

// ---------------------------------------------------------------------------
// Walking
// ---------------------------------------------------------------------------

struct Scan<'a> {
    cwd:      &'a Path,
    base:     &'a Path,
    matcher:  &'a GlobMatcher,
    excluded: &'a GlobSet,
    read:     bool,
}

impl Scan<'_> {
    /// Emit every match under `root`; returns how many matched, including
    /// matches already produced by an earlier glob. `None` when `emit`
    /// asked to stop.
    fn walk(
        &self,
        root: &Path,
        max_depth: Option<usize>,
        seen: &mut HashSet<PathBuf>,
        emit: &mut Emit<'_>,
    ) -> Result<Option<usize>, PipesetError> {
        if std::fs::symlink_metadata(root).is_err() {
            return Ok(Some(0));
        }

        let mut builder = WalkBuilder::new(root);
        builder
            .standard_filters(false)
            .ignore(false)
            .parents(false)
            .hidden(false)
            .follow_links(false)
            .same_file_system(false)
            .max_depth(max_depth)
            .sort_by_file_name(|a, b| a.cmp(b));

        let mut matched = 0;
        for res in builder.build() {
            let entry = res.map_err(map_ignore_error)?;
            if entry.depth() == 0 {
                continue;
            }

            let path = entry.path();
            if !self.matcher.is_match(path) || self.excluded.is_match(path) {
                continue;
            }
            matched += 1;
            if !seen.insert(path.to_path_buf()) {
                continue;
            }
            if !emit(self.entry(&entry)?) {
                return Ok(None);
            }
        }
        Ok(Some(matched))
    }

    fn entry(&self, found: &DirEntry) -> Result<Entry, PipesetError> {
        let path = found.path();
        let mut entry = Entry::new(self.cwd, self.base, path);

        let kind = match found.file_type() {
            Some(ft) => EntryKind::from_file_type(ft),
            None => EntryKind::Other,
        };
        // Links are reported as-is; only their contents follow the link.
        let is_file = match kind {
            EntryKind::File => true,
            EntryKind::Symlink => std::fs::metadata(path).map(|m| m.is_file()).unwrap_or(false),
            _ => false,
        };

        if self.read && is_file {
            let contents = std::fs::read(path).map_err(|e| PipesetError::io(path, e))?;
            entry.contents = Some(contents);
        }
        Ok(entry)
    }
}

// ---------------------------------------------------------------------------
// Glob helpers
// ---------------------------------------------------------------------------

fn compile(pattern: &str, original: &str) -> Result<GlobMatcher, PipesetError> {
    GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .map(|g| g.compile_matcher())
        .map_err(|source| PipesetError::InvalidGlob {
            glob: original.to_string(),
            source,
        })
}

fn absolute_pattern(cwd: &str, glob: &str) -> String {
    if glob.starts_with('/') {
        paths::change_glob("/", glob)
    } else {
        paths::change_glob(cwd, glob)
    }
}

fn is_magic(segment: &str) -> bool {
    segment.contains(['*', '?', '[', '{'])
}

/// Leading segments of `pattern` up to the first one containing glob
/// syntax. For a plain path, its parent directory.
fn glob_parent(pattern: &str) -> String {
    let segments: Vec<&str> = pattern.split('/').collect();
    let literal = segments.iter().take_while(|s| !is_magic(s)).count();
    let keep = if literal == segments.len() { literal.saturating_sub(1) } else { literal };

    let parent = segments[..keep].join("/");
    if parent.is_empty() { "/".to_string() } else { parent }
}

/// How deep below the glob parent a match can sit. `None` for `**`.
fn max_depth(pattern: &str) -> Option<usize> {
    if pattern.contains("**") {
        return None;
    }
    let parent_len = glob_parent(pattern).split('/').filter(|s| !s.is_empty()).count();
    let total = pattern.split('/').filter(|s| !s.is_empty()).count();
    Some(total.saturating_sub(parent_len))
}

// ---------------------------------------------------------------------------
// Map ignore::Error to PipesetError
// ---------------------------------------------------------------------------

fn map_ignore_error(e: ignore::Error) -> PipesetError {
    match e {
        ignore::Error::WithPath { path, err } => match *err {
            ignore::Error::Io(io_err) => {
                if io_err.kind() == std::io::ErrorKind::PermissionDenied {
                    PipesetError::PermissionDenied(path)
                } else {
                    PipesetError::Io { path, source: io_err }
                }
            }
            other => PipesetError::Walk(other.to_string()),
        },
        ignore::Error::WithDepth { err, .. } => map_ignore_error(*err),
        ignore::Error::Loop { child, .. } => PipesetError::SymlinkLoop(child),
        ignore::Error::Io(io_err) => PipesetError::Io {
            path: PathBuf::new(),
            source: io_err,
        },
        other => PipesetError::Walk(other.to_string()),
    }
}
