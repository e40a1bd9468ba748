//! A destination that mirrors the incoming tree as symbolic links.
//!
//! Linking runs in two phases. While entries stream in, every non-directory
//! entry is linked immediately and every directory is queued. Once the
//! stream ends, the queue is revisited in arrival order: a directory whose
//! mirror location is still free and which is itself a symbolic link gets
//! one link for the whole directory. Plain directories are never mirrored;
//! the ancestors created for file links form the destination skeleton.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::entry::{Entry, EntryInfo, EntryKind};
use crate::error::PipesetError;
use crate::paths;
use crate::traits::Sink;

/// Mirrors entries under a destination directory as relative symlinks.
///
/// Created via [`pipeset::dest_symlink()`](crate::dest_symlink).
pub struct SymlinkSink {
    directory: PathBuf,
    force:     bool,
    queue:     Vec<EntryInfo>,
    linked:    usize,
    skipped:   usize,
}

impl SymlinkSink {
    /// `directory` may be relative; it is resolved against each entry's
    /// `cwd`.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            force:     false,
            queue:     Vec::new(),
            linked:    0,
            skipped:   0,
        }
    }

    /// Replace whatever already exists at a file's mirror location.
    ///
    /// Off by default, in which case an existing destination wins.
    pub fn force(mut self, yes: bool) -> Self {
        self.force = yes;
        self
    }

    /// Directories waiting for the second phase, in arrival order.
    pub fn queued(&self) -> &[EntryInfo] {
        &self.queue
    }

    /// Links created so far.
    pub fn linked(&self) -> usize {
        self.linked
    }

    /// Entries left alone because their mirror location was taken.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Where `entry` is mirrored.
    pub fn link_path(&self, entry: &EntryInfo) -> PathBuf {
        paths::link_path(&self.directory, &entry.cwd, &entry.base, &entry.path)
    }

    // ── Phase one ─────────────────────────────────────────────────────────

    /// Link a non-directory entry now, or queue a directory for
    /// [`settle_directories`](SymlinkSink::settle_directories).
    ///
    /// The kind is taken from `stat`, so a symlink to a directory is queued
    /// like a directory.
    pub async fn link_entry(&mut self, entry: EntryInfo) -> Result<(), PipesetError> {
        let kind = EntryKind::of(&entry.path)
            .await
            .map_err(|e| PipesetError::io(&entry.path, e))?;

        if kind == EntryKind::Dir {
            debug!(path = %entry.path.display(), "directory queued");
            self.queue.push(entry);
            return Ok(());
        }

        let link = self.link_path(&entry);
        if !self.force && exists(&link).await? {
            debug!(link = %link.display(), "destination exists; skipping");
            self.skipped += 1;
            return Ok(());
        }

        create_symlink(&link, &entry.path, kind).await?;
        self.linked += 1;
        Ok(())
    }

    // ── Phase two ─────────────────────────────────────────────────────────

    /// Link every queued directory that is itself a symbolic link and whose
    /// mirror location is still free, in arrival order. Empties the queue.
    pub async fn settle_directories(&mut self) -> Result<(), PipesetError> {
        let queue = std::mem::take(&mut self.queue);

        for dir in queue {
            let link = self.link_path(&dir);
            if exists(&link).await? {
                self.skipped += 1;
                continue;
            }

            let meta = tokio::fs::symlink_metadata(&dir.path)
                .await
                .map_err(|e| PipesetError::io(&dir.path, e))?;
            if meta.file_type().is_symlink() {
                create_symlink(&link, &dir.path, EntryKind::Dir).await?;
                self.linked += 1;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Sink for SymlinkSink {
    async fn write(&mut self, entry: Entry) -> Result<(), PipesetError> {
        self.link_entry(entry.info()).await
    }

    async fn finish(&mut self) -> Result<(), PipesetError> {
        self.settle_directories().await
    }
}

// ---------------------------------------------------------------------------
// Filesystem helpers
// ---------------------------------------------------------------------------

/// Whether `path` resolves to something. A dangling link counts as absent.
async fn exists(path: &Path) -> Result<bool, PipesetError> {
    tokio::fs::try_exists(path)
        .await
        .map_err(|e| PipesetError::io(path, e))
}

/// Create `link` pointing at `original` through a path relative to the
/// link's own directory, creating missing ancestors and replacing whatever
/// is already at `link`.
async fn create_symlink(link: &Path, original: &Path, kind: EntryKind) -> Result<(), PipesetError> {
    let parent = link.parent().unwrap_or_else(|| Path::new("/"));
    tokio::fs::create_dir_all(parent)
        .await
        .map_err(|e| PipesetError::io(parent, e))?;

    remove_existing(link)
        .await
        .map_err(|e| PipesetError::io(link, e))?;

    let target = paths::relative(parent, original);
    symlink(&target, link, kind)
        .await
        .map_err(|e| PipesetError::io(link, e))?;

    debug!(link = %link.display(), target = %target.display(), "link created");
    Ok(())
}

async fn remove_existing(path: &Path) -> io::Result<()> {
    match tokio::fs::symlink_metadata(path).await {
        Ok(meta) if meta.is_dir() => tokio::fs::remove_dir_all(path).await,
        Ok(_) => tokio::fs::remove_file(path).await,
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(unix)]
async fn symlink(target: &Path, link: &Path, _kind: EntryKind) -> io::Result<()> {
    tokio::fs::symlink(target, link).await
}

#[cfg(windows)]
async fn symlink(target: &Path, link: &Path, kind: EntryKind) -> io::Result<()> {
    match kind {
        EntryKind::Dir => tokio::fs::symlink_dir(target, link).await,
        _ => tokio::fs::symlink_file(target, link).await,
    }
}
