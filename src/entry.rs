use std::fs::FileType;
use std::path::{Path, PathBuf};

use crate::paths;

/// A single file record flowing through a pipeline.
///
/// `cwd`, `base` and `path` are absolute. `cwd` is the directory the glob
/// that produced the record was resolved from (not necessarily the process
/// working directory), `base` is the root of the matched glob and `path` is
/// the record's current location. Stages take ownership of an entry, may
/// rewrite `path` and `contents`, and hand it downstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Working directory the record's glob was resolved from.
    pub cwd: PathBuf,

    /// Root of the matched glob. Output paths are computed relative to it.
    pub base: PathBuf,

    /// Absolute path of the record.
    pub path: PathBuf,

    /// File contents. `None` for directories and for sources opened with
    /// `read(false)`.
    pub contents: Option<Vec<u8>>,

    /// Source map attached by a transformation engine, if any.
    pub source_map: Option<String>,
}

impl Entry {
    pub fn new(
        cwd: impl Into<PathBuf>,
        base: impl Into<PathBuf>,
        path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            cwd:        cwd.into(),
            base:       base.into(),
            path:       path.into(),
            contents:   None,
            source_map: None,
        }
    }

    pub fn with_contents(mut self, contents: impl Into<Vec<u8>>) -> Self {
        self.contents = Some(contents.into());
        self
    }

    /// `path` relative to `base`.
    pub fn relative(&self) -> PathBuf {
        paths::relative(&self.base, &self.path)
    }

    pub fn is_null(&self) -> bool {
        self.contents.is_none()
    }

    /// The location triple without contents, handed to user callbacks.
    pub fn info(&self) -> EntryInfo {
        EntryInfo {
            cwd:  self.cwd.clone(),
            base: self.base.clone(),
            path: self.path.clone(),
        }
    }
}

/// The `{cwd, base, path}` triple of an [`Entry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    pub cwd:  PathBuf,
    pub base: PathBuf,
    pub path: PathBuf,
}

impl EntryInfo {
    pub fn relative(&self) -> PathBuf {
        paths::relative(&self.base, &self.path)
    }
}

/// What an entry's path refers to on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// A regular file.
    File,

    /// A directory.
    Dir,

    /// A symbolic link (only reported when links are not followed).
    Symlink,

    /// Anything else (device files, pipes, sockets, etc.).
    Other,
}

impl EntryKind {
    pub(crate) fn from_file_type(ft: FileType) -> Self {
        if ft.is_dir() {
            Self::Dir
        } else if ft.is_file() {
            Self::File
        } else if ft.is_symlink() {
            Self::Symlink
        } else {
            Self::Other
        }
    }

    /// Kind of `path` after following symlinks.
    pub async fn of(path: &Path) -> std::io::Result<Self> {
        let meta = tokio::fs::metadata(path).await?;
        Ok(Self::from_file_type(meta.file_type()))
    }
}
