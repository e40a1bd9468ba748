use std::path::PathBuf;

use async_trait::async_trait;
use tracing::debug;

use crate::entry::{Entry, EntryKind};
use crate::error::PipesetError;
use crate::paths;
use crate::traits::Sink;

/// Writes entries under a destination directory, keyed by their
/// `base`-relative path.
///
/// Created via [`pipeset::dest()`](crate::dest). Entries with contents are
/// written out; directory entries become directories; file entries without
/// contents are copied from their current `path`.
pub struct DestSink {
    directory: PathBuf,
    written:   usize,
}

impl DestSink {
    /// `directory` may be relative; it is resolved against each entry's
    /// `cwd`.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            written:   0,
        }
    }

    pub fn written(&self) -> usize {
        self.written
    }

    pub fn target(&self, entry: &Entry) -> PathBuf {
        paths::link_path(&self.directory, &entry.cwd, &entry.base, &entry.path)
    }
}

#[async_trait]
impl Sink for DestSink {
    async fn write(&mut self, entry: Entry) -> Result<(), PipesetError> {
        let target = self.target(&entry);

        match &entry.contents {
            Some(contents) => {
                create_parent(&target).await?;
                tokio::fs::write(&target, contents)
                    .await
                    .map_err(|e| PipesetError::io(&target, e))?;
            }
            None => match EntryKind::of(&entry.path).await {
                Ok(EntryKind::Dir) => {
                    tokio::fs::create_dir_all(&target)
                        .await
                        .map_err(|e| PipesetError::io(&target, e))?;
                }
                Ok(_) => {
                    create_parent(&target).await?;
                    tokio::fs::copy(&entry.path, &target)
                        .await
                        .map_err(|e| PipesetError::io(&entry.path, e))?;
                }
                Err(e) => return Err(PipesetError::io(&entry.path, e)),
            },
        }

        debug!(target = %target.display(), "entry written");
        self.written += 1;
        Ok(())
    }
}

async fn create_parent(target: &std::path::Path) -> Result<(), PipesetError> {
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| PipesetError::io(parent, e))?;
    }
    Ok(())
}
