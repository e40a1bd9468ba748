//! # pipeset
//!
//! Adapters for object-stream build pipelines.
//!
//! A pipeline is an [`EntryStream`]: an ordered, finite stream of file
//! records ([`Entry`]) that stages consume and re-emit. pipeset supplies the
//! pieces that glue such pipelines together:
//!
//! - [`insert_pipe`] splices a whole sub-pipeline in as a single stage,
//!   holding back the end of the stream until the sub-pipeline is done.
//! - [`dest_symlink`] mirrors the incoming tree as relative symbolic links.
//! - [`task`] composes a glob source, a spliced build function and a
//!   destination into a reusable [`Task`].
//! - [`BundleTransform`] and [`TemplateTransform`] adapt external bundlers
//!   and template compilers to the same streaming contract.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use pipeset::{map, Entry, EntryStreamExt};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), pipeset::PipesetError> {
//! let copy = pipeset::task()
//!     .name("copy")
//!     .src(["assets/**/*.txt", "!assets/drafts/**"])
//!     .build(|input| {
//!         input.through(map(|mut entry: Entry| {
//!             entry.path.set_extension("md");
//!             Ok(entry)
//!         }))
//!     })
//!     .dest("dist")
//!     .into_task()?;
//!
//! let report = copy.run().await?;
//! println!("{} entries in {:.3}s", report.entries, report.stats.duration.as_secs_f64());
//! # Ok(())
//! # }
//! ```
//!
//! # Mirroring as symlinks
//!
//! ```rust,no_run
//! use pipeset::{drain, Source};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), pipeset::PipesetError> {
//! let mut sink = pipeset::dest_symlink("dist");
//! drain(pipeset::src(["src/**"]).open(), &mut sink).await?;
//! println!("{} links", sink.linked());
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

pub mod bundle;
pub mod paths;
pub mod template;

mod cache;
mod dest;
mod entry;
mod error;
mod results;
mod source;
mod splice;
mod stage;
mod symlink;
mod task;
mod traits;

// ── Public re-exports ─────────────────────────────────────────────────────────

pub use bundle::{Bundle, BundleRequest, BundleTransform, Bundler, Chunk, OutputOptions};
pub use cache::BundleCache;
pub use dest::DestSink;
pub use entry::{Entry, EntryInfo, EntryKind};
pub use error::{ErrorKind, PipesetError, Result};
pub use paths::{change_glob, change_globs};
pub use results::{RunStats, TaskReport};
pub use source::{GlobSource, SrcOptions, SOURCE_BUFFER};
pub use splice::{insert_pipe, Splice, SpliceInput};
pub use stage::{drain, exhaust, map, through, EntryStreamExt, Map};
pub use symlink::SymlinkSink;
pub use task::{BuildFn, SharedSink, Task, TaskBuilder};
pub use template::{TemplateEngine, TemplateTransform};
pub use traits::{EntryStream, Sink, Source, Transform};

// ── Entry points ──────────────────────────────────────────────────────────────

/// Create a new [`TaskBuilder`].
pub fn task() -> TaskBuilder {
    TaskBuilder::default()
}

/// Enumerate the entries matched by `globs`. See [`GlobSource`].
pub fn src<I, S>(globs: I) -> GlobSource
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    GlobSource::new(globs)
}

/// Write entries under `directory`. See [`DestSink`].
pub fn dest(directory: impl Into<std::path::PathBuf>) -> DestSink {
    DestSink::new(directory)
}

/// Mirror entries under `directory` as symbolic links. See [`SymlinkSink`].
pub fn dest_symlink(directory: impl Into<std::path::PathBuf>) -> SymlinkSink {
    SymlinkSink::new(directory)
}
