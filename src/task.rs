use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Mutex;
use tracing::info;

use crate::dest::DestSink;
use crate::error::PipesetError;
use crate::paths::change_globs;
use crate::results::{RunStats, TaskReport};
use crate::source::{GlobSource, SrcOptions};
use crate::stage::{drain, exhaust, EntryStreamExt};
use crate::traits::{EntryStream, Sink, Source};

/// Builds the sub-pipeline a task splices between its source and its sink.
pub type BuildFn = Arc<dyn Fn(EntryStream) -> EntryStream + Send + Sync>;

/// A sink shared between the caller and a task.
pub type SharedSink = Arc<Mutex<dyn Sink>>;

// ---------------------------------------------------------------------------
// TaskBuilder
// ---------------------------------------------------------------------------

/// Configuration record for a [`Task`].
///
/// Created via [`pipeset::task()`](crate::task). `src` and `build` are
/// required; [`into_task()`](TaskBuilder::into_task) fails with
/// [`PipesetError::MissingField`] before anything runs when either is absent.
///
/// # Example
///
/// ```rust,ignore
/// let copy = pipeset::task()
///     .name("copy")
///     .src_base("assets")
///     .src(["**/*.txt", "!drafts/**"])
///     .build(|input| input)
///     .dest("dist")
///     .into_task()?;
///
/// let report = copy.run().await?;
/// ```
#[derive(Default)]
pub struct TaskBuilder {
    name:        Option<String>,
    src_base:    Option<String>,
    src:         Option<Vec<String>>,
    src_options: SrcOptions,
    build:       Option<BuildFn>,
    dest:        Option<PathBuf>,
    writable:    Option<SharedSink>,
}

impl TaskBuilder {
    // ── Identity ──────────────────────────────────────────────────────────

    /// Display name reported by [`Task::name`] and in logs.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    // ── Source ────────────────────────────────────────────────────────────

    /// Globs selecting the task's input. Required.
    pub fn src<I, S>(mut self, globs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.src = Some(globs.into_iter().map(Into::into).collect());
        self
    }

    /// Prefix every `src` glob with this path, keeping `!` in front.
    pub fn src_base(mut self, base: impl Into<String>) -> Self {
        self.src_base = Some(base.into());
        self
    }

    pub fn src_options(mut self, options: SrcOptions) -> Self {
        self.src_options = options;
        self
    }

    // ── Pipeline ──────────────────────────────────────────────────────────

    /// The sub-pipeline spliced between source and sink. Required.
    pub fn build<F>(mut self, build: F) -> Self
    where
        F: Fn(EntryStream) -> EntryStream + Send + Sync + 'static,
    {
        self.build = Some(Arc::new(build));
        self
    }

    // ── Sink ──────────────────────────────────────────────────────────────

    /// Write results under `directory`. Takes precedence over
    /// [`writable`](TaskBuilder::writable).
    pub fn dest(mut self, directory: impl Into<PathBuf>) -> Self {
        self.dest = Some(directory.into());
        self
    }

    /// Hand results to a caller-owned sink.
    pub fn writable<S: Sink + 'static>(mut self, sink: Arc<Mutex<S>>) -> Self {
        self.writable = Some(sink as SharedSink);
        self
    }

    // ── Validate ──────────────────────────────────────────────────────────

    /// Validate the configuration and produce the task.
    ///
    /// # Errors
    ///
    /// [`PipesetError::MissingField`] when `src` or `build` was never set.
    pub fn into_task(self) -> Result<Task, PipesetError> {
        let src = self.src.ok_or(PipesetError::MissingField("src"))?;
        let build = self.build.ok_or(PipesetError::MissingField("build"))?;

        let globs = match &self.src_base {
            Some(base) => change_globs(base, &src),
            None => src,
        };

        let output = match (self.dest, self.writable) {
            (Some(dir), _) => Output::Dest(dir),
            (None, Some(sink)) => Output::Writable(sink),
            (None, None) => Output::Drain,
        };

        Ok(Task {
            name: self.name,
            source: GlobSource::new(globs).options(self.src_options),
            build,
            output,
        })
    }
}

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

enum Output {
    Dest(PathBuf),
    Writable(SharedSink),
    Drain,
}

/// A validated, reusable pipeline: source, spliced build, sink.
pub struct Task {
    name:   Option<String>,
    source: GlobSource,
    build:  BuildFn,
    output: Output,
}

impl Task {
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The globs this task reads, after `src_base` prefixing.
    pub fn globs(&self) -> &[String] {
        self.source.globs()
    }

    /// The source spliced through `build`, without the sink.
    pub fn stream(&self) -> EntryStream {
        let build = Arc::clone(&self.build);
        self.source.open().splice(move |input| build(input))
    }

    /// Run the whole pipeline once.
    ///
    /// # Errors
    ///
    /// The first error raised anywhere in the pipeline. Entries already
    /// written stay written.
    pub async fn run(&self) -> Result<TaskReport, PipesetError> {
        let name = self.name.as_deref().unwrap_or("<anonymous>");
        info!(task = name, globs = ?self.source.globs(), "task started");
        let start = Instant::now();

        let stream = self.stream();
        let entries = match &self.output {
            Output::Dest(dir) => {
                let mut sink = DestSink::new(dir);
                drain(stream, &mut sink).await?
            }
            Output::Writable(sink) => {
                let mut sink = sink.lock().await;
                drain(stream, &mut *sink).await?
            }
            Output::Drain => exhaust(stream).await?,
        };

        let duration = start.elapsed();
        info!(task = name, entries, elapsed_ms = duration.as_millis() as u64, "task finished");

        Ok(TaskReport {
            name: self.name.clone(),
            entries,
            stats: RunStats::compute(entries, duration),
        })
    }
}
