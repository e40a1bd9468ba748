//! Inserting a sub-pipeline as a single stage.
//!
//! A [`Splice`] owns two endpoints. The producer endpoint is an unbounded
//! queue that the outer pipeline writes into and the sub-pipeline reads
//! from. The consumer endpoint is a task that drains the sub-pipeline's
//! output into the splice's own output queue and, once the sub-pipeline is
//! exhausted, fires a one-shot completion signal. The splice's output only
//! ends after that signal arrives, so downstream stages never observe the
//! end of the stream before the nested pipeline has finished.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, warn};

use crate::entry::Entry;
use crate::error::PipesetError;
use crate::traits::EntryStream;

/// Backlog size above which a warning is logged once per splice.
pub const HIGH_WATER_MARK: usize = 4096;

type Item = Result<Entry, PipesetError>;

/// Wrap `build` so it can be inserted as one stage of a larger pipeline.
///
/// `build` receives the stream of entries submitted to the splice and
/// returns the sub-pipeline's output. It runs immediately on a spawned
/// task, so this must be called from within a Tokio runtime.
///
/// # Example
///
/// ```rust
/// use futures::StreamExt;
/// use pipeset::{insert_pipe, map, Entry, EntryStreamExt, Source};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), pipeset::PipesetError> {
/// let entries = vec![Entry::new("/w", "/w", "/w/a.txt")];
///
/// let splice = insert_pipe(|input| {
///     input.through(map(|mut e: Entry| {
///         e.path.set_extension("md");
///         Ok(e)
///     }))
/// });
///
/// let out: Vec<_> = splice.pipe(entries.open()).collect().await;
/// assert_eq!(out[0].as_ref().unwrap().path.to_str(), Some("/w/a.md"));
/// # Ok(())
/// # }
/// ```
pub fn insert_pipe<F>(build: F) -> Splice
where
    F: FnOnce(EntryStream) -> EntryStream + Send + 'static,
{
    Splice::new(build)
}

/// A sub-pipeline presented as a single duplex stage.
///
/// Feed it with [`submit`](Splice::submit) and [`finish`](Splice::finish)
/// and read it through [`into_stream`](Splice::into_stream), or hand it a
/// whole upstream with [`pipe`](Splice::pipe). To write and read at the
/// same time, [`split`](Splice::split) it.
pub struct Splice {
    input:      SpliceInput,
    output:     mpsc::UnboundedReceiver<Entry>,
    completion: oneshot::Receiver<Result<(), PipesetError>>,
}

/// The writable half of a [`Splice`].
///
/// Dropping it closes the sub-pipeline's input, like
/// [`finish`](SpliceInput::finish).
pub struct SpliceInput {
    intake:  Option<Intake>,
    pending: Arc<AtomicUsize>,
}

impl SpliceInput {
    /// Hand one entry to the sub-pipeline.
    ///
    /// Never waits: the producer endpoint is unbounded. Fails with
    /// [`PipesetError::SpliceClosed`] after [`finish`](SpliceInput::finish)
    /// or once the sub-pipeline has stopped reading.
    pub fn submit(&mut self, entry: Entry) -> Result<(), PipesetError> {
        self.intake
            .as_mut()
            .ok_or(PipesetError::SpliceClosed)?
            .push(Ok(entry))
    }

    /// Signal that no more input will arrive.
    ///
    /// The splice's output still runs until the sub-pipeline completes.
    pub fn finish(&mut self) {
        self.intake = None;
    }

    /// Entries submitted but not yet read by the sub-pipeline.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Relaxed)
    }
}

/// The producer endpoint.
struct Intake {
    producer: mpsc::UnboundedSender<Item>,
    pending:  Arc<AtomicUsize>,
    warned:   bool,
}

impl Intake {
    fn push(&mut self, item: Item) -> Result<(), PipesetError> {
        let backlog = self.pending.fetch_add(1, Ordering::Relaxed) + 1;
        if self.producer.send(item).is_err() {
            self.pending.fetch_sub(1, Ordering::Relaxed);
            return Err(PipesetError::SpliceClosed);
        }
        if backlog > HIGH_WATER_MARK && !self.warned {
            self.warned = true;
            warn!(backlog, "splice input is not being consumed; buffering without bound");
        }
        Ok(())
    }
}

impl Splice {
    fn new<F>(build: F) -> Self
    where
        F: FnOnce(EntryStream) -> EntryStream + Send + 'static,
    {
        let (producer, intake) = mpsc::unbounded_channel::<Item>();
        let (emit, output) = mpsc::unbounded_channel::<Entry>();
        let (done, completion) = oneshot::channel();
        let pending = Arc::new(AtomicUsize::new(0));

        let backlog = Arc::clone(&pending);
        let input = UnboundedReceiverStream::new(intake)
            .inspect(move |_| {
                backlog.fetch_sub(1, Ordering::Relaxed);
            })
            .boxed();

        tokio::spawn(async move {
            let mut nested = build(input);
            let mut result: Result<(), PipesetError> = Ok(());
            let mut emitted = 0usize;

            while let Some(item) = nested.next().await {
                match item {
                    Ok(entry) => {
                        // The outer side went away; nobody is left to read.
                        if emit.send(entry).is_err() {
                            break;
                        }
                        emitted += 1;
                    }
                    Err(err) => {
                        result = Err(err);
                        break;
                    }
                }
            }

            debug!(emitted, ok = result.is_ok(), "nested pipeline completed");
            let _ = done.send(result);
        });

        Self {
            input: SpliceInput {
                intake: Some(Intake {
                    producer,
                    pending: Arc::clone(&pending),
                    warned: false,
                }),
                pending,
            },
            output,
            completion,
        }
    }

    /// See [`SpliceInput::submit`].
    pub fn submit(&mut self, entry: Entry) -> Result<(), PipesetError> {
        self.input.submit(entry)
    }

    /// See [`SpliceInput::finish`].
    pub fn finish(&mut self) {
        self.input.finish();
    }

    /// Entries submitted but not yet read by the sub-pipeline.
    pub fn pending(&self) -> usize {
        self.input.pending()
    }

    /// Separate the input from the output so entries can be submitted
    /// while earlier results are read.
    pub fn split(self) -> (SpliceInput, EntryStream) {
        (self.input, output_stream(self.output, self.completion))
    }

    /// The splice's output. Consuming the splice closes its input.
    ///
    /// Yields the sub-pipeline's entries in the order it produced them and
    /// ends only after the consumer endpoint signals completion. If the
    /// sub-pipeline failed, its error is the last item; if it panicked, the
    /// last item is [`PipesetError::SubPipelineAborted`].
    pub fn into_stream(self) -> EntryStream {
        output_stream(self.output, self.completion)
    }

    /// Feed all of `upstream` into the sub-pipeline and return the output.
    ///
    /// Upstream errors are forwarded into the sub-pipeline in order, where
    /// they end it like any other error.
    pub fn pipe(self, mut upstream: EntryStream) -> EntryStream {
        if let Some(mut intake) = self.input.intake {
            tokio::spawn(async move {
                while let Some(item) = upstream.next().await {
                    let failed = item.is_err();
                    if intake.push(item).is_err() || failed {
                        break;
                    }
                }
            });
        }
        output_stream(self.output, self.completion)
    }
}

fn output_stream(
    output: mpsc::UnboundedReceiver<Entry>,
    completion: oneshot::Receiver<Result<(), PipesetError>>,
) -> EntryStream {
    let entries = UnboundedReceiverStream::new(output).map(Ok::<Entry, PipesetError>);
    let tail = stream::once(async move {
        match completion.await {
            Ok(Ok(())) => None,
            Ok(Err(err)) => Some(Err(err)),
            Err(_) => Some(Err(PipesetError::SubPipelineAborted)),
        }
    })
    .filter_map(|item| async move { item });

    entries.chain(tail).boxed()
}
