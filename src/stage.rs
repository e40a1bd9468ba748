use std::collections::VecDeque;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};

use crate::entry::Entry;
use crate::error::PipesetError;
use crate::splice::insert_pipe;
use crate::traits::{EntryStream, Sink, Transform};

// ---------------------------------------------------------------------------
// Chaining
// ---------------------------------------------------------------------------

/// `.pipe()`-style chaining on [`EntryStream`].
pub trait EntryStreamExt {
    /// Feed the stream through `transform`.
    fn through<T: Transform + 'static>(self, transform: T) -> EntryStream;

    /// Insert a sub-pipeline as a single stage. See [`insert_pipe`].
    fn splice<F>(self, build: F) -> EntryStream
    where
        F: FnOnce(EntryStream) -> EntryStream + Send + 'static;
}

impl EntryStreamExt for EntryStream {
    fn through<T: Transform + 'static>(self, transform: T) -> EntryStream {
        through(self, transform)
    }

    fn splice<F>(self, build: F) -> EntryStream
    where
        F: FnOnce(EntryStream) -> EntryStream + Send + 'static,
    {
        insert_pipe(build).pipe(self)
    }
}

enum Phase {
    Reading,
    Done,
}

struct Through<T> {
    input:     EntryStream,
    transform: T,
    ready:     VecDeque<Entry>,
    phase:     Phase,
}

/// Run every entry of `input` through `transform`, one at a time.
///
/// Outputs keep the order they were produced in. `flush` runs once when the
/// input is exhausted. An `Err`, whether read from `input` or returned by
/// the transform, is emitted after the entries already produced and ends
/// the stage.
pub fn through<T: Transform + 'static>(input: EntryStream, transform: T) -> EntryStream {
    let state = Through {
        input,
        transform,
        ready: VecDeque::new(),
        phase: Phase::Reading,
    };

    stream::unfold(state, |mut st| async move {
        loop {
            if let Some(entry) = st.ready.pop_front() {
                return Some((Ok(entry), st));
            }
            if let Phase::Done = st.phase {
                return None;
            }

            let produced = match st.input.next().await {
                Some(Ok(entry)) => st.transform.transform(entry).await,
                Some(Err(err)) => Err(err),
                None => {
                    st.phase = Phase::Done;
                    st.transform.flush().await
                }
            };

            match produced {
                Ok(entries) => st.ready.extend(entries),
                Err(err) => {
                    st.phase = Phase::Done;
                    return Some((Err(err), st));
                }
            }
        }
    })
    .boxed()
}

// ---------------------------------------------------------------------------
// Draining
// ---------------------------------------------------------------------------

/// Write every entry of `input` into `sink`, then finish it.
///
/// Stops at the first error; entries already written stay written. Returns
/// the number of entries written.
pub async fn drain<S: Sink + ?Sized>(mut input: EntryStream, sink: &mut S) -> Result<usize, PipesetError> {
    let mut written = 0;
    while let Some(item) = input.next().await {
        sink.write(item?).await?;
        written += 1;
    }
    sink.finish().await?;
    Ok(written)
}

/// Consume `input` without writing anything, returning how many entries it
/// produced.
pub async fn exhaust(mut input: EntryStream) -> Result<usize, PipesetError> {
    let mut seen = 0;
    while let Some(item) = input.next().await {
        item?;
        seen += 1;
    }
    Ok(seen)
}

// ---------------------------------------------------------------------------
// Closure adapters
// ---------------------------------------------------------------------------

/// A [`Transform`] that maps each entry to exactly one entry.
///
/// Created by [`map()`].
pub struct Map<F> {
    f: F,
}

/// Build a one-to-one transform from a closure.
///
/// ```rust
/// use pipeset::{map, Entry};
///
/// let rename = map(|mut entry: Entry| {
///     entry.path.set_extension("txt");
///     Ok(entry)
/// });
/// # let _ = rename;
/// ```
pub fn map<F>(f: F) -> Map<F>
where
    F: FnMut(Entry) -> Result<Entry, PipesetError> + Send,
{
    Map { f }
}

#[async_trait]
impl<F> Transform for Map<F>
where
    F: FnMut(Entry) -> Result<Entry, PipesetError> + Send,
{
    async fn transform(&mut self, entry: Entry) -> Result<Vec<Entry>, PipesetError> {
        Ok(vec![(self.f)(entry)?])
    }
}
