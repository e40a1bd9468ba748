use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};

use crate::entry::Entry;
use crate::error::PipesetError;

/// An ordered, finite, lazily produced sequence of entries.
///
/// Errors travel in-band. The first `Err` ends a run; stages forward it and
/// stop reading their input.
pub type EntryStream = BoxStream<'static, Result<Entry, PipesetError>>;

/// A provider of entries, such as a glob enumerator.
///
/// `open()` may be called more than once; every call starts a fresh
/// enumeration.
pub trait Source: Send + Sync {
    fn open(&self) -> EntryStream;
}

impl Source for Vec<Entry> {
    fn open(&self) -> EntryStream {
        stream::iter(self.clone().into_iter().map(Ok)).boxed()
    }
}

/// A pipeline stage that turns each entry into zero or more entries.
///
/// Calls never overlap: `transform` is awaited to completion before the
/// next entry is read, and `flush` runs once after the input ends.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use pipeset::{Entry, PipesetError, Transform};
///
/// struct Uppercase;
///
/// #[async_trait]
/// impl Transform for Uppercase {
///     async fn transform(&mut self, mut entry: Entry) -> Result<Vec<Entry>, PipesetError> {
///         if let Some(bytes) = entry.contents.as_mut() {
///             bytes.make_ascii_uppercase();
///         }
///         Ok(vec![entry])
///     }
/// }
/// ```
#[async_trait]
pub trait Transform: Send {
    async fn transform(&mut self, entry: Entry) -> Result<Vec<Entry>, PipesetError>;

    /// Emit anything held back until the end of the stream.
    async fn flush(&mut self) -> Result<Vec<Entry>, PipesetError> {
        Ok(Vec::new())
    }
}

/// A terminal stage.
///
/// `write` is called once per entry in stream order and `finish` once after
/// the last entry. `finish` is not called when the stream ends in an error.
#[async_trait]
pub trait Sink: Send {
    async fn write(&mut self, entry: Entry) -> Result<(), PipesetError>;

    async fn finish(&mut self) -> Result<(), PipesetError> {
        Ok(())
    }
}
