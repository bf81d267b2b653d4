//! Resumable reader trait and raw read streams.

use async_trait::async_trait;
use ef_error::{ExportError, Result};
use ef_types::Record;
use serde_json::Value;
use std::fmt;
use std::pin::Pin;
use tokio::io::AsyncRead;

/// Boxed async byte source.
pub type ByteStream = Pin<Box<dyn AsyncRead + Send + Sync>>;

/// Description of one raw input unit that a reader can expose as bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamInfo {
    /// Name of the unit; unique within one reader
    pub filename: String,

    /// Size in bytes, when known up front
    pub size: Option<u64>,
}

/// An opened raw input unit.
pub struct ReadStream {
    pub info: StreamInfo,
    pub reader: ByteStream,
}

impl fmt::Debug for ReadStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadStream")
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

/// Trait for resumable record sources.
///
/// A reader produces batches until [`is_finished`](Reader::is_finished)
/// reports true. An empty batch does not mean the reader is finished.
///
/// Positions are opaque JSON values understood only by the reader that
/// produced them. After [`set_last_position`](Reader::set_last_position) the
/// reader must yield exactly the input that followed that position.
#[async_trait]
pub trait Reader: Send {
    /// Fetches the next batch of records (possibly empty).
    async fn get_next_batch(&mut self) -> Result<Vec<Record>>;

    /// Returns true once all input has been consumed.
    fn is_finished(&self) -> bool;

    /// Returns the position after the last record yielded.
    fn get_last_position(&self) -> Value;

    /// Seeds the reader from a checkpointed position (`None` = start).
    fn set_last_position(&mut self, position: Option<Value>) -> Result<()>;

    /// Returns true if the reader implements the raw stream methods.
    fn supports_read_streams(&self) -> bool {
        false
    }

    /// Lists the raw input units.
    async fn get_read_streams(&mut self) -> Result<Vec<StreamInfo>> {
        Err(ExportError::config("reader does not support read streams"))
    }

    /// Opens one raw input unit for reading.
    async fn open_read_stream(&mut self, info: &StreamInfo) -> Result<ReadStream> {
        Err(ExportError::config(format!(
            "reader does not support read streams (requested {})",
            info.filename
        )))
    }
}
