//! Destination writer trait.

use crate::reader::ReadStream;
use async_trait::async_trait;
use ef_error::{ExportError, Result};
use ef_types::{Compression, WriteInfo};

/// Trait for destination writers.
///
/// A writer receives packed buffer files and delivers them. Buffering,
/// thresholds and the items limit are handled by the generic buffered
/// writer that owns it; implementations only deal with the destination.
///
/// After [`write`](Writer::write) returns `Ok`, the writer is responsible
/// for the artifact and the caller deletes the local file.
#[async_trait]
pub trait Writer: Send {
    /// Delivers one packed file.
    ///
    /// `group_keys` are the group's path-safe keys: membership values that
    /// cannot appear in a path are replaced by random tokens.
    async fn write(&mut self, info: &WriteInfo, group_keys: &[String]) -> Result<()>;

    /// Verifies every delivered file against the destination.
    ///
    /// Fails with [`ExportError::InconsistentWriteState`] naming the
    /// offending destination.
    async fn check_write_consistency(&mut self) -> Result<()> {
        Err(ExportError::config(format!(
            "writer {} does not support consistency checks",
            self.name()
        )))
    }

    /// Runs after all files were delivered (and checked, if enabled).
    async fn finish(&mut self) -> Result<()> {
        Ok(())
    }

    /// Returns true if the writer implements [`write_stream`](Writer::write_stream).
    fn supports_write_stream(&self) -> bool {
        false
    }

    /// Forwards a raw byte stream to the destination under its own name.
    async fn write_stream(&mut self, stream: ReadStream) -> Result<()> {
        Err(ExportError::config(format!(
            "writer {} does not support write_stream (got {})",
            self.name(),
            stream.info.filename
        )))
    }

    /// Compression the writer imposes regardless of configuration.
    fn compression_override(&self) -> Option<Compression> {
        None
    }

    /// Releases destination resources.
    async fn close(&mut self) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &str;
}
