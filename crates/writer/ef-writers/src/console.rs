//! Console writer.

use async_trait::async_trait;
use ef_error::{ExportError, Result};
use ef_traits::Writer;
use ef_types::{Compression, OptionSpec, WriteInfo};
use serde_json::{Map, Value};
use std::pin::Pin;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;

type Output = Pin<Box<dyn AsyncWrite + Send>>;

/// Prints every delivered file to stdout, uncompressed.
pub struct ConsoleWriter {
    output: Output,
}

impl ConsoleWriter {
    pub const OPTIONS: &'static [OptionSpec] = &[];

    pub fn new() -> Self {
        Self::with_output(Box::pin(tokio::io::stdout()))
    }

    /// Writer printing to `output` instead of stdout.
    pub fn with_output(output: Output) -> Self {
        Self { output }
    }

    pub fn from_options(options: &Map<String, Value>) -> Result<Self> {
        ef_types::resolve_options("writers.console", Self::OPTIONS, options)?;
        Ok(Self::new())
    }
}

impl Default for ConsoleWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Writer for ConsoleWriter {
    async fn write(&mut self, info: &WriteInfo, _group_membership: &[String]) -> Result<()> {
        if info.compression != Compression::None {
            return Err(ExportError::writer(format!(
                "console writer cannot print {} compressed files",
                info.compression
            )));
        }
        let mut content = tokio::fs::read(&info.file_path).await?;
        if !content.ends_with(b"\n") {
            content.push(b'\n');
        }
        self.output.write_all(&content).await?;
        self.output.flush().await?;
        debug!(records = info.number_of_records, "Printed file");
        Ok(())
    }

    fn compression_override(&self) -> Option<Compression> {
        Some(Compression::None)
    }

    fn name(&self) -> &str {
        "console"
    }
}
