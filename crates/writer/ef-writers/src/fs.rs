//! Local filesystem writer.

use crate::delivered::DeliveredFile;
use crate::filebase::{FileCounters, Filebase};
use async_trait::async_trait;
use ef_buffer::hash_file;
use ef_error::{ExportError, Result};
use ef_traits::{ReadStream, Writer};
use ef_types::{OptionKind, OptionSpec, WriteInfo};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::io;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
struct FsWriterOptions {
    filebase: String,
}

/// Copies packed files under a filebase, e.g.
/// `/exports/{groups[0]}/%Y%m%d_` → `/exports/ES/20240309_0.jl.gz`.
///
/// File numbers count up per rendered filebase and skip names that already
/// exist on disk.
pub struct FsWriter {
    filebase: Filebase,
    counters: FileCounters,
    delivered: Vec<DeliveredFile>,
}

impl FsWriter {
    pub const OPTIONS: &'static [OptionSpec] =
        &[OptionSpec::required("filebase", OptionKind::String)];

    pub fn new(filebase: Filebase) -> Self {
        Self {
            filebase,
            counters: FileCounters::default(),
            delivered: Vec::new(),
        }
    }

    pub fn from_options(options: &Map<String, Value>) -> Result<Self> {
        let opts: FsWriterOptions = ef_types::parse_options("writers.fs", Self::OPTIONS, options)?;
        Ok(Self::new(Filebase::new(opts.filebase)?))
    }

    pub fn delivered(&self) -> &[DeliveredFile] {
        &self.delivered
    }
}

async fn ensure_dir(dir: &str) -> Result<()> {
    if !dir.is_empty() {
        tokio::fs::create_dir_all(dir).await.map_err(|e| {
            ExportError::writer(format!("cannot create directory {dir}: {e}"))
        })?;
    }
    Ok(())
}

fn basename(filename: &str) -> &str {
    filename.rsplit('/').next().unwrap_or(filename)
}

#[async_trait]
impl Writer for FsWriter {
    async fn write(&mut self, info: &WriteInfo, group_keys: &[String]) -> Result<()> {
        let rendered = self.filebase.render(group_keys)?;
        ensure_dir(&rendered.dir).await?;

        let extension = info.full_extension();
        let number = self.counters.next(&rendered.file(""), |n| {
            Path::new(&rendered.file(&format!("{n}.{extension}"))).exists()
        });
        let destination = rendered.file(&format!("{number}.{extension}"));

        tokio::fs::copy(&info.file_path, &destination)
            .await
            .map_err(|e| ExportError::writer(format!("cannot write {destination}: {e}")))?;
        debug!(destination = %destination, records = info.number_of_records, "Wrote file");
        self.delivered.push(DeliveredFile::new(destination, info));
        Ok(())
    }

    async fn check_write_consistency(&mut self) -> Result<()> {
        for file in &self.delivered {
            let metadata = match tokio::fs::metadata(&file.destination).await {
                Ok(metadata) => metadata,
                Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(file.missing()),
                Err(e) => return Err(e.into()),
            };
            file.check_size(metadata.len())?;
            if let Some(algorithm) = file.hash_algorithm() {
                file.check_hash(&hash_file(Path::new(&file.destination), algorithm)?)?;
            }
        }
        info!(files = self.delivered.len(), "Checked written files");
        Ok(())
    }

    fn supports_write_stream(&self) -> bool {
        true
    }

    async fn write_stream(&mut self, mut stream: ReadStream) -> Result<()> {
        let dir = self.filebase.render(&[])?.as_dir();
        ensure_dir(&dir).await?;
        let destination: PathBuf =
            Path::new(&dir).join(basename(&stream.info.filename));

        let mut file = tokio::fs::File::create(&destination).await.map_err(|e| {
            ExportError::writer(format!("cannot create {}: {e}", destination.display()))
        })?;
        let bytes = tokio::io::copy(&mut stream.reader, &mut file).await?;
        file.flush().await?;
        debug!(destination = %destination.display(), bytes, "Wrote stream");
        Ok(())
    }

    fn name(&self) -> &str {
        "fs"
    }
}
