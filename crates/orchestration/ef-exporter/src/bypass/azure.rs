//! Bucket-to-Azure object copy.

use super::keys::{KeyDestination, KeySource, SourceBucket, SourceObject};
use super::{basename, join_path, specific_writer_options};
use async_trait::async_trait;
use ef_error::Result;
use ef_types::ExportConfig;
use ef_writers::{AzureBlobWriter, AzureFileWriter};

/// Downloads each object and uploads it as a blob.
pub struct AzureBlobDestination {
    writer: AzureBlobWriter,
    dir: String,
}

impl AzureBlobDestination {
    pub fn new(writer: AzureBlobWriter) -> Result<Self> {
        let dir = writer.filebase().render(&[])?.as_dir();
        Ok(Self { writer, dir })
    }

    pub fn from_config(config: &ExportConfig) -> Result<Self> {
        Self::new(AzureBlobWriter::from_options(&specific_writer_options(config)?)?)
    }
}

#[async_trait]
impl KeyDestination for AzureBlobDestination {
    async fn transfer(&mut self, source: &SourceBucket, object: &SourceObject) -> Result<()> {
        let file = source.download(object).await?;
        let name = join_path(&self.dir, basename(&object.key));
        self.writer.upload_file(&name, file.path()).await
    }

    fn name(&self) -> &str {
        "azure_blob"
    }
}

/// Downloads each object and uploads it into a file share.
pub struct AzureFileDestination {
    writer: AzureFileWriter,
    dir: String,
    dir_ready: bool,
}

impl AzureFileDestination {
    pub fn new(writer: AzureFileWriter) -> Result<Self> {
        let dir = writer.filebase().render(&[])?.as_dir();
        Ok(Self {
            writer,
            dir,
            dir_ready: false,
        })
    }

    pub fn from_config(config: &ExportConfig) -> Result<Self> {
        Self::new(AzureFileWriter::from_options(&specific_writer_options(config)?)?)
    }
}

#[async_trait]
impl KeyDestination for AzureFileDestination {
    async fn transfer(&mut self, source: &SourceBucket, object: &SourceObject) -> Result<()> {
        if !self.dir_ready {
            self.writer.ensure_directories(&self.dir).await?;
            self.dir_ready = true;
        }
        let file = source.download(object).await?;
        let dest = join_path(&self.dir, basename(&object.key));
        self.writer.upload_file(&dest, file.path()).await
    }

    fn name(&self) -> &str {
        "azure_file"
    }
}
