//! Azure blob storage writer.

use crate::delivered::DeliveredFile;
use crate::filebase::Filebase;
use async_trait::async_trait;
use ef_error::{ExportError, Result};
use ef_retry::{with_retry, RetryConfig};
use ef_traits::Writer;
use ef_types::{OptionKind, OptionSpec, WriteInfo};
use object_store::azure::MicrosoftAzureBuilder;
use object_store::buffered::BufWriter;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
struct AzureBlobOptions {
    account: String,
    access_key: String,
    container: String,
    filebase: String,
}

/// Uploads packed files as blobs named `<filebase><uuid>.<ext>`.
pub struct AzureBlobWriter {
    store: Arc<dyn ObjectStore>,
    container: String,
    filebase: Filebase,
    delivered: Vec<DeliveredFile>,
}

impl AzureBlobWriter {
    pub const OPTIONS: &'static [OptionSpec] = &[
        OptionSpec::required("account", OptionKind::String).with_env("AZURE_STORAGE_ACCOUNT"),
        OptionSpec::required("access_key", OptionKind::String).with_env("AZURE_STORAGE_ACCESS_KEY"),
        OptionSpec::required("container", OptionKind::String),
        OptionSpec::required("filebase", OptionKind::String),
    ];

    pub fn new(store: Arc<dyn ObjectStore>, container: impl Into<String>, filebase: Filebase) -> Self {
        Self {
            store,
            container: container.into(),
            filebase,
            delivered: Vec::new(),
        }
    }

    pub fn from_options(options: &Map<String, Value>) -> Result<Self> {
        let opts: AzureBlobOptions =
            ef_types::parse_options("writers.azure_blob", Self::OPTIONS, options)?;
        let store = MicrosoftAzureBuilder::new()
            .with_account(&opts.account)
            .with_access_key(&opts.access_key)
            .with_container_name(&opts.container)
            .build()
            .map_err(|e| ExportError::config(format!("invalid Azure blob settings: {e}")))?;
        Ok(Self::new(Arc::new(store), opts.container, Filebase::new(opts.filebase)?))
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    pub fn filebase(&self) -> &Filebase {
        &self.filebase
    }

    /// Streams a local file into the blob `name`.
    pub async fn upload_file(&self, name: &str, path: &Path) -> Result<()> {
        let location = ObjectPath::from(name);
        with_retry(&RetryConfig::long(), "azure_blob_upload", || {
            let store = self.store.clone();
            let location = location.clone();
            async move {
                let mut file = tokio::fs::File::open(path).await?;
                let mut upload = BufWriter::new(store, location);
                let result = async {
                    tokio::io::copy(&mut file, &mut upload).await?;
                    upload.shutdown().await
                }
                .await;
                result.map_err(|e| {
                    ExportError::writer(format!(
                        "Azure blob upload failed for {}/{name}: {e}",
                        self.container
                    ))
                })
            }
        })
        .await?;
        debug!(container = %self.container, blob = name, "Uploaded blob");
        Ok(())
    }
}

#[async_trait]
impl Writer for AzureBlobWriter {
    async fn write(&mut self, info: &WriteInfo, group_keys: &[String]) -> Result<()> {
        let rendered = self.filebase.render(group_keys)?;
        let name = rendered.file(&format!("{}.{}", Uuid::new_v4().simple(), info.full_extension()));
        self.upload_file(&name, &info.file_path).await?;
        self.delivered.push(DeliveredFile::new(name, info));
        Ok(())
    }

    async fn check_write_consistency(&mut self) -> Result<()> {
        for file in &self.delivered {
            match self.store.head(&ObjectPath::from(file.destination.as_str())).await {
                Ok(meta) => file.check_size(meta.size as u64)?,
                Err(object_store::Error::NotFound { .. }) => return Err(file.missing()),
                Err(e) => {
                    return Err(ExportError::writer(format!(
                        "cannot stat blob {}: {e}",
                        file.destination
                    )))
                }
            }
        }
        info!(container = %self.container, files = self.delivered.len(), "Checked written blobs");
        Ok(())
    }

    fn name(&self) -> &str {
        "azure_blob"
    }
}
