//! Key-by-key transfer out of an S3 bucket.

use async_trait::async_trait;
use ef_error::{ExportError, Result};
use ef_readers::{S3Reader, S3Source};
use ef_retry::{with_retry, RetryConfig};
use ef_s3::{
    is_simple_etag, list_matching, md5_hex_of_file, normalize_etag, sdk_error_message,
    verify_etag, LazyS3Client, ITEMS_COUNT_METADATA,
};
use ef_traits::Persistence;
use ef_types::{KeyTransferState, Metadata};
use ef_writers::WRITER_MODULE;
use serde_json::{Map, Value};
use std::path::Path;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Head of a source object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceObject {
    pub key: String,
    pub size: u64,
    /// Quotes stripped
    pub e_tag: String,
    /// Record count from the object's user metadata
    pub items: Option<u64>,
}

/// Where a key bypass reads objects from.
#[async_trait]
pub trait KeySource: Send + Sync {
    /// Every key the job copies, in copy order.
    async fn list_keys(&self) -> Result<Vec<String>>;

    async fn head(&self, key: &str) -> Result<SourceObject>;

    /// Downloads `object` into a temporary file.
    async fn download(&self, object: &SourceObject) -> Result<NamedTempFile>;

    /// Bucket or container name, for logging.
    fn location(&self) -> &str;
}

/// The bucket, prefix and pattern configured on an S3 reader.
pub struct SourceBucket {
    reader: S3Reader,
}

impl SourceBucket {
    /// Resolves the S3 reader options without reading anything.
    pub fn from_options(options: &Map<String, Value>) -> Result<Self> {
        Ok(Self {
            reader: S3Reader::from_options(options)?,
        })
    }

    fn source(&self) -> &S3Source {
        self.reader.source()
    }

    pub fn bucket(&self) -> &str {
        self.source().bucket()
    }

    pub fn client(&self) -> &LazyS3Client {
        self.source().client()
    }

    async fn download_to(&self, key: &str, path: &Path) -> Result<()> {
        let client = self.client().get().await?;
        let bucket = self.bucket();
        with_retry(&RetryConfig::long(), "s3_download", || {
            let req = client.get_object().bucket(bucket).key(key);
            async move {
                let output = req.send().await.map_err(|e| {
                    ExportError::reader(format!(
                        "S3 get object failed for s3://{bucket}/{key}: {}",
                        sdk_error_message(e)
                    ))
                })?;
                let mut body = output.body.into_async_read();
                let mut file = tokio::fs::File::create(path).await?;
                tokio::io::copy(&mut body, &mut file).await?;
                file.flush().await?;
                Ok::<(), ExportError>(())
            }
        })
        .await
    }
}

#[async_trait]
impl KeySource for SourceBucket {
    /// Every key under the prefix matching the pattern.
    async fn list_keys(&self) -> Result<Vec<String>> {
        let source = self.source();
        let client = source.client().get().await?;
        let objects =
            list_matching(client, source.bucket(), source.prefix(), source.pattern()).await?;
        Ok(objects.into_iter().map(|o| o.key).collect())
    }

    async fn head(&self, key: &str) -> Result<SourceObject> {
        let client = self.client().get().await?;
        let bucket = self.bucket();
        let output = with_retry(&RetryConfig::short(), "s3_head_object", || {
            let req = client.head_object().bucket(bucket).key(key);
            async move {
                req.send().await.map_err(|e| {
                    ExportError::reader(format!(
                        "S3 head object failed for s3://{bucket}/{key}: {}",
                        sdk_error_message(e)
                    ))
                })
            }
        })
        .await?;

        let items = output
            .metadata
            .as_ref()
            .and_then(|m| m.get(ITEMS_COUNT_METADATA))
            .and_then(|v| v.trim().parse::<u64>().ok());
        Ok(SourceObject {
            key: key.to_string(),
            size: output.content_length.unwrap_or(0).max(0) as u64,
            e_tag: output.e_tag.as_deref().map(normalize_etag).unwrap_or_default(),
            items,
        })
    }

    /// Downloads `object` into a temporary file, checking its MD5 against
    /// the source ETag when the ETag is a plain MD5.
    async fn download(&self, object: &SourceObject) -> Result<NamedTempFile> {
        let file = NamedTempFile::new()?;
        self.download_to(&object.key, file.path()).await?;
        if is_simple_etag(&object.e_tag) {
            let md5 = md5_hex_of_file(file.path()).await?;
            verify_etag(&object.key, &object.e_tag, &md5)?;
        }
        debug!(bucket = self.bucket(), key = %object.key, "Downloaded object");
        Ok(file)
    }

    fn location(&self) -> &str {
        self.bucket()
    }
}

/// Where a key bypass copies objects to.
#[async_trait]
pub trait KeyDestination<S: KeySource + ?Sized = SourceBucket>: Send {
    /// Copies one object; must fail if the copy cannot be verified.
    async fn transfer(&mut self, source: &S, object: &SourceObject) -> Result<()>;

    /// Called once every key has been copied.
    async fn finish(&mut self) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &str;
}

fn load_state(position: Value) -> Result<KeyTransferState> {
    serde_json::from_value(position)
        .map_err(|e| ExportError::persistence(format!("invalid key transfer state: {e}")))
}

/// Copies every pending key of the job to `destination`.
///
/// The initial listing is committed before the first copy; each copied key
/// is committed as soon as it is done, so a resumed job skips it.
pub async fn run_key_transfer<S: KeySource + ?Sized>(
    source: &S,
    destination: &mut dyn KeyDestination<S>,
    persistence: &mut dyn Persistence,
    metadata: &Metadata,
) -> Result<()> {
    let mut state = match persistence.get_last_position()? {
        Some(position) => {
            let state = load_state(position)?;
            info!(
                pending = state.pending.len(),
                done = state.done.len(),
                "Resuming key transfer"
            );
            state
        }
        None => {
            let state = KeyTransferState::new(source.list_keys().await?);
            info!(source = source.location(), keys = state.pending.len(), "Listed source keys");
            persistence.commit_position(serde_json::to_value(&state)?)?;
            state
        }
    };

    for key in state.pending.clone() {
        let object = source.head(&key).await?;
        destination.transfer(source, &object).await?;
        state.mark_done(&key, object.items);
        persistence.commit_position(serde_json::to_value(&state)?)?;
        info!(
            key = %key,
            destination = destination.name(),
            done = state.done.len(),
            pending = state.pending.len(),
            "Copied key"
        );
    }
    destination.finish().await?;

    metadata.set_metadata(WRITER_MODULE, "items_count", state.stats.total_count);
    metadata.set_metadata(WRITER_MODULE, "written_files", state.done.len() as u64);
    metadata.set_accurate_items_count(state.stats.valid_total_count);
    Ok(())
}
