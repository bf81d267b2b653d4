//! S3 writer.

use crate::delivered::DeliveredFile;
use crate::filebase::{Filebase, RenderedFilebase};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ef_error::{ExportError, Result};
use ef_retry::{with_retry, RetryConfig};
use ef_s3::aws_sdk_s3::primitives::ByteStream;
use ef_s3::{
    content_md5, is_simple_etag, md5_hex_of_file, normalize_etag, sdk_error_message,
    verify_etag, LazyS3Client, S3Config, ITEMS_COUNT_METADATA, S3_CONNECTION_OPTIONS,
};
use ef_traits::{ReadStream, Writer};
use ef_types::{HashAlgorithm, OptionKind, OptionSpec, WriteInfo};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
struct S3WriterOptions {
    bucket: String,
    filebase: String,
    save_pointer: Option<String>,
    #[serde(flatten)]
    connection: S3Config,
}

/// Uploads packed files to `s3://bucket/<filebase><uuid>.<ext>`.
///
/// Every object carries its record count in the `total` user metadata.
/// With `save_pointer`, a text object holding the last resolved filebase
/// (for `out/%Y-%m-%d`, `out/2024-01-02`) is stored at that key when the job finishes.
pub struct S3Writer {
    client: LazyS3Client,
    bucket: String,
    filebase: Filebase,
    save_pointer: Option<String>,
    delivered: Vec<DeliveredFile>,
    last_dir: Option<String>,
}

impl S3Writer {
    pub const OPTIONS: &'static [OptionSpec] = &[
        OptionSpec::required("bucket", OptionKind::String),
        OptionSpec::required("filebase", OptionKind::String),
        OptionSpec::optional("save_pointer", OptionKind::String),
        S3_CONNECTION_OPTIONS[0],
        S3_CONNECTION_OPTIONS[1],
        S3_CONNECTION_OPTIONS[2],
        S3_CONNECTION_OPTIONS[3],
    ];

    pub fn new(
        client: LazyS3Client,
        bucket: impl Into<String>,
        filebase: Filebase,
        save_pointer: Option<String>,
    ) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            filebase,
            save_pointer,
            delivered: Vec::new(),
            last_dir: None,
        }
    }

    pub fn from_options(options: &Map<String, Value>) -> Result<Self> {
        let opts: S3WriterOptions = ef_types::parse_options("writers.s3", Self::OPTIONS, options)?;
        Ok(Self::new(
            LazyS3Client::new(opts.connection),
            opts.bucket,
            Filebase::new(opts.filebase)?,
            opts.save_pointer,
        ))
    }

    pub fn client(&self) -> &LazyS3Client {
        &self.client
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn filebase(&self) -> &Filebase {
        &self.filebase
    }

    pub fn save_pointer(&self) -> Option<&str> {
        self.save_pointer.as_deref()
    }

    pub fn delivered(&self) -> &[DeliveredFile] {
        &self.delivered
    }

    /// Uploads a local file, verifying the returned ETag against its MD5.
    ///
    /// Returns the object's ETag.
    pub async fn upload_file(&self, key: &str, path: &Path, items: Option<u64>) -> Result<String> {
        let client = self.client.get().await?;
        let md5 = md5_hex_of_file(path).await?;
        let md5_b64 = content_md5(&md5)?;
        let (bucket, md5_b64) = (self.bucket.as_str(), md5_b64.as_str());

        let output = with_retry(&RetryConfig::long(), "s3_put_object", move || async move {
            let body = ByteStream::from_path(path).await.map_err(|e| {
                ExportError::writer(format!("cannot read {}: {e}", path.display()))
            })?;
            let mut req = client
                .put_object()
                .bucket(bucket)
                .key(key)
                .body(body)
                .content_md5(md5_b64);
            if let Some(items) = items {
                req = req.metadata(ITEMS_COUNT_METADATA, items.to_string());
            }
            req.send().await.map_err(|e| {
                ExportError::writer(format!(
                    "S3 put object failed for s3://{bucket}/{key}: {}",
                    sdk_error_message(e)
                ))
            })
        })
        .await?;

        let etag = output.e_tag.as_deref().map(normalize_etag).unwrap_or_default();
        if is_simple_etag(&etag) {
            verify_etag(key, &md5, &etag)?;
        }
        debug!(bucket = %self.bucket, key, "Uploaded object");
        Ok(etag)
    }

    /// Stores `content` as a small text object.
    pub async fn write_pointer(&self, key: &str, content: &str) -> Result<()> {
        let client = self.client.get().await?;
        let bucket = self.bucket.as_str();
        with_retry(&RetryConfig::short(), "s3_put_pointer", || {
            let req = client
                .put_object()
                .bucket(bucket)
                .key(key)
                .content_type("text/plain")
                .body(ByteStream::from(content.as_bytes().to_vec()));
            async move {
                req.send().await.map_err(|e| {
                    ExportError::writer(format!(
                        "S3 put pointer failed for s3://{bucket}/{key}: {}",
                        sdk_error_message(e)
                    ))
                })
            }
        })
        .await?;
        info!(bucket = %self.bucket, key, pointer = content, "Saved pointer");
        Ok(())
    }

    /// Size and ETag of an object, `None` if it does not exist.
    async fn head(&self, key: &str) -> Result<Option<(u64, String)>> {
        let client = self.client.get().await?;
        let bucket = self.bucket.as_str();
        with_retry(&RetryConfig::short(), "s3_head_object", || {
            let req = client.head_object().bucket(bucket).key(key);
            async move {
                match req.send().await {
                    Ok(output) => Ok(Some((
                        output.content_length.unwrap_or(0).max(0) as u64,
                        output.e_tag.as_deref().map(normalize_etag).unwrap_or_default(),
                    ))),
                    Err(e) if e.as_service_error().is_some_and(|se| se.is_not_found()) => Ok(None),
                    Err(e) => Err(ExportError::writer(format!(
                        "S3 head object failed for s3://{bucket}/{key}: {}",
                        sdk_error_message(e)
                    ))),
                }
            }
        })
        .await
    }
}

impl S3Writer {
    fn remember_dir(&mut self, rendered: &RenderedFilebase) {
        self.last_dir = Some(rendered.as_dir());
    }

    /// Save-pointer content: the last resolved filebase, or the filebase
    /// resolved at `now` when nothing was written.
    fn pointer_content(&self, now: DateTime<Utc>) -> Result<String> {
        match &self.last_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(self.filebase.render_at(&[], now)?.as_dir()),
        }
    }
}

fn join_key(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{dir}/{name}")
    }
}

#[async_trait]
impl Writer for S3Writer {
    async fn write(&mut self, info: &WriteInfo, group_keys: &[String]) -> Result<()> {
        let rendered = self.filebase.render(group_keys)?;
        let key = rendered.file(&format!("{}.{}", Uuid::new_v4().simple(), info.full_extension()));

        self.upload_file(&key, &info.file_path, Some(info.number_of_records))
            .await?;
        self.delivered.push(DeliveredFile::new(key, info));
        self.remember_dir(&rendered);
        Ok(())
    }

    async fn check_write_consistency(&mut self) -> Result<()> {
        for file in &self.delivered {
            let Some((size, etag)) = self.head(&file.destination).await? else {
                return Err(file.missing());
            };
            file.check_size(size)?;
            if file.hash_algorithm() == Some(HashAlgorithm::Md5) && is_simple_etag(&etag) {
                file.check_hash(&etag)?;
            }
        }
        info!(bucket = %self.bucket, files = self.delivered.len(), "Checked written objects");
        Ok(())
    }

    async fn finish(&mut self) -> Result<()> {
        let Some(pointer) = self.save_pointer.clone() else {
            return Ok(());
        };
        let content = self.pointer_content(Utc::now())?;
        self.write_pointer(&pointer, &content).await
    }

    fn supports_write_stream(&self) -> bool {
        true
    }

    async fn write_stream(&mut self, mut stream: ReadStream) -> Result<()> {
        let rendered = self.filebase.render(&[])?;
        let dir = rendered.as_dir();
        let name = stream.info.filename.rsplit('/').next().unwrap_or_default();
        let key = join_key(&dir, name);

        let spool = tempfile::NamedTempFile::new()?;
        let mut file = tokio::fs::File::create(spool.path()).await?;
        let bytes = tokio::io::copy(&mut stream.reader, &mut file).await?;
        file.flush().await?;
        drop(file);

        self.upload_file(&key, spool.path(), None).await?;
        debug!(key = %key, bytes, "Wrote stream");
        self.remember_dir(&rendered);
        Ok(())
    }

    fn name(&self) -> &str {
        "s3"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_from_options() {
        let options = json!({
            "bucket": "out",
            "filebase": "exports/%Y/",
            "save_pointer": "pointer/LAST",
            "endpoint_url": "http://localhost:4566",
            "aws_region": "us-east-1"
        })
        .as_object()
        .cloned()
        .unwrap();
        let writer = S3Writer::from_options(&options).unwrap();
        assert_eq!(writer.bucket(), "out");
        assert_eq!(writer.save_pointer(), Some("pointer/LAST"));
        assert_eq!(writer.filebase().template(), "exports/%Y/");
        assert!(writer.supports_write_stream());
    }

    #[test]
    fn test_filebase_required() {
        let options = json!({"bucket": "out"}).as_object().cloned().unwrap();
        assert!(S3Writer::from_options(&options).is_err());
    }

    fn dated_writer() -> S3Writer {
        let options = json!({"bucket": "out", "filebase": "out/%Y-%m-%d", "save_pointer": "LAST"})
            .as_object()
            .cloned()
            .unwrap();
        S3Writer::from_options(&options).unwrap()
    }

    #[test]
    fn test_pointer_holds_resolved_filebase() {
        let day = Utc.with_ymd_and_hms(2024, 1, 2, 8, 0, 0).unwrap();
        let mut writer = dated_writer();
        assert_eq!(writer.pointer_content(day).unwrap(), "out/2024-01-02");

        let rendered = writer.filebase().render_at(&[], day).unwrap();
        writer.remember_dir(&rendered);
        let later = Utc.with_ymd_and_hms(2024, 1, 5, 8, 0, 0).unwrap();
        assert_eq!(writer.pointer_content(later).unwrap(), "out/2024-01-02");
    }

    #[test]
    fn test_join_key() {
        assert_eq!(join_key("", "a"), "a");
        assert_eq!(join_key("out/2024", "a"), "out/2024/a");
    }
}
