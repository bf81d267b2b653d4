//! S3 JSON-lines reader.

use crate::lines::{JsonLinesReader, UnitSource};
use async_trait::async_trait;
use ef_error::{ExportError, Result};
use ef_retry::{with_retry, RetryConfig};
use ef_s3::{list_matching, sdk_error_message, LazyS3Client, S3Config, S3_CONNECTION_OPTIONS};
use ef_traits::{ByteStream, StreamInfo};
use ef_types::{OptionKind, OptionSpec};
use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

#[derive(Debug, Deserialize)]
struct S3ReaderOptions {
    bucket: String,
    prefix: Option<String>,
    pattern: Option<String>,
    batch_size: usize,
    #[serde(flatten)]
    connection: S3Config,
}

/// Objects under a bucket prefix, named by key.
#[derive(Debug)]
pub struct S3Source {
    client: LazyS3Client,
    bucket: String,
    prefix: Option<String>,
    pattern: Option<Regex>,
}

impl S3Source {
    pub fn new(
        client: LazyS3Client,
        bucket: impl Into<String>,
        prefix: Option<String>,
        pattern: Option<Regex>,
    ) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            prefix,
            pattern,
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    pub fn pattern(&self) -> Option<&Regex> {
        self.pattern.as_ref()
    }

    pub fn client(&self) -> &LazyS3Client {
        &self.client
    }
}

#[async_trait]
impl UnitSource for S3Source {
    const POSITION_KEY: &'static str = "key";

    async fn list_units(&self) -> Result<Vec<StreamInfo>> {
        let client = self.client.get().await?;
        let objects =
            list_matching(client, &self.bucket, self.prefix.as_deref(), self.pattern.as_ref())
                .await?;
        debug!(bucket = %self.bucket, objects = objects.len(), "Listed S3 keys");
        Ok(objects
            .into_iter()
            .map(|o| StreamInfo {
                filename: o.key,
                size: Some(o.size),
            })
            .collect())
    }

    async fn open_unit(&self, name: &str) -> Result<ByteStream> {
        let client = self.client.get().await?;
        let bucket = self.bucket.as_str();
        let output = with_retry(&RetryConfig::short(), "s3_get_object", || {
            let req = client.get_object().bucket(bucket).key(name);
            async move {
                req.send().await.map_err(|e| {
                    ExportError::reader(format!(
                        "S3 get object failed for s3://{bucket}/{name}: {}",
                        sdk_error_message(e)
                    ))
                })
            }
        })
        .await?;
        Ok(Box::pin(output.body.into_async_read()))
    }
}

/// Reads JSON-lines objects (optionally `.gz`) from a bucket.
///
/// Position: `{key, line}`.
pub type S3Reader = JsonLinesReader<S3Source>;

impl S3Reader {
    pub const OPTIONS: &'static [OptionSpec] = &[
        OptionSpec::required("bucket", OptionKind::String),
        OptionSpec::optional("prefix", OptionKind::String),
        OptionSpec::optional("pattern", OptionKind::String),
        OptionSpec::required("batch_size", OptionKind::Integer).with_default("10000"),
        S3_CONNECTION_OPTIONS[0],
        S3_CONNECTION_OPTIONS[1],
        S3_CONNECTION_OPTIONS[2],
        S3_CONNECTION_OPTIONS[3],
    ];

    pub fn from_options(options: &Map<String, Value>) -> Result<Self> {
        let opts: S3ReaderOptions = ef_types::parse_options("readers.s3", Self::OPTIONS, options)?;
        let pattern = opts
            .pattern
            .map(|p| {
                Regex::new(&p)
                    .map_err(|e| ExportError::config(format!("invalid pattern '{p}': {e}")))
            })
            .transpose()?;
        let source = S3Source::new(
            LazyS3Client::new(opts.connection),
            opts.bucket,
            opts.prefix,
            pattern,
        );
        Ok(JsonLinesReader::new(source, opts.batch_size))
    }
}
