//! S3 object listing with pagination support.

use async_stream::try_stream;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::Client;
use chrono::{DateTime, Utc};
use ef_error::{ExportError, Result};
use ef_retry::{with_retry, RetryConfig};
use futures::{Stream, TryStreamExt};
use regex::Regex;

/// Represents an S3 object discovered during listing.
#[derive(Debug, Clone, PartialEq)]
pub struct S3Object {
    /// The object key (full path within the bucket)
    pub key: String,

    /// Size of the object in bytes
    pub size: u64,

    /// ETag as returned by S3, quotes stripped
    pub e_tag: Option<String>,

    /// Last modified timestamp
    pub last_modified: Option<DateTime<Utc>>,
}

/// List objects in an S3 bucket with optional prefix filtering.
///
/// Returns a stream of [`S3Object`] items, handling pagination automatically.
/// Directory markers (keys ending with `/`) are filtered out. Each page
/// request is retried with the short profile.
pub fn list_objects<'a>(
    client: &'a Client,
    bucket: &'a str,
    prefix: Option<&'a str>,
) -> impl Stream<Item = Result<S3Object>> + 'a {
    try_stream! {
        let mut continuation_token: Option<String> = None;
        let retry = RetryConfig::short();

        loop {
            let token = continuation_token.clone();
            let resp = with_retry(&retry, "s3_list_objects", || {
                let mut req = client.list_objects_v2().bucket(bucket);
                if let Some(prefix) = prefix {
                    req = req.prefix(prefix);
                }
                if let Some(token) = &token {
                    req = req.continuation_token(token);
                }
                async move {
                    req.send().await.map_err(|e| {
                        ExportError::reader(format!(
                            "S3 list objects failed for bucket {bucket}: {}",
                            DisplayErrorContext(e)
                        ))
                    })
                }
            })
            .await?;

            if let Some(contents) = resp.contents {
                for obj in contents {
                    let key = obj.key.unwrap_or_default();

                    if key.is_empty() || key.ends_with('/') {
                        continue;
                    }

                    let last_modified = obj.last_modified.and_then(|t| {
                        DateTime::from_timestamp(t.secs(), t.subsec_nanos())
                    });

                    yield S3Object {
                        key,
                        size: obj.size.unwrap_or(0).max(0) as u64,
                        e_tag: obj.e_tag.map(|t| normalize_etag(&t)),
                        last_modified,
                    };
                }
            }

            if resp.is_truncated == Some(true) {
                continuation_token = resp.next_continuation_token;
                if continuation_token.is_none() {
                    break;
                }
            } else {
                break;
            }
        }
    }
}

/// Lists keys under `prefix`, keeping those whose key matches `pattern`.
pub async fn list_matching(
    client: &Client,
    bucket: &str,
    prefix: Option<&str>,
    pattern: Option<&Regex>,
) -> Result<Vec<S3Object>> {
    let objects: Vec<S3Object> = list_objects(client, bucket, prefix).try_collect().await?;
    Ok(filter_by_pattern(objects, pattern))
}

/// Keeps objects whose key matches `pattern` (all of them if `None`).
pub fn filter_by_pattern(objects: Vec<S3Object>, pattern: Option<&Regex>) -> Vec<S3Object> {
    match pattern {
        Some(re) => objects.into_iter().filter(|o| re.is_match(&o.key)).collect(),
        None => objects,
    }
}

/// Strips the surrounding quotes S3 puts on ETags.
pub fn normalize_etag(etag: &str) -> String {
    etag.trim_matches('"').to_string()
}
