//! S3 support for exportflow.
//!
//! This crate provides S3 operations shared by the reader, writer and bypasses:
//! - Client configuration with LocalStack support, created lazily
//! - Paginated object listing with regex filtering
//! - MD5 / ETag helpers for integrity checks

mod client;
mod integrity;
mod list;

pub use client::{create_s3_client, LazyS3Client, S3Config, S3_CONNECTION_OPTIONS};
pub use integrity::{content_md5, is_simple_etag, md5_hex, md5_hex_of_file, verify_etag};
pub use list::{filter_by_pattern, list_matching, list_objects, normalize_etag, S3Object};

/// User-metadata key carrying the number of records in an object.
pub const ITEMS_COUNT_METADATA: &str = "total";

/// Re-exported so dependents can name the SDK types without a direct dependency.
pub use aws_sdk_s3;

/// Renders an SDK error with its full context (error code included).
pub fn sdk_error_message<E: std::error::Error>(err: E) -> String {
    aws_sdk_s3::error::DisplayErrorContext(err).to_string()
}
