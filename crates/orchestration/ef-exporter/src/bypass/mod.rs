//! Pipeline bypasses.
//!
//! When a job only moves data unchanged from one place to another, the
//! record pipeline is skipped and the source is copied directly:
//!
//! - [`BypassKind::S3ToS3`] - Server-side object copy between buckets
//! - [`BypassKind::S3ToAzureBlob`] - Objects downloaded and re-uploaded as blobs
//! - [`BypassKind::S3ToAzureFile`] - Objects downloaded and re-uploaded to a share
//! - [`BypassKind::Stream`] - Raw streams forwarded from reader to writer
//!
//! The first kind whose conditions hold is used. Progress is checkpointed
//! through the job's persistence after every copied unit.

mod azure;
mod keys;
mod s3;
mod stream;

pub use azure::{AzureBlobDestination, AzureFileDestination};
pub use keys::{run_key_transfer, KeyDestination, KeySource, SourceBucket, SourceObject};
pub use s3::S3Destination;
pub use stream::{run_stream_transfer, CountingReader};

use crate::registry::{normalize_name, Registry, DEFAULT_FORMATTER, NO_FILTER, NO_GROUPING, NO_TRANSFORM};
use ef_error::Result;
use ef_traits::{Persistence, Reader, Writer};
use ef_types::{ExportConfig, Metadata, ModuleConfig};
use ef_writers::{bypass_blocking_option, bypass_ignored_options};
use std::fmt;
use tracing::{info, warn};

/// The available bypasses, in the order they are tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BypassKind {
    S3ToS3,
    S3ToAzureBlob,
    S3ToAzureFile,
    Stream,
}

impl BypassKind {
    pub const ALL: [BypassKind; 4] = [
        BypassKind::S3ToS3,
        BypassKind::S3ToAzureBlob,
        BypassKind::S3ToAzureFile,
        BypassKind::Stream,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            BypassKind::S3ToS3 => "s3_to_s3",
            BypassKind::S3ToAzureBlob => "s3_to_azure_blob",
            BypassKind::S3ToAzureFile => "s3_to_azure_file",
            BypassKind::Stream => "stream",
        }
    }

    /// The reader/writer pair a key bypass needs, `None` for the stream bypass.
    fn endpoints(self) -> Option<(&'static str, &'static str)> {
        match self {
            BypassKind::S3ToS3 => Some(("s3", "s3")),
            BypassKind::S3ToAzureBlob => Some(("s3", "azure_blob")),
            BypassKind::S3ToAzureFile => Some(("s3", "azure_file")),
            BypassKind::Stream => None,
        }
    }

    /// Whether this bypass can run `config`. Every failed condition is
    /// logged with its reason.
    pub fn meets_conditions(self, config: &ExportConfig, registry: &Registry) -> bool {
        let reader = normalize_name("readers", &config.reader.name);
        let writer = normalize_name("writers", &config.writer.name);

        match self.endpoints() {
            Some((wanted_reader, wanted_writer)) => {
                if reader != wanted_reader || writer != wanted_writer {
                    info!(
                        bypass = self.as_str(),
                        reader, writer, "Skipping bypass: unsupported reader/writer pair"
                    );
                    return false;
                }
            }
            None => {
                let read_streams = registry
                    .readers
                    .get(reader)
                    .is_ok_and(|e| e.capabilities.read_streams);
                let write_stream = registry
                    .writers
                    .get(writer)
                    .is_ok_and(|e| e.capabilities.write_stream);
                if !read_streams || !write_stream {
                    info!(
                        bypass = self.as_str(),
                        reader,
                        writer,
                        read_streams,
                        write_stream,
                        "Skipping bypass: reader or writer cannot stream"
                    );
                    return false;
                }
            }
        }

        match pipeline_blocker(config) {
            Some(reason) => {
                info!(bypass = self.as_str(), reason = %reason, "Skipping bypass");
                false
            }
            None => true,
        }
    }
}

impl fmt::Display for BypassKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn is_noop(module: Option<&ModuleConfig>, role: &str, noop: &str) -> bool {
    module.map_or(true, |m| normalize_name(role, &m.name) == noop)
}

/// The first reason the record pipeline cannot be skipped, if any.
fn pipeline_blocker(config: &ExportConfig) -> Option<String> {
    if !is_noop(config.filter_before.as_ref(), "filters", NO_FILTER) {
        return Some("filter_before is configured".into());
    }
    if !is_noop(config.filter_after.as_ref(), "filters", NO_FILTER) {
        return Some("filter_after is configured".into());
    }
    if !is_noop(config.transform.as_ref(), "transforms", NO_TRANSFORM) {
        return Some("transform is configured".into());
    }
    if !is_noop(config.grouper.as_ref(), "groupers", NO_GROUPING) {
        return Some("grouper is configured".into());
    }
    if let Some(option) = bypass_blocking_option(&config.writer.options) {
        return Some(format!("writer option {option} is set"));
    }
    if config
        .writer
        .option_str("write_buffer")
        .is_some_and(|b| b != "grouping")
    {
        return Some("writer samples records".into());
    }
    if !is_noop(config.formatter(), "formatters", DEFAULT_FORMATTER) {
        return Some("a non-default formatter is configured".into());
    }
    None
}

/// The first applicable bypass, `None` when the pipeline must run.
pub fn try_bypass(config: &ExportConfig, registry: &Registry) -> Option<BypassKind> {
    if config.exporter_options.prevent_bypass {
        info!("Bypass prevented by configuration");
        return None;
    }
    let kind = BypassKind::ALL
        .into_iter()
        .find(|kind| kind.meets_conditions(config, registry))?;
    for option in ignored_writer_options(config) {
        warn!(bypass = kind.as_str(), option, "Writer option has no effect on a bypass");
    }
    Some(kind)
}

/// Writer options set in `config` that a bypass does not apply.
fn ignored_writer_options(config: &ExportConfig) -> Vec<&'static str> {
    bypass_ignored_options(&config.writer.options)
}

/// Runs `kind` for `config`.
///
/// Key bypasses build their own S3 source and destination from the
/// configuration; the stream bypass drives the exporter's `reader` and
/// `writer`.
pub async fn execute(
    kind: BypassKind,
    config: &ExportConfig,
    reader: &mut dyn Reader,
    writer: &mut dyn Writer,
    persistence: &mut dyn Persistence,
    metadata: &Metadata,
) -> Result<()> {
    info!(bypass = kind.as_str(), "Executing bypass");
    match kind {
        BypassKind::S3ToS3 => {
            let source = SourceBucket::from_options(&config.reader.options)?;
            let mut destination = S3Destination::from_config(config)?;
            run_key_transfer(&source, &mut destination, persistence, metadata).await
        }
        BypassKind::S3ToAzureBlob => {
            let source = SourceBucket::from_options(&config.reader.options)?;
            let mut destination = AzureBlobDestination::from_config(config)?;
            run_key_transfer(&source, &mut destination, persistence, metadata).await
        }
        BypassKind::S3ToAzureFile => {
            let source = SourceBucket::from_options(&config.reader.options)?;
            let mut destination = AzureFileDestination::from_config(config)?;
            run_key_transfer(&source, &mut destination, persistence, metadata).await
        }
        BypassKind::Stream => run_stream_transfer(reader, writer, persistence, metadata).await,
    }
}

/// The writer-specific options of `config`'s writer.
fn specific_writer_options(
    config: &ExportConfig,
) -> Result<serde_json::Map<String, serde_json::Value>> {
    let module = format!("writers.{}", normalize_name("writers", &config.writer.name));
    let (_, specific) = ef_writers::WriterOptions::split(&module, &config.writer.options)?;
    Ok(specific)
}

/// Last path segment of a key or file name.
fn basename(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

/// Joins a destination directory and a file name.
fn join_path(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{}/{name}", dir.trim_end_matches('/'))
    }
}
