//! Options shared by every writer.

use ef_buffer::{DEFAULT_ITEMS_PER_BUFFER_WRITE, DEFAULT_SIZE_PER_BUFFER_WRITE};
use ef_error::{ExportError, Result};
use ef_types::{Compression, HashAlgorithm, OptionKind, OptionSpec};
use serde::Deserialize;
use serde_json::{Map, Value};

/// Buffering and delivery options accepted by every writer, in addition to
/// its own.
pub const GENERIC_WRITER_OPTIONS: [OptionSpec; 8] = [
    OptionSpec::required("items_per_buffer_write", OptionKind::Integer).with_default("500000"),
    OptionSpec::required("size_per_buffer_write", OptionKind::Integer).with_default("4000000000"),
    OptionSpec::required("items_limit", OptionKind::Integer).with_default("0"),
    OptionSpec::required("check_consistency", OptionKind::Boolean).with_default("false"),
    OptionSpec::required("compression", OptionKind::String).with_default("\"gz\""),
    OptionSpec::required("hash_algorithm", OptionKind::String).with_default("\"none\""),
    OptionSpec::required("write_buffer", OptionKind::String).with_default("\"grouping\""),
    OptionSpec::required("write_buffer_options", OptionKind::Object).with_default("{}"),
];

/// Options whose explicit presence disables every bypass.
pub const BYPASS_BLOCKING_OPTIONS: [&str; 3] =
    ["items_limit", "items_per_buffer_write", "size_per_buffer_write"];

/// Options a bypass copies past without applying: files are moved as they
/// are, so they are neither recompressed, hashed nor checked.
pub const BYPASS_IGNORED_OPTIONS: [&str; 3] = ["check_consistency", "compression", "hash_algorithm"];

/// Strategy used to accumulate records before packing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteBufferKind {
    /// Append every record to its group file
    Grouping,
    /// Keep a uniform sample of `sample_size` records per group
    Reservoir { sample_size: usize },
}

#[derive(Debug, Deserialize)]
struct RawWriterOptions {
    items_per_buffer_write: u64,
    size_per_buffer_write: u64,
    items_limit: u64,
    check_consistency: bool,
    compression: String,
    hash_algorithm: String,
    write_buffer: String,
    write_buffer_options: Map<String, Value>,
}

/// Resolved generic writer options.
#[derive(Debug, Clone, PartialEq)]
pub struct WriterOptions {
    pub items_per_buffer_write: u64,
    pub size_per_buffer_write: u64,
    /// 0 means unlimited
    pub items_limit: u64,
    pub check_consistency: bool,
    pub compression: Compression,
    pub hash_algorithm: Option<HashAlgorithm>,
    pub write_buffer: WriteBufferKind,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            items_per_buffer_write: DEFAULT_ITEMS_PER_BUFFER_WRITE,
            size_per_buffer_write: DEFAULT_SIZE_PER_BUFFER_WRITE,
            items_limit: 0,
            check_consistency: false,
            compression: Compression::Gz,
            hash_algorithm: None,
            write_buffer: WriteBufferKind::Grouping,
        }
    }
}

impl WriterOptions {
    /// Splits a writer's options into the generic ones and the rest.
    ///
    /// The generic ones are resolved and validated here; the remainder is
    /// left for the specific writer.
    pub fn split(module: &str, options: &Map<String, Value>) -> Result<(Self, Map<String, Value>)> {
        let (generic, specific): (Map<String, Value>, Map<String, Value>) = options
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .partition(|(k, _)| GENERIC_WRITER_OPTIONS.iter().any(|s| s.name == k));

        let raw: RawWriterOptions =
            ef_types::parse_options(module, &GENERIC_WRITER_OPTIONS, &generic)?;
        Ok((Self::from_raw(module, raw)?, specific))
    }

    fn from_raw(module: &str, raw: RawWriterOptions) -> Result<Self> {
        if raw.items_per_buffer_write == 0 {
            return Err(ExportError::config(format!(
                "{module}: items_per_buffer_write must be > 0"
            )));
        }
        let write_buffer = match raw.write_buffer.as_str() {
            "grouping" => WriteBufferKind::Grouping,
            "reservoir" | "reservoir_sampling" => {
                let sample_size = raw
                    .write_buffer_options
                    .get("sample_size")
                    .and_then(Value::as_u64)
                    .filter(|n| *n > 0)
                    .ok_or_else(|| {
                        ExportError::config(format!(
                            "{module}: write_buffer_options.sample_size must be a positive integer"
                        ))
                    })?;
                WriteBufferKind::Reservoir {
                    sample_size: sample_size as usize,
                }
            }
            other => {
                return Err(ExportError::config(format!(
                    "{module}: unknown write_buffer '{other}' (expected grouping or reservoir)"
                )))
            }
        };

        Ok(Self {
            items_per_buffer_write: raw.items_per_buffer_write,
            size_per_buffer_write: raw.size_per_buffer_write,
            items_limit: raw.items_limit,
            check_consistency: raw.check_consistency,
            compression: raw.compression.parse()?,
            hash_algorithm: HashAlgorithm::parse_option(&raw.hash_algorithm)?,
            write_buffer,
        })
    }
}

/// Returns the first option among [`BYPASS_BLOCKING_OPTIONS`] explicitly set.
pub fn bypass_blocking_option(options: &Map<String, Value>) -> Option<&'static str> {
    BYPASS_BLOCKING_OPTIONS
        .iter()
        .copied()
        .find(|name| options.contains_key(*name))
}

/// Options among [`BYPASS_IGNORED_OPTIONS`] explicitly set.
pub fn bypass_ignored_options(options: &Map<String, Value>) -> Vec<&'static str> {
    BYPASS_IGNORED_OPTIONS
        .iter()
        .copied()
        .filter(|name| options.contains_key(*name))
        .collect()
}
