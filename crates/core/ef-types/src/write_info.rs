//! Packed-file descriptors and the compression/hash settings they carry.

use ef_error::{ExportError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Compression applied to buffer files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    None,
    #[default]
    Gz,
    Zip,
    Bz2,
}

impl Compression {
    /// Returns the file-name suffix, or `None` for uncompressed output.
    pub fn extension(&self) -> Option<&'static str> {
        match self {
            Self::None => None,
            Self::Gz => Some("gz"),
            Self::Zip => Some("zip"),
            Self::Bz2 => Some("bz2"),
        }
    }
}

impl FromStr for Compression {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "none" | "" => Ok(Self::None),
            "gz" | "gzip" => Ok(Self::Gz),
            "zip" => Ok(Self::Zip),
            "bz2" | "bzip2" => Ok(Self::Bz2),
            other => Err(ExportError::config(format!(
                "unsupported compression format '{other}' (expected none, gz, zip or bz2)"
            ))),
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension().unwrap_or("none"))
    }
}

/// Hash computed over packed files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    Md5,
    Sha256,
}

impl HashAlgorithm {
    /// Parses the `hash_algorithm` writer option; `none` disables hashing.
    pub fn parse_option(s: &str) -> Result<Option<Self>> {
        match s.to_lowercase().as_str() {
            "none" | "" => Ok(None),
            "md5" => Ok(Some(Self::Md5)),
            "sha256" => Ok(Some(Self::Sha256)),
            other => Err(ExportError::config(format!(
                "unsupported hash algorithm '{other}' (expected none, md5 or sha256)"
            ))),
        }
    }
}

/// Descriptor of a packed buffer file, ready for delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteInfo {
    /// Records written to the file since it was opened
    pub number_of_records: u64,

    /// Local path of the final (possibly compressed) file
    pub file_path: PathBuf,

    /// Size of the file on disk
    pub size_bytes: u64,

    /// Hex digest of the on-disk bytes, when hashing is enabled
    pub file_hash: Option<String>,

    /// Compression applied to the file
    pub compression: Compression,

    /// Format extension of the uncompressed content (e.g. `jl`)
    pub file_extension: String,
}

impl WriteInfo {
    /// Returns the extension a destination name should carry, e.g. `jl.gz`.
    pub fn full_extension(&self) -> String {
        match self.compression.extension() {
            Some(comp) => format!("{}.{comp}", self.file_extension),
            None => self.file_extension.clone(),
        }
    }
}
