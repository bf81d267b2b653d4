//! Per-group flush policy and the pack operation.

use crate::grouping::{GroupInfo, GroupingInfo, RandomTokens};
use crate::tracker::FilesTracker;
use ef_error::{ExportError, Result};
use ef_types::{Compression, HashAlgorithm, Record, WriteInfo};
use md5::Md5;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use tracing::debug;

pub const DEFAULT_ITEMS_PER_BUFFER_WRITE: u64 = 500_000;
pub const DEFAULT_SIZE_PER_BUFFER_WRITE: u64 = 4_000_000_000;

/// Thresholds and file settings of a [`WriteBuffer`].
#[derive(Debug, Clone, PartialEq)]
pub struct WriteBufferOptions {
    pub items_per_buffer_write: u64,
    pub size_per_buffer_write: u64,
    pub compression: Compression,
    pub hash_algorithm: Option<HashAlgorithm>,
    pub file_extension: String,
}

impl Default for WriteBufferOptions {
    fn default() -> Self {
        Self {
            items_per_buffer_write: DEFAULT_ITEMS_PER_BUFFER_WRITE,
            size_per_buffer_write: DEFAULT_SIZE_PER_BUFFER_WRITE,
            compression: Compression::Gz,
            hash_algorithm: None,
            file_extension: "jl".to_string(),
        }
    }
}

/// Accumulates formatted records per group and packs them into files.
pub struct WriteBuffer {
    tracker: Box<dyn FilesTracker>,
    grouping_info: GroupingInfo,
    options: WriteBufferOptions,
}

impl WriteBuffer {
    pub fn new(
        tracker: Box<dyn FilesTracker>,
        tokens: RandomTokens,
        options: WriteBufferOptions,
    ) -> Self {
        Self {
            tracker,
            grouping_info: GroupingInfo::new(tokens),
            options,
        }
    }

    /// Routes a formatted record to its group's file.
    pub fn buffer(&mut self, record: &Record) -> Result<()> {
        let payload = record.formatted.as_deref().ok_or_else(|| {
            ExportError::Format("record reached the write buffer unformatted".to_string())
        })?;
        let key = &record.group_membership;
        self.tracker.add_item(key, payload)?;
        self.grouping_info.add_to_group(key);
        Ok(())
    }

    /// True when the group's current file reached either threshold.
    pub fn should_write_buffer(&self, key: &[String]) -> bool {
        if !self.tracker.supports_threshold_flush() {
            return false;
        }
        let buffered = self
            .grouping_info
            .get(key)
            .map_or(0, |g| g.buffered_items);
        self.tracker.current_size(key) >= self.options.size_per_buffer_write
            || buffered >= self.options.items_per_buffer_write
    }

    /// Closes the group's current file and describes it. Does not open a new one.
    pub fn pack_buffer(&mut self, key: &[String]) -> Result<WriteInfo> {
        let ended = self.tracker.end_group_file(key)?.ok_or_else(|| {
            ExportError::writer(format!("no buffer file to pack for group {key:?}"))
        })?;

        let size_bytes = std::fs::metadata(&ended.path)?.len();
        let file_hash = match self.options.hash_algorithm {
            Some(algorithm) => Some(hash_file(&ended.path, algorithm)?),
            None => None,
        };
        self.grouping_info.reset_buffered(key, ended.path.clone());

        debug!(
            group = ?key,
            records = ended.records,
            size_bytes,
            path = %ended.path.display(),
            "Packed buffer"
        );

        Ok(WriteInfo {
            number_of_records: ended.records,
            file_path: ended.path,
            size_bytes,
            file_hash,
            compression: self.options.compression,
            file_extension: self.options.file_extension.clone(),
        })
    }

    /// Opens a fresh file for the group's next batch.
    pub fn add_new_buffer_for_group(&mut self, key: &[String]) -> Result<()> {
        self.tracker.create_new_group_file(key)
    }

    /// Removes the packed file and its uncompressed sibling, if any.
    pub fn clean_tmp_files(&self, info: &WriteInfo) -> Result<()> {
        remove_if_exists(&info.file_path)?;
        if info.compression != Compression::None {
            remove_if_exists(&info.file_path.with_extension(""))?;
        }
        Ok(())
    }

    /// Groups with at least one buffered record.
    pub fn keys_with_items(&self) -> Vec<Vec<String>> {
        self.grouping_info.keys_with_items()
    }

    pub fn group(&self, key: &[String]) -> Option<&GroupInfo> {
        self.grouping_info.get(key)
    }

    pub fn grouping_info(&self) -> &GroupingInfo {
        &self.grouping_info
    }

    pub fn options(&self) -> &WriteBufferOptions {
        &self.options
    }

    pub fn tmp_dir(&self) -> &Path {
        self.tracker.tmp_dir()
    }

    /// Removes the temp directory.
    pub fn close(&mut self) -> Result<()> {
        self.tracker.close()
    }
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e.into()),
        _ => Ok(()),
    }
}

/// Hex digest of a file's bytes.
pub fn hash_file(path: &Path, algorithm: HashAlgorithm) -> Result<String> {
    let mut file = File::open(path)?;
    match algorithm {
        HashAlgorithm::Md5 => digest_reader::<Md5>(&mut file),
        HashAlgorithm::Sha256 => digest_reader::<Sha256>(&mut file),
    }
}

fn digest_reader<D: Digest>(reader: &mut impl Read) -> Result<String> {
    let mut hasher = D::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}
