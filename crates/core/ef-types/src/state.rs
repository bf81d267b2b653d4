//! Persisted job records and bypass state shapes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A job record as stored by a persistence backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedJob {
    pub job_id: String,

    /// Opaque reader position (or bypass state), `null` until first commit
    #[serde(default)]
    pub last_position: Value,

    /// Configuration the job was created with
    pub configuration: Value,

    #[serde(default)]
    pub last_committed_timestamp: Option<DateTime<Utc>>,

    #[serde(default)]
    pub job_finished: bool,

    /// Number of commits performed
    #[serde(default)]
    pub commited_positions: u64,
}

impl PersistedJob {
    /// Creates a fresh, never-committed job record.
    pub fn new(job_id: impl Into<String>, configuration: Value) -> Self {
        Self {
            job_id: job_id.into(),
            last_position: Value::Null,
            configuration,
            last_committed_timestamp: None,
            job_finished: false,
            commited_positions: 0,
        }
    }

    /// Returns the last committed position, or `None` if never committed.
    pub fn position(&self) -> Option<&Value> {
        (!self.last_position.is_null()).then_some(&self.last_position)
    }

    /// Replaces the position and bumps the commit counter.
    pub fn commit(&mut self, position: Value) {
        self.last_position = position;
        self.commited_positions += 1;
        self.last_committed_timestamp = Some(Utc::now());
    }

    /// Marks the job finished.
    pub fn finish(&mut self) {
        self.job_finished = true;
        self.last_committed_timestamp = Some(Utc::now());
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyTransferStats {
    /// Sum of item counts stored in the source keys' metadata
    pub total_count: u64,

    /// False once any transferred key lacked an item count
    #[serde(default = "default_true")]
    pub valid_total_count: bool,
}

impl Default for KeyTransferStats {
    fn default() -> Self {
        Self {
            total_count: 0,
            valid_total_count: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Resumable state of a key-by-key object copy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyTransferState {
    pub pending: Vec<String>,
    pub done: Vec<String>,
    #[serde(default)]
    pub stats: KeyTransferStats,
}

impl KeyTransferState {
    /// Creates the initial state for a listing of source keys.
    pub fn new(keys: Vec<String>) -> Self {
        Self {
            pending: keys,
            done: Vec::new(),
            stats: KeyTransferStats::default(),
        }
    }

    /// Moves `key` from pending to done and adds its item count.
    pub fn mark_done(&mut self, key: &str, items: Option<u64>) {
        self.pending.retain(|k| k != key);
        self.done.push(key.to_string());
        match items {
            Some(items) => self.stats.total_count += items,
            None => self.stats.valid_total_count = false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamTransferStats {
    pub bytes_copied: u64,
}

/// Resumable state of a stream-forwarding copy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamTransferState {
    pub done: Vec<String>,
    #[serde(default)]
    pub stats: StreamTransferStats,
}

impl StreamTransferState {
    pub fn is_done(&self, filename: &str) -> bool {
        self.done.iter().any(|f| f == filename)
    }

    pub fn mark_done(&mut self, filename: &str, bytes: u64) {
        self.done.push(filename.to_string());
        self.stats.bytes_copied += bytes;
    }
}
