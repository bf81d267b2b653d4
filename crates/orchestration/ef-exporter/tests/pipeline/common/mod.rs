//! In-process plugins for executor tests.
//!
//! Each helper registers a plugin into a [`Registry`] and returns a handle
//! the test can inspect after the run.

use async_trait::async_trait;
use ef_error::{ExportError, Result};
use ef_exporter::registry::Capabilities;
use ef_exporter::Registry;
use ef_traits::{Notifier, Reader, Writer};
use ef_types::{Record, WriteInfo};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Emits a fixed list of records in batches; position = records emitted.
pub struct ListReader {
    records: Vec<Value>,
    batch_size: usize,
    emitted: usize,
    fail_at: Option<usize>,
    armed: Arc<AtomicBool>,
    stall_at: Option<usize>,
    stalled: bool,
    positions: Arc<Mutex<Vec<Option<Value>>>>,
}

#[async_trait]
impl Reader for ListReader {
    async fn get_next_batch(&mut self) -> Result<Vec<Record>> {
        if self.fail_at == Some(self.emitted) && self.armed.swap(false, Ordering::SeqCst) {
            return Err(ExportError::reader(format!("induced failure at {}", self.emitted)));
        }
        if self.stall_at == Some(self.emitted) {
            if self.stalled {
                return Err(ExportError::reader(format!("stalled at {}", self.emitted)));
            }
            self.stalled = true;
            return Ok(Vec::new());
        }
        let end = (self.emitted + self.batch_size).min(self.records.len());
        let batch = self.records[self.emitted..end]
            .iter()
            .cloned()
            .map(Record::from_value)
            .collect::<Result<Vec<_>>>()?;
        self.emitted = end;
        Ok(batch)
    }

    fn is_finished(&self) -> bool {
        self.emitted >= self.records.len()
    }

    /// A stalled reader reports one record past what it emitted.
    fn get_last_position(&self) -> Value {
        json!(self.emitted + usize::from(self.stalled))
    }

    fn set_last_position(&mut self, position: Option<Value>) -> Result<()> {
        self.positions.lock().push(position.clone());
        self.emitted = position.and_then(|p| p.as_u64()).unwrap_or(0) as usize;
        Ok(())
    }
}

/// Handle on a registered list reader.
#[derive(Clone, Default)]
pub struct ListReaderHandle {
    armed: Arc<AtomicBool>,
    positions: Arc<Mutex<Vec<Option<Value>>>>,
}

impl ListReaderHandle {
    /// Positions passed to `set_last_position`, in call order.
    pub fn positions(&self) -> Vec<Option<Value>> {
        self.positions.lock().clone()
    }
}

/// Registers reader `list`; with `fail_at`, the first batch requested at
/// that position fails once.
pub fn register_list_reader(
    registry: &mut Registry,
    records: Vec<Value>,
    batch_size: usize,
    fail_at: Option<usize>,
) -> ListReaderHandle {
    register_reader(registry, records, batch_size, fail_at, None)
}

/// Registers reader `list` that returns an empty batch at `stall_at`, then
/// fails at the same position.
pub fn register_stalling_reader(
    registry: &mut Registry,
    records: Vec<Value>,
    batch_size: usize,
    stall_at: usize,
) -> ListReaderHandle {
    register_reader(registry, records, batch_size, None, Some(stall_at))
}

fn register_reader(
    registry: &mut Registry,
    records: Vec<Value>,
    batch_size: usize,
    fail_at: Option<usize>,
    stall_at: Option<usize>,
) -> ListReaderHandle {
    let handle = ListReaderHandle {
        armed: Arc::new(AtomicBool::new(fail_at.is_some())),
        positions: Arc::default(),
    };
    let shared = handle.clone();
    registry
        .readers
        .register("list", &[], Capabilities::NONE, move |_| {
            Ok(Box::new(ListReader {
                records: records.clone(),
                batch_size,
                emitted: 0,
                fail_at,
                armed: shared.armed.clone(),
                stall_at,
                stalled: false,
                positions: shared.positions.clone(),
            }))
        });
    handle
}

/// A file handed to the memory writer.
#[derive(Debug, Clone)]
pub struct Delivered {
    pub group_keys: Vec<String>,
    pub lines: Vec<Value>,
}

/// Keeps delivered files in memory. Expects uncompressed JSON lines.
pub struct MemoryWriter {
    delivered: Arc<Mutex<Vec<Delivered>>>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl Writer for MemoryWriter {
    async fn write(&mut self, info: &WriteInfo, group_keys: &[String]) -> Result<()> {
        let content = tokio::fs::read_to_string(&info.file_path).await?;
        let lines = content
            .lines()
            .filter(|l| !l.is_empty())
            .map(serde_json::from_str)
            .collect::<std::result::Result<Vec<Value>, _>>()?;
        assert_eq!(lines.len() as u64, info.number_of_records);
        self.delivered.lock().push(Delivered {
            group_keys: group_keys.to_vec(),
            lines,
        });
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[derive(Clone, Default)]
pub struct MemoryWriterHandle {
    delivered: Arc<Mutex<Vec<Delivered>>>,
    closed: Arc<AtomicBool>,
}

impl MemoryWriterHandle {
    pub fn delivered(&self) -> Vec<Delivered> {
        self.delivered.lock().clone()
    }

    /// Every delivered record, in delivery order.
    pub fn records(&self) -> Vec<Value> {
        self.delivered
            .lock()
            .iter()
            .flat_map(|d| d.lines.iter().cloned())
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Registers writer `memory`.
pub fn register_memory_writer(registry: &mut Registry) -> MemoryWriterHandle {
    let handle = MemoryWriterHandle::default();
    let shared = handle.clone();
    registry
        .writers
        .register("memory", &[], Capabilities::NONE, move |_| {
            Ok(Box::new(MemoryWriter {
                delivered: shared.delivered.clone(),
                closed: shared.closed.clone(),
            }))
        });
    handle
}

/// Records lifecycle events as `started`, `completed` or `failed: <message>`.
pub struct RecordingNotifier {
    events: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify_start(&self) -> Result<()> {
        self.events.lock().push("started".into());
        Ok(())
    }

    async fn notify_complete(&self, _metadata: &Value) -> Result<()> {
        self.events.lock().push("completed".into());
        Ok(())
    }

    async fn notify_failure(&self, message: &str, _trace: &str, _configuration: &Value) -> Result<()> {
        self.events.lock().push(format!("failed: {message}"));
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}

/// Registers notifier `recording`; returns its event log.
pub fn register_recording_notifier(registry: &mut Registry) -> Arc<Mutex<Vec<String>>> {
    let events: Arc<Mutex<Vec<String>>> = Arc::default();
    let shared = events.clone();
    registry
        .notifiers
        .register("recording", &[], Capabilities::NONE, move |_| {
            Ok(Box::new(RecordingNotifier {
                events: shared.clone(),
            }))
        });
    events
}

/// `n` records `{"id": i}`.
pub fn numbered(n: usize) -> Vec<Value> {
    (0..n).map(|id| json!({ "id": id })).collect()
}
