//! Per-run metadata registry.
//!
//! A cheaply cloneable handle shared by every stage of a run. Stages record
//! per-module values; the executor records run-level fields and serializes a
//! snapshot at shutdown.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use std::sync::Arc;

#[derive(Debug, Default)]
struct MetadataInner {
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
    configuration: Value,
    bypassed_pipeline: bool,
    accurate_items_count: bool,
    modules: Map<String, Value>,
}

/// Shared metadata handle.
#[derive(Debug, Clone)]
pub struct Metadata {
    inner: Arc<Mutex<MetadataInner>>,
}

impl Default for Metadata {
    fn default() -> Self {
        Self::new(Value::Null)
    }
}

impl Metadata {
    /// Creates a registry for a run with the given configuration.
    pub fn new(configuration: Value) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MetadataInner {
                configuration,
                accurate_items_count: true,
                ..Default::default()
            })),
        }
    }

    /// Records the run start time.
    pub fn start(&self) {
        self.inner.lock().start_time = Some(Utc::now());
    }

    /// Records the run end time.
    pub fn finish(&self) {
        self.inner.lock().end_time = Some(Utc::now());
    }

    /// Sets a per-module value.
    pub fn set_metadata(&self, module: &str, key: &str, value: impl Into<Value>) {
        let mut inner = self.inner.lock();
        let entry = inner
            .modules
            .entry(module.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(map) = entry {
            map.insert(key.to_string(), value.into());
        }
    }

    /// Returns a per-module value.
    pub fn get_metadata(&self, module: &str, key: &str) -> Option<Value> {
        self.inner
            .lock()
            .modules
            .get(module)
            .and_then(|m| m.get(key))
            .cloned()
    }

    /// Adds `by` to an integer per-module value, starting from zero.
    pub fn increment(&self, module: &str, key: &str, by: u64) -> u64 {
        let current = self
            .get_metadata(module, key)
            .and_then(|v| v.as_u64())
            .unwrap_or(0);
        let next = current + by;
        self.set_metadata(module, key, next);
        next
    }

    /// Returns a per-module integer value, or zero.
    pub fn get_u64(&self, module: &str, key: &str) -> u64 {
        self.get_metadata(module, key)
            .and_then(|v| v.as_u64())
            .unwrap_or(0)
    }

    pub fn set_bypassed_pipeline(&self, bypassed: bool) {
        self.inner.lock().bypassed_pipeline = bypassed;
    }

    pub fn bypassed_pipeline(&self) -> bool {
        self.inner.lock().bypassed_pipeline
    }

    pub fn set_accurate_items_count(&self, accurate: bool) {
        self.inner.lock().accurate_items_count = accurate;
    }

    pub fn accurate_items_count(&self) -> bool {
        self.inner.lock().accurate_items_count
    }

    /// Elapsed run time in seconds, up to `end_time` or now.
    pub fn elapsed_seconds(&self) -> f64 {
        let inner = self.inner.lock();
        match inner.start_time {
            Some(start) => {
                let end = inner.end_time.unwrap_or_else(Utc::now);
                (end - start).num_milliseconds() as f64 / 1000.0
            }
            None => 0.0,
        }
    }

    /// Serializes the registry.
    pub fn snapshot(&self) -> Value {
        let elapsed = self.elapsed_seconds();
        let inner = self.inner.lock();
        json!({
            "start_time": inner.start_time.map(|t| t.to_rfc3339()),
            "end_time": inner.end_time.map(|t| t.to_rfc3339()),
            "elapsed_time": elapsed,
            "configuration": inner.configuration,
            "bypassed_pipeline": inner.bypassed_pipeline,
            "accurate_items_count": inner.accurate_items_count,
            "modules": inner.modules,
        })
    }
}
