//! Process-wide in-memory job store.

use super::JobBackend;
use ef_error::Result;
use ef_types::{OptionSpec, PersistedJob};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::LazyLock;

static JOBS: LazyLock<Mutex<HashMap<String, PersistedJob>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// Jobs live for the lifetime of the process and are shared by every
/// instance, so a second exporter in the same process can resume them.
#[derive(Debug, Default, Clone, Copy)]
pub struct MemoryBackend;

impl MemoryBackend {
    pub const OPTIONS: &'static [OptionSpec] = &[];

    pub fn new() -> Self {
        Self
    }

    pub fn from_options(options: &Map<String, Value>) -> Result<Self> {
        ef_types::resolve_options("persistence.memory", Self::OPTIONS, options)?;
        Ok(Self)
    }
}

impl JobBackend for MemoryBackend {
    fn read(&self, job_id: &str) -> Result<Option<PersistedJob>> {
        Ok(JOBS.lock().get(job_id).cloned())
    }

    fn write(&mut self, job: &PersistedJob) -> Result<()> {
        JOBS.lock().insert(job.job_id.clone(), job.clone());
        Ok(())
    }

    fn remove(&mut self, job_id: &str) -> Result<()> {
        JOBS.lock().remove(job_id);
        Ok(())
    }

    fn uri(&self, job_id: &str) -> Option<String> {
        Some(format!("memory:{job_id}"))
    }

    fn name(&self) -> &str {
        "memory"
    }
}
