//! Job state stores.
//!
//! Every backend stores [`PersistedJob`] documents keyed by job id; the
//! job lifecycle on top of them is shared by [`JobStore`]:
//!
//! - [`NoneBackend`] - Nothing is stored; jobs cannot be resumed (default)
//! - [`MemoryBackend`] - Process-wide map, `memory:<job_id>`
//! - [`FileBackend`] - One JSON file per job, `file:<dir>/<job_id>`
//! - [`SqliteBackend`] - One row per job, `sqlite:<database>/<job_id>`

mod file;
mod memory;
mod sqlite;

pub use file::FileBackend;
pub use memory::MemoryBackend;
pub use sqlite::SqliteBackend;

use ef_error::{ExportError, Result};
use ef_traits::Persistence;
use ef_types::{ExportConfig, OptionSpec, PersistedJob};
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;
use tracing::{debug, info};
use uuid::Uuid;

static MEMORY_URI: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^memory:(?P<job_id>[^/]+)$").expect("valid memory uri regex"));
static FILE_URI: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^file:(?P<dir>.+)/(?P<job_id>[^/]+)$").expect("valid file uri regex")
});
static SQLITE_URI: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^sqlite:(?P<database>.+)/(?P<job_id>[^/]+)$").expect("valid sqlite uri regex")
});

/// Storage of job documents.
pub trait JobBackend: Send {
    /// Reads a job, `None` if it does not exist.
    fn read(&self, job_id: &str) -> Result<Option<PersistedJob>>;

    /// Creates or replaces a job.
    fn write(&mut self, job: &PersistedJob) -> Result<()>;

    /// Removes a job; removing a missing job is not an error.
    fn remove(&mut self, job_id: &str) -> Result<()>;

    /// URI resuming `job_id`, if jobs can be resumed.
    fn uri(&self, job_id: &str) -> Option<String>;

    fn name(&self) -> &str;
}

/// Job lifecycle over a [`JobBackend`].
pub struct JobStore<B> {
    backend: B,
    current: Option<PersistedJob>,
}

impl<B: JobBackend> JobStore<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            current: None,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn current_mut(&mut self) -> Result<&mut PersistedJob> {
        self.current
            .as_mut()
            .ok_or_else(|| ExportError::persistence("no current job"))
    }
}

impl<B: JobBackend> Persistence for JobStore<B> {
    fn generate_new_job(&mut self, configuration: &Value) -> Result<String> {
        let job = PersistedJob::new(Uuid::new_v4().to_string(), configuration.clone());
        self.backend.write(&job)?;
        let job_id = job.job_id.clone();
        info!(store = self.backend.name(), job_id = %job_id, "Created job");
        self.current = Some(job);
        Ok(job_id)
    }

    fn load_job(&mut self, job_id: &str) -> Result<()> {
        let job = self.backend.read(job_id)?.ok_or_else(|| {
            ExportError::config(format!(
                "job {job_id} not found in {} persistence",
                self.backend.name()
            ))
        })?;
        info!(
            store = self.backend.name(),
            job_id,
            commits = job.commited_positions,
            "Loaded job"
        );
        self.current = Some(job);
        Ok(())
    }

    fn job_id(&self) -> Option<&str> {
        self.current.as_ref().map(|job| job.job_id.as_str())
    }

    fn get_last_position(&self) -> Result<Option<Value>> {
        Ok(self.current.as_ref().and_then(|job| job.position().cloned()))
    }

    fn commit_position(&mut self, position: Value) -> Result<()> {
        let job = self.current_mut()?;
        job.commit(position);
        let job = job.clone();
        self.backend.write(&job)?;
        debug!(job_id = %job.job_id, commits = job.commited_positions, "Committed position");
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let job = self.current_mut()?;
        job.finish();
        let job = job.clone();
        self.backend.write(&job)
    }

    fn delete(&mut self) -> Result<()> {
        if let Some(job) = self.current.take() {
            self.backend.remove(&job.job_id)?;
            debug!(job_id = %job.job_id, "Deleted job");
        }
        Ok(())
    }

    fn resume_uri(&self) -> Option<String> {
        self.job_id().and_then(|id| self.backend.uri(id))
    }

    fn name(&self) -> &str {
        self.backend.name()
    }
}

/// Stores nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoneBackend;

impl NoneBackend {
    pub const OPTIONS: &'static [OptionSpec] = &[];

    pub fn from_options(options: &Map<String, Value>) -> Result<Self> {
        ef_types::resolve_options("persistence.none", Self::OPTIONS, options)?;
        Ok(Self)
    }
}

impl JobBackend for NoneBackend {
    fn read(&self, _job_id: &str) -> Result<Option<PersistedJob>> {
        Ok(None)
    }

    fn write(&mut self, _job: &PersistedJob) -> Result<()> {
        Ok(())
    }

    fn remove(&mut self, _job_id: &str) -> Result<()> {
        Ok(())
    }

    fn uri(&self, _job_id: &str) -> Option<String> {
        None
    }

    fn name(&self) -> &str {
        "none"
    }
}

/// Reads the job a persistence URI points at.
pub fn job_from_uri(uri: &str) -> Result<PersistedJob> {
    let (job, job_id) = if let Some(caps) = MEMORY_URI.captures(uri) {
        let job_id = &caps["job_id"];
        (MemoryBackend::new().read(job_id)?, job_id.to_string())
    } else if let Some(caps) = FILE_URI.captures(uri) {
        let job_id = &caps["job_id"];
        (FileBackend::new(&caps["dir"]).read(job_id)?, job_id.to_string())
    } else if let Some(caps) = SQLITE_URI.captures(uri) {
        let job_id = &caps["job_id"];
        (SqliteBackend::open(&caps["database"])?.read(job_id)?, job_id.to_string())
    } else {
        return Err(ExportError::config(format!(
            "unrecognized persistence URI '{uri}' (expected memory:, file: or sqlite:)"
        )));
    };
    job.ok_or_else(|| ExportError::config(format!("job {job_id} not found at {uri}")))
}

/// Returns the configuration a job was created with, marked as a resume of
/// that job.
pub fn configuration_from_uri(uri: &str) -> Result<ExportConfig> {
    let job = job_from_uri(uri)?;
    if job.job_finished {
        info!(job_id = %job.job_id, "Job already finished, resuming anyway");
    }
    Ok(ExportConfig::from_value(job.configuration)?.into_resumed(job.job_id))
}
