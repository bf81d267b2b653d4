//! Job state store trait.

use ef_error::Result;
use serde_json::Value;

/// Trait for job state stores.
///
/// A store tracks one current job at a time. The job is either allocated
/// with [`generate_new_job`](Persistence::generate_new_job) or selected with
/// [`load_job`](Persistence::load_job) on resume.
///
/// Lifecycle: `created -> (commit)* -> finished`, or abandoned on crash
/// (resumable). [`delete`](Persistence::delete) is only called once the
/// job is known to be fully done.
pub trait Persistence: Send {
    /// Allocates a fresh job record and makes it current.
    fn generate_new_job(&mut self, configuration: &Value) -> Result<String>;

    /// Makes an existing job current.
    fn load_job(&mut self, job_id: &str) -> Result<()>;

    /// Id of the current job.
    fn job_id(&self) -> Option<&str>;

    /// Current position, or `None` if never committed.
    fn get_last_position(&self) -> Result<Option<Value>>;

    /// Atomically replaces the stored position.
    fn commit_position(&mut self, position: Value) -> Result<()>;

    /// Marks the job finished and releases resources.
    fn close(&mut self) -> Result<()>;

    /// Removes the job record entirely.
    fn delete(&mut self) -> Result<()>;

    /// URI that resumes the current job, for backends that can be resumed.
    fn resume_uri(&self) -> Option<String> {
        None
    }

    fn name(&self) -> &str;
}
