//! Job lifecycle notifications.

use async_trait::async_trait;
use ef_error::Result;
use serde_json::Value;

/// Trait for job notifiers.
///
/// Errors returned here are logged by the caller and never fail the job.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_start(&self) -> Result<()>;

    /// Called after a clean run with the final metadata snapshot.
    async fn notify_complete(&self, metadata: &Value) -> Result<()>;

    /// Called after a failed run.
    async fn notify_failure(&self, message: &str, trace: &str, configuration: &Value) -> Result<()>;

    fn name(&self) -> &str;
}
