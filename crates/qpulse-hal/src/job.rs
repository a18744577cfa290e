//! Running jobs.
//!
//! ```text
//!   Machine::execute() ──→ Job ──→ result_handles() ──→ JobResults
//!                           │
//!                           └──→ resume() / halt() / is_paused()
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{info, instrument};

use crate::backend::ExecutionBackend;
use crate::error::HalResult;
use crate::results::JobResults;

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub String);

impl JobId {
    /// Create a new job ID.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A job accepted by a backend.
pub struct Job {
    id: JobId,
    backend: Arc<dyn ExecutionBackend>,
    poll_interval: Duration,
    submitted_at: DateTime<Utc>,
    results: OnceCell<JobResults>,
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("backend", &self.backend.name())
            .field("submitted_at", &self.submitted_at)
            .finish()
    }
}

impl Job {
    pub fn new(id: JobId, backend: Arc<dyn ExecutionBackend>, poll_interval: Duration) -> Self {
        Self {
            id,
            backend,
            poll_interval,
            submitted_at: Utc::now(),
            results: OnceCell::new(),
        }
    }

    pub fn id(&self) -> &JobId {
        &self.id
    }

    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Result handles; the schema is loaded on first call.
    pub async fn result_handles(&self) -> HalResult<&JobResults> {
        self.results
            .get_or_try_init(|| {
                JobResults::load(self.id.clone(), Arc::clone(&self.backend), self.poll_interval)
            })
            .await
    }

    /// Resume a job waiting at a `pause` statement.
    #[instrument(skip(self), fields(job_id = %self.id))]
    pub async fn resume(&self) -> HalResult<()> {
        info!("resuming job");
        self.backend.resume(&self.id).await
    }

    /// Stop the job. Its results are closed.
    #[instrument(skip(self), fields(job_id = %self.id))]
    pub async fn halt(&self) -> HalResult<()> {
        info!("halting job");
        self.backend.halt(&self.id).await
    }

    pub async fn is_paused(&self) -> HalResult<bool> {
        self.backend.is_paused(&self.id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_id_display() {
        let id = JobId::from("3f1c");
        assert_eq!(id.to_string(), "3f1c");
        assert_eq!(id, JobId::new(String::from("3f1c")));
    }

    #[test]
    fn test_job_id_serializes_as_string() {
        let json = serde_json::to_string(&JobId::new("abc")).unwrap();
        assert_eq!(json, "\"abc\"");
    }
}
