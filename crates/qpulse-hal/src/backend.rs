//! Execution backend trait and wire types.
//!
//! The [`ExecutionBackend`] trait is the boundary to whatever runs programs:
//!
//! ```text
//!   execute() ──→ result_schema() ──→ result_header() ──→ fetch_chunks()
//!   (program)      (once per job)      (polled)           (streamed)
//! ```
//!
//! | Method | Returns |
//! |--------|---------|
//! | `name()` | `&str` |
//! | `execute()` | job id and diagnostics |
//! | `result_schema()` | every named result of a job |
//! | `result_header()` | progress of one named result |
//! | `fetch_chunks()` | ordered binary chunks of one named result |
//! | `resume()`, `halt()`, `is_paused()` | job control |

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::{ExecuteOptions, HardwareConfig};
use crate::error::HalResult;
use crate::job::JobId;
use crate::results::{ResultHeader, ResultSchema};

/// Severity of a backend diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticLevel {
    Debug,
    Info,
    Warning,
    Error,
}

/// A message reported by the backend while accepting a program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub message: String,
}

impl Diagnostic {
    pub fn new(level: DiagnosticLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(DiagnosticLevel::Error, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(DiagnosticLevel::Warning, message)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.level, self.message)
    }
}

/// An execute call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteRequest {
    /// The program, serialized with `Program::to_json`.
    pub program: String,
    pub config: HardwareConfig,
    pub options: ExecuteOptions,
}

/// Outcome of an execute call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteResponse {
    pub job_id: JobId,
    pub ok: bool,
    #[serde(default)]
    pub messages: Vec<Diagnostic>,
}

/// A chunk of encoded result items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultChunk {
    /// Number of items in `data`.
    pub count: usize,
    pub data: Vec<u8>,
}

/// Stream of result chunks, in item order.
pub type ChunkStream = BoxStream<'static, HalResult<ResultChunk>>;

/// Trait for program execution backends.
///
/// Implementations must be thread-safe; handles share one backend through
/// an `Arc`.
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    /// Get the name of this backend.
    fn name(&self) -> &str;

    /// Submit a program for execution.
    ///
    /// A rejected program is reported with `ok == false` and diagnostics,
    /// not with an error.
    async fn execute(&self, request: &ExecuteRequest) -> HalResult<ExecuteResponse>;

    /// Schema of every named result of a job.
    async fn result_schema(&self, job_id: &JobId) -> HalResult<ResultSchema>;

    /// Progress snapshot of one named result.
    async fn result_header(&self, job_id: &JobId, name: &str) -> HalResult<ResultHeader>;

    /// Stream items `offset..offset + limit` of a named result.
    ///
    /// With `limit == None` the stream follows the result until it is done
    /// or closed.
    async fn fetch_chunks(
        &self,
        job_id: &JobId,
        name: &str,
        offset: usize,
        limit: Option<usize>,
    ) -> HalResult<ChunkStream>;

    /// Resume a paused job.
    async fn resume(&self, job_id: &JobId) -> HalResult<()>;

    /// Stop a job.
    async fn halt(&self, job_id: &JobId) -> HalResult<()>;

    /// Whether the job is waiting at a `pause` statement.
    async fn is_paused(&self, job_id: &JobId) -> HalResult<bool>;
}
