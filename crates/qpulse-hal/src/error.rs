//! Error types for the HAL crate.

use qpulse_ir::IrError;
use thiserror::Error;

/// Errors that can occur while executing programs or reading results.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum HalError {
    /// A wait deadline elapsed.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// The backend rejected the program. `messages` holds every diagnostic,
    /// one per line.
    #[error("Job {job_id} failed to execute: {messages}")]
    ExecutionFailed { job_id: String, messages: String },

    /// No sink with this name in the job's result schema.
    #[error("Result not found: {0}")]
    ResultNotFound(String),

    /// The call is not valid for this handle.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A result payload does not match its dtype.
    #[error("Decode error: {0}")]
    Decode(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Job not found.
    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Program error.
    #[error(transparent)]
    Ir(#[from] IrError),
}

/// Result type for HAL operations.
pub type HalResult<T> = Result<T, HalError>;
