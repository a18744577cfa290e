//! QPulse Hardware Abstraction Layer
//!
//! This crate connects finished programs to whatever executes them and reads
//! their results back.
//!
//! # Overview
//!
//! - An [`ExecutionBackend`] trait for program submission, result schemas,
//!   result headers and chunked result streaming
//! - A [`Machine`] binding a backend to a [`HardwareConfig`]
//! - [`Job`] handles with lazily loaded [`JobResults`]
//! - [`NamedJobResult`] handles that wait on and fetch one named result
//!
//! # Example: Running a Program
//!
//! ```ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use qpulse_hal::{HardwareConfig, Machine};
//! use qpulse_adapter_sim::SimulatorBackend;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let program = build_program()?;
//!     let machine = Machine::new(Arc::new(SimulatorBackend::new()), HardwareConfig::empty());
//!
//!     let job = machine.execute(&program).await?;
//!     let results = job.result_handles().await?;
//!     results.wait_for_all_values(Some(Duration::from_secs(10))).await?;
//!
//!     for (name, handle) in results.iter() {
//!         println!("{name}: {:?}", handle.fetch_all().await?);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Result Semantics
//!
//! | Sink | Handle | `fetch` returns |
//! |------|--------|-----------------|
//! | `save` | single | the latest value, or nothing |
//! | `save_all` | multiple | items in the requested range |

pub mod backend;
pub mod config;
pub mod dtype;
pub mod error;
pub mod job;
pub mod machine;
pub mod results;

pub use backend::{
    ChunkStream, Diagnostic, DiagnosticLevel, ExecuteRequest, ExecuteResponse, ExecutionBackend,
    ResultChunk,
};
pub use config::{ClientConfig, ExecuteOptions, HardwareConfig};
pub use dtype::{ElementDtype, ResultValue, ScalarKind};
pub use error::{HalError, HalResult};
pub use job::{Job, JobId};
pub use machine::Machine;
pub use results::{
    FetchRange, FetchedResult, JobResults, NamedJobResult, ResultHeader, ResultItemSchema,
    ResultSchema,
};
