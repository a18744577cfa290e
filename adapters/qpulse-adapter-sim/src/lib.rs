//! QPulse Scripted Simulator Backend
//!
//! This crate provides an in-memory [`ExecutionBackend`](qpulse_hal::ExecutionBackend)
//! for tests, demos and offline development. It does not model pulses;
//! result values are pushed by the caller or generated at random.
//!
//! # Features
//!
//! - **Schema Inference**: result names, cardinality and dtypes derived from
//!   the program's stream pipeline
//! - **Result Harness**: push values, flag data loss, finish or close jobs
//! - **Chunked Fetches**: configurable chunk size, followed streams for
//!   results still processing
//! - **Scripted Rejection**: fail every execution with given diagnostics
//!
//! # Dtype Inference
//!
//! | Pipeline | Dtype |
//! |----------|-------|
//! | source of an `int` variable | `int64` |
//! | source of a `fixed` variable | `float64` |
//! | `.average()` | `float64` |
//! | `.boolean_to_int()` | `int64` |
//! | `.buffer(n)` | input dtype with shape `[n]` |
//! | `.with_timestamps()` | input dtype, timestamped |
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use qpulse_adapter_sim::SimulatorBackend;
//! use qpulse_hal::{HardwareConfig, Machine};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let sim = Arc::new(SimulatorBackend::new());
//!     let machine = Machine::new(sim.clone(), HardwareConfig::empty());
//!
//!     let job = machine.execute(&program).await?;
//!     sim.fill_synthetic(job.id(), 100)?;
//!     sim.finish(job.id())?;
//!
//!     let results = job.result_handles().await?;
//!     println!("{:?}", results.require("I")?.fetch_all().await?);
//!     Ok(())
//! }
//! ```

mod schema;
mod simulator;

pub use simulator::SimulatorBackend;
