//! CLI command implementations.

pub mod build;
pub mod common;
pub mod demos;
pub mod run;
pub mod version;
