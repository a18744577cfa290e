//! Program execution entry point.

use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

use qpulse_ir::Program;

use crate::backend::{Diagnostic, DiagnosticLevel, ExecuteRequest, ExecutionBackend};
use crate::config::{ClientConfig, ExecuteOptions, HardwareConfig};
use crate::error::{HalError, HalResult};
use crate::job::Job;

/// A backend bound to a hardware configuration.
pub struct Machine {
    backend: Arc<dyn ExecutionBackend>,
    hardware: HardwareConfig,
    config: ClientConfig,
}

impl fmt::Debug for Machine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Machine")
            .field("backend", &self.backend.name())
            .field("config", &self.config)
            .finish()
    }
}

impl Machine {
    pub fn new(backend: Arc<dyn ExecutionBackend>, hardware: HardwareConfig) -> Self {
        Self {
            backend,
            hardware,
            config: ClientConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn hardware(&self) -> &HardwareConfig {
        &self.hardware
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Execute with the configured options.
    pub async fn execute(&self, program: &Program) -> HalResult<Job> {
        self.execute_with(program, &self.config.execute).await
    }

    /// Execute a program.
    ///
    /// Backend diagnostics are logged at their level. A rejected program
    /// fails with [`HalError::ExecutionFailed`] carrying every message.
    #[instrument(skip(self, program, options), fields(backend = %self.backend.name()))]
    pub async fn execute_with(
        &self,
        program: &Program,
        options: &ExecuteOptions,
    ) -> HalResult<Job> {
        options.validate()?;
        let request = ExecuteRequest {
            program: program.to_json()?,
            config: self.hardware.clone(),
            options: options.clone(),
        };
        info!(
            statements = program.statements().len(),
            results = program.sinks().len(),
            dry_run = options.dry_run,
            "executing program"
        );

        let response = self.backend.execute(&request).await?;
        for diagnostic in &response.messages {
            log_diagnostic(diagnostic);
        }

        if !response.ok {
            let messages = response
                .messages
                .iter()
                .map(|d| d.message.as_str())
                .collect::<Vec<_>>()
                .join("\n");
            error!(job_id = %response.job_id, "job failed to execute");
            return Err(HalError::ExecutionFailed {
                job_id: response.job_id.to_string(),
                messages,
            });
        }

        info!(job_id = %response.job_id, "job started");
        Ok(Job::new(
            response.job_id,
            Arc::clone(&self.backend),
            self.config.poll_interval(),
        ))
    }
}

fn log_diagnostic(diagnostic: &Diagnostic) {
    match diagnostic.level {
        DiagnosticLevel::Debug => debug!("{}", diagnostic.message),
        DiagnosticLevel::Info => info!("{}", diagnostic.message),
        DiagnosticLevel::Warning => warn!("{}", diagnostic.message),
        DiagnosticLevel::Error => error!("{}", diagnostic.message),
    }
}
