//! Client and hardware configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::error::{HalError, HalResult};

/// Environment variable naming the client config file.
pub const CONFIG_ENV: &str = "QPULSE_CONFIG";

/// Options sent with every execute call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecuteOptions {
    /// Maximum job duration in milliseconds.
    pub duration_limit_ms: u64,
    /// Maximum number of result items kept per job.
    pub data_limit: u64,
    /// Start the job even if the machine is busy.
    pub force_execution: bool,
    /// Compile and validate without running.
    pub dry_run: bool,
    /// Backend-specific compiler flags.
    pub flags: Vec<String>,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            duration_limit_ms: 1000,
            data_limit: 20000,
            force_execution: false,
            dry_run: false,
            flags: Vec::new(),
        }
    }
}

impl ExecuteOptions {
    pub fn validate(&self) -> HalResult<()> {
        if self.flags.iter().any(|f| f.trim().is_empty()) {
            return Err(HalError::Configuration(
                "execute flags must be non-empty strings".into(),
            ));
        }
        Ok(())
    }
}

/// Results client configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Interval between result header polls.
    pub poll_interval_ms: u64,
    /// Timeout used when a caller does not pass one. `None` waits forever.
    pub default_timeout_secs: Option<f64>,
    pub execute: ExecuteOptions,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 200,
            default_timeout_secs: None,
            execute: ExecuteOptions::default(),
        }
    }
}

impl ClientConfig {
    pub fn from_yaml_str(yaml: &str) -> HalResult<Self> {
        let config: ClientConfig = serde_yaml_ng::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> HalResult<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "loading client config");
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    /// `~/.qpulse/config.yaml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".qpulse").join("config.yaml"))
    }

    /// Load from `$QPULSE_CONFIG`, else the default path if it exists, else defaults.
    /// Environment overrides are applied last.
    pub fn load_default() -> HalResult<Self> {
        let path = std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .or_else(|| Self::default_path().filter(|p| p.exists()));
        let config = match path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.with_env_overrides()
    }

    /// Defaults with environment overrides.
    pub fn from_env() -> HalResult<Self> {
        Self::default().with_env_overrides()
    }

    /// Apply `QPULSE_POLL_INTERVAL_MS` and `QPULSE_TIMEOUT_SECS`.
    pub fn with_env_overrides(mut self) -> HalResult<Self> {
        if let Ok(value) = std::env::var("QPULSE_POLL_INTERVAL_MS") {
            self.poll_interval_ms = value.parse().map_err(|_| {
                HalError::Configuration(format!("invalid QPULSE_POLL_INTERVAL_MS: {value}"))
            })?;
        }
        if let Ok(value) = std::env::var("QPULSE_TIMEOUT_SECS") {
            self.default_timeout_secs = Some(value.parse().map_err(|_| {
                HalError::Configuration(format!("invalid QPULSE_TIMEOUT_SECS: {value}"))
            })?);
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> HalResult<()> {
        if self.poll_interval_ms == 0 {
            return Err(HalError::Configuration(
                "poll_interval_ms must be positive".into(),
            ));
        }
        if let Some(timeout) = self.default_timeout_secs {
            if !timeout.is_finite() || timeout < 0.0 {
                return Err(HalError::Configuration(format!(
                    "default_timeout_secs must be a non-negative number, got {timeout}"
                )));
            }
        }
        self.execute.validate()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout_secs.map(Duration::from_secs_f64)
    }
}

/// Hardware configuration document handed to the backend with each program.
///
/// The document is opaque here; only its root must be a mapping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HardwareConfig(serde_json::Value);

impl HardwareConfig {
    pub fn new(value: serde_json::Value) -> HalResult<Self> {
        match value {
            serde_json::Value::Object(_) => Ok(Self(value)),
            serde_json::Value::Null => Ok(Self(serde_json::Value::Object(Default::default()))),
            other => Err(HalError::Configuration(format!(
                "hardware configuration must be a mapping, got {}",
                json_kind(&other)
            ))),
        }
    }

    pub fn empty() -> Self {
        Self(serde_json::Value::Object(Default::default()))
    }

    pub fn from_json_str(json: &str) -> HalResult<Self> {
        Self::new(serde_json::from_str(json)?)
    }

    pub fn from_yaml_str(yaml: &str) -> HalResult<Self> {
        Self::new(serde_yaml_ng::from_str(yaml)?)
    }

    /// Load a `.json` file as JSON and anything else as YAML.
    pub fn load(path: impl AsRef<Path>) -> HalResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&text),
            _ => Self::from_yaml_str(&text),
        }
    }

    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }

    /// Top-level section, e.g. `elements`.
    pub fn section(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "a sequence",
        serde_json::Value::Object(_) => "a mapping",
    }
}
