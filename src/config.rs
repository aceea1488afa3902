//! Engine configuration parsing and validation.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::engine::codec::MAX_LINE_BYTES;
use crate::engine::spawner::EngineBinary;
use crate::{AppError, Result};

/// Smallest accepted error-delivery queue capacity.
///
/// Every session task posts at most one outcome, so this keeps producers
/// from ever blocking on a slow completion loop.
pub const MIN_ERROR_QUEUE_CAPACITY: usize = 10;

fn default_max_line_bytes() -> usize {
    MAX_LINE_BYTES
}

fn default_error_queue_capacity() -> usize {
    MIN_ERROR_QUEUE_CAPACITY
}

fn default_inbound_queue_capacity() -> usize {
    16
}

fn default_shutdown_grace_ms() -> u64 {
    5000
}

/// On-disk shape of the configuration file.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
struct RawConfig {
    binary: PathBuf,
    #[serde(default)]
    extra_args: Vec<String>,
    #[serde(default = "default_max_line_bytes")]
    max_line_bytes: usize,
    #[serde(default = "default_error_queue_capacity")]
    error_queue_capacity: usize,
    #[serde(default = "default_inbound_queue_capacity")]
    inbound_queue_capacity: usize,
    #[serde(default = "default_shutdown_grace_ms")]
    shutdown_grace_ms: u64,
}

/// Settings for one engine session.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Where the engine executable comes from.
    pub binary: EngineBinary,
    /// Additional arguments passed after the mode flag.
    pub extra_args: Vec<String>,
    /// Maximum length of a single stdout record.
    pub max_line_bytes: usize,
    /// Capacity of the error-delivery queue (at least [`MIN_ERROR_QUEUE_CAPACITY`]).
    pub error_queue_capacity: usize,
    /// Capacity of the inbound-message queue.
    pub inbound_queue_capacity: usize,
    /// How long teardown waits for the engine to exit before killing it.
    pub shutdown_grace: Duration,
}

impl EngineConfig {
    /// Build a configuration with default settings for the given binary.
    #[must_use]
    pub fn with_binary(binary: EngineBinary) -> Self {
        Self {
            binary,
            extra_args: Vec::new(),
            max_line_bytes: default_max_line_bytes(),
            error_queue_capacity: default_error_queue_capacity(),
            inbound_queue_capacity: default_inbound_queue_capacity(),
            shutdown_grace: Duration::from_millis(default_shutdown_grace_ms()),
        }
    }

    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let raw: RawConfig = toml::from_str(raw)?;
        let config = Self {
            binary: EngineBinary::Path(raw.binary),
            extra_args: raw.extra_args,
            max_line_bytes: raw.max_line_bytes,
            error_queue_capacity: raw.error_queue_capacity,
            inbound_queue_capacity: raw.inbound_queue_capacity,
            shutdown_grace: Duration::from_millis(raw.shutdown_grace_ms),
        };
        config.validate()?;
        Ok(config)
    }

    /// Check the numeric limits.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` naming the first offending key.
    pub fn validate(&self) -> Result<()> {
        if self.max_line_bytes == 0 {
            return Err(AppError::Config(
                "max_line_bytes must be greater than zero".into(),
            ));
        }

        if self.error_queue_capacity < MIN_ERROR_QUEUE_CAPACITY {
            return Err(AppError::Config(format!(
                "error_queue_capacity must be at least {MIN_ERROR_QUEUE_CAPACITY}"
            )));
        }

        if self.inbound_queue_capacity == 0 {
            return Err(AppError::Config(
                "inbound_queue_capacity must be greater than zero".into(),
            ));
        }

        if let EngineBinary::Path(path) = &self.binary {
            if path.as_os_str().is_empty() {
                return Err(AppError::Config("binary must not be empty".into()));
            }
        }

        Ok(())
    }
}
