//! Configuration loading via `ortho-config`.

use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::reconciler::ReconcileSettings;
use crate::retry::RetryPolicy;

/// Control plane connection and timing settings derived from environment
/// variables, configuration files, and CLI flags.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(prefix = "STRATUS")]
pub struct StratusConfig {
    /// Base URL of the CloudStack API, for example
    /// `http://localhost:8096/client/api`. This value is required.
    pub api_url: String,
    /// API key forwarded as the `apikey` parameter. Requests are not signed,
    /// so this only identifies the caller to an integration endpoint.
    pub api_key: Option<String>,
    /// Seconds between job polls.
    #[ortho_config(default = 2)]
    pub poll_interval_secs: u64,
    /// Seconds a single job may stay pending before it is reported as timed
    /// out.
    #[ortho_config(default = 600)]
    pub job_timeout_secs: u64,
    /// Attempts per control plane call before a transport failure surfaces.
    #[ortho_config(default = 4)]
    pub transport_attempts: u32,
    /// Backoff before the first retry, in milliseconds. Doubles per attempt.
    #[ortho_config(default = 500)]
    pub backoff_base_ms: u64,
    /// HTTP request timeout in seconds.
    #[ortho_config(default = 30)]
    pub http_timeout_secs: u64,
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, env_var: &'static str, toml_key: &'static str) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }

    fn missing(&self) -> ConfigError {
        ConfigError::MissingField(format!(
            "missing {}: set {} or add {} to stratus.toml",
            self.description, self.env_var, self.toml_key
        ))
    }
}

impl StratusConfig {
    /// Loads configuration using the `ortho-config` derive. Values merge
    /// defaults, configuration files, environment variables, and CLI flags in
    /// that order of precedence.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the loader fails to merge sources.
    pub fn load_from_sources() -> Result<Self, ConfigError> {
        Self::load().map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Loads configuration without attempting to parse CLI arguments. Values
    /// still merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("stratus")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Performs semantic validation. Error messages name the environment
    /// variable and TOML key that supply each value.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when the API URL is empty and
    /// [`ConfigError::InvalidValue`] when a URL or timing value is unusable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.api_url.trim();
        if url.is_empty() {
            return Err(FieldMetadata::new("CloudStack API URL", "STRATUS_API_URL", "api_url")
                .missing());
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::InvalidValue(format!(
                "api_url must start with http:// or https:// (got '{url}'): \
                 set STRATUS_API_URL or api_url in stratus.toml"
            )));
        }
        let positive = [
            ("poll_interval_secs", "STRATUS_POLL_INTERVAL_SECS", self.poll_interval_secs),
            ("job_timeout_secs", "STRATUS_JOB_TIMEOUT_SECS", self.job_timeout_secs),
            ("http_timeout_secs", "STRATUS_HTTP_TIMEOUT_SECS", self.http_timeout_secs),
            (
                "transport_attempts",
                "STRATUS_TRANSPORT_ATTEMPTS",
                u64::from(self.transport_attempts),
            ),
        ];
        for (toml_key, env_var, value) in positive {
            if value == 0 {
                return Err(ConfigError::InvalidValue(format!(
                    "{toml_key} must be greater than zero: set {env_var} or {toml_key} in \
                     stratus.toml"
                )));
            }
        }
        Ok(())
    }

    /// Timing and retry settings for the reconciler.
    #[must_use]
    pub const fn settings(&self) -> ReconcileSettings {
        ReconcileSettings {
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            job_timeout: Duration::from_secs(self.job_timeout_secs),
            retry: RetryPolicy::new(
                self.transport_attempts,
                Duration::from_millis(self.backoff_base_ms),
            ),
        }
    }

    /// HTTP request timeout.
    #[must_use]
    pub const fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Indicates a configuration value is present but unusable.
    #[error("invalid configuration value: {0}")]
    InvalidValue(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}
