//! Error types for the CloudStack client.

use thiserror::Error;

use crate::config::ConfigError;

/// Errors raised while constructing a [`super::CloudStackClient`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum CloudStackError {
    /// Raised when the configuration is incomplete.
    #[error("configuration error: {0}")]
    Config(String),
    /// Raised when the HTTP client cannot be built.
    #[error("failed to build HTTP client: {message}")]
    Client {
        /// Message returned by the HTTP library.
        message: String,
    },
}

impl From<ConfigError> for CloudStackError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value.to_string())
    }
}
