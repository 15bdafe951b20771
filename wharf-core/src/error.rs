//! Error types for Wharf
//!
//! This module defines the error types surfaced by the Wharf engine. Only
//! configuration problems, bind failures, and out-of-order lifecycle calls
//! reach callers as errors; per-connection runtime failures are contained by
//! the engine and reported through notifications and diagnostics instead.

use thiserror::Error;

/// Result type alias for Wharf operations
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for Wharf operations
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Lifecycle calls made out of order (start while listening, stop while stopped)
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// I/O errors (listener bind and socket setup)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Shorthand for an invalid-state error
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Error::InvalidState(message.into())
    }
}

/// Configuration errors
#[derive(Error, Debug, Clone)]
pub enum ConfigError {
    /// Invalid configuration value
    #[error("Invalid configuration value for {field}: {value}")]
    InvalidValue {
        /// Field that failed validation
        field: String,
        /// Rejected value
        value: String,
    },

    /// Missing required configuration
    #[error("Missing required configuration: {field}")]
    MissingField {
        /// Field that is required but absent
        field: String,
    },

    /// Listen URI could not be parsed
    #[error("Invalid listen URI: {0}")]
    InvalidUri(String),

    /// TLS material could not be loaded or assembled
    #[error("TLS configuration error: {0}")]
    Tls(String),

    /// Configuration validation failed
    #[error("Configuration validation failed: {0}")]
    Validation(String),
}
