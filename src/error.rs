//! Error types for the Routegate service.

use thiserror::Error;

/// Main error type for Routegate operations.
///
/// Rate-limit rejections are not errors of this type; they are ordinary
/// [`Verdict`](crate::ratelimit::Verdict) values.
#[derive(Error, Debug)]
pub enum RoutegateError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// YAML parse errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Routegate operations.
pub type Result<T> = std::result::Result<T, RoutegateError>;
