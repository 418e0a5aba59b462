//! Common error types for patfam

use thiserror::Error;

/// Common result type for patfam operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared by the patfam crates
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    ///
    /// The only error class allowed to abort a run, and only before any
    /// provider fetch has started.
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON encode/decode error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML decode error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
