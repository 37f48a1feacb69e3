//! Error types for revgate core

use thiserror::Error;

/// Result type alias for revgate core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for revgate core operations
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Review engine failure
    #[error("Review engine error: {0}")]
    Engine(String),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}
