//! Error types for GitHub operations

use thiserror::Error;

/// Result type for GitHub operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during GitHub operations
#[derive(Error, Debug)]
pub enum Error {
    /// Input rejected before any network call was made
    #[error("Invalid input: {0}")]
    Validation(String),

    /// Signature rejected, bad credentials, or token exchange refused
    #[error("GitHub authentication error: {0}")]
    Auth(String),

    /// Network failure or retryable status that outlived the retry policy
    #[error("Transient failure after {attempts} attempt(s): {message}")]
    Transient {
        attempts: u32,
        status: Option<u16>,
        message: String,
    },

    /// The operation's overall deadline passed
    #[error("Deadline exceeded after {attempts} attempt(s)")]
    Timeout { attempts: u32 },

    /// Non-retryable API error
    #[error("GitHub API error {status}: {message}")]
    Api { status: u16, message: String },

    /// Required credential or setting missing
    #[error("Configuration error: {0}")]
    Config(String),

    /// Unexpected response shape
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Error taxonomy used for status mapping and logging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    Auth,
    TransientNetwork,
    PermanentApi,
    Config,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Auth => "auth",
            ErrorKind::TransientNetwork => "transient_network",
            ErrorKind::PermanentApi => "permanent_api",
            ErrorKind::Config => "config",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    /// Which taxonomy bucket this error falls in
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) => ErrorKind::Validation,
            Error::Auth(_) => ErrorKind::Auth,
            Error::Transient { .. } | Error::Timeout { .. } => ErrorKind::TransientNetwork,
            Error::Api { .. } | Error::Parse(_) => ErrorKind::PermanentApi,
            Error::Config(_) => ErrorKind::Config,
        }
    }

    /// HTTP status reported by the platform, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Api { status, .. } => Some(*status),
            Error::Transient { status, .. } => *status,
            _ => None,
        }
    }

    /// Whether the deadline ran out
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout { .. })
    }
}
