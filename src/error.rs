//! Error types for cxxbox

use thiserror::Error;

/// Result type alias using cxxbox's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for cxxbox
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Docker/container error (sandbox could not be created, started or attached)
    #[error("Container error: {0}")]
    Container(String),

    /// Compile phase exceeded its deadline
    #[error("Compile phase timed out")]
    CompileTimeout,

    /// Run phase exceeded its deadline
    #[error("Run phase timed out")]
    RunTimeout,

    /// Invalid input (oversized or empty code, bad options)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Check if error is a client error (user's fault)
    pub fn is_client_error(&self) -> bool {
        matches!(self, Error::InvalidInput(_))
    }

    /// Check if error is a phase timeout (maps to a gateway-timeout response)
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::CompileTimeout | Error::RunTimeout)
    }
}

impl From<bollard::errors::Error> for Error {
    fn from(err: bollard::errors::Error) -> Self {
        Error::Container(err.to_string())
    }
}
