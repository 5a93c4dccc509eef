//! Error types for the SkyMerge environment abstraction.

use thiserror::Error;

/// Errors that can occur while talking to the outside world.
#[derive(Debug, Error)]
pub enum EnvError {
    /// Transport failed (DNS, connection reset, TLS, ...)
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Remote answered with a non-success status
    #[error("HTTP status {0}")]
    HttpStatus(u16),

    /// Response body could not be decoded
    #[error("Decode error: {0}")]
    DecodeError(String),

    /// Operation timed out
    #[error("Timeout after {0}ms")]
    Timeout(u64),

    /// Source is switched off or unreachable by configuration (simulation faults)
    #[error("Source unavailable: {0}")]
    Unavailable(String),
}

impl EnvError {
    /// Creates a network error.
    pub fn network(msg: impl Into<String>) -> Self {
        Self::NetworkError(msg.into())
    }

    /// Creates an unavailable error.
    pub fn unavailable(what: impl std::fmt::Display) -> Self {
        Self::Unavailable(what.to_string())
    }
}

impl From<reqwest::Error> for EnvError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            // reqwest does not expose the configured limit on the error
            Self::Timeout(0)
        } else if let Some(status) = err.status() {
            Self::HttpStatus(status.as_u16())
        } else if err.is_decode() {
            Self::DecodeError(err.to_string())
        } else {
            Self::NetworkError(err.to_string())
        }
    }
}

impl From<serde_json::Error> for EnvError {
    fn from(err: serde_json::Error) -> Self {
        Self::DecodeError(err.to_string())
    }
}
