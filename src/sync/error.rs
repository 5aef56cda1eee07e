use std::time::Duration;

use thiserror::Error;

/// Why a single fetch attempt produced no readings.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FetchError {
    #[error("request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
    #[error("network error: {0}")]
    Transport(String),
    #[error("unauthorized (HTTP {0})")]
    Unauthorized(u16),
    #[error("server responded with HTTP {0}")]
    Status(u16),
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("fetch cancelled")]
    Cancelled,
}

impl FetchError {
    /// Authorization failures are not fast-retried.
    pub fn is_auth(&self) -> bool {
        matches!(self, FetchError::Unauthorized(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, FetchError::Cancelled)
    }

    pub fn from_status(code: u16) -> Self {
        match code {
            401 | 403 => FetchError::Unauthorized(code),
            _ => FetchError::Status(code),
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            // reqwest does not report the configured limit.
            FetchError::Timeout(Duration::ZERO)
        } else if let Some(status) = err.status() {
            FetchError::from_status(status.as_u16())
        } else if err.is_decode() {
            FetchError::Malformed(err.to_string())
        } else {
            FetchError::Transport(err.to_string())
        }
    }
}
