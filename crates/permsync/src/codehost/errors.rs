use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors returned by a code host client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The code host answered with a non-success status.
    #[error("HTTP {status} for {url}: {message}")]
    Http {
        status: u16,
        url: String,
        message: String,
    },

    /// The primary rate limit is exhausted.
    #[error("Rate limit exceeded. Resets at {reset_at}")]
    RateLimited { reset_at: DateTime<Utc> },

    /// Connection-level failure.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The response body could not be decoded.
    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// Refreshing an expired OAuth token failed.
    #[error("Token refresh failed: {0}")]
    TokenRefresh(String),

    /// The client is misconfigured (bad base URL, unbuildable transport).
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl ClientError {
    /// Create an HTTP status error.
    #[inline]
    pub fn http(status: u16, url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            url: url.into(),
            message: message.into(),
        }
    }

    /// HTTP status code carried by this error, if any.
    #[inline]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether the code host reported the resource as missing (404).
    #[inline]
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    /// Whether the code host refused access to the resource (403).
    #[inline]
    pub fn is_forbidden(&self) -> bool {
        self.status() == Some(403)
    }

    /// Whether this is a rate limit error (retryable after a delay).
    #[inline]
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. }) || self.status() == Some(429)
    }
}

/// Result type for code host operations.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Take the first line of an error message for compact log output.
#[inline]
pub fn short_error_message(e: &impl std::error::Error) -> String {
    let full = e.to_string();
    full.lines().next().unwrap_or(&full).to_string()
}
