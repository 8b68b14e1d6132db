//! Transport-level errors and their mapping onto the core taxonomy

use chorus_core::{ConnectError, RemoteError};

/// Errors raised inside the HTTP and WebSocket handlers.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// A configured URL could not be parsed or used as a base
    #[error("Invalid URL {url}: {reason}")]
    InvalidUrl {
        /// The offending URL
        url: String,
        /// Why it was rejected
        reason: String,
    },

    /// The HTTP client failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The WebSocket handshake or stream failed
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// An operation exceeded its bound
    #[error("Timed out after {timeout_ms}ms")]
    Timeout {
        /// Bound that was exceeded
        timeout_ms: u64,
    },

    /// A frame or body could not be encoded or decoded
    #[error("Codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

impl TransportError {
    /// Create an invalid-URL error.
    pub fn invalid_url(url: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::InvalidUrl {
            url: url.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<TransportError> for RemoteError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Timeout { timeout_ms } => RemoteError::Timeout { timeout_ms },
            TransportError::Codec(e) => RemoteError::Malformed(e.to_string()),
            TransportError::Http(e) if e.is_decode() => RemoteError::Malformed(e.to_string()),
            other => RemoteError::Transport(other.to_string()),
        }
    }
}

impl From<TransportError> for ConnectError {
    fn from(err: TransportError) -> Self {
        ConnectError::new(err.to_string())
    }
}
