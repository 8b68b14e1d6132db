//! Error taxonomy for the feed client
//!
//! `FeedError` is what callers of the synchronization core see. Effect
//! handlers report the narrower `RemoteError`, which converts into
//! `FeedError` at the seam.

use crate::effects::channel::ConnectionState;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Errors surfaced by toggles, post creation and the broadcast channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum FeedError {
    /// A toggle for the same key is already in flight
    #[error("Busy: {key} already has a request in flight")]
    Busy {
        /// Display form of the engagement key
        key: String,
    },

    /// Transport unreachable, dropped, or timed out
    #[error("Network failure: {message}")]
    NetworkFailure {
        /// Description of the transport problem
        message: String,
    },

    /// The server answered but declined the request
    #[error("Remote rejected{}: {message}", status_suffix(.status))]
    RemoteRejected {
        /// HTTP status, when the rejection came over HTTP
        status: Option<u16>,
        /// Server-supplied or synthesized reason
        message: String,
    },

    /// The broadcast channel is not connected
    #[error("Broadcast channel unavailable (state: {state})")]
    ChannelUnavailable {
        /// Channel state at the time of the call
        state: ConnectionState,
    },

    /// A local precondition failed; nothing was sent or mutated
    #[error("Invalid: {message}")]
    Invalid {
        /// Description of the violated precondition
        message: String,
    },
}

impl FeedError {
    /// Create a busy error for a key.
    pub fn busy(key: impl fmt::Display) -> Self {
        Self::Busy {
            key: key.to_string(),
        }
    }

    /// Create a network failure.
    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkFailure {
            message: message.into(),
        }
    }

    /// Create a rejection without an HTTP status.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::RemoteRejected {
            status: None,
            message: message.into(),
        }
    }

    /// Create a rejection carrying an HTTP status.
    pub fn rejected_with_status(status: u16, message: impl Into<String>) -> Self {
        Self::RemoteRejected {
            status: Some(status),
            message: message.into(),
        }
    }

    /// Create a channel-unavailable error.
    pub fn channel_unavailable(state: ConnectionState) -> Self {
        Self::ChannelUnavailable { state }
    }

    /// Create an invalid-input error.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    /// Whether an optimistic mutation must be reverted for this error.
    pub fn requires_rollback(&self) -> bool {
        matches!(self, Self::NetworkFailure { .. } | Self::RemoteRejected { .. })
    }

    /// Whether the error should be shown to the user as a transient message.
    ///
    /// `Busy` is an ignored click and `ChannelUnavailable` is recovered by the
    /// fallback path, so neither is shown.
    pub fn is_user_visible(&self) -> bool {
        !matches!(self, Self::Busy { .. } | Self::ChannelUnavailable { .. })
    }

    /// Coarse category for frontends.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Busy { .. } => ErrorCategory::Concurrency,
            Self::NetworkFailure { .. } | Self::ChannelUnavailable { .. } => ErrorCategory::Network,
            Self::RemoteRejected { .. } => ErrorCategory::Remote,
            Self::Invalid { .. } => ErrorCategory::Input,
        }
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" ({s})")).unwrap_or_default()
}

/// High-level error categories for frontend treatment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Overlapping request on the same key
    Concurrency,
    /// Connectivity problem, usually transient
    Network,
    /// Server-side refusal
    Remote,
    /// Correctable by the user
    Input,
}

impl ErrorCategory {
    /// Whether retrying later may succeed without user changes.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network | Self::Concurrency)
    }

    /// Short hint shown next to the error.
    pub fn resolution_hint(&self) -> &'static str {
        match self {
            Self::Concurrency => "Wait for the previous action to finish",
            Self::Network => "Check your network connection and retry",
            Self::Remote => "The server declined the request",
            Self::Input => "Check your input and try again",
        }
    }
}

/// Errors reported by remote effect handlers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum RemoteError {
    /// Could not reach the server or the connection broke
    #[error("transport error: {0}")]
    Transport(String),

    /// The call did not finish within its bound
    #[error("timed out after {timeout_ms}ms")]
    Timeout {
        /// Bound that was exceeded
        timeout_ms: u64,
    },

    /// Non-success status or explicit refusal
    #[error("rejected: {message}")]
    Rejected {
        /// HTTP status, when known
        status: Option<u16>,
        /// Reason
        message: String,
    },

    /// Response did not match the expected schema
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl From<RemoteError> for FeedError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::Transport(message) => Self::network(message),
            RemoteError::Timeout { timeout_ms } => {
                Self::network(format!("request timed out after {timeout_ms}ms"))
            }
            RemoteError::Rejected { status, message } => Self::RemoteRejected { status, message },
            RemoteError::Malformed(detail) => Self::rejected(format!("malformed response: {detail}")),
        }
    }
}

/// Standard result type for feed operations.
pub type Result<T> = std::result::Result<T, FeedError>;
