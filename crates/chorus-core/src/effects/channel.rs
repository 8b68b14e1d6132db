//! Duplex channel transport interface
//!
//! # Effect Classification
//!
//! - **Category**: Infrastructure Effect
//! - **Implementation**: `chorus-transport` (WebSocket), `chorus-testkit` (in-memory relay)
//! - **Usage**: `BroadcastChannel` in `chorus-feed`
//!
//! A transport only knows how to open one link. Reconnection, state tracking
//! and event mapping live in the broadcast channel that owns the link.

use crate::protocol::{ClientEvent, ServerEvent};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Lifecycle state of a session's broadcast connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionState {
    /// No link; publishing is refused
    #[default]
    Disconnected,
    /// A connect attempt is running; publishing is refused
    Connecting,
    /// Link is up
    Connected,
}

impl ConnectionState {
    /// Whether outbound events can be sent.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        })
    }
}

/// One established link.
///
/// The link is considered dropped once `inbound` yields `None`; sends on
/// `outbound` fail from then on.
#[derive(Debug)]
pub struct ChannelLink {
    /// Events to the server
    pub outbound: mpsc::UnboundedSender<ClientEvent>,
    /// Events from the server
    pub inbound: mpsc::UnboundedReceiver<ServerEvent>,
}

/// Error opening a link.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("connect failed: {reason}")]
pub struct ConnectError {
    /// Why the attempt failed
    pub reason: String,
}

impl ConnectError {
    /// Create a connect error.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Opens duplex links to the broadcast server.
#[async_trait]
pub trait ChannelTransport: Send + Sync {
    /// Open a new link. Each call yields an independent link.
    async fn connect(&self) -> Result<ChannelLink, ConnectError>;
}

#[async_trait]
impl<T: ChannelTransport + ?Sized> ChannelTransport for Arc<T> {
    async fn connect(&self) -> Result<ChannelLink, ConnectError> {
        (**self).connect().await
    }
}
