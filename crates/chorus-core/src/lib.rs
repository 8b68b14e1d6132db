//! # Chorus Core
//!
//! Foundation types for the chorus feed client: posts, drafts and engagement
//! keys, the `FeedError` taxonomy, channel and REST wire formats, client
//! configuration, and the effect traits through which the synchronization
//! core in `chorus-feed` reaches every remote collaborator.
//!
//! This crate performs no I/O of its own. Production handlers live in
//! `chorus-transport`; deterministic doubles live in `chorus-testkit`.

#![forbid(unsafe_code)]

pub mod config;
pub mod effects;
pub mod errors;
pub mod protocol;
pub mod types;

pub use config::{ClientConfig, ConfigError, ContentLimits, ReconnectConfig};
pub use effects::{
    ChannelLink, ChannelTransport, ConnectError, ConnectionState, EngagementEffects, PostEffects,
    RemoteEffects,
};
pub use errors::{ErrorCategory, FeedError, RemoteError, Result};
pub use protocol::{ClientEvent, ServerEvent};
pub use types::*;
