//! Effect interfaces
//!
//! Domain logic in `chorus-feed` reaches every remote collaborator through
//! these traits, so production handlers and test doubles are interchangeable.

pub mod channel;
pub mod remote;

pub use channel::{ChannelLink, ChannelTransport, ConnectError, ConnectionState};
pub use remote::{EngagementEffects, PostEffects, RemoteEffects};
