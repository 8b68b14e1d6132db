//! # Chorus Feed
//!
//! The engagement-and-feed synchronization core.
//!
//! - [`EngagementToggle`]: optimistic like/repost/save with per-key `Busy`
//!   rejection and rollback on failure
//! - [`PendingMutation`]: the commit/rollback rule shared by toggles and post
//!   creation
//! - [`FeedAggregator`]: duplicate-free, prepend-only merge of the baseline
//!   fetch and live arrivals
//! - [`BroadcastChannel`]: reconnecting duplex channel with an explicit state
//!   machine and no outbound queueing
//! - [`PostComposer`]: draft retention and the HTTP/channel create paths
//! - [`FeedSession`]: explicit `init`/`shutdown` wiring of all of the above
//!
//! Remote collaborators are reached only through the effect traits in
//! `chorus-core`.

#![forbid(unsafe_code)]

pub mod aggregator;
pub mod channel;
pub mod composer;
pub mod engagement;
pub mod reconciliation;
pub mod session;

pub use aggregator::FeedAggregator;
pub use channel::{BroadcastChannel, ChannelEvent, CONNECTION_LOST};
pub use composer::{ComposerSettings, PostComposer};
pub use engagement::{
    EngagementStore, EngagementToggle, InFlightToggle, RepostSubmission, ToggleOutcome,
};
pub use reconciliation::{PendingMutation, Settled};
pub use session::FeedSession;
