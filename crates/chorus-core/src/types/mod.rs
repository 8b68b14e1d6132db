//! Domain types shared by every Chorus crate

pub mod engagement;
pub mod identifiers;
pub mod post;

pub use engagement::{
    normalize_repost_comment, ActionKind, EngagementKey, EngagementMutation, EngagementState,
    Transition, MAX_REPOST_COMMENT_CHARS,
};
pub use identifiers::{PostId, UserId};
pub use post::{FeedEntry, MediaAttachment, Post, PostDraft, ViewerEngagement};
