//! Engagement keys and per-key state
//!
//! An engagement is a per-user, per-post boolean relation (liked, reposted,
//! saved). State is keyed by `(user, post, kind)` and only ever mutated by the
//! toggle state machine in `chorus-feed`.

use crate::errors::{FeedError, Result};
use crate::types::identifiers::{PostId, UserId};
use crate::types::post::ViewerEngagement;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum length of a repost comment, in Unicode code points.
pub const MAX_REPOST_COMMENT_CHARS: usize = 280;

/// The kind of engagement being toggled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    /// Like / unlike
    Like,
    /// Repost / remove repost
    Repost,
    /// Save / unsave
    Save,
}

impl ActionKind {
    /// All kinds, in display order.
    pub const ALL: [ActionKind; 3] = [ActionKind::Like, ActionKind::Repost, ActionKind::Save];

    /// Path segment used by the REST interface.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Like => "like",
            Self::Repost => "repost",
            Self::Save => "save",
        }
    }

    /// Read this kind's flag from the baseline viewer flags.
    pub fn viewer_flag(&self, viewer: &ViewerEngagement) -> bool {
        match self {
            Self::Like => viewer.is_liked,
            Self::Repost => viewer.is_reposted,
            Self::Save => viewer.is_saved,
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of one engagement relation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EngagementKey {
    /// Engaging user
    pub user: UserId,
    /// Target post
    pub post: PostId,
    /// Engagement kind
    pub kind: ActionKind,
}

impl EngagementKey {
    /// Build a key.
    pub fn new(user: impl Into<UserId>, post: impl Into<PostId>, kind: ActionKind) -> Self {
        Self {
            user: user.into(),
            post: post.into(),
            kind,
        }
    }

    /// Reject keys with blank identifiers.
    pub fn validate(&self) -> Result<()> {
        if self.user.is_blank() {
            return Err(FeedError::invalid("user id is empty"));
        }
        if self.post.is_blank() {
            return Err(FeedError::invalid("post id is empty"));
        }
        Ok(())
    }
}

impl fmt::Display for EngagementKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.user, self.post, self.kind)
    }
}

/// Local state of one engagement relation.
///
/// `repost_comment` is only ever set for repost keys that are applied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngagementState {
    /// Whether the relation currently holds (possibly optimistically)
    pub applied: bool,
    /// Whether a remote call for this key is in flight
    pub pending: bool,
    /// Comment entered when the repost was submitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repost_comment: Option<String>,
}

impl EngagementState {
    /// Settled state with the given applied flag.
    pub fn settled(applied: bool) -> Self {
        Self {
            applied,
            pending: false,
            repost_comment: None,
        }
    }
}

/// Direction of a toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Transition {
    /// off -> on
    Apply,
    /// on -> off
    Revoke,
}

impl Transition {
    /// Transition that moves away from `applied`.
    pub fn from_current(applied: bool) -> Self {
        if applied {
            Self::Revoke
        } else {
            Self::Apply
        }
    }

    /// Value of `applied` after the transition.
    pub fn target(&self) -> bool {
        matches!(self, Self::Apply)
    }
}

/// Remote mutation issued for one toggle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngagementMutation {
    /// `POST /posts/{id}/like`
    CreateLike,
    /// `DELETE /posts/{id}/like`
    DeleteLike,
    /// `POST /posts/{id}/repost` with an optional comment
    CreateRepost {
        /// Comment entered at submission time
        comment: Option<String>,
    },
    /// `DELETE /posts/{id}/repost`
    DeleteRepost,
    /// `POST /posts/{id}/save`
    CreateSave,
    /// `DELETE /posts/{id}/save`
    DeleteSave,
}

impl EngagementMutation {
    /// Map a kind and direction to the remote mutation. The comment is dropped
    /// for anything other than turning a repost on.
    pub fn for_transition(kind: ActionKind, transition: Transition, comment: Option<String>) -> Self {
        match (kind, transition) {
            (ActionKind::Like, Transition::Apply) => Self::CreateLike,
            (ActionKind::Like, Transition::Revoke) => Self::DeleteLike,
            (ActionKind::Repost, Transition::Apply) => Self::CreateRepost { comment },
            (ActionKind::Repost, Transition::Revoke) => Self::DeleteRepost,
            (ActionKind::Save, Transition::Apply) => Self::CreateSave,
            (ActionKind::Save, Transition::Revoke) => Self::DeleteSave,
        }
    }

    /// Engagement kind this mutation belongs to.
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::CreateLike | Self::DeleteLike => ActionKind::Like,
            Self::CreateRepost { .. } | Self::DeleteRepost => ActionKind::Repost,
            Self::CreateSave | Self::DeleteSave => ActionKind::Save,
        }
    }

    /// Direction of this mutation.
    pub fn transition(&self) -> Transition {
        match self {
            Self::CreateLike | Self::CreateRepost { .. } | Self::CreateSave => Transition::Apply,
            Self::DeleteLike | Self::DeleteRepost | Self::DeleteSave => Transition::Revoke,
        }
    }
}

/// Normalize a repost comment: blank becomes `None`, over-long is rejected.
pub fn normalize_repost_comment(comment: Option<String>) -> Result<Option<String>> {
    let Some(comment) = comment else {
        return Ok(None);
    };
    if comment.trim().is_empty() {
        return Ok(None);
    }
    let chars = comment.chars().count();
    if chars > MAX_REPOST_COMMENT_CHARS {
        return Err(FeedError::invalid(format!(
            "repost comment is {chars} characters, limit is {MAX_REPOST_COMMENT_CHARS}"
        )));
    }
    Ok(Some(comment))
}
