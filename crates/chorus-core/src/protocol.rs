//! Wire formats
//!
//! Channel frames are JSON text of the form `{"event": <name>, "data": {...}}`.
//! REST responses are checked against explicit schemas here so that handlers
//! never infer success from the mere presence of a field.

use crate::errors::RemoteError;
use crate::types::{EngagementMutation, FeedEntry, MediaAttachment, Post};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Events sent by the client over the broadcast channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Ask the server to create a post and acknowledge it
    CreatePost {
        /// Post text
        content: String,
        /// Optional image, base64 encoded
        #[serde(default, skip_serializing_if = "Option::is_none")]
        image: Option<MediaAttachment>,
    },
    /// Fan out an already committed post to other sessions
    NewPost {
        /// The committed post
        post: Post,
    },
}

/// Events received from the broadcast channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Acknowledgement of the most recent `create_post`
    PostCreated {
        /// The committed post
        post: Post,
    },
    /// Refusal of the most recent `create_post`
    PostError {
        /// Server-supplied reason
        reason: String,
    },
    /// Another session's post
    NewPost {
        /// The committed post
        post: Post,
    },
}

/// Body of `POST /posts/{id}/save`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveAck {
    /// Must be `true`
    pub saved: bool,
}

/// Body of `DELETE /posts/{id}/save`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsaveAck {
    /// Must be `true`
    pub unsaved: bool,
}

/// Body of `POST /posts`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePostResponse {
    /// The committed post
    pub post: Post,
}

/// Body of `GET /posts`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedResponse {
    /// Baseline entries, newest first
    pub posts: Vec<FeedEntry>,
}

/// Body sent with `POST /posts/{id}/repost`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepostRequest {
    /// Optional comment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// Check a 2xx engagement response body against the schema for `mutation`.
///
/// Like and repost endpoints only need to return a JSON object. Save and
/// unsave must carry their boolean flag set to `true`; otherwise the server's
/// `msg`/`message` field, if any, becomes the rejection reason.
pub fn validate_engagement_response(
    mutation: &EngagementMutation,
    body: &Value,
) -> Result<(), RemoteError> {
    if !body.is_object() {
        return Err(RemoteError::Malformed(format!(
            "expected a JSON object, got {body}"
        )));
    }

    let flag = match mutation {
        EngagementMutation::CreateSave => "saved",
        EngagementMutation::DeleteSave => "unsaved",
        _ => return Ok(()),
    };

    match body.get(flag).and_then(Value::as_bool) {
        Some(true) => Ok(()),
        _ => Err(RemoteError::Rejected {
            status: None,
            message: server_message(body)
                .unwrap_or_else(|| format!("response did not confirm `{flag}`")),
        }),
    }
}

/// Extract a human-readable reason from an error body.
pub fn server_message(body: &Value) -> Option<String> {
    ["msg", "message", "error"]
        .iter()
        .find_map(|key| body.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}
