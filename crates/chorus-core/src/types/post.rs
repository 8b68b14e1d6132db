//! Posts, drafts and baseline feed entries

use crate::config::ContentLimits;
use crate::errors::{FeedError, Result};
use crate::types::identifiers::{PostId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A committed post.
///
/// `id` and `created_at` are assigned by the server at creation commit and a
/// post is never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    /// Server-assigned identifier
    pub id: PostId,
    /// Author of the post
    pub creator_id: UserId,
    /// Post text
    pub content: String,
    /// URI of an externally stored image, if any
    #[serde(default)]
    pub media_ref: Option<String>,
    /// Server commit time
    pub created_at: DateTime<Utc>,
}

/// The viewer's own engagement flags for a post, as reported by the baseline fetch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewerEngagement {
    /// Viewer has liked the post
    #[serde(default)]
    pub is_liked: bool,
    /// Viewer has reposted the post
    #[serde(default)]
    pub is_reposted: bool,
    /// Viewer has saved the post
    #[serde(default)]
    pub is_saved: bool,
}

/// One element of the baseline feed fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedEntry {
    /// The post itself
    #[serde(flatten)]
    pub post: Post,
    /// Viewer engagement flags carried alongside the post
    #[serde(flatten)]
    pub viewer: ViewerEngagement,
}

impl From<Post> for FeedEntry {
    fn from(post: Post) -> Self {
        Self {
            post,
            viewer: ViewerEngagement::default(),
        }
    }
}

/// Image attached to a draft post.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaAttachment {
    /// Original file name
    pub file_name: String,
    /// MIME type, expected to be `image/*`
    pub content_type: String,
    /// Raw bytes, base64 encoded on the wire
    #[serde(with = "base64_bytes")]
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for MediaAttachment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaAttachment")
            .field("file_name", &self.file_name)
            .field("content_type", &self.content_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// A post the user is composing. Kept intact across failed submissions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostDraft {
    /// Text content
    pub content: String,
    /// Optional image
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<MediaAttachment>,
}

impl PostDraft {
    /// Text-only draft.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            image: None,
        }
    }

    /// Attach an image.
    pub fn with_image(mut self, image: MediaAttachment) -> Self {
        self.image = Some(image);
        self
    }

    /// Content as it will be submitted.
    pub fn trimmed_content(&self) -> &str {
        self.content.trim()
    }

    /// Whether there is nothing to submit.
    pub fn is_empty(&self) -> bool {
        self.trimmed_content().is_empty() && self.image.is_none()
    }

    /// Check the draft against local content limits.
    pub fn validate(&self, limits: &ContentLimits) -> Result<()> {
        let content = self.trimmed_content();
        if content.is_empty() {
            return Err(FeedError::invalid("content cannot be empty"));
        }

        let chars = content.chars().count();
        if chars > limits.max_post_chars {
            return Err(FeedError::invalid(format!(
                "content is {chars} characters, limit is {}",
                limits.max_post_chars
            )));
        }

        if let Some(image) = &self.image {
            if !image.content_type.starts_with("image/") {
                return Err(FeedError::invalid(format!(
                    "attachment type {} is not an image",
                    image.content_type
                )));
            }
            if image.bytes.len() > limits.max_image_bytes {
                return Err(FeedError::invalid(format!(
                    "image is {} bytes, limit is {}",
                    image.bytes.len(),
                    limits.max_image_bytes
                )));
            }
        }

        Ok(())
    }
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
