//! Remote service interfaces
//!
//! # Effect Classification
//!
//! - **Category**: Application Effect
//! - **Implementation**: `chorus-transport::HttpApiClient`, `chorus-testkit::MockRemote`
//! - **Usage**: `EngagementToggle`, `PostComposer`, `FeedSession`
//!
//! Handlers validate server responses against the expected schema before
//! reporting success; a 2xx with the wrong body is a `RemoteError::Malformed`.

use crate::errors::RemoteError;
use crate::types::{EngagementMutation, FeedEntry, Post, PostDraft, PostId};
use async_trait::async_trait;
use std::sync::Arc;

/// Engagement endpoints (`/posts/{id}/like|repost|save`).
#[async_trait]
pub trait EngagementEffects: Send + Sync {
    /// Perform one engagement mutation for the authenticated user.
    async fn mutate_engagement(
        &self,
        post: &PostId,
        mutation: &EngagementMutation,
    ) -> Result<(), RemoteError>;
}

/// Post endpoints (`POST /posts`, `GET /posts`).
#[async_trait]
pub trait PostEffects: Send + Sync {
    /// Commit a new post. Returns the post with server-assigned id and time.
    async fn create_post(&self, draft: &PostDraft) -> Result<Post, RemoteError>;

    /// Fetch the baseline feed, newest first.
    async fn fetch_posts(&self) -> Result<Vec<FeedEntry>, RemoteError>;
}

/// Everything a feed session needs from the remote side.
pub trait RemoteEffects: EngagementEffects + PostEffects {}

impl<T: EngagementEffects + PostEffects + ?Sized> RemoteEffects for T {}

#[async_trait]
impl<T: EngagementEffects + ?Sized> EngagementEffects for Arc<T> {
    async fn mutate_engagement(
        &self,
        post: &PostId,
        mutation: &EngagementMutation,
    ) -> Result<(), RemoteError> {
        (**self).mutate_engagement(post, mutation).await
    }
}

#[async_trait]
impl<T: PostEffects + ?Sized> PostEffects for Arc<T> {
    async fn create_post(&self, draft: &PostDraft) -> Result<Post, RemoteError> {
        (**self).create_post(draft).await
    }

    async fn fetch_posts(&self) -> Result<Vec<FeedEntry>, RemoteError> {
        (**self).fetch_posts().await
    }
}
