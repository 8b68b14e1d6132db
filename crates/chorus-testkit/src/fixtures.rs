//! Post and feed-entry builders

use chorus_core::{FeedEntry, Post, PostId, UserId, ViewerEngagement};
use chrono::{DateTime, TimeZone, Utc};

/// Fixed epoch for fixture timestamps.
pub fn fixture_time(offset_secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + offset_secs, 0).unwrap()
}

/// A post by `"author"` whose content names its id.
pub fn post(id: impl Into<PostId>) -> Post {
    post_by(id, "author")
}

/// A post by a given creator.
pub fn post_by(id: impl Into<PostId>, creator: impl Into<UserId>) -> Post {
    let id = id.into();
    Post {
        content: format!("post {id}"),
        id,
        creator_id: creator.into(),
        media_ref: None,
        created_at: fixture_time(0),
    }
}

/// A baseline entry with no viewer engagement.
pub fn entry(id: impl Into<PostId>) -> FeedEntry {
    FeedEntry::from(post(id))
}

/// A baseline entry with explicit viewer flags.
pub fn entry_with(id: impl Into<PostId>, viewer: ViewerEngagement) -> FeedEntry {
    FeedEntry {
        post: post(id),
        viewer,
    }
}

/// Ids of a post sequence, as strings.
pub fn ids<'a>(posts: impl IntoIterator<Item = &'a Post>) -> Vec<String> {
    posts.into_iter().map(|p| p.id.to_string()).collect()
}
