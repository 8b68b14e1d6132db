//! Ordered, duplicate-free feed
//!
//! The aggregator merges the baseline fetch with live arrivals. Arrivals are
//! prepended; an id already present is a no-op. Existing entries are never
//! reordered.

use chorus_core::{Post, PostId};
use std::collections::{HashSet, VecDeque};

/// The posts shown to one session, newest first.
#[derive(Debug, Default, Clone)]
pub struct FeedAggregator {
    posts: VecDeque<Post>,
    ids: HashSet<PostId>,
}

impl FeedAggregator {
    /// Create an empty feed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the feed with a baseline, keeping its order.
    ///
    /// Later duplicates within the baseline are dropped. Returns the number of
    /// posts kept.
    pub fn initialize<I>(&mut self, baseline: I) -> usize
    where
        I: IntoIterator<Item = Post>,
    {
        self.posts.clear();
        self.ids.clear();
        for post in baseline {
            if self.ids.insert(post.id.clone()) {
                self.posts.push_back(post);
            }
        }
        self.posts.len()
    }

    /// Another session's post arrived over the channel.
    pub fn on_peer_post(&mut self, post: Post) -> bool {
        self.prepend(post)
    }

    /// One of this session's posts was committed by the server.
    pub fn on_own_post_committed(&mut self, post: Post) -> bool {
        self.prepend(post)
    }

    /// Copy of the current ordering.
    pub fn snapshot(&self) -> Vec<Post> {
        self.posts.iter().cloned().collect()
    }

    /// Iterate without copying.
    pub fn iter(&self) -> impl Iterator<Item = &Post> {
        self.posts.iter()
    }

    /// Whether a post is present.
    pub fn contains(&self, id: &PostId) -> bool {
        self.ids.contains(id)
    }

    /// Number of posts.
    pub fn len(&self) -> usize {
        self.posts.len()
    }

    /// Whether the feed is empty.
    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }

    fn prepend(&mut self, post: Post) -> bool {
        if !self.ids.insert(post.id.clone()) {
            return false;
        }
        self.posts.push_front(post);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn post(id: u64) -> Post {
        Post {
            id: PostId::from(id),
            creator_id: "author".into(),
            content: format!("post {id}"),
            media_ref: None,
            created_at: Utc.timestamp_opt(1_700_000_000 + id as i64, 0).unwrap(),
        }
    }

    fn ids(feed: &FeedAggregator) -> Vec<String> {
        feed.iter().map(|p| p.id.to_string()).collect()
    }

    #[test]
    fn arrival_is_prepended_to_baseline() {
        let mut feed = FeedAggregator::new();
        feed.initialize([post(1), post(2)]);
        assert!(feed.on_peer_post(post(3)));
        assert_eq!(ids(&feed), ["3", "1", "2"]);
    }

    #[test]
    fn repeated_arrival_is_a_no_op() {
        let mut feed = FeedAggregator::new();
        assert!(feed.on_peer_post(post(1)));
        assert!(!feed.on_peer_post(post(1)));
        assert_eq!(ids(&feed), ["1"]);
    }

    #[test]
    fn own_commit_seen_twice_is_inserted_once() {
        let mut feed = FeedAggregator::new();
        feed.initialize([post(1)]);
        assert!(feed.on_own_post_committed(post(2)));
        assert!(!feed.on_peer_post(post(2)));
        assert_eq!(ids(&feed), ["2", "1"]);
    }

    #[test]
    fn initialize_replaces_and_dedups_baseline() {
        let mut feed = FeedAggregator::new();
        feed.on_peer_post(post(9));
        let kept = feed.initialize([post(3), post(2), post(3), post(1)]);
        assert_eq!(kept, 3);
        assert_eq!(ids(&feed), ["3", "2", "1"]);
        assert!(!feed.contains(&PostId::from(9u64)));
    }
}
