//! Scripted REST endpoints
//!
//! [`MockRemote`] answers engagement mutations with the body a real server
//! would send and runs it through the same schema check the HTTP client
//! uses, so response-shape failures can be scripted as well as transport
//! failures. Every call is recorded.

use async_trait::async_trait;
use chorus_core::protocol::{validate_engagement_response, CreatePostResponse, FeedResponse};
use chorus_core::{
    EngagementEffects, EngagementMutation, FeedEntry, Post, PostDraft, PostEffects, PostId,
    RemoteError, UserId,
};
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::time::Duration;

/// How the mock answers one call.
#[derive(Debug, Clone, PartialEq)]
pub enum MockOutcome {
    /// Answer with the default success body
    Succeed,
    /// Answer 2xx with this body; engagement bodies are schema-checked
    Respond(Value),
    /// Fail with this error
    Fail(RemoteError),
    /// Never answer
    Hang,
}

/// A call the mock received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedCall {
    /// Engagement mutation on a post
    Engagement {
        /// Target post
        post: PostId,
        /// Mutation sent
        mutation: EngagementMutation,
    },
    /// `POST /posts`
    CreatePost(PostDraft),
    /// `GET /posts`
    FetchPosts,
}

#[derive(Debug)]
struct MockState {
    author: UserId,
    feed: Vec<FeedEntry>,
    engagement_script: VecDeque<MockOutcome>,
    create_script: VecDeque<MockOutcome>,
    fetch_script: VecDeque<MockOutcome>,
    latency: Duration,
    next_post: u64,
    calls: Vec<RecordedCall>,
}

/// In-memory REST double.
#[derive(Debug)]
pub struct MockRemote {
    state: Mutex<MockState>,
}

impl Default for MockRemote {
    fn default() -> Self {
        Self::new("viewer")
    }
}

impl MockRemote {
    /// Create a mock that attributes created posts to `author`.
    pub fn new(author: impl Into<UserId>) -> Self {
        Self {
            state: Mutex::new(MockState {
                author: author.into(),
                feed: Vec::new(),
                engagement_script: VecDeque::new(),
                create_script: VecDeque::new(),
                fetch_script: VecDeque::new(),
                latency: Duration::ZERO,
                next_post: 1,
                calls: Vec::new(),
            }),
        }
    }

    /// Baseline returned by `fetch_posts`.
    pub fn with_feed(self, feed: Vec<FeedEntry>) -> Self {
        self.set_feed(feed);
        self
    }

    /// Delay every answer by `latency`.
    pub fn with_latency(self, latency: Duration) -> Self {
        self.state.lock().latency = latency;
        self
    }

    /// Replace the baseline.
    pub fn set_feed(&self, feed: Vec<FeedEntry>) {
        self.state.lock().feed = feed;
    }

    /// Script the next engagement answer. Unscripted calls succeed.
    pub fn push_engagement(&self, outcome: MockOutcome) {
        self.state.lock().engagement_script.push_back(outcome);
    }

    /// Script the next `create_post` answer.
    pub fn push_create(&self, outcome: MockOutcome) {
        self.state.lock().create_script.push_back(outcome);
    }

    /// Script the next `fetch_posts` answer.
    pub fn push_fetch(&self, outcome: MockOutcome) {
        self.state.lock().fetch_script.push_back(outcome);
    }

    /// Fail the next engagement call with a transport error.
    pub fn fail_next_engagement(&self) {
        self.push_engagement(MockOutcome::Fail(RemoteError::Transport(
            "connection refused".into(),
        )));
    }

    /// All calls so far, in order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.lock().calls.clone()
    }

    /// Engagement mutations so far, in order.
    pub fn engagement_calls(&self) -> Vec<EngagementMutation> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                RecordedCall::Engagement { mutation, .. } => Some(mutation.clone()),
                _ => None,
            })
            .collect()
    }

    /// Number of `create_post` calls so far.
    pub fn create_count(&self) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|call| matches!(call, RecordedCall::CreatePost(_)))
            .count()
    }

    fn record(&self, call: RecordedCall) -> (MockOutcome, Duration) {
        let mut state = self.state.lock();
        let script = match &call {
            RecordedCall::Engagement { .. } => &mut state.engagement_script,
            RecordedCall::CreatePost(_) => &mut state.create_script,
            RecordedCall::FetchPosts => &mut state.fetch_script,
        };
        let outcome = script.pop_front().unwrap_or(MockOutcome::Succeed);
        state.calls.push(call);
        (outcome, state.latency)
    }
}

async fn wait(latency: Duration, outcome: &MockOutcome) {
    if !latency.is_zero() {
        tokio::time::sleep(latency).await;
    }
    if matches!(outcome, MockOutcome::Hang) {
        std::future::pending::<()>().await;
    }
}

fn default_engagement_body(mutation: &EngagementMutation) -> Value {
    match mutation {
        EngagementMutation::CreateSave => json!({ "saved": true }),
        EngagementMutation::DeleteSave => json!({ "unsaved": true }),
        _ => json!({}),
    }
}

#[async_trait]
impl EngagementEffects for MockRemote {
    async fn mutate_engagement(
        &self,
        post: &PostId,
        mutation: &EngagementMutation,
    ) -> Result<(), RemoteError> {
        let (outcome, latency) = self.record(RecordedCall::Engagement {
            post: post.clone(),
            mutation: mutation.clone(),
        });
        wait(latency, &outcome).await;

        let body = match outcome {
            MockOutcome::Succeed | MockOutcome::Hang => default_engagement_body(mutation),
            MockOutcome::Respond(body) => body,
            MockOutcome::Fail(err) => return Err(err),
        };
        validate_engagement_response(mutation, &body)
    }
}

#[async_trait]
impl PostEffects for MockRemote {
    async fn create_post(&self, draft: &PostDraft) -> Result<Post, RemoteError> {
        let (outcome, latency) = self.record(RecordedCall::CreatePost(draft.clone()));
        wait(latency, &outcome).await;

        match outcome {
            MockOutcome::Fail(err) => Err(err),
            MockOutcome::Respond(body) => serde_json::from_value::<CreatePostResponse>(body)
                .map(|response| response.post)
                .map_err(|e| RemoteError::Malformed(e.to_string())),
            MockOutcome::Succeed | MockOutcome::Hang => {
                let mut state = self.state.lock();
                let id = PostId::new(format!("http-{}", state.next_post));
                state.next_post += 1;
                Ok(Post {
                    id,
                    creator_id: state.author.clone(),
                    content: draft.trimmed_content().to_string(),
                    media_ref: draft
                        .image
                        .as_ref()
                        .map(|image| format!("memory://{}", image.file_name)),
                    created_at: Utc::now(),
                })
            }
        }
    }

    async fn fetch_posts(&self) -> Result<Vec<FeedEntry>, RemoteError> {
        let (outcome, latency) = self.record(RecordedCall::FetchPosts);
        wait(latency, &outcome).await;

        match outcome {
            MockOutcome::Fail(err) => Err(err),
            MockOutcome::Respond(body) => {
                serde_json::from_value::<FeedResponse>(body)
                    .map(|response| response.posts)
                    .map_err(|e| RemoteError::Malformed(e.to_string()))
            }
            MockOutcome::Succeed | MockOutcome::Hang => Ok(self.state.lock().feed.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unscripted_calls_succeed_and_are_recorded() {
        let remote = MockRemote::default();
        remote
            .mutate_engagement(&"p1".into(), &EngagementMutation::CreateSave)
            .await
            .unwrap();
        let post = remote.create_post(&PostDraft::text(" hi ")).await.unwrap();
        assert_eq!(post.content, "hi");
        assert_eq!(post.id.as_str(), "http-1");
        assert_eq!(remote.engagement_calls(), vec![EngagementMutation::CreateSave]);
        assert_eq!(remote.create_count(), 1);
    }

    #[tokio::test]
    async fn scripted_body_goes_through_schema_check() {
        let remote = MockRemote::default();
        remote.push_engagement(MockOutcome::Respond(json!({ "msg": "nope" })));
        let err = remote
            .mutate_engagement(&"p1".into(), &EngagementMutation::CreateSave)
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::Rejected { message, .. } if message == "nope"));
    }
}
