//! Post creation
//!
//! The composer holds the user's draft. Submitting takes the draft out
//! optimistically; any failure puts it back exactly as it was so the user can
//! retry without retyping.
//!
//! [`PostComposer::submit`] is the canonical path: commit over HTTP, insert
//! into the local feed, then fan out on the broadcast channel.
//! [`PostComposer::submit_over_channel`] publishes on the channel and waits for
//! the server's acknowledgement, falling back to `submit` when the channel is
//! not connected.

use crate::aggregator::FeedAggregator;
use crate::channel::{BroadcastChannel, ChannelEvent};
use crate::reconciliation::PendingMutation;
use chorus_core::{
    ContentLimits, FeedError, MediaAttachment, Post, PostDraft, PostEffects, RemoteError, Result,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tracing::{debug, info, warn};

/// Timeouts and limits applied to submissions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposerSettings {
    /// Bound on `POST /posts`
    pub request_timeout: Duration,
    /// Bound on waiting for `post_created`/`post_error`
    pub publish_ack_timeout: Duration,
    /// Local content limits
    pub limits: ContentLimits,
}

impl Default for ComposerSettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            publish_ack_timeout: Duration::from_secs(10),
            limits: ContentLimits::default(),
        }
    }
}

/// Draft holder and submission driver for one session.
pub struct PostComposer<P: ?Sized> {
    effects: Arc<P>,
    channel: BroadcastChannel,
    feed: Arc<Mutex<FeedAggregator>>,
    draft: Mutex<PostDraft>,
    settings: ComposerSettings,
}

impl<P: PostEffects + ?Sized> PostComposer<P> {
    /// Create a composer with an empty draft.
    pub fn new(
        effects: Arc<P>,
        channel: BroadcastChannel,
        feed: Arc<Mutex<FeedAggregator>>,
        settings: ComposerSettings,
    ) -> Self {
        Self {
            effects,
            channel,
            feed,
            draft: Mutex::new(PostDraft::default()),
            settings,
        }
    }

    /// Copy of the current draft.
    pub fn draft(&self) -> PostDraft {
        self.draft.lock().clone()
    }

    /// Replace the draft.
    pub fn set_draft(&self, draft: PostDraft) {
        *self.draft.lock() = draft;
    }

    /// Replace the draft text, keeping any attachment.
    pub fn set_content(&self, content: impl Into<String>) {
        self.draft.lock().content = content.into();
    }

    /// Attach or replace the image.
    pub fn attach_image(&self, image: MediaAttachment) {
        self.draft.lock().image = Some(image);
    }

    /// Remove the image.
    pub fn remove_image(&self) {
        self.draft.lock().image = None;
    }

    /// Discard the draft.
    pub fn clear(&self) {
        *self.draft.lock() = PostDraft::default();
    }

    /// Commit the draft over HTTP, add it to the feed, and fan it out.
    pub async fn submit(&self) -> Result<Post> {
        let pending = self.take_draft()?;

        let result = self.create_over_http(pending.previous()).await;
        let settled = pending.settle(&result);
        if !settled.is_committed() {
            self.restore(settled.into_value());
        }
        let post = result?;

        self.feed.lock().on_own_post_committed(post.clone());
        match self.channel.announce(&post) {
            Ok(()) => debug!(post = %post.id, "post announced"),
            Err(FeedError::ChannelUnavailable { state }) => {
                info!(post = %post.id, %state, "channel unavailable, skipping fan-out");
            }
            Err(err) => warn!(post = %post.id, error = %err, "post fan-out failed"),
        }
        info!(post = %post.id, "post created");
        Ok(post)
    }

    /// Publish the draft on the channel and wait for the server's answer.
    ///
    /// Falls back to [`submit`](Self::submit) when the channel is not
    /// connected. Returns `Busy`, leaving the draft alone, while another
    /// channel submission is waiting for its answer.
    pub async fn submit_over_channel(&self) -> Result<Post> {
        let draft = self.draft();
        draft.validate(&self.settings.limits)?;

        let mut events = self.channel.subscribe();
        match self.channel.publish(&draft) {
            Ok(()) => {}
            Err(FeedError::ChannelUnavailable { state }) => {
                info!(%state, "channel unavailable, creating post over HTTP");
                return self.submit().await;
            }
            Err(err) => return Err(err),
        }
        let pending = self.take_draft()?;

        let timeout = self.settings.publish_ack_timeout;
        let result = match tokio::time::timeout(timeout, await_ack(&mut events)).await {
            Ok(result) => result,
            Err(_) => {
                let unanswered = FeedError::network(format!(
                    "no response to publish within {}ms",
                    timeout.as_millis()
                ));
                if self.channel.abandon_publish() {
                    warn!("publish abandoned after ack timeout");
                    Err(unanswered)
                } else {
                    // The answer raced the timeout and is already queued.
                    take_ready_ack(&mut events).unwrap_or(Err(unanswered))
                }
            }
        };

        let settled = pending.settle(&result);
        if !settled.is_committed() {
            self.restore(settled.into_value());
        }
        let post = result?;
        self.feed.lock().on_own_post_committed(post.clone());
        info!(post = %post.id, "post created over channel");
        Ok(post)
    }

    fn take_draft(&self) -> Result<PendingMutation<PostDraft>> {
        let mut draft = self.draft.lock();
        draft.validate(&self.settings.limits)?;
        let taken = std::mem::take(&mut *draft);
        Ok(PendingMutation::new(taken, PostDraft::default()))
    }

    fn restore(&self, draft: PostDraft) {
        debug!("restoring draft after failed submission");
        *self.draft.lock() = draft;
    }

    async fn create_over_http(&self, draft: &PostDraft) -> Result<Post> {
        let timeout = self.settings.request_timeout;
        match tokio::time::timeout(timeout, self.effects.create_post(draft)).await {
            Ok(result) => result.map_err(FeedError::from),
            Err(_) => Err(RemoteError::Timeout {
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            }
            .into()),
        }
    }
}

async fn await_ack(events: &mut broadcast::Receiver<ChannelEvent>) -> Result<Post> {
    loop {
        match events.recv().await {
            Ok(ChannelEvent::Created(post)) => return Ok(post),
            Ok(ChannelEvent::CreationFailed(reason)) => return Err(FeedError::rejected(reason)),
            Ok(ChannelEvent::PeerPostArrived(_)) => {}
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "channel events lagged while awaiting publish ack");
            }
            Err(RecvError::Closed) => return Err(FeedError::network("channel closed")),
        }
    }
}

fn take_ready_ack(events: &mut broadcast::Receiver<ChannelEvent>) -> Option<Result<Post>> {
    loop {
        match events.try_recv() {
            Ok(ChannelEvent::Created(post)) => return Some(Ok(post)),
            Ok(ChannelEvent::CreationFailed(reason)) => {
                return Some(Err(FeedError::rejected(reason)));
            }
            Ok(ChannelEvent::PeerPostArrived(_)) | Err(TryRecvError::Lagged(_)) => {}
            Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
        }
    }
}
