//! Per-session wiring
//!
//! A [`FeedSession`] owns everything one signed-in viewer needs: the
//! engagement store, the feed, the broadcast channel and the composer. Its
//! lifecycle is explicit. `init` fetches the baseline and starts the
//! background tasks; `shutdown` stops them. Dropping a running session shuts
//! it down as well.

use crate::aggregator::FeedAggregator;
use crate::channel::{BroadcastChannel, ChannelEvent};
use crate::composer::{ComposerSettings, PostComposer};
use crate::engagement::{EngagementToggle, InFlightToggle, RepostSubmission, ToggleOutcome};
use chorus_core::{
    ActionKind, ChannelTransport, ClientConfig, ConnectionState, EngagementKey, EngagementState,
    FeedEntry, FeedError, Post, PostId, RemoteEffects, RemoteError, Result, UserId,
};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Idle,
    Starting,
    Running,
    Stopped,
}

struct Tasks {
    supervisor: JoinHandle<()>,
    pump: JoinHandle<()>,
}

/// One viewer's feed, engagements and channel.
pub struct FeedSession<R: ?Sized, T: ?Sized> {
    user: UserId,
    config: ClientConfig,
    remote: Arc<R>,
    transport: Arc<T>,
    toggles: EngagementToggle<R>,
    feed: Arc<Mutex<FeedAggregator>>,
    channel: BroadcastChannel,
    composer: PostComposer<R>,
    lifecycle: Mutex<Lifecycle>,
    tasks: Mutex<Option<Tasks>>,
}

impl<R, T> FeedSession<R, T>
where
    R: RemoteEffects + ?Sized + 'static,
    T: ChannelTransport + ?Sized + 'static,
{
    /// Build an idle session. Nothing is fetched or connected until
    /// [`init`](Self::init).
    pub fn new(
        user: impl Into<UserId>,
        config: ClientConfig,
        remote: Arc<R>,
        transport: Arc<T>,
    ) -> Result<Self> {
        let user = user.into();
        if user.is_blank() {
            return Err(FeedError::invalid("user id is empty"));
        }
        config
            .validate()
            .map_err(|e| FeedError::invalid(e.to_string()))?;

        let feed = Arc::new(Mutex::new(FeedAggregator::new()));
        let channel = BroadcastChannel::new(config.reconnect.clone(), config.event_buffer);
        let toggles = EngagementToggle::new(Arc::clone(&remote), config.request_timeout());
        let composer = PostComposer::new(
            Arc::clone(&remote),
            channel.clone(),
            Arc::clone(&feed),
            ComposerSettings {
                request_timeout: config.request_timeout(),
                publish_ack_timeout: config.publish_ack_timeout(),
                limits: config.limits.clone(),
            },
        );

        Ok(Self {
            user,
            config,
            remote,
            transport,
            toggles,
            feed,
            channel,
            composer,
            lifecycle: Mutex::new(Lifecycle::Idle),
            tasks: Mutex::new(None),
        })
    }

    /// Fetch the baseline, seed engagements, and start the channel.
    ///
    /// A failed fetch leaves the session idle so `init` can be retried.
    pub async fn init(&self) -> Result<()> {
        {
            let mut lifecycle = self.lifecycle.lock();
            let current = *lifecycle;
            if current != Lifecycle::Idle {
                return Err(FeedError::invalid(format!(
                    "session cannot be initialized from {current:?}"
                )));
            }
            *lifecycle = Lifecycle::Starting;
        }

        let entries = match self.fetch_baseline().await {
            Ok(entries) => entries,
            Err(err) => {
                let mut lifecycle = self.lifecycle.lock();
                if *lifecycle == Lifecycle::Starting {
                    *lifecycle = Lifecycle::Idle;
                }
                return Err(err);
            }
        };
        let kept = self.apply_baseline(entries);

        let mut lifecycle = self.lifecycle.lock();
        if *lifecycle != Lifecycle::Starting {
            return Err(FeedError::invalid("session was shut down during init"));
        }

        // Subscribe before the supervisor can deliver anything.
        let events = self.channel.subscribe();
        let pump = tokio::spawn(pump_events(events, Arc::clone(&self.feed)));
        let channel = self.channel.clone();
        let transport = Arc::clone(&self.transport);
        let supervisor = tokio::spawn(async move { channel.run(&*transport).await });

        *self.tasks.lock() = Some(Tasks { supervisor, pump });
        *lifecycle = Lifecycle::Running;
        info!(user = %self.user, posts = kept, "feed session started");
        Ok(())
    }

    /// Re-fetch the baseline and rebuild the feed from it.
    pub async fn refresh(&self) -> Result<usize> {
        if *self.lifecycle.lock() != Lifecycle::Running {
            return Err(FeedError::invalid("session is not running"));
        }
        let entries = self.fetch_baseline().await?;
        let kept = self.apply_baseline(entries);
        debug!(user = %self.user, posts = kept, "feed refreshed");
        Ok(kept)
    }

    /// Stop the channel and the event pump. Idempotent.
    pub async fn shutdown(&self) {
        let tasks = {
            let mut lifecycle = self.lifecycle.lock();
            if *lifecycle == Lifecycle::Stopped {
                return;
            }
            *lifecycle = Lifecycle::Stopped;
            self.tasks.lock().take()
        };

        self.channel.shutdown();
        if let Some(tasks) = tasks {
            tasks.pump.abort();
            if let Err(err) = tasks.supervisor.await {
                if !err.is_cancelled() {
                    warn!(error = %err, "channel supervisor ended abnormally");
                }
            }
        }
        info!(user = %self.user, "feed session stopped");
    }

    /// Signed-in user.
    pub fn user(&self) -> &UserId {
        &self.user
    }

    /// Effective configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Copy of the feed ordering.
    pub fn snapshot(&self) -> Vec<Post> {
        self.feed.lock().snapshot()
    }

    /// Shared feed handle.
    pub fn feed(&self) -> Arc<Mutex<FeedAggregator>> {
        Arc::clone(&self.feed)
    }

    /// The viewer's state for one engagement.
    pub fn engagement(&self, post: impl Into<PostId>, kind: ActionKind) -> EngagementState {
        self.toggles
            .state(&EngagementKey::new(self.user.clone(), post, kind))
    }

    /// Start a toggle for the viewer and return it in flight.
    pub fn begin_toggle(
        &self,
        post: impl Into<PostId>,
        kind: ActionKind,
    ) -> Result<InFlightToggle<R>> {
        self.toggles
            .begin(EngagementKey::new(self.user.clone(), post, kind))
    }

    /// Toggle an engagement for the viewer.
    pub async fn toggle(&self, post: impl Into<PostId>, kind: ActionKind) -> Result<bool> {
        self.toggles.toggle(self.user.clone(), post, kind).await
    }

    /// Toggle the viewer's repost through the comment prompt.
    pub async fn toggle_repost(
        &self,
        post: impl Into<PostId>,
        submission: RepostSubmission,
    ) -> Result<ToggleOutcome> {
        self.toggles
            .toggle_repost(self.user.clone(), post, submission)
            .await
    }

    /// Engagement toggles bound to this session's store.
    pub fn toggles(&self) -> &EngagementToggle<R> {
        &self.toggles
    }

    /// Draft holder.
    pub fn composer(&self) -> &PostComposer<R> {
        &self.composer
    }

    /// Broadcast channel.
    pub fn channel(&self) -> &BroadcastChannel {
        &self.channel
    }

    /// Broadcast channel state.
    pub fn connection_state(&self) -> ConnectionState {
        self.channel.state()
    }

    async fn fetch_baseline(&self) -> Result<Vec<FeedEntry>> {
        let timeout = self.config.request_timeout();
        match tokio::time::timeout(timeout, self.remote.fetch_posts()).await {
            Ok(result) => result.map_err(FeedError::from),
            Err(_) => Err(RemoteError::Timeout {
                timeout_ms: self.config.request_timeout_ms,
            }
            .into()),
        }
    }

    fn apply_baseline(&self, entries: Vec<FeedEntry>) -> usize {
        self.toggles.seed_from_entries(&self.user, &entries);
        self.feed
            .lock()
            .initialize(entries.into_iter().map(|entry| entry.post))
    }
}

impl<R: ?Sized, T: ?Sized> Drop for FeedSession<R, T> {
    fn drop(&mut self) {
        if let Some(tasks) = self.tasks.get_mut().take() {
            self.channel.shutdown();
            tasks.pump.abort();
            tasks.supervisor.abort();
        }
    }
}

async fn pump_events(
    mut events: broadcast::Receiver<ChannelEvent>,
    feed: Arc<Mutex<FeedAggregator>>,
) {
    loop {
        match events.recv().await {
            Ok(ChannelEvent::PeerPostArrived(post)) => {
                let id = post.id.clone();
                if feed.lock().on_peer_post(post) {
                    debug!(post = %id, "peer post added to feed");
                }
            }
            Ok(ChannelEvent::Created(post)) => {
                feed.lock().on_own_post_committed(post);
            }
            Ok(ChannelEvent::CreationFailed(reason)) => {
                debug!(%reason, "publish failed");
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "feed missed channel events; refresh to resync");
            }
            Err(RecvError::Closed) => break,
        }
    }
}
