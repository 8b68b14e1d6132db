//! Reconnecting broadcast channel
//!
//! A [`BroadcastChannel`] owns at most one [`ChannelLink`] at a time. The
//! supervisor loop in [`BroadcastChannel::run`] drives the connection state
//! machine:
//!
//! ```text
//! Disconnected -> Connecting -> Connected -> Disconnected (link dropped)
//!                     |                          |
//!                     +--> Disconnected ---------+--> Connecting (after backoff)
//! ```
//!
//! Outbound events are only accepted while `Connected`. Nothing is queued for
//! later delivery; callers get `ChannelUnavailable` immediately and decide
//! what to do.

use chorus_core::{
    ChannelTransport, ClientEvent, ConnectionState, FeedError, Post, PostDraft, ReconnectConfig,
    Result, ServerEvent,
};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, error, info, warn};

/// Reason attached to `CreationFailed` when the link drops under a publish.
pub const CONNECTION_LOST: &str = "connection lost";

/// Events delivered to channel subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// The most recent publish was committed
    Created(Post),
    /// The most recent publish failed
    CreationFailed(String),
    /// Another session's post
    PeerPostArrived(Post),
}

#[derive(Debug, Default)]
struct LinkSlot {
    outbound: Option<mpsc::UnboundedSender<ClientEvent>>,
    awaiting_ack: bool,
}

struct Inner {
    state: watch::Sender<ConnectionState>,
    slot: Mutex<LinkSlot>,
    events: broadcast::Sender<ChannelEvent>,
    shutdown: watch::Sender<bool>,
    reconnect: ReconnectConfig,
}

/// Session-scoped duplex channel to the broadcast server.
#[derive(Clone)]
pub struct BroadcastChannel {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for BroadcastChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BroadcastChannel")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl BroadcastChannel {
    /// Create a disconnected channel.
    pub fn new(reconnect: ReconnectConfig, event_buffer: usize) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (events, _) = broadcast::channel(event_buffer.max(1));
        let (shutdown, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                state,
                slot: Mutex::new(LinkSlot::default()),
                events,
                shutdown,
                reconnect,
            }),
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// Observe state transitions.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Receive channel events from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ChannelEvent> {
        self.inner.events.subscribe()
    }

    /// Whether a publish is waiting for its response.
    pub fn awaiting_ack(&self) -> bool {
        self.inner.slot.lock().awaiting_ack
    }

    /// Send `create_post` for a draft. The outcome arrives later as
    /// `Created` or `CreationFailed`.
    ///
    /// Fails with `Busy` while an earlier publish is unanswered.
    pub fn publish(&self, draft: &PostDraft) -> Result<()> {
        let event = ClientEvent::CreatePost {
            content: draft.trimmed_content().to_string(),
            image: draft.image.clone(),
        };
        let mut slot = self.inner.slot.lock();
        // One publish at a time: responses carry no correlation id.
        if slot.awaiting_ack {
            return Err(FeedError::busy("create_post"));
        }
        self.send_locked(&mut slot, event)?;
        slot.awaiting_ack = true;
        Ok(())
    }

    /// Stop waiting for the outstanding publish. A response that arrives
    /// later is ignored. Returns whether a publish was still outstanding.
    pub fn abandon_publish(&self) -> bool {
        let outstanding = self.take_ack();
        if outstanding {
            debug!("outstanding publish abandoned");
        }
        outstanding
    }

    /// Fan out an already committed post. No response is expected.
    pub fn announce(&self, post: &Post) -> Result<()> {
        let mut slot = self.inner.slot.lock();
        self.send_locked(&mut slot, ClientEvent::NewPost { post: post.clone() })
    }

    /// Stop the supervisor and drop the link. Idempotent.
    pub fn shutdown(&self) {
        if !self.inner.shutdown.send_replace(true) {
            info!("broadcast channel shutting down");
        }
        self.detach();
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    pub fn is_shut_down(&self) -> bool {
        *self.inner.shutdown.borrow()
    }

    /// Connect, pump inbound events, and reconnect with backoff until
    /// shutdown or until the attempt limit is exhausted.
    pub async fn run<T>(&self, transport: &T)
    where
        T: ChannelTransport + ?Sized,
    {
        let reconnect = &self.inner.reconnect;
        let mut shutdown = self.inner.shutdown.subscribe();
        let mut attempt: u32 = 0;
        let mut failed_connects: u32 = 0;

        loop {
            if *shutdown.borrow() {
                break;
            }

            self.set_state(ConnectionState::Connecting);
            let connected = tokio::select! {
                result = transport.connect() => result,
                _ = shutdown.changed() => break,
            };

            match connected {
                Ok(link) => {
                    failed_connects = 0;
                    if reconnect.reset_on_success {
                        attempt = 0;
                    }
                    self.attach(link.outbound);
                    info!("broadcast channel connected");

                    let stopped = self.pump(link.inbound, &mut shutdown).await;
                    self.detach();
                    if stopped {
                        break;
                    }
                    warn!("broadcast channel link dropped");
                }
                Err(err) => {
                    self.set_state(ConnectionState::Disconnected);
                    failed_connects += 1;
                    warn!(error = %err, failed_connects, "broadcast channel connect failed");
                    if !reconnect.allows_attempt(failed_connects) {
                        error!(failed_connects, "broadcast channel giving up");
                        break;
                    }
                }
            }

            attempt = attempt.saturating_add(1);
            let delay = reconnect.backoff_delay(attempt);
            let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
            debug!(attempt, delay_ms, "scheduling reconnect");
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => break,
            }
        }

        self.detach();
    }

    async fn pump(
        &self,
        mut inbound: mpsc::UnboundedReceiver<ServerEvent>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> bool {
        loop {
            tokio::select! {
                frame = inbound.recv() => match frame {
                    Some(event) => self.dispatch(event),
                    None => return false,
                },
                _ = shutdown.changed() => return true,
            }
        }
    }

    fn dispatch(&self, event: ServerEvent) {
        let event = match event {
            ServerEvent::PostCreated { post } => {
                if !self.take_ack() {
                    debug!(post = %post.id, "ignoring post_created with no publish outstanding");
                    return;
                }
                ChannelEvent::Created(post)
            }
            ServerEvent::PostError { reason } => {
                if !self.take_ack() {
                    debug!(%reason, "ignoring post_error with no publish outstanding");
                    return;
                }
                ChannelEvent::CreationFailed(reason)
            }
            ServerEvent::NewPost { post } => ChannelEvent::PeerPostArrived(post),
        };
        // No subscribers is fine.
        let _ = self.inner.events.send(event);
    }

    fn take_ack(&self) -> bool {
        std::mem::take(&mut self.inner.slot.lock().awaiting_ack)
    }

    fn send_locked(&self, slot: &mut LinkSlot, event: ClientEvent) -> Result<()> {
        let state = self.state();
        let Some(outbound) = slot.outbound.as_ref().filter(|_| state.is_connected()) else {
            return Err(FeedError::channel_unavailable(state));
        };
        if outbound.send(event).is_err() {
            return Err(FeedError::channel_unavailable(ConnectionState::Disconnected));
        }
        Ok(())
    }

    fn attach(&self, outbound: mpsc::UnboundedSender<ClientEvent>) {
        let mut slot = self.inner.slot.lock();
        slot.outbound = Some(outbound);
        slot.awaiting_ack = false;
        self.set_state(ConnectionState::Connected);
    }

    fn detach(&self) {
        let lost_publish = {
            let mut slot = self.inner.slot.lock();
            slot.outbound = None;
            self.set_state(ConnectionState::Disconnected);
            std::mem::take(&mut slot.awaiting_ack)
        };
        if lost_publish {
            warn!("link lost with a publish outstanding");
            let _ = self
                .inner
                .events
                .send(ChannelEvent::CreationFailed(CONNECTION_LOST.to_string()));
        }
    }

    fn set_state(&self, next: ConnectionState) {
        let previous = self.inner.state.send_replace(next);
        if previous != next {
            debug!(from = %previous, to = %next, "channel state changed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chorus_core::{ChannelLink, ConnectError};

    struct Refusing;

    #[async_trait::async_trait]
    impl ChannelTransport for Refusing {
        async fn connect(&self) -> std::result::Result<ChannelLink, ConnectError> {
            Err(ConnectError::new("refused"))
        }
    }

    #[test]
    fn publish_is_refused_while_disconnected() {
        let channel = BroadcastChannel::new(ReconnectConfig::default(), 8);
        let err = channel.publish(&PostDraft::text("hello")).unwrap_err();
        assert_eq!(
            err,
            FeedError::channel_unavailable(ConnectionState::Disconnected)
        );
        assert!(!channel.awaiting_ack());
    }

    #[test]
    fn unsolicited_acks_are_ignored() {
        let channel = BroadcastChannel::new(ReconnectConfig::default(), 8);
        let mut events = channel.subscribe();
        channel.dispatch(ServerEvent::PostError {
            reason: "late".into(),
        });
        assert!(events.try_recv().is_err());
    }

    fn connected() -> (BroadcastChannel, mpsc::UnboundedReceiver<ClientEvent>) {
        let channel = BroadcastChannel::new(ReconnectConfig::default(), 8);
        let (outbound, sent) = mpsc::unbounded_channel();
        channel.attach(outbound);
        (channel, sent)
    }

    #[test]
    fn second_publish_is_busy_until_the_first_is_answered() {
        let (channel, mut sent) = connected();
        channel.publish(&PostDraft::text("first")).unwrap();
        assert_eq!(
            channel.publish(&PostDraft::text("second")).unwrap_err(),
            FeedError::busy("create_post")
        );
        assert!(sent.try_recv().is_ok());
        assert!(sent.try_recv().is_err());

        channel.dispatch(ServerEvent::PostError {
            reason: "nope".into(),
        });
        assert!(channel.publish(&PostDraft::text("second")).is_ok());
    }

    #[test]
    fn abandoned_publish_ignores_late_ack_and_link_loss() {
        let (channel, _sent) = connected();
        let mut events = channel.subscribe();
        channel.publish(&PostDraft::text("slow")).unwrap();

        assert!(channel.abandon_publish());
        assert!(!channel.awaiting_ack());
        assert!(!channel.abandon_publish());

        channel.dispatch(ServerEvent::PostCreated {
            post: chorus_testkit::post("late"),
        });
        channel.detach();
        assert!(events.try_recv().is_err());
        assert_eq!(channel.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_attempt_limit() {
        let channel = BroadcastChannel::new(
            ReconnectConfig {
                max_attempts: Some(3),
                ..ReconnectConfig::default()
            },
            8,
        );
        channel.run(&Refusing).await;
        assert_eq!(channel.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn shutdown_before_run_returns_immediately() {
        let channel = BroadcastChannel::new(ReconnectConfig::default(), 8);
        channel.shutdown();
        channel.shutdown();
        channel.run(&Refusing).await;
        assert!(channel.is_shut_down());
        assert_eq!(channel.state(), ConnectionState::Disconnected);
    }
}
