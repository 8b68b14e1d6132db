//! In-process broadcast server
//!
//! Every [`RelayTransport`] handed out by one [`InMemoryRelay`] talks to the
//! same hub. The hub acknowledges `create_post` to the publishing link only
//! and forwards the created post to every other link as `new_post`.
//! `new_post` from a client is forwarded the same way.

use async_trait::async_trait;
use chorus_core::{
    ChannelLink, ChannelTransport, ClientEvent, ConnectError, Post, PostId, ServerEvent, UserId,
};
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

#[derive(Debug, Default)]
struct Hub {
    links: HashMap<u64, mpsc::UnboundedSender<ServerEvent>>,
    next_link: u64,
    available: bool,
    reject_next: Option<String>,
    hold_acks: bool,
    connects: usize,
    received: Vec<ClientEvent>,
}

/// Shared hub that relay transports connect to.
#[derive(Debug, Clone)]
pub struct InMemoryRelay {
    hub: Arc<Mutex<Hub>>,
}

impl Default for InMemoryRelay {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRelay {
    /// Create an accepting relay.
    pub fn new() -> Self {
        Self {
            hub: Arc::new(Mutex::new(Hub {
                available: true,
                ..Hub::default()
            })),
        }
    }

    /// A transport for one session; posts it creates are attributed to `user`.
    pub fn transport(&self, user: impl Into<UserId>) -> RelayTransport {
        RelayTransport {
            hub: Arc::clone(&self.hub),
            user: user.into(),
        }
    }

    /// Accept or refuse new connections. Existing links are unaffected.
    pub fn set_available(&self, available: bool) {
        self.hub.lock().available = available;
    }

    /// Close every open link from the server side.
    pub fn drop_all(&self) {
        let dropped = {
            let mut hub = self.hub.lock();
            let count = hub.links.len();
            hub.links.clear();
            count
        };
        debug!(dropped, "relay dropped all links");
    }

    /// Answer the next `create_post` with `post_error`.
    pub fn reject_next(&self, reason: impl Into<String>) {
        self.hub.lock().reject_next = Some(reason.into());
    }

    /// Stop answering `create_post` (posts are neither acked nor fanned out).
    pub fn hold_acks(&self, hold: bool) {
        self.hub.lock().hold_acks = hold;
    }

    /// Number of open links.
    pub fn link_count(&self) -> usize {
        self.hub.lock().links.len()
    }

    /// Number of successful connects so far.
    pub fn connect_count(&self) -> usize {
        self.hub.lock().connects
    }

    /// Every client event received so far, in order.
    pub fn received(&self) -> Vec<ClientEvent> {
        self.hub.lock().received.clone()
    }

    /// Inject a `new_post` to every open link, as if another client sent it.
    pub fn broadcast(&self, post: Post) {
        let hub = self.hub.lock();
        for link in hub.links.values() {
            let _ = link.send(ServerEvent::NewPost { post: post.clone() });
        }
    }
}

/// One session's way into an [`InMemoryRelay`].
#[derive(Debug, Clone)]
pub struct RelayTransport {
    hub: Arc<Mutex<Hub>>,
    user: UserId,
}

#[async_trait]
impl ChannelTransport for RelayTransport {
    async fn connect(&self) -> Result<ChannelLink, ConnectError> {
        let (to_client, inbound) = mpsc::unbounded_channel();
        let (outbound, from_client) = mpsc::unbounded_channel();

        let link_id = {
            let mut hub = self.hub.lock();
            if !hub.available {
                return Err(ConnectError::new("relay unavailable"));
            }
            let id = hub.next_link;
            hub.next_link += 1;
            hub.connects += 1;
            hub.links.insert(id, to_client);
            id
        };
        debug!(link = link_id, user = %self.user, "relay link opened");

        tokio::spawn(serve_link(
            Arc::clone(&self.hub),
            link_id,
            self.user.clone(),
            from_client,
        ));
        Ok(ChannelLink { outbound, inbound })
    }
}

async fn serve_link(
    hub: Arc<Mutex<Hub>>,
    link_id: u64,
    user: UserId,
    mut from_client: mpsc::UnboundedReceiver<ClientEvent>,
) {
    while let Some(event) = from_client.recv().await {
        let mut state = hub.lock();
        // A link closed by the server no longer reaches the hub.
        if !state.links.contains_key(&link_id) {
            continue;
        }
        state.received.push(event.clone());

        match event {
            ClientEvent::CreatePost { content, image } => {
                if state.hold_acks {
                    continue;
                }
                if let Some(reason) = state.reject_next.take() {
                    send_to(&state, link_id, ServerEvent::PostError { reason });
                    continue;
                }
                let post = Post {
                    id: PostId::new(uuid::Uuid::new_v4().to_string()),
                    creator_id: user.clone(),
                    content,
                    media_ref: image.map(|image| format!("relay://{}", image.file_name)),
                    created_at: Utc::now(),
                };
                send_to(&state, link_id, ServerEvent::PostCreated { post: post.clone() });
                fan_out(&state, link_id, post);
            }
            ClientEvent::NewPost { post } => fan_out(&state, link_id, post),
        }
    }

    hub.lock().links.remove(&link_id);
    debug!(link = link_id, "relay link closed by client");
}

fn send_to(hub: &Hub, link_id: u64, event: ServerEvent) {
    if let Some(link) = hub.links.get(&link_id) {
        let _ = link.send(event);
    }
}

fn fan_out(hub: &Hub, from: u64, post: Post) {
    for (id, link) in &hub.links {
        if *id != from {
            let _ = link.send(ServerEvent::NewPost { post: post.clone() });
        }
    }
}
