//! WebSocket channel transport
//!
//! Each successful `connect` spawns two pump tasks bridging the socket and
//! the link's mpsc endpoints. The link reads as dropped (inbound yields
//! `None`) as soon as the socket closes or errors. Dropping the link's
//! outbound sender closes the socket.

use crate::error::TransportError;
use async_trait::async_trait;
use chorus_core::{
    ChannelLink, ChannelTransport, ClientConfig, ClientEvent, ConnectError, ServerEvent,
};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use reqwest::Url;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens WebSocket links to the broadcast endpoint.
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    url: Url,
    connect_timeout: Duration,
}

impl WebSocketTransport {
    /// Create a transport for `url` (`ws://` or `wss://`).
    pub fn new(url: &str, connect_timeout: Duration) -> Result<Self, TransportError> {
        let url = Url::parse(url).map_err(|e| TransportError::invalid_url(url, e))?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(TransportError::invalid_url(
                url.as_str(),
                format!("unsupported scheme {}", url.scheme()),
            ));
        }
        Ok(Self {
            url,
            connect_timeout,
        })
    }

    /// Create a transport from configuration.
    pub fn from_config(config: &ClientConfig) -> Result<Self, TransportError> {
        Self::new(&config.channel_url, config.request_timeout())
    }

    /// Endpoint this transport connects to.
    pub fn url(&self) -> &Url {
        &self.url
    }

    async fn open(&self) -> Result<Socket, TransportError> {
        let timeout_ms = u64::try_from(self.connect_timeout.as_millis()).unwrap_or(u64::MAX);
        let (socket, response) = timeout(self.connect_timeout, connect_async(self.url.as_str()))
            .await
            .map_err(|_| TransportError::Timeout { timeout_ms })??;
        debug!(status = %response.status(), url = %self.url, "websocket handshake complete");
        Ok(socket)
    }
}

#[async_trait]
impl ChannelTransport for WebSocketTransport {
    async fn connect(&self) -> Result<ChannelLink, ConnectError> {
        let socket = self.open().await?;
        let (sink, stream) = socket.split();

        let (outbound, from_client) = mpsc::unbounded_channel();
        let (to_client, inbound) = mpsc::unbounded_channel();
        tokio::spawn(write_frames(sink, from_client));
        tokio::spawn(read_frames(stream, to_client));

        info!(url = %self.url, "broadcast channel link open");
        Ok(ChannelLink { outbound, inbound })
    }
}

async fn write_frames(
    mut sink: SplitSink<Socket, Message>,
    mut from_client: mpsc::UnboundedReceiver<ClientEvent>,
) {
    while let Some(event) = from_client.recv().await {
        let frame = match serde_json::to_string(&event) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(error = %err, "dropping unencodable client event");
                continue;
            }
        };
        if let Err(err) = sink.send(Message::Text(frame)).await {
            warn!(error = %err, "websocket write failed");
            return;
        }
    }
    // Link released by the client.
    let _ = sink.close().await;
}

async fn read_frames(
    mut stream: SplitStream<Socket>,
    to_client: mpsc::UnboundedSender<ServerEvent>,
) {
    while let Some(frame) = stream.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                Ok(text) => text,
                Err(_) => {
                    warn!("ignoring non-UTF-8 binary frame");
                    continue;
                }
            },
            Ok(Message::Close(frame)) => {
                debug!(?frame, "websocket closed by server");
                break;
            }
            Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => continue,
            Err(err) => {
                warn!(error = %err, "websocket read failed");
                break;
            }
        };

        match serde_json::from_str::<ServerEvent>(&text) {
            Ok(event) => {
                if to_client.send(event).is_err() {
                    break;
                }
            }
            Err(err) => warn!(error = %err, "ignoring unrecognized channel frame"),
        }
    }
}
