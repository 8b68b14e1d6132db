//! WebSocketTransport against a local tungstenite server

use chorus_core::{ChannelTransport, ClientEvent, Post, ServerEvent};
use chorus_transport::WebSocketTransport;
use chrono::{TimeZone, Utc};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

fn committed(content: &str) -> Post {
    Post {
        id: "p-7".into(),
        creator_id: "alice".into(),
        content: content.to_string(),
        media_ref: None,
        created_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
    }
}

/// Accept one client, acknowledge its first `create_post`, send a junk frame,
/// then close.
async fn ack_server() -> (String, JoinHandle<ClientEvent>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

        let text = ws.next().await.unwrap().unwrap().into_text().unwrap();
        let received: ClientEvent = serde_json::from_str(&text).unwrap();
        let ClientEvent::CreatePost { content, .. } = &received else {
            panic!("expected create_post");
        };

        let ack = serde_json::to_string(&ServerEvent::PostCreated {
            post: committed(content),
        })
        .unwrap();
        ws.send(Message::Text(ack)).await.unwrap();
        ws.send(Message::Text("{\"event\":\"mystery\"}".into()))
            .await
            .unwrap();
        ws.close(None).await.unwrap();
        received
    });
    (format!("ws://{addr}/ws"), handle)
}

#[tokio::test]
async fn frames_round_trip_and_close_drops_the_link() {
    let (url, server) = ack_server().await;
    let transport = WebSocketTransport::new(&url, Duration::from_secs(2)).unwrap();
    let mut link = transport.connect().await.unwrap();

    link.outbound
        .send(ClientEvent::CreatePost {
            content: "hello".into(),
            image: None,
        })
        .unwrap();

    let ack = tokio::time::timeout(Duration::from_secs(5), link.inbound.recv())
        .await
        .unwrap();
    assert_eq!(
        ack,
        Some(ServerEvent::PostCreated {
            post: committed("hello")
        })
    );

    // The unknown frame is skipped and the close ends the link.
    let closed = tokio::time::timeout(Duration::from_secs(5), link.inbound.recv())
        .await
        .unwrap();
    assert_eq!(closed, None);

    assert!(matches!(
        server.await.unwrap(),
        ClientEvent::CreatePost { content, image: None } if content == "hello"
    ));
}

#[tokio::test]
async fn refused_connection_is_a_connect_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let transport = WebSocketTransport::new(&format!("ws://{addr}/ws"), Duration::from_secs(2)).unwrap();
    assert!(transport.connect().await.is_err());
}
