//! # Chorus Transport
//!
//! Production handlers for the effect traits in `chorus-core`:
//!
//! - [`HttpApiClient`]: engagement and post endpoints over HTTP (reqwest)
//! - [`WebSocketTransport`]: the broadcast channel over a WebSocket carrying
//!   JSON text frames (tokio-tungstenite)

#![forbid(unsafe_code)]

pub mod error;
pub mod http;
pub mod websocket;

pub use error::TransportError;
pub use http::HttpApiClient;
pub use websocket::WebSocketTransport;
