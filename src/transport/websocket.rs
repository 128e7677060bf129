//! WebSocket transport over `tokio-tungstenite`.
//!
//! Production implementation of the [`Transport`] and [`Connector`] traits.
//! WebSocket control frames (ping/pong/binary) are handled below the text
//! channel and never surface to the protocol engine; DDP runs its own
//! heartbeat in-band as `{"msg":"ping"}` text frames.

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, trace};
use url::Url;

use crate::error::Result;

use super::{Connector, Transport};

// ============================================================================
// Types
// ============================================================================

/// Stream type produced by `connect_async` (plain TCP or TLS).
type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ============================================================================
// WebSocketTransport
// ============================================================================

/// A live WebSocket connection carrying one frame per text message.
pub struct WebSocketTransport {
    stream: WsStream,
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&mut self, text: String) -> Result<()> {
        trace!(len = text.len(), "Sending text message");
        self.stream.send(Message::Text(text.into())).await?;
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text.to_string())),

                Ok(Message::Close(_)) => {
                    debug!("WebSocket closed by remote");
                    return None;
                }

                // Binary and ws-level ping/pong are not protocol frames.
                Ok(_) => {}

                Err(e) => return Some(Err(e.into())),
            }
        }
    }

    async fn close(&mut self) {
        let _ = self.stream.close(None).await;
    }
}

// ============================================================================
// WebSocketConnector
// ============================================================================

/// Opens WebSocket transports to a fixed endpoint URL.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    url: Url,
}

impl WebSocketConnector {
    /// Creates a connector for the given `ws://` or `wss://` endpoint.
    #[inline]
    #[must_use]
    pub fn new(url: Url) -> Self {
        Self { url }
    }

    /// Returns the endpoint URL.
    #[inline]
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self) -> Result<Box<dyn Transport>> {
        debug!(url = %self.url, "Opening WebSocket");
        let (stream, _response) = connect_async(self.url.as_str()).await?;
        Ok(Box::new(WebSocketTransport { stream }))
    }
}

// ============================================================================
// Tests
// ============================================================================
