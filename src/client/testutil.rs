//! In-memory transport harness for engine and session tests.
//!
//! A [`TestConnector`] hands each `connect` attempt to the test as a
//! [`TestPeer`], the server side of an in-memory channel pair. Tests script
//! the server by reading frames from the peer and sending raw JSON back.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::timeout;
use url::Url;

use crate::error::{Error, Result};
use crate::transport::{Connector, Transport};

use super::config::ClientConfig;
use super::connection::DdpClient;

// ============================================================================
// TestTransport
// ============================================================================

pub(crate) struct TestTransport {
    to_server: mpsc::UnboundedSender<String>,
    from_server: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl Transport for TestTransport {
    async fn send(&mut self, text: String) -> Result<()> {
        self.to_server.send(text).map_err(|_| Error::ConnectionLost)
    }

    async fn recv(&mut self) -> Option<Result<String>> {
        self.from_server.recv().await.map(Ok)
    }

    async fn close(&mut self) {}
}

// ============================================================================
// TestPeer
// ============================================================================

/// Server side of one accepted connection.
pub(crate) struct TestPeer {
    from_client: mpsc::UnboundedReceiver<String>,
    to_client: mpsc::UnboundedSender<String>,
}

impl TestPeer {
    pub async fn recv(&mut self) -> String {
        timeout(Duration::from_secs(5), self.from_client.recv())
            .await
            .expect("peer recv timed out")
            .expect("client side closed")
    }

    pub async fn recv_json(&mut self) -> Value {
        serde_json::from_str(&self.recv().await).expect("client sent valid json")
    }

    pub fn send(&self, text: impl Into<String>) {
        let _ = self.to_client.send(text.into());
    }

    pub async fn accept_handshake(&mut self) {
        let frame = self.recv_json().await;
        assert_eq!(frame["msg"], "connect");
        assert_eq!(frame["version"], "1");
        self.send(r#"{"msg":"connected","session":"s1"}"#);
    }
}

// ============================================================================
// TestConnector
// ============================================================================

pub(crate) struct TestConnector {
    accepts: mpsc::UnboundedSender<TestPeer>,
}

impl TestConnector {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<TestPeer>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { accepts: tx }), rx)
    }
}

#[async_trait]
impl Connector for TestConnector {
    async fn connect(&self) -> Result<Box<dyn Transport>> {
        let (client_tx, client_rx) = mpsc::unbounded_channel();
        let (server_tx, server_rx) = mpsc::unbounded_channel();

        let peer = TestPeer {
            from_client: client_rx,
            to_client: server_tx,
        };
        self.accepts
            .send(peer)
            .map_err(|_| Error::connect("test server gone"))?;

        Ok(Box::new(TestTransport {
            to_server: client_tx,
            from_server: server_rx,
        }))
    }
}

// ============================================================================
// Harness
// ============================================================================

/// Installs a log subscriber once per process.
///
/// Rerun a failing test with `RUST_LOG=ddp_client=trace` for frame-level
/// output interleaved with the captured test output.
pub(crate) fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub(crate) fn test_config() -> ClientConfig {
    let url = Url::parse("ws://test.invalid/websocket").expect("valid url");
    ClientConfig::new(url)
        .call_timeout(Duration::from_secs(2))
        .reconnect_initial_delay(Duration::from_millis(10))
        .reconnect_max_delay(Duration::from_millis(50))
}

/// Connects a client over the in-memory transport and accepts the handshake.
pub(crate) async fn connected_client_with(
    config: ClientConfig,
) -> (DdpClient, TestPeer, mpsc::UnboundedReceiver<TestPeer>) {
    init_tracing();

    let (connector, mut accepts) = TestConnector::new();
    let client = DdpClient::with_connector(config, connector);

    let connecting = {
        let client = client.clone();
        tokio::spawn(async move { client.connect().await })
    };

    let mut peer = accepts.recv().await.expect("connect attempt");
    peer.accept_handshake().await;
    connecting.await.expect("join").expect("connected");

    (client, peer, accepts)
}

pub(crate) async fn connected_client() -> (DdpClient, TestPeer, mpsc::UnboundedReceiver<TestPeer>) {
    connected_client_with(test_config()).await
}

/// Round-trips a dummy call so everything the peer sent beforehand is known
/// to have been dispatched.
pub(crate) async fn fence(client: &DdpClient, peer: &mut TestPeer) {
    let call = {
        let client = client.clone();
        tokio::spawn(async move { client.call("fence", vec![]).await })
    };
    let frame = peer.recv_json().await;
    assert_eq!(frame["msg"], "method");
    peer.send(format!(
        r#"{{"msg":"result","id":"{}","result":null}}"#,
        frame["id"].as_str().expect("id")
    ));
    call.await.expect("join").expect("fence call");
}
