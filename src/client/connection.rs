//! The DDP protocol engine.
//!
//! [`DdpClient`] owns the connection, the pending-call and subscription
//! registries, and the single inbound dispatch loop that demultiplexes
//! server frames.
//!
//! # Dispatch Loop
//!
//! One task per connection reads frames in arrival order and routes them:
//!
//! - `result` resolves the matching pending call
//! - `ready` / `nosub` resolve subscription waiters
//! - `added` / `changed` / `removed` are applied to the collection store
//!   synchronously, in arrival order
//! - `ping` is answered with `pong` immediately; `pong` resolves the
//!   outstanding self-ping
//! - anything else is logged and ignored
//!
//! The loop never suspends on caller behalf and never performs long-running
//! work; callers suspend on their own oneshot receivers. On transport
//! closure the loop fails all in-flight operations, re-opens the transport
//! with capped exponential backoff, re-handshakes, and emits
//! [`ClientEvent::ReconnectRequested`] exactly once per physical reconnect.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, trace, warn};

use crate::collection::{Collection, CollectionStore, TypedCollection};
use crate::error::{Error, Result};
use crate::identifiers::{MethodId, SubscriptionId};
use crate::protocol::{ClientFrame, ServerFrame};
use crate::transport::{Connector, Transport, WebSocketConnector};

use super::config::ClientConfig;
use super::event::{ClientEvent, EventListeners};
use super::registry::{PendingCalls, Subscriptions};

// ============================================================================
// Types
// ============================================================================

/// Which registry entry an outbound frame belongs to, so a failed send can
/// resolve it instead of leaving the caller hanging.
enum Correlation {
    Call(MethodId),
    Sub(SubscriptionId),
}

/// Commands from caller tasks to the dispatch loop.
enum LoopCommand {
    /// Send an encoded frame.
    Send {
        text: String,
        correlation: Option<Correlation>,
    },
    /// Close the transport and stop the loop.
    Shutdown,
}

type CommandSender = mpsc::UnboundedSender<LoopCommand>;

// ============================================================================
// DdpClient
// ============================================================================

/// A DDP connection: method calls, subscriptions, and mirrored collections.
///
/// # Thread Safety
///
/// `DdpClient` is `Send + Sync` and cheap to clone; clones share one
/// connection. Any number of tasks may issue calls and subscriptions
/// concurrently.
///
/// # Example
///
/// ```no_run
/// use ddp_client::{ClientConfig, DdpClient, Result};
/// use serde_json::json;
/// use url::Url;
///
/// # async fn example() -> Result<()> {
/// let url = Url::parse("wss://chat.example.com/websocket").unwrap();
/// let client = DdpClient::new(ClientConfig::new(url));
///
/// client.connect().await?;
/// client.subscribe_and_wait("stream-room-messages", vec![json!("general")], None).await?;
/// let result = client.call("getStatistics", vec![]).await?;
/// println!("{result}");
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct DdpClient {
    inner: Arc<ClientInner>,
}

/// Shared state behind the client handle.
struct ClientInner {
    config: ClientConfig,
    connector: Arc<dyn Connector>,
    /// Present while a dispatch loop is running.
    command_tx: Arc<Mutex<Option<CommandSender>>>,
    pending: Arc<Mutex<PendingCalls>>,
    subscriptions: Arc<Mutex<Subscriptions>>,
    store: Arc<CollectionStore>,
    listeners: Arc<EventListeners>,
    /// Outstanding self-initiated ping; at most one tracked at a time.
    self_ping: Arc<Mutex<Option<oneshot::Sender<()>>>>,
    /// DDP session id from the most recent `connected` frame.
    session_id: Arc<Mutex<Option<String>>>,
}

impl DdpClient {
    /// Creates a client for the configured WebSocket endpoint.
    ///
    /// No IO happens until [`connect`](Self::connect).
    #[must_use]
    pub fn new(config: ClientConfig) -> Self {
        let connector = Arc::new(WebSocketConnector::new(config.url.clone()));
        Self::with_connector(config, connector)
    }

    /// Creates a client over a custom [`Connector`].
    ///
    /// This is the seam for alternative transports and for tests that run
    /// the engine over an in-memory channel.
    #[must_use]
    pub fn with_connector(config: ClientConfig, connector: Arc<dyn Connector>) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                config,
                connector,
                command_tx: Arc::new(Mutex::new(None)),
                pending: Arc::new(Mutex::new(PendingCalls::default())),
                subscriptions: Arc::new(Mutex::new(Subscriptions::default())),
                store: Arc::new(CollectionStore::new()),
                listeners: Arc::new(EventListeners::default()),
                self_ping: Arc::new(Mutex::new(None)),
                session_id: Arc::new(Mutex::new(None)),
            }),
        }
    }

    // ========================================================================
    // Connection Lifecycle
    // ========================================================================

    /// Opens the transport, performs the handshake, and starts the dispatch
    /// loop.
    ///
    /// Re-invocation after a failed connect is allowed; calling while a
    /// connection is live is an error.
    ///
    /// # Errors
    ///
    /// - [`Error::Connect`] on handshake rejection or transport failure
    /// - [`Error::ConnectTimeout`] if the configured deadline elapses
    pub async fn connect(&self) -> Result<()> {
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        // Claim the connection slot before the first await, so a racing
        // connect() fails here instead of opening a second transport and a
        // second dispatch loop over the shared registries.
        {
            let mut slot = self.inner.command_tx.lock();
            if slot.is_some() {
                return Err(Error::connect("already connected"));
            }
            *slot = Some(command_tx);
        }

        let connect_timeout = self.inner.config.connect_timeout;
        let opened = timeout(connect_timeout, async {
            let mut transport = self.inner.connector.connect().await?;
            let session = handshake(transport.as_mut()).await?;
            Ok::<_, Error>((transport, session))
        })
        .await;

        let (transport, session) = match opened {
            Ok(Ok(pair)) => pair,
            Ok(Err(e)) => {
                *self.inner.command_tx.lock() = None;
                return Err(e);
            }
            Err(_) => {
                *self.inner.command_tx.lock() = None;
                return Err(Error::connect_timeout(connect_timeout.as_millis() as u64));
            }
        };

        info!(url = %self.inner.config.url, session = %session, "Connected");
        *self.inner.session_id.lock() = Some(session);

        let dispatch = DispatchLoop {
            transport,
            command_rx,
            connector: Arc::clone(&self.inner.connector),
            config: self.inner.config.clone(),
            pending: Arc::clone(&self.inner.pending),
            subscriptions: Arc::clone(&self.inner.subscriptions),
            store: Arc::clone(&self.inner.store),
            listeners: Arc::clone(&self.inner.listeners),
            self_ping: Arc::clone(&self.inner.self_ping),
            session_id: Arc::clone(&self.inner.session_id),
            command_tx_slot: Arc::clone(&self.inner.command_tx),
        };
        tokio::spawn(dispatch.run());

        Ok(())
    }

    /// Closes the connection and stops the dispatch loop.
    ///
    /// All in-flight operations resolve with
    /// [`Error::ConnectionLost`].
    pub fn shutdown(&self) {
        if let Some(tx) = self.inner.command_tx.lock().as_ref() {
            let _ = tx.send(LoopCommand::Shutdown);
        }
    }

    /// Returns the DDP session id from the most recent handshake.
    #[must_use]
    pub fn session_id(&self) -> Option<String> {
        self.inner.session_id.lock().clone()
    }

    // ========================================================================
    // Method Calls
    // ========================================================================

    /// Invokes a remote method with the configured default deadline.
    ///
    /// See [`call_with_timeout`](Self::call_with_timeout).
    pub async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value> {
        self.call_with_timeout(method, params, self.inner.config.call_timeout)
            .await
    }

    /// Invokes a remote method and waits for its result.
    ///
    /// # Errors
    ///
    /// - [`Error::CallTimeout`] if no result arrives within the deadline;
    ///   the pending entry is withdrawn and a later result is discarded
    /// - [`Error::Remote`] if the server answered with an error payload
    /// - [`Error::ConnectionLost`] if the connection drops mid-flight
    pub async fn call_with_timeout(
        &self,
        method: &str,
        params: Vec<Value>,
        call_timeout: Duration,
    ) -> Result<Value> {
        {
            let pending = self.inner.pending.lock();
            if pending.len() >= self.inner.config.max_pending_calls {
                warn!(
                    pending = pending.len(),
                    max = self.inner.config.max_pending_calls,
                    "Too many pending calls"
                );
                return Err(Error::protocol(format!(
                    "Too many pending calls: {}/{}",
                    pending.len(),
                    self.inner.config.max_pending_calls
                )));
            }
        }

        let id = MethodId::generate();
        let text = ClientFrame::Method {
            method: method.to_string(),
            params,
            id,
        }
        .encode()?;

        let (tx, rx) = oneshot::channel();
        self.inner.pending.lock().insert(id, tx);

        if let Err(e) = self.send_command(LoopCommand::Send {
            text,
            correlation: Some(Correlation::Call(id)),
        }) {
            self.inner.pending.lock().remove(&id);
            return Err(e);
        }

        trace!(method = %method, id = %id, "Call sent");

        match timeout(call_timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(Error::ConnectionLost),
            Err(_) => {
                // Withdraw the entry so a late result cannot resurrect us.
                self.inner.pending.lock().remove(&id);
                Err(Error::call_timeout(id, call_timeout.as_millis() as u64))
            }
        }
    }

    /// Returns the number of currently pending calls.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.pending.lock().len()
    }

    // ========================================================================
    // Subscriptions
    // ========================================================================

    /// Issues a subscription without waiting for readiness.
    ///
    /// # Errors
    ///
    /// [`Error::ConnectionLost`] if no connection is live.
    pub fn subscribe(&self, name: &str, params: Vec<Value>) -> Result<SubscriptionId> {
        self.subscribe_inner(name, params, None)
    }

    /// Issues a subscription and waits until the server marks it ready.
    ///
    /// `wait_timeout` defaults to the configured call timeout.
    ///
    /// # Errors
    ///
    /// - [`Error::Subscription`] on a `nosub` rejection
    /// - [`Error::SubscriptionTimeout`] if no `ready` frame lists the id in
    ///   time; the subscription itself stays registered and may still
    ///   become ready later
    pub async fn subscribe_and_wait(
        &self,
        name: &str,
        params: Vec<Value>,
        wait_timeout: Option<Duration>,
    ) -> Result<SubscriptionId> {
        let wait_timeout = wait_timeout.unwrap_or(self.inner.config.call_timeout);
        let (tx, rx) = oneshot::channel();
        let id = self.subscribe_inner(name, params, Some(tx))?;

        match timeout(wait_timeout, rx).await {
            Ok(Ok(Ok(()))) => Ok(id),
            Ok(Ok(Err(e))) => Err(e),
            Ok(Err(_)) => Err(Error::ConnectionLost),
            Err(_) => Err(Error::subscription_timeout(
                name,
                wait_timeout.as_millis() as u64,
            )),
        }
    }

    fn subscribe_inner(
        &self,
        name: &str,
        params: Vec<Value>,
        waiter: Option<oneshot::Sender<Result<()>>>,
    ) -> Result<SubscriptionId> {
        let id = SubscriptionId::generate();
        let text = ClientFrame::Sub {
            id,
            name: name.to_string(),
            params: params.clone(),
        }
        .encode()?;

        self.inner
            .subscriptions
            .lock()
            .insert(id, name, params, waiter);

        if let Err(e) = self.send_command(LoopCommand::Send {
            text,
            correlation: Some(Correlation::Sub(id)),
        }) {
            self.inner.subscriptions.lock().remove(&id);
            return Err(e);
        }

        debug!(name = %name, id = %id, "Subscription sent");
        Ok(id)
    }

    /// Cancels a subscription.
    ///
    /// The registry entry is removed when the server confirms with `nosub`.
    ///
    /// # Errors
    ///
    /// [`Error::ConnectionLost`] if no connection is live.
    pub fn unsubscribe(&self, id: SubscriptionId) -> Result<()> {
        let text = ClientFrame::Unsub { id }.encode()?;
        self.send_command(LoopCommand::Send {
            text,
            correlation: None,
        })
    }

    /// Returns `true` if the subscription is currently marked ready.
    #[must_use]
    pub fn subscription_ready(&self, id: SubscriptionId) -> bool {
        self.inner.subscriptions.lock().is_ready(&id)
    }

    /// Waits until an already-issued subscription is marked ready.
    ///
    /// Resolves immediately when readiness is already set. Useful for
    /// re-waiting a fire-and-forget subscription, or after a reconnect
    /// cleared readiness and [`reassert_subscriptions`](Self::reassert_subscriptions)
    /// reissued it.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionLost`] if the id is not registered
    /// - [`Error::Subscription`] on a `nosub` rejection while waiting
    /// - [`Error::SubscriptionTimeout`] if no `ready` frame lists the id
    ///   within the deadline
    pub async fn wait_subscription_ready(
        &self,
        id: SubscriptionId,
        deadline: Duration,
    ) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        let name = {
            let mut registry = self.inner.subscriptions.lock();
            let name = registry.name_of(&id);
            registry.add_waiter(&id, tx);
            name
        };

        match timeout(deadline, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(Error::ConnectionLost),
            Err(_) => Err(Error::subscription_timeout(
                name.unwrap_or_else(|| id.to_string()),
                deadline.as_millis() as u64,
            )),
        }
    }

    /// Reissues every registered subscription under its existing id.
    ///
    /// Called by the session layer after a reconnect; the engine itself
    /// never resubscribes. Readiness is reset by the disconnect and comes
    /// back with the server's fresh `ready` frames.
    ///
    /// # Errors
    ///
    /// [`Error::ConnectionLost`] if no connection is live.
    pub fn reassert_subscriptions(&self) -> Result<usize> {
        let snapshot = self.inner.subscriptions.lock().snapshot();
        let count = snapshot.len();

        for (id, name, params) in snapshot {
            let text = ClientFrame::Sub { id, name, params }.encode()?;
            self.send_command(LoopCommand::Send {
                text,
                correlation: Some(Correlation::Sub(id)),
            })?;
        }

        if count > 0 {
            debug!(count, "Reasserted subscriptions");
        }
        Ok(count)
    }

    // ========================================================================
    // Heartbeat
    // ========================================================================

    /// Sends a ping and waits for the matching pong.
    ///
    /// At most one self-initiated ping is tracked at a time; issuing a new
    /// one abandons a stale outstanding ping.
    ///
    /// # Errors
    ///
    /// [`Error::CallTimeout`] if no pong arrives within the deadline.
    pub async fn ping(&self, deadline: Duration) -> Result<()> {
        let id = MethodId::generate();
        let text = ClientFrame::Ping {
            id: Some(id.to_string()),
        }
        .encode()?;

        let (tx, rx) = oneshot::channel();
        *self.inner.self_ping.lock() = Some(tx);

        self.send_command(LoopCommand::Send {
            text,
            correlation: None,
        })?;

        match timeout(deadline, rx).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(Error::ConnectionLost),
            Err(_) => {
                self.inner.self_ping.lock().take();
                Err(Error::call_timeout(id, deadline.as_millis() as u64))
            }
        }
    }

    // ========================================================================
    // Collections & Events
    // ========================================================================

    /// Returns the shared collection store.
    #[inline]
    #[must_use]
    pub fn store(&self) -> &Arc<CollectionStore> {
        &self.inner.store
    }

    /// Returns the named collection mirror, if any diffs created it.
    #[must_use]
    pub fn get_collection(&self, name: &str) -> Option<Arc<Collection>> {
        self.inner.store.get(name)
    }

    /// Returns a typed projection over the named collection, if it exists.
    #[must_use]
    pub fn typed_collection<T: DeserializeOwned>(&self, name: &str) -> Option<TypedCollection<T>> {
        self.get_collection(name).map(TypedCollection::new)
    }

    /// Waits for an entry to appear in the named collection.
    ///
    /// Bounded polling at the configured interval; see
    /// [`CollectionStore::wait_for_entry`].
    pub async fn wait_for_entry(
        &self,
        collection: &str,
        id: &str,
        deadline: Duration,
    ) -> Result<Arc<Collection>> {
        self.inner
            .store
            .wait_for_entry(
                collection,
                id,
                self.inner.config.consistency_poll_interval,
                deadline,
            )
            .await
    }

    /// Registers an event listener.
    ///
    /// The returned receiver yields [`ClientEvent`]s; consumers must not
    /// block the receiving task on slow work.
    #[must_use]
    pub fn events(&self) -> mpsc::UnboundedReceiver<ClientEvent> {
        self.inner.listeners.register()
    }

    /// Returns the configuration this client was built with.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn send_command(&self, command: LoopCommand) -> Result<()> {
        let guard = self.inner.command_tx.lock();
        let tx = guard.as_ref().ok_or(Error::ConnectionLost)?;
        tx.send(command).map_err(|_| Error::ConnectionLost)
    }
}

// ============================================================================
// Handshake
// ============================================================================

/// Performs the connect handshake on a fresh transport.
///
/// Non-frame messages before `connected` (e.g. the server-id banner) are
/// skipped.
async fn handshake(transport: &mut dyn Transport) -> Result<String> {
    transport.send(ClientFrame::connect().encode()?).await?;

    loop {
        match transport.recv().await {
            Some(Ok(text)) => match ServerFrame::parse(&text) {
                Some(ServerFrame::Connected { session }) => return Ok(session),
                Some(ServerFrame::Failed { version }) => {
                    return Err(Error::connect(format!(
                        "server rejected handshake, wants protocol version {version}"
                    )));
                }
                _ => {}
            },
            Some(Err(e)) => return Err(e),
            None => return Err(Error::connect("transport closed during handshake")),
        }
    }
}

// ============================================================================
// DispatchLoop
// ============================================================================

/// The single per-connection reader/dispatcher task.
struct DispatchLoop {
    transport: Box<dyn Transport>,
    command_rx: mpsc::UnboundedReceiver<LoopCommand>,
    connector: Arc<dyn Connector>,
    config: ClientConfig,
    pending: Arc<Mutex<PendingCalls>>,
    subscriptions: Arc<Mutex<Subscriptions>>,
    store: Arc<CollectionStore>,
    listeners: Arc<EventListeners>,
    self_ping: Arc<Mutex<Option<oneshot::Sender<()>>>>,
    session_id: Arc<Mutex<Option<String>>>,
    /// Cleared on exit so the client handle can connect again.
    command_tx_slot: Arc<Mutex<Option<CommandSender>>>,
}

impl DispatchLoop {
    async fn run(mut self) {
        loop {
            tokio::select! {
                message = self.transport.recv() => {
                    match message {
                        Some(Ok(text)) => {
                            let reply = ServerFrame::parse(&text)
                                .and_then(|frame| self.handle_frame(frame));

                            if let Some(reply) = reply
                                && let Ok(json) = reply.encode()
                                && let Err(e) = self.transport.send(json).await
                            {
                                warn!(error = %e, "Failed to send heartbeat reply");
                            }
                        }

                        Some(Err(e)) => {
                            error!(error = %e, "Transport error");
                            if !self.reconnect().await {
                                break;
                            }
                        }

                        None => {
                            debug!("Transport closed by remote");
                            if !self.reconnect().await {
                                break;
                            }
                        }
                    }
                }

                command = self.command_rx.recv() => {
                    match command {
                        Some(LoopCommand::Send { text, correlation }) => {
                            self.handle_send(text, correlation).await;
                        }

                        Some(LoopCommand::Shutdown) => {
                            debug!("Shutdown command received");
                            self.transport.close().await;
                            break;
                        }

                        None => {
                            debug!("Command channel closed");
                            self.transport.close().await;
                            break;
                        }
                    }
                }
            }
        }

        self.fail_inflight();
        *self.command_tx_slot.lock() = None;
        debug!("Dispatch loop terminated");
    }

    /// Routes one inbound frame. Returns a frame to send back, if any.
    ///
    /// Must stay short: collection diffs apply synchronously here to
    /// preserve arrival order, and anything slower belongs on the
    /// consumer's own task.
    fn handle_frame(&self, frame: ServerFrame) -> Option<ClientFrame> {
        match frame {
            ServerFrame::Result { id, result, error } => {
                let outcome = match error {
                    Some(remote) => Err(Error::Remote(remote)),
                    None => Ok(result.unwrap_or(Value::Null)),
                };
                if !self.pending.lock().resolve(&id, outcome) {
                    debug!(id = %id, "Discarding result for unknown or timed-out call");
                }
                None
            }

            ServerFrame::Ready { subs } => {
                let mut registry = self.subscriptions.lock();
                for id in subs {
                    if registry.mark_ready(&id) {
                        trace!(id = %id, "Subscription ready");
                    } else {
                        debug!(id = %id, "Ready for unknown subscription");
                    }
                }
                None
            }

            ServerFrame::Nosub { id, error } => {
                let reason = error.map(|e| e.to_string());
                match self.subscriptions.lock().reject(id, reason) {
                    Some(name) => debug!(id = %id, name = %name, "Subscription ended"),
                    None => debug!(id = %id, "Nosub for unknown subscription"),
                }
                None
            }

            ServerFrame::Added {
                collection,
                id,
                fields,
            } => {
                self.store.added(&collection, id, fields.unwrap_or_default());
                None
            }

            ServerFrame::Changed {
                collection,
                id,
                fields,
            } => {
                let fields = fields.unwrap_or_default();
                self.store.changed(&collection, &id, fields.clone());
                self.listeners
                    .emit(&ClientEvent::CollectionChanged { collection, fields });
                None
            }

            ServerFrame::Removed { collection, id } => {
                self.store.removed(&collection, &id);
                None
            }

            ServerFrame::Ping { id } => Some(ClientFrame::Pong { id }),

            ServerFrame::Pong { .. } => {
                if let Some(tx) = self.self_ping.lock().take() {
                    let _ = tx.send(());
                }
                None
            }

            ServerFrame::Updated { methods } => {
                trace!(count = methods.len(), "Server writes flushed");
                None
            }

            ServerFrame::Connected { session } => {
                debug!(session = %session, "Unexpected connected frame mid-stream");
                None
            }

            ServerFrame::Failed { version } => {
                warn!(version = %version, "Unexpected failed frame mid-stream");
                None
            }
        }
    }

    async fn handle_send(&mut self, text: String, correlation: Option<Correlation>) {
        if let Err(e) = self.transport.send(text).await {
            warn!(error = %e, "Failed to send frame");
            if let Some(correlation) = correlation {
                self.fail_correlation(correlation);
            }
        }
    }

    /// Fails everything in flight: pending calls, subscription waiters and
    /// readiness, and the outstanding self-ping.
    fn fail_inflight(&self) {
        self.pending.lock().fail_all();
        self.subscriptions.lock().connection_lost();
        self.self_ping.lock().take();
    }

    fn fail_correlation(&self, correlation: Correlation) {
        match correlation {
            Correlation::Call(id) => {
                if let Some(tx) = self.pending.lock().remove(&id) {
                    let _ = tx.send(Err(Error::ConnectionLost));
                }
            }
            Correlation::Sub(id) => {
                self.subscriptions
                    .lock()
                    .reject(id, Some("connection lost before subscribe".to_string()));
            }
        }
    }

    /// Re-establishes the transport after closure.
    ///
    /// Returns `false` when shutdown was requested instead. On success the
    /// reconnect event has been emitted exactly once.
    async fn reconnect(&mut self) -> bool {
        self.fail_inflight();

        let mut delay = self.config.reconnect_initial_delay;
        loop {
            tokio::select! {
                _ = sleep(delay) => {
                    match self.try_reopen().await {
                        Ok(()) => {
                            info!(url = %self.config.url, "Reconnected");
                            self.listeners.emit(&ClientEvent::ReconnectRequested);
                            return true;
                        }
                        Err(e) => {
                            warn!(error = %e, delay_ms = delay.as_millis() as u64, "Reconnect attempt failed");
                            delay = (delay * 2).min(self.config.reconnect_max_delay);
                        }
                    }
                }

                command = self.command_rx.recv() => {
                    match command {
                        Some(LoopCommand::Send { correlation, .. }) => {
                            // Fail fast rather than queueing across the gap.
                            if let Some(correlation) = correlation {
                                self.fail_correlation(correlation);
                            }
                        }
                        Some(LoopCommand::Shutdown) | None => return false,
                    }
                }
            }
        }
    }

    async fn try_reopen(&mut self) -> Result<()> {
        let connect_timeout = self.config.connect_timeout;

        let reopened = timeout(connect_timeout, async {
            let mut transport = self.connector.connect().await?;
            let session = handshake(transport.as_mut()).await?;
            Ok::<_, Error>((transport, session))
        })
        .await;

        match reopened {
            Ok(Ok((transport, session))) => {
                self.transport = transport;
                *self.session_id.lock() = Some(session);
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(Error::connect_timeout(connect_timeout.as_millis() as u64)),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
