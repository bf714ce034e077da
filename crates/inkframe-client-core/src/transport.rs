//! Realtime channel transport with automatic recovery.
//!
//! One supervisor task owns the connect/read/backoff loop, so at most one
//! physical socket and one pending reconnect exist at any moment. Delivery is
//! best-effort: outbound payloads are dropped while the channel is closed and
//! inbound frames carry no acknowledgment.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError, RwLock};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt, stream::SplitSink};
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_RECONNECT_DELAY};
use crate::error::{CoreError, Result};
use crate::router::MessageRouter;
use crate::store::ConnectionFlag;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWriter = SplitSink<WsStream, Message>;

/// Transport lifecycle. `Destroyed` is terminal: no further transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Disconnected,
    Connecting,
    Connected,
    Destroyed,
}

/// Transport configuration.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub url: String,
    pub reconnect_delay: Duration,
    pub connect_timeout: Duration,
}

impl TransportConfig {
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

/// Owns the single realtime duplex connection.
pub struct TransportClient {
    url: Url,
    reconnect_delay: Duration,
    connect_timeout: Duration,
    state: RwLock<TransportState>,
    writer: tokio::sync::Mutex<Option<WsWriter>>,
    destroyed: AtomicBool,
    supervisor: StdMutex<Option<JoinHandle<()>>>,
    router: Arc<MessageRouter>,
    connection: Arc<ConnectionFlag>,
}

impl TransportClient {
    pub fn new(
        config: TransportConfig,
        router: Arc<MessageRouter>,
        connection: Arc<ConnectionFlag>,
    ) -> Result<Self> {
        let url = Url::parse(&config.url)?;
        if url.scheme() != "ws" && url.scheme() != "wss" {
            return Err(CoreError::InvalidUrl(format!(
                "URL must use ws:// or wss:// scheme, got: {}",
                url.scheme()
            )));
        }

        Ok(Self {
            url,
            reconnect_delay: config.reconnect_delay,
            connect_timeout: config.connect_timeout,
            state: RwLock::new(TransportState::Disconnected),
            writer: tokio::sync::Mutex::new(None),
            destroyed: AtomicBool::new(false),
            supervisor: StdMutex::new(None),
            router,
            connection,
        })
    }

    /// Channel endpoint as string.
    pub fn url(&self) -> &str {
        self.url.as_str()
    }

    /// Current transport lifecycle state.
    pub fn state(&self) -> TransportState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Ensure a connection attempt is in flight or established. A no-op when
    /// the supervisor is already running or the transport was destroyed.
    pub fn connect(self: &Arc<Self>) {
        if self.is_destroyed() {
            debug!("transport destroyed, ignoring connect");
            return;
        }

        let mut supervisor = self
            .supervisor
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if supervisor.as_ref().is_some_and(|task| !task.is_finished()) {
            debug!("transport already connecting or connected");
            return;
        }

        let client = Arc::clone(self);
        *supervisor = Some(tokio::spawn(async move {
            client.run().await;
        }));
    }

    /// Serialize and transmit a payload, fire-and-forget. Silently drops the
    /// payload while the channel is not open.
    pub async fn send<T: Serialize>(&self, payload: &T) {
        if self.state() != TransportState::Connected {
            debug!("dropping outbound message, channel not open");
            return;
        }
        let text = match serde_json::to_string(payload) {
            Ok(text) => text,
            Err(error) => {
                warn!("outbound message serialization failed: {error}");
                return;
            }
        };

        let mut writer_guard = self.writer.lock().await;
        let Some(writer) = writer_guard.as_mut() else {
            debug!("dropping outbound message, channel not open");
            return;
        };
        if let Err(error) = writer.send(Message::Text(text)).await {
            warn!("websocket send failed: {error}");
        }
    }

    /// Permanently tear down the connection and suppress all future
    /// reconnection attempts. The transport cannot be revived afterwards.
    pub async fn disconnect(&self) {
        self.destroyed.store(true, Ordering::SeqCst);

        if let Some(task) = self
            .supervisor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }

        if let Some(mut writer) = self.writer.lock().await.take() {
            if let Err(error) = writer.send(Message::Close(None)).await {
                debug!("close frame send failed: {error}");
            }
        }

        self.set_state(TransportState::Destroyed);
        self.connection.set_connected(false);
        info!("realtime channel destroyed");
    }

    fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    fn set_state(&self, next: TransportState) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = next;
    }

    /// Supervisor loop: connect, read until close, then back off for the
    /// fixed delay and try again. Exactly one reconnect is scheduled per
    /// close, and the destroyed flag is consulted before every step so no
    /// effect lands after teardown.
    async fn run(&self) {
        loop {
            if self.is_destroyed() {
                break;
            }
            self.set_state(TransportState::Connecting);

            match timeout(self.connect_timeout, connect_async(self.url.as_str())).await {
                Ok(Ok((stream, _response))) => {
                    let (writer, mut reader) = stream.split();
                    *self.writer.lock().await = Some(writer);
                    self.set_state(TransportState::Connected);
                    self.connection.set_connected(true);
                    info!("realtime channel connected");

                    while let Some(frame) = reader.next().await {
                        match frame {
                            Ok(Message::Text(text)) => self.router.dispatch_raw(&text),
                            Ok(Message::Ping(payload)) => {
                                debug!("received ping ({} bytes)", payload.len());
                            }
                            Ok(Message::Pong(_)) => {}
                            Ok(Message::Close(_)) => break,
                            Ok(Message::Binary(_)) => {}
                            Ok(Message::Frame(_)) => {}
                            Err(error) => {
                                warn!("websocket read error: {error}");
                                break;
                            }
                        }
                    }

                    self.writer.lock().await.take();
                    self.connection.set_connected(false);
                    if self.is_destroyed() {
                        break;
                    }
                    self.set_state(TransportState::Disconnected);
                    info!("realtime channel disconnected");
                }
                Ok(Err(error)) => {
                    warn!("websocket connect failed: {error}");
                    self.set_state(TransportState::Disconnected);
                }
                Err(_) => {
                    warn!(
                        "websocket connect timed out after {:?}",
                        self.connect_timeout
                    );
                    self.set_state(TransportState::Disconnected);
                }
            }

            if self.is_destroyed() {
                break;
            }
            tokio::time::sleep(self.reconnect_delay).await;
        }
    }
}
