use anyhow::{anyhow, Context, Result};
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use super::packet::{self, FeedEvent, Frame};
use super::Readiness;
use crate::config::TelemetryConfig;
use crate::vehicle::{GeoPoint, VehicleTelemetrySnapshot};
use crate::view::{render_telemetry, TelemetryView};

type FeedSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Default)]
struct TelemetryState {
    connected: bool,
    snapshot: VehicleTelemetrySnapshot,
}

struct Shared {
    state: RwLock<TelemetryState>,
    view_tx: watch::Sender<TelemetryView>,
    /// Bumped whenever a connection is replaced or torn down so a stale
    /// reader task can no longer touch the state.
    generation: AtomicU64,
}

struct Connection {
    reader: JoinHandle<()>,
    shutdown: oneshot::Sender<()>,
}

/// Keeps the latest vehicle telemetry from the push feed and re-renders the
/// telemetry section on every change.
pub struct TelemetryClient {
    config: TelemetryConfig,
    shared: Arc<Shared>,
    connection: Mutex<Option<Connection>>,
}

impl Shared {
    fn apply(&self, generation: u64, event: FeedEvent) -> Result<()> {
        if self.generation.load(Ordering::SeqCst) != generation {
            debug!("Dropping telemetry event from a replaced connection");
            return Ok(());
        }

        {
            let mut state = self
                .state
                .write()
                .map_err(|e| anyhow!("Lock error: {}", e))?;
            match event {
                FeedEvent::Connect => {
                    info!("Telemetry feed connected");
                    state.connected = true;
                }
                FeedEvent::Disconnect => {
                    info!("Telemetry feed disconnected");
                    state.connected = false;
                    state.snapshot = VehicleTelemetrySnapshot::default();
                }
                FeedEvent::Telemetry(update) => {
                    debug!("Telemetry update: {:?}", update);
                    state.snapshot.apply(update);
                }
            }
        }

        self.render()
    }

    fn reset(&self) -> Result<()> {
        {
            let mut state = self
                .state
                .write()
                .map_err(|e| anyhow!("Lock error: {}", e))?;
            state.connected = false;
            state.snapshot = VehicleTelemetrySnapshot::default();
        }
        self.render()
    }

    fn render(&self) -> Result<()> {
        let view = {
            let state = self
                .state
                .read()
                .map_err(|e| anyhow!("Lock error: {}", e))?;
            render_telemetry(state.connected, &state.snapshot)
        };
        self.view_tx.send_replace(view);
        Ok(())
    }
}

impl TelemetryClient {
    pub fn new(config: TelemetryConfig) -> Self {
        let state = TelemetryState::default();
        let (view_tx, _) = watch::channel(render_telemetry(state.connected, &state.snapshot));
        Self {
            config,
            shared: Arc::new(Shared {
                state: RwLock::new(state),
                view_tx,
                generation: AtomicU64::new(0),
            }),
            connection: Mutex::new(None),
        }
    }

    /// Dials the feed, replacing any existing connection. Failures are logged
    /// and leave the client disconnected.
    pub async fn connect(&self) {
        let mut connection = self.connection.lock().await;
        if let Some(previous) = connection.take() {
            info!("Replacing existing telemetry connection");
            previous.reader.abort();
        }
        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;

        info!("Connecting to telemetry feed at {}", self.config.url);
        let socket = match self.dial().await {
            Ok(socket) => socket,
            Err(e) => {
                error!("Telemetry connection failed: {:#}", e);
                if let Err(e) = self.shared.reset() {
                    error!("Failed to reset telemetry state: {}", e);
                }
                return;
            }
        };

        let (shutdown, shutdown_rx) = oneshot::channel();
        let shared = self.shared.clone();
        let namespace = self.config.namespace.clone();
        let reader = tokio::spawn(async move {
            Self::read_loop(socket, shared, namespace, generation, shutdown_rx).await;
        });

        *connection = Some(Connection { reader, shutdown });
    }

    /// Closes the feed if open and resets telemetry state. Safe to call when
    /// not connected.
    pub async fn disconnect(&self) {
        let mut connection = self.connection.lock().await;
        self.shared.generation.fetch_add(1, Ordering::SeqCst);

        if let Some(Connection {
            mut reader,
            shutdown,
        }) = connection.take()
        {
            info!("Disconnecting from telemetry feed");
            let _ = shutdown.send(());
            if tokio::time::timeout(Duration::from_secs(2), &mut reader)
                .await
                .is_err()
            {
                warn!("Telemetry reader did not stop in time, aborting");
                reader.abort();
            }
        }

        if let Err(e) = self.shared.reset() {
            error!("Failed to reset telemetry state: {}", e);
        }
    }

    async fn dial(&self) -> Result<FeedSocket> {
        let timeout = Duration::from_secs(self.config.connect_timeout_secs);
        let (socket, _) = tokio::time::timeout(timeout, connect_async(self.config.url.as_str()))
            .await
            .context("Telemetry handshake timed out")?
            .context("Failed to open telemetry websocket")?;
        Ok(socket)
    }

    async fn read_loop(
        mut socket: FeedSocket,
        shared: Arc<Shared>,
        namespace: String,
        generation: u64,
        mut shutdown: oneshot::Receiver<()>,
    ) {
        let apply = |event: FeedEvent| {
            if let Err(e) = shared.apply(generation, event) {
                error!("Failed to apply telemetry event: {}", e);
            }
        };

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    let _ = socket.send(Message::Text(packet::disconnect_frame(&namespace))).await;
                    let _ = socket.close(None).await;
                    break;
                }
                msg = socket.next() => {
                    let text = match msg {
                        Some(Ok(Message::Text(text))) => text,
                        Some(Ok(Message::Close(reason))) => {
                            debug!("Telemetry socket closed: {:?}", reason);
                            apply(FeedEvent::Disconnect);
                            break;
                        }
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => {
                            error!("Telemetry socket error: {}", e);
                            apply(FeedEvent::Disconnect);
                            break;
                        }
                        None => {
                            apply(FeedEvent::Disconnect);
                            break;
                        }
                    };

                    let frame = match packet::parse_frame(&text) {
                        Ok(frame) => frame,
                        Err(e) => {
                            warn!("Ignoring telemetry frame {:?}: {}", text, e);
                            continue;
                        }
                    };

                    let reply = match &frame {
                        Frame::Open => Some(packet::connect_frame(&namespace)),
                        Frame::Ping => Some(packet::PONG.to_string()),
                        _ => None,
                    };
                    if let Some(reply) = reply {
                        if let Err(e) = socket.send(Message::Text(reply)).await {
                            error!("Failed to write to telemetry socket: {}", e);
                            apply(FeedEvent::Disconnect);
                            break;
                        }
                        continue;
                    }

                    if let Frame::ConnectError { message, .. } = &frame {
                        warn!("Telemetry namespace rejected: {}", message);
                        apply(FeedEvent::Disconnect);
                        break;
                    }

                    let closing = frame == Frame::Close;
                    match frame.into_event(&namespace) {
                        Ok(Some(event)) => apply(event),
                        Ok(None) => debug!("Unhandled telemetry frame: {}", text),
                        Err(e) => warn!("Bad telemetry event: {:#}", e),
                    }
                    if closing {
                        break;
                    }
                }
            }
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<TelemetryView> {
        self.shared.view_tx.subscribe()
    }

    pub fn view(&self) -> TelemetryView {
        self.shared.view_tx.borrow().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.shared
            .state
            .read()
            .map(|state| state.connected)
            .unwrap_or(false)
    }

    pub fn snapshot(&self) -> Result<VehicleTelemetrySnapshot> {
        let state = self
            .shared
            .state
            .read()
            .map_err(|e| anyhow!("Lock error: {}", e))?;
        Ok(state.snapshot.clone())
    }

    #[cfg(test)]
    pub(crate) fn generation(&self) -> u64 {
        self.shared.generation.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    pub(crate) fn inject_from(&self, generation: u64, event: FeedEvent) -> Result<()> {
        self.shared.apply(generation, event)
    }

    #[cfg(test)]
    pub(crate) fn inject(&self, event: FeedEvent) -> Result<()> {
        self.inject_from(self.generation(), event)
    }
}

impl Readiness for TelemetryClient {
    fn is_ready(&self) -> bool {
        self.shared
            .state
            .read()
            .map(|state| state.connected && state.snapshot.home.is_some())
            .unwrap_or(false)
    }

    fn home_position(&self) -> Option<GeoPoint> {
        self.shared
            .state
            .read()
            .ok()
            .and_then(|state| state.snapshot.home)
    }
}
