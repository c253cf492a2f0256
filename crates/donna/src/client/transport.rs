//! Chat event transport.
//!
//! Maintains exactly one live logical WebSocket connection per session,
//! translates network-level connect/message/close/error into the
//! `ChatEvent` / `ClientCommand` vocabulary, and reconnects with a fixed
//! backoff on unexpected close.
//!
//! A generation counter guards against stale-connection callback
//! delivery: a client environment may construct and tear down transports
//! in rapid succession, and a superseded connection racing a newer one
//! must never produce signals or state changes. Every socket task checks
//! it still owns the current generation before emitting anything.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::{FutureExt, SinkExt, StreamExt};
use log::{debug, info, warn};
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use url::Url;

use donna_protocol::{CLOSE_AUTH_REQUIRED, ChatEvent, ClientCommand};

/// Default backoff before re-dialing after an unexpected close.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Connection parameters for the chat endpoint.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Base endpoint, e.g. `ws://127.0.0.1:8787/ws/chat`.
    pub url: String,
    /// IANA timezone name forwarded so the agent resolves relative dates
    /// against the caller's calendar day. Omitted -> server default.
    pub timezone: Option<String>,
    /// Shared auth token, when the server requires one.
    pub token: Option<String>,
    /// Backoff between reconnect attempts.
    pub reconnect_delay: Duration,
}

impl TransportConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timezone: None,
            token: None,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }

    /// Full endpoint URL with connection metadata as percent-encoded
    /// query parameters.
    fn endpoint(&self) -> String {
        if self.timezone.is_none() && self.token.is_none() {
            return self.url.clone();
        }
        match Url::parse(&self.url) {
            Ok(mut url) => {
                {
                    let mut pairs = url.query_pairs_mut();
                    if let Some(tz) = &self.timezone {
                        pairs.append_pair("timezone", tz);
                    }
                    if let Some(token) = &self.token {
                        pairs.append_pair("token", token);
                    }
                }
                url.into()
            }
            Err(err) => {
                warn!("unparseable endpoint URL {}: {err}", self.url);
                self.url.clone()
            }
        }
    }
}

/// Signals raised to the transport's owner.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportSignal {
    /// The connection is established and commands may be sent.
    Connected,
    /// An event frame arrived from the backend.
    Event(ChatEvent),
    /// The connection dropped. When `reconnecting` is true a re-dial is
    /// scheduled after the configured delay.
    Disconnected { reconnecting: bool },
    /// The server closed with the auth close code; reconnection is
    /// suppressed and the caller should re-prompt for credentials.
    AuthRequired,
}

/// What to do after a connection closed with the given close code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// Schedule one reconnect attempt after the backoff delay.
    Retry,
    /// Do not reconnect; surface an authentication-required state.
    AuthRequired,
}

/// Reconnect policy: only the distinguished auth close code suppresses
/// the backoff-reconnect loop.
pub fn decide_reconnect(close_code: Option<u16>) -> ReconnectDecision {
    if close_code == Some(CLOSE_AUTH_REQUIRED) {
        ReconnectDecision::AuthRequired
    } else {
        ReconnectDecision::Retry
    }
}

struct Shared {
    config: TransportConfig,
    signal_tx: mpsc::UnboundedSender<TransportSignal>,
    /// Latest connection generation. Socket tasks from older generations
    /// are stale and must not act.
    generation: AtomicU64,
    /// Outbound command sender of the live connection, if any.
    outbound: Mutex<Option<mpsc::UnboundedSender<ClientCommand>>>,
}

impl Shared {
    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn emit(&self, signal: TransportSignal) {
        let _ = self.signal_tx.send(signal);
    }
}

/// Reconnecting WebSocket client for the chat endpoint.
pub struct ChatTransport {
    shared: Arc<Shared>,
}

impl ChatTransport {
    /// Create a transport and the signal stream its owner consumes.
    pub fn new(config: TransportConfig) -> (Self, mpsc::UnboundedReceiver<TransportSignal>) {
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            config,
            signal_tx,
            generation: AtomicU64::new(0),
            outbound: Mutex::new(None),
        });
        (Self { shared }, signal_rx)
    }

    /// Open a connection. A call while already connected is a no-op.
    pub async fn connect(&self) {
        {
            let outbound = self.shared.outbound.lock().await;
            if outbound.is_some() {
                debug!("connect() while already connected; ignoring");
                return;
            }
        }
        let generation = self.shared.next_generation();
        tokio::spawn(run_connection(self.shared.clone(), generation));
    }

    /// Transmit a command. Dropped (not queued) when not connected; the
    /// caller is expected to check `is_connected` before offering
    /// interactive actions.
    pub async fn send(&self, command: ClientCommand) {
        let outbound = self.shared.outbound.lock().await;
        match outbound.as_ref() {
            Some(tx) => {
                if tx.send(command).is_err() {
                    warn!("connection closing; command dropped");
                }
            }
            None => debug!("not connected; command dropped"),
        }
    }

    /// Close the connection and cancel any scheduled reconnect. Safe to
    /// call multiple times.
    pub async fn disconnect(&self) {
        // Bumping the generation marks any live socket task stale;
        // dropping its command sender wakes it so it closes promptly.
        self.shared.next_generation();
        let had_connection = {
            let mut outbound = self.shared.outbound.lock().await;
            outbound.take().is_some()
        };
        if had_connection {
            self.shared.emit(TransportSignal::Disconnected {
                reconnecting: false,
            });
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.shared.outbound.lock().await.is_some()
    }
}

/// Drive one WebSocket connection until it closes, then apply the
/// reconnect policy. Stale generations exit silently at every step.
///
/// Boxed because the future is recursive: a closed connection schedules
/// a reconnect, which spawns `run_connection` again.
fn run_connection(shared: Arc<Shared>, generation: u64) -> BoxFuture<'static, ()> {
    async move {
    let endpoint = shared.config.endpoint();

    let stream = match connect_async(&endpoint).await {
        Ok((stream, _)) => stream,
        Err(err) => {
            if !shared.is_current(generation) {
                return;
            }
            warn!("chat connection to {} failed: {}", endpoint, err);
            shared.emit(TransportSignal::Disconnected { reconnecting: true });
            schedule_reconnect(shared, generation).await;
            return;
        }
    };

    let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel::<ClientCommand>();
    {
        let mut outbound = shared.outbound.lock().await;
        if !shared.is_current(generation) {
            // Superseded while dialing; close without a trace.
            return;
        }
        *outbound = Some(cmd_tx);
    }
    info!("chat connection established");
    shared.emit(TransportSignal::Connected);

    let (mut sink, mut source) = stream.split();
    let mut close_code: Option<u16> = None;

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                Some(cmd) => {
                    let json = match serde_json::to_string(&cmd) {
                        Ok(json) => json,
                        Err(err) => {
                            warn!("failed to serialize command: {}", err);
                            continue;
                        }
                    };
                    if sink.send(WsMessage::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                // disconnect() dropped our sender: close the socket.
                None => {
                    let _ = sink.send(WsMessage::Close(None)).await;
                    break;
                }
            },
            msg = source.next() => match msg {
                Some(Ok(WsMessage::Text(text))) => {
                    if !shared.is_current(generation) {
                        return;
                    }
                    match serde_json::from_str::<ChatEvent>(text.as_ref()) {
                        Ok(event) => shared.emit(TransportSignal::Event(event)),
                        // One corrupt frame must not lose the session.
                        Err(err) => warn!("dropping malformed event frame: {}", err),
                    }
                }
                Some(Ok(WsMessage::Close(frame))) => {
                    close_code = frame.map(|f| u16::from(f.code));
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    warn!("chat connection error: {}", err);
                    break;
                }
                None => break,
            },
        }
    }

    let still_current = {
        let mut outbound = shared.outbound.lock().await;
        if shared.is_current(generation) {
            *outbound = None;
            true
        } else {
            false
        }
    };
    if !still_current {
        return;
    }

    match decide_reconnect(close_code) {
        ReconnectDecision::AuthRequired => {
            info!("server closed with auth-required code; not reconnecting");
            shared.emit(TransportSignal::AuthRequired);
            shared.emit(TransportSignal::Disconnected {
                reconnecting: false,
            });
        }
        ReconnectDecision::Retry => {
            shared.emit(TransportSignal::Disconnected { reconnecting: true });
            schedule_reconnect(shared, generation).await;
        }
    }
    }
    .boxed()
}

/// Wait the fixed backoff, then re-dial under a fresh generation unless
/// this connection was superseded in the meantime.
async fn schedule_reconnect(shared: Arc<Shared>, generation: u64) {
    let delay = shared.config.reconnect_delay;
    debug!("scheduling reconnect in {:?}", delay);
    tokio::time::sleep(delay).await;
    if !shared.is_current(generation) {
        debug!("reconnect cancelled: connection superseded");
        return;
    }
    let next = shared.next_generation();
    tokio::spawn(run_connection(shared, next));
}
