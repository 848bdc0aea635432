//! Realtime session over WebSocket.
//!
//! A [`RealtimeSession`] owns at most one open connection. The connection
//! runs as a single task that owns the socket: outbound commands arrive on an
//! unbounded queue, inbound frames are classified one at a time. Keepalive and
//! negotiation tasks hang off the connection and are torn down with it,
//! whether the close was requested locally or came from the transport.

use std::fmt;
use std::sync::{
    atomic::{AtomicU64, AtomicUsize, Ordering},
    Arc, Mutex, MutexGuard, PoisonError,
};

use futures::{SinkExt, StreamExt};
use tokio::{
    net::TcpStream,
    sync::{broadcast, mpsc, watch},
    task::JoinHandle,
};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        client::IntoClientRequest,
        http::HeaderValue,
        protocol::{frame::coding::CloseCode, CloseFrame},
        Error as WsError, Message,
    },
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, error, info, warn};

use super::{
    events::{self, SessionEvent},
    keepalive::KeepAliveTimer,
    messages::ClientEvent,
    negotiation::{self, SessionConfig},
    relay::AudioRelay,
};
use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};
use crate::util::timeout::with_timeout;

type RealtimeWebSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const EVENT_CAPACITY: usize = 256;
const CLIENT_CLOSE_REASON: &str = "client closed";

/// Lifecycle of a realtime session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Open,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Connecting => write!(f, "connecting"),
            Self::Open => write!(f, "open"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Commands for the connection task.
#[derive(Debug)]
pub(crate) enum Outbound {
    Text(String),
    Ping,
    Close,
}

/// Everything owned by one open connection.
struct Link {
    generation: u64,
    outbound_tx: mpsc::UnboundedSender<Outbound>,
    keepalive: Option<KeepAliveTimer>,
    negotiation: Option<JoinHandle<()>>,
    task: Option<JoinHandle<()>>,
}

impl Link {
    /// Cancel the timers owned by this connection. The keepalive goes first.
    fn stop_timers(&mut self) {
        self.keepalive.take();
        if let Some(negotiation) = self.negotiation.take() {
            negotiation.abort();
        }
    }
}

/// State shared between the session, its relays, and the connection task.
pub(crate) struct SessionShared {
    state_tx: watch::Sender<SessionState>,
    link: Mutex<Option<Link>>,
    events_tx: broadcast::Sender<SessionEvent>,
    live_keepalives: Arc<AtomicUsize>,
    generations: AtomicU64,
}

impl SessionShared {
    fn new() -> Self {
        let (state_tx, _) = watch::channel(SessionState::Idle);
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state_tx,
            link: Mutex::new(None),
            events_tx,
            live_keepalives: Arc::new(AtomicUsize::new(0)),
            generations: AtomicU64::new(0),
        }
    }

    fn lock_link(&self) -> MutexGuard<'_, Option<Link>> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn state(&self) -> SessionState {
        *self.state_tx.borrow()
    }

    pub(crate) fn is_open(&self) -> bool {
        self.state() == SessionState::Open
    }

    fn set_state(&self, state: SessionState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            debug!(from = %previous, to = %state, "Realtime session state changed");
        }
    }

    /// Queue one application message on the open connection.
    pub(crate) fn send(&self, event: &ClientEvent) -> bool {
        let guard = self.lock_link();
        let Some(link) = guard.as_ref().filter(|_| self.is_open()) else {
            debug!(
                event_type = event.event_type(),
                "Realtime send skipped: no open session"
            );
            return false;
        };

        let payload = match serde_json::to_string(event) {
            Ok(payload) => payload,
            Err(error) => {
                warn!(
                    event_type = event.event_type(),
                    error = %error,
                    "Realtime send failed to serialize"
                );
                return false;
            }
        };

        match link.outbound_tx.send(Outbound::Text(payload)) {
            Ok(()) => true,
            Err(_) => {
                warn!(
                    event_type = event.event_type(),
                    "Realtime send failed: connection task is gone"
                );
                false
            }
        }
    }

    /// Install a freshly opened socket as the active connection.
    fn open(
        self: &Arc<Self>,
        socket: RealtimeWebSocket,
        session: SessionConfig,
        config: &BridgeConfig,
    ) {
        let generation = self.generations.fetch_add(1, Ordering::SeqCst) + 1;
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        let mut link = self.lock_link();
        if let Some(mut stale) = link.take() {
            stale.stop_timers();
            if let Some(task) = stale.task.take() {
                task.abort();
            }
        }

        self.set_state(SessionState::Open);
        let keepalive = KeepAliveTimer::start(
            outbound_tx.clone(),
            self.state_tx.subscribe(),
            config.keepalive_interval,
            Arc::clone(&self.live_keepalives),
        );
        let negotiation =
            negotiation::schedule(outbound_tx.clone(), session, config.negotiation_delay);
        let task = tokio::spawn(run_connection(
            socket,
            outbound_rx,
            Arc::clone(self),
            generation,
        ));

        *link = Some(Link {
            generation,
            outbound_tx,
            keepalive: Some(keepalive),
            negotiation: Some(negotiation),
            task: Some(task),
        });
    }

    /// Teardown driven by the transport (remote close or error).
    ///
    /// A no-op when `close()` already claimed this connection.
    fn finish(&self, generation: u64, code: Option<u16>, reason: String) {
        let mut link = self.lock_link();
        if link.as_ref().map(|active| active.generation) != Some(generation) {
            return;
        }
        if let Some(mut finished) = link.take() {
            finished.stop_timers();
            // The task is the caller; detach instead of aborting it.
            drop(finished.task.take());
        }
        self.set_state(SessionState::Closed);
        drop(link);

        info!(code = ?code, reason = %reason, "Realtime session closed by transport");
        let _ = self.events_tx.send(SessionEvent::Closed { code, reason });
    }
}

/// A single realtime speech session.
///
/// One instance per supervisor; instances share nothing with each other.
pub struct RealtimeSession {
    config: BridgeConfig,
    shared: Arc<SessionShared>,
}

impl RealtimeSession {
    /// Create a new realtime session (does not connect yet).
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            config,
            shared: Arc::new(SessionShared::new()),
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    pub fn is_open(&self) -> bool {
        self.shared.is_open()
    }

    /// Watch lifecycle transitions.
    pub fn state_changes(&self) -> watch::Receiver<SessionState> {
        self.shared.state_tx.subscribe()
    }

    /// Receive classified inbound messages and the final close notification.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events_tx.subscribe()
    }

    /// A cloneable handle for forwarding caller audio into this session.
    pub fn relay(&self) -> AudioRelay {
        AudioRelay::new(Arc::clone(&self.shared))
    }

    /// Number of keepalive timers currently alive for this session.
    pub fn live_keepalive_timers(&self) -> usize {
        self.shared.live_keepalives.load(Ordering::SeqCst)
    }

    /// Open the realtime socket. A no-op when a session is already open.
    pub async fn connect(&mut self) -> Result<()> {
        if self.is_open() {
            debug!("Realtime connect skipped: session already open");
            return Ok(());
        }

        self.config.validate()?;
        let api_key = match self.config.resolve_api_key() {
            Ok(api_key) => api_key,
            Err(error) => {
                warn!(error = %error, "Realtime connect skipped");
                return Err(error);
            }
        };
        let url = self.config.realtime_url()?;
        let session = SessionConfig::from_config(&self.config);

        self.shared.set_state(SessionState::Connecting);
        let opened = with_timeout(
            self.config.connect_timeout,
            connect_realtime_socket(&url, &api_key, &self.config.user_agent),
        )
        .await;

        match opened {
            Ok(socket) => {
                info!(model = %self.config.model, "Realtime socket open");
                self.shared.open(socket, session, &self.config);
                Ok(())
            }
            Err(error) => {
                error!(error = %error, "Realtime connect failed");
                self.shared.set_state(SessionState::Closed);
                Err(error)
            }
        }
    }

    /// Queue one application message. Returns `false` when nothing was sent.
    pub fn send(&self, event: &ClientEvent) -> bool {
        self.shared.send(event)
    }

    /// Close the session. Safe to call in any state, any number of times.
    pub async fn close(&mut self) {
        let link = {
            let mut link = self.shared.lock_link();
            let taken = link.take();
            if taken.is_some() || self.state() != SessionState::Idle {
                self.shared.set_state(SessionState::Closed);
            }
            taken
        };
        let Some(mut link) = link else {
            return;
        };

        link.stop_timers();
        // Queued behind any pending audio, so the tail of the stream is flushed first.
        let _ = link.outbound_tx.send(Outbound::Close);
        drop(link.outbound_tx);

        if let Some(mut task) = link.task.take() {
            let joined = with_timeout(self.config.close_timeout, async {
                (&mut task).await.map_err(|error| {
                    BridgeError::Transport(format!("Realtime connection task failed: {error}"))
                })
            })
            .await;
            match joined {
                Ok(()) => {}
                Err(BridgeError::Timeout(ms)) => {
                    warn!(
                        timeout_ms = ms,
                        "Realtime close handshake timed out, aborting connection"
                    );
                    task.abort();
                }
                Err(error) => warn!(error = %error, "Realtime close failed"),
            }
        }

        info!("Realtime session closed");
        let _ = self.shared.events_tx.send(SessionEvent::Closed {
            code: Some(u16::from(CloseCode::Normal)),
            reason: CLIENT_CLOSE_REASON.to_string(),
        });
    }
}

impl Drop for RealtimeSession {
    fn drop(&mut self) {
        if let Some(mut link) = self.shared.lock_link().take() {
            link.stop_timers();
            if let Some(task) = link.task.take() {
                task.abort();
            }
        }
    }
}

async fn run_connection(
    mut socket: RealtimeWebSocket,
    mut outbound_rx: mpsc::UnboundedReceiver<Outbound>,
    shared: Arc<SessionShared>,
    generation: u64,
) {
    let (code, reason) = loop {
        tokio::select! {
            command = outbound_rx.recv() => match command {
                Some(Outbound::Text(text)) => {
                    if let Err(error) = socket.send(Message::Text(text.into())).await {
                        error!(error = %error, "Realtime send failed");
                        break (None, format!("send failed: {error}"));
                    }
                }
                Some(Outbound::Ping) => {
                    if let Err(error) = socket.send(Message::Ping(Default::default())).await {
                        warn!(error = %error, "Realtime keepalive ping failed");
                    }
                }
                Some(Outbound::Close) | None => {
                    close_gracefully(&mut socket).await;
                    break (Some(u16::from(CloseCode::Normal)), CLIENT_CLOSE_REASON.to_string());
                }
            },
            frame = socket.next() => match frame {
                Some(Ok(message)) => {
                    if let Some(closed) = handle_server_message(&mut socket, &shared, message).await {
                        break closed;
                    }
                }
                Some(Err(error)) => {
                    error!(error = %error, "Realtime transport error");
                    break (None, error.to_string());
                }
                None => break (None, "stream ended".to_string()),
            },
        }
    };

    shared.finish(generation, code, reason);
}

/// Returns the close code and reason once the peer has closed.
async fn handle_server_message(
    socket: &mut RealtimeWebSocket,
    shared: &SessionShared,
    message: Message,
) -> Option<(Option<u16>, String)> {
    match message {
        Message::Text(text) => forward_inbound(shared, text.as_ref()),
        Message::Binary(bytes) => match std::str::from_utf8(&bytes) {
            Ok(text) => forward_inbound(shared, text),
            Err(_) => warn!(bytes = bytes.len(), "Dropping non-UTF-8 realtime frame"),
        },
        Message::Ping(payload) => {
            if let Err(error) = socket.send(Message::Pong(payload)).await {
                warn!(error = %error, "Realtime pong failed");
            }
        }
        Message::Pong(_) => debug!("Realtime keepalive acknowledged"),
        Message::Close(frame) => {
            // Flush the automatic close reply before dropping the socket.
            let _ = socket.flush().await;
            return Some(match frame {
                Some(frame) => (Some(u16::from(frame.code)), frame.reason.to_string()),
                None => (None, String::new()),
            });
        }
        Message::Frame(_) => {}
    }
    None
}

fn forward_inbound(shared: &SessionShared, text: &str) {
    if let Some(message) = events::classify(text) {
        let _ = shared.events_tx.send(SessionEvent::Inbound(message));
    }
}

async fn close_gracefully(socket: &mut RealtimeWebSocket) {
    let frame = CloseFrame {
        code: CloseCode::Normal,
        reason: CLIENT_CLOSE_REASON.into(),
    };
    if let Err(error) = socket.send(Message::Close(Some(frame))).await {
        debug!(error = %error, "Realtime close frame not delivered");
        return;
    }
    // Wait for the peer's close reply; `close()` bounds how long this may take.
    while let Some(Ok(message)) = socket.next().await {
        if matches!(message, Message::Close(_)) {
            break;
        }
    }
}

async fn connect_realtime_socket(
    url: &str,
    api_key: &str,
    user_agent: &str,
) -> Result<RealtimeWebSocket> {
    let mut request = url.into_client_request().map_err(|error| {
        BridgeError::Configuration(format!("Invalid realtime websocket URL: {error}"))
    })?;
    let auth_value = HeaderValue::from_str(&format!("Bearer {api_key}")).map_err(|error| {
        BridgeError::Configuration(format!("Invalid realtime auth header: {error}"))
    })?;
    let agent_value = HeaderValue::from_str(user_agent).map_err(|error| {
        BridgeError::Configuration(format!("Invalid realtime user agent: {error}"))
    })?;
    request.headers_mut().insert("Authorization", auth_value);
    request.headers_mut().insert("User-Agent", agent_value);

    connect_async(request)
        .await
        .map(|(socket, _)| socket)
        .map_err(map_connect_error)
}

fn map_connect_error(error: WsError) -> BridgeError {
    match error {
        WsError::Http(response) => {
            let status = response.status().as_u16();
            if matches!(status, 401 | 403) {
                BridgeError::Authentication(format!(
                    "Realtime websocket authentication failed with status {status}"
                ))
            } else {
                BridgeError::TransportOpen(format!(
                    "Realtime websocket handshake failed with status {status}"
                ))
            }
        }
        WsError::Io(error) => BridgeError::Io(error),
        WsError::Url(error) => {
            BridgeError::Configuration(format!("Invalid realtime websocket URL: {error}"))
        }
        other => BridgeError::TransportOpen(format!("Realtime websocket connect failed: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn new_session_is_idle_without_timers() {
        let session = RealtimeSession::new(BridgeConfig::default());
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(session.live_keepalive_timers(), 0);
        assert!(!session.send(&ClientEvent::InputAudioBufferCommit));
    }

    #[tokio::test]
    async fn zero_keepalive_interval_is_rejected_before_connecting() {
        let mut session = RealtimeSession::new(BridgeConfig {
            api_key: Some("test-key".into()),
            keepalive_interval: Duration::ZERO,
            ..BridgeConfig::default()
        });
        assert_eq!(session.config().keepalive_interval, Duration::ZERO);

        let error = session.connect().await.expect_err("connect should fail");
        assert!(matches!(error, BridgeError::Configuration(_)));
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(session.live_keepalive_timers(), 0);
    }

    #[tokio::test]
    async fn close_before_connect_stays_idle() {
        let mut session = RealtimeSession::new(BridgeConfig::default());
        session.close().await;
        session.close().await;
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(session.live_keepalive_timers(), 0);
    }

    #[tokio::test]
    async fn unreachable_endpoint_leaves_session_closed() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("listener should bind");
        let address = listener.local_addr().expect("local addr should be available");
        drop(listener);

        let mut session = RealtimeSession::new(BridgeConfig {
            api_key: Some("test-key".into()),
            base_url: format!("ws://{address}/v1/realtime"),
            ..BridgeConfig::default()
        });
        let error = session.connect().await.expect_err("connect should fail");
        assert!(matches!(error, BridgeError::Io(_) | BridgeError::TransportOpen(_)));
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(session.live_keepalive_timers(), 0);
    }

    #[test]
    fn handshake_status_maps_to_error_kind() {
        let response = |status: u16| {
            tokio_tungstenite::tungstenite::http::Response::builder()
                .status(status)
                .body(None)
                .expect("response should build")
        };
        assert!(matches!(
            map_connect_error(WsError::Http(response(401))),
            BridgeError::Authentication(_)
        ));
        assert!(matches!(
            map_connect_error(WsError::Http(response(403))),
            BridgeError::Authentication(_)
        ));
        assert!(matches!(
            map_connect_error(WsError::Http(response(502))),
            BridgeError::TransportOpen(_)
        ));
    }
}
