//! Transport client
//!
//! Owns the single live connection of a session. A background task runs the
//! handshake, heartbeats and inbound dispatch, and reconnects with backoff
//! when the link drops.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior};

use chat_common::{AppError, AppResult, ReconnectConfig};
use chat_core::{AuthProvider, Credential, UserId};

use super::backoff::Backoff;
use super::connector::{Connector, Frame, LiveLink};
use super::listener::{ConnectionListener, ListenerHandle, ListenerRegistry};
use super::state::{ConnectionState, TransportSignal};
use crate::error::TransportError;
use crate::protocol::{
    CloseAction, CloseCode, GatewayMessage, HelloPayload, IdentifyPayload, OpCode, ReadyPayload,
};

const SIGNAL_BUFFER: usize = 32;

/// How long the server may take to say Hello and accept Identify
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(15);

/// Handle to the live connection; cheap to clone
#[derive(Clone)]
pub struct TransportClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    url: String,
    connector: Arc<dyn Connector>,
    auth: Arc<dyn AuthProvider>,
    reconnect: ReconnectConfig,
    state: RwLock<ConnectionState>,
    /// Identity reported by the last READY
    user_id: RwLock<Option<UserId>>,
    /// Bumped on every connect; a task only touches shared state while it is current
    generation: AtomicU64,
    outbound: Mutex<Option<mpsc::UnboundedSender<GatewayMessage>>>,
    stop: Mutex<Option<oneshot::Sender<()>>>,
    listeners: Arc<ListenerRegistry>,
    signals: broadcast::Sender<TransportSignal>,
}

// How one connection attempt ended
enum SessionEnd {
    Stopped,
    AuthRejected,
    Lost(TransportError),
}

impl TransportClient {
    pub fn new(
        url: impl Into<String>,
        connector: Arc<dyn Connector>,
        auth: Arc<dyn AuthProvider>,
        reconnect: ReconnectConfig,
    ) -> Self {
        let (signals, _) = broadcast::channel(SIGNAL_BUFFER);
        Self {
            inner: Arc::new(ClientInner {
                url: url.into(),
                connector,
                auth,
                reconnect,
                state: RwLock::new(ConnectionState::Disconnected),
                user_id: RwLock::new(None),
                generation: AtomicU64::new(0),
                outbound: Mutex::new(None),
                stop: Mutex::new(None),
                listeners: Arc::new(ListenerRegistry::default()),
                signals,
            }),
        }
    }

    /// Current state
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.read()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// User the server identified us as, once a handshake completed
    pub fn user_id(&self) -> Option<UserId> {
        self.inner.user_id.read().clone()
    }

    /// Lifecycle signals from now on
    pub fn signals(&self) -> broadcast::Receiver<TransportSignal> {
        self.inner.signals.subscribe()
    }

    /// Register a listener; it stays registered while the handle lives
    pub fn add_listener<L>(&self, listener: &Arc<L>) -> ListenerHandle
    where
        L: ConnectionListener + 'static,
    {
        let weak: Weak<dyn ConnectionListener> = Arc::downgrade(listener) as Weak<L>;
        self.inner.listeners.add(weak)
    }

    /// Open the connection in the background.
    ///
    /// A no-op while connecting, connected or reconnecting. Fails only when
    /// no credential is available.
    pub fn connect(&self) -> AppResult<()> {
        let mut state = self.inner.state.write();
        if state.is_active() {
            return Ok(());
        }
        if self.inner.auth.credential().is_none() {
            *state = ConnectionState::Unauthenticated;
            return Err(AppError::Unauthenticated);
        }
        *state = ConnectionState::Connecting;

        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = oneshot::channel();
        *self.inner.outbound.lock() = Some(outbound_tx);
        *self.inner.stop.lock() = Some(stop_tx);
        drop(state);

        tracing::info!(url = %self.inner.url, generation, "Connecting");
        tokio::spawn(Arc::clone(&self.inner).run(generation, outbound_rx, stop_rx));
        Ok(())
    }

    /// Close the connection and cancel any pending reconnect
    pub fn disconnect(&self) {
        {
            let mut state = self.inner.state.write();
            if matches!(
                *state,
                ConnectionState::Disconnected | ConnectionState::Unauthenticated
            ) {
                return;
            }
            *state = ConnectionState::Disconnecting;
        }
        self.inner.outbound.lock().take();
        if let Some(stop) = self.inner.stop.lock().take() {
            let _ = stop.send(());
        }
        tracing::info!("Disconnecting");
    }

    /// Queue a frame; `false` (and nothing sent) unless connected
    pub fn send(&self, message: GatewayMessage) -> bool {
        if !self.is_connected() {
            tracing::warn!(op = %message.op, state = %self.state(), "Dropping frame, not connected");
            return false;
        }
        match self.inner.outbound.lock().as_ref() {
            Some(tx) => tx.send(message).is_ok(),
            None => false,
        }
    }
}

impl std::fmt::Debug for TransportClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportClient")
            .field("url", &self.inner.url)
            .field("state", &self.state())
            .field("listeners", &self.inner.listeners.len())
            .finish()
    }
}

impl ClientInner {
    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    fn transition(&self, generation: u64, next: ConnectionState) -> bool {
        let mut state = self.state.write();
        if !self.is_current(generation) {
            return false;
        }
        // Only the final transition may leave Disconnecting
        if *state == ConnectionState::Disconnecting && next != ConnectionState::Disconnected {
            return false;
        }
        *state = next;
        true
    }

    fn signal(&self, signal: TransportSignal) {
        let _ = self.signals.send(signal);
    }

    async fn run(
        self: Arc<Self>,
        generation: u64,
        mut outbound: mpsc::UnboundedReceiver<GatewayMessage>,
        mut stop: oneshot::Receiver<()>,
    ) {
        let mut backoff = Backoff::new(&self.reconnect);

        loop {
            let mut connected = false;
            let end = tokio::select! {
                _ = &mut stop => SessionEnd::Stopped,
                end = self.session(generation, &mut outbound, &mut connected) => end,
            };

            if connected {
                backoff.reset();
                self.listeners.each(|l| l.on_disconnected());
                self.signal(TransportSignal::Disconnected);
            }

            match end {
                SessionEnd::Stopped => break,
                SessionEnd::AuthRejected => {
                    tracing::error!("Credential rejected, not reconnecting");
                    self.auth.invalidate();
                    if self.transition(generation, ConnectionState::Unauthenticated) {
                        self.signal(TransportSignal::AuthRejected);
                    }
                    return;
                }
                SessionEnd::Lost(error) => {
                    let Some(delay) = backoff.next_delay() else {
                        tracing::error!(attempts = backoff.attempts(), error = %error, "Reconnect abandoned");
                        if self.transition(generation, ConnectionState::Disconnected) {
                            self.signal(TransportSignal::ReconnectFailed {
                                attempts: backoff.attempts(),
                            });
                        }
                        return;
                    };
                    if !self.transition(generation, ConnectionState::Reconnecting) {
                        break;
                    }
                    let attempt = backoff.attempts();
                    tracing::warn!(attempt, delay_ms = delay.as_millis() as u64, error = %error, "Connection lost, reconnecting");
                    self.signal(TransportSignal::Reconnecting { attempt, delay });

                    tokio::select! {
                        _ = &mut stop => break,
                        () = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        if self.transition(generation, ConnectionState::Disconnected) {
            tracing::info!("Disconnected");
        }
    }

    async fn session(
        &self,
        generation: u64,
        outbound: &mut mpsc::UnboundedReceiver<GatewayMessage>,
        connected: &mut bool,
    ) -> SessionEnd {
        // Frames queued for a previous link are not delivered
        while outbound.try_recv().is_ok() {}

        let Some(credential) = self.auth.credential() else {
            return SessionEnd::AuthRejected;
        };

        let mut link = match self.connector.connect(&self.url).await {
            Ok(link) => link,
            Err(e) => return SessionEnd::Lost(e),
        };

        let (hello, ready) = match tokio::time::timeout(HANDSHAKE_TIMEOUT, handshake(link.as_mut(), &credential)).await {
            Ok(Ok(accepted)) => accepted,
            Ok(Err(end)) => {
                link.close().await;
                return end;
            }
            Err(_) => {
                link.close().await;
                return SessionEnd::Lost(TransportError::Protocol("handshake timed out".to_string()));
            }
        };

        if !self.transition(generation, ConnectionState::Connected) {
            link.close().await;
            return SessionEnd::Stopped;
        }
        *connected = true;
        tracing::info!(heartbeat_ms = hello.heartbeat_interval, user_id = %ready.user_id, "Connected");
        *self.user_id.write() = Some(ready.user_id);
        self.signal(TransportSignal::Connected);
        self.listeners.each(|l| l.on_connected());

        let end = self.pump(link.as_mut(), outbound, &hello).await;
        if !matches!(end, SessionEnd::Lost(TransportError::Closed { .. })) {
            link.close().await;
        }
        end
    }

    // Connected phase: heartbeats, outbound frames, inbound dispatch
    async fn pump(
        &self,
        link: &mut dyn LiveLink,
        outbound: &mut mpsc::UnboundedReceiver<GatewayMessage>,
        hello: &HelloPayload,
    ) -> SessionEnd {
        let period = Duration::from_millis(hello.heartbeat_interval.max(1));
        let mut heartbeat = tokio::time::interval_at(Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut awaiting_ack = false;
        let mut sequence: Option<u64> = None;

        loop {
            tokio::select! {
                _ = heartbeat.tick() => {
                    if awaiting_ack {
                        return SessionEnd::Lost(TransportError::HeartbeatTimeout);
                    }
                    if let Err(e) = send_frame(link, &GatewayMessage::heartbeat(sequence)).await {
                        return SessionEnd::Lost(e);
                    }
                    awaiting_ack = true;
                }

                message = outbound.recv() => {
                    let Some(message) = message else {
                        return SessionEnd::Stopped;
                    };
                    tracing::trace!(op = %message.op, "Sending frame");
                    if let Err(e) = send_frame(link, &message).await {
                        return SessionEnd::Lost(e);
                    }
                }

                frame = link.next_frame() => {
                    let text = match frame {
                        Ok(Frame::Text(text)) => text,
                        Ok(Frame::Close { code, reason }) => return closed(code, reason),
                        Err(e) => return SessionEnd::Lost(e),
                    };
                    let message = match GatewayMessage::from_json(&text) {
                        Ok(message) => message,
                        Err(e) => {
                            tracing::warn!(error = %e, "Ignoring undecodable frame");
                            continue;
                        }
                    };

                    match message.op {
                        OpCode::HeartbeatAck => awaiting_ack = false,
                        OpCode::Heartbeat => {
                            if let Err(e) = send_frame(link, &GatewayMessage::heartbeat(sequence)).await {
                                return SessionEnd::Lost(e);
                            }
                        }
                        OpCode::Dispatch => {
                            if let Some(s) = message.s {
                                sequence = Some(s);
                            }
                            if let Some((event_type, data)) = message.as_dispatch() {
                                self.listeners.each(|l| l.on_dispatch(event_type, data));
                            }
                        }
                        OpCode::Reconnect => {
                            tracing::info!("Server requested reconnect");
                            return SessionEnd::Lost(TransportError::Protocol("reconnect requested".to_string()));
                        }
                        OpCode::InvalidSession => return SessionEnd::AuthRejected,
                        op => tracing::trace!(op = %op, "Ignoring frame"),
                    }
                }
            }
        }
    }
}

// Hello, then Identify, then wait for READY
async fn handshake(
    link: &mut dyn LiveLink,
    credential: &Credential,
) -> Result<(HelloPayload, ReadyPayload), SessionEnd> {
    let hello = loop {
        let message = next_message(link).await?;
        if let Some(hello) = message.as_hello() {
            break hello;
        }
        tracing::trace!(op = %message.op, "Frame before Hello ignored");
    };

    let identify = GatewayMessage::identify(IdentifyPayload::new(credential.token()));
    send_frame(link, &identify).await.map_err(SessionEnd::Lost)?;

    loop {
        let message = next_message(link).await?;
        match message.op {
            OpCode::InvalidSession => return Err(SessionEnd::AuthRejected),
            OpCode::Dispatch if message.is_ready() => {
                let ready = message
                    .d
                    .and_then(|d| serde_json::from_value::<ReadyPayload>(d).ok())
                    .ok_or_else(|| SessionEnd::Lost(TransportError::Protocol("malformed READY".to_string())))?;
                return Ok((hello, ready));
            }
            op => tracing::trace!(op = %op, "Frame before READY ignored"),
        }
    }
}

async fn next_message(link: &mut dyn LiveLink) -> Result<GatewayMessage, SessionEnd> {
    loop {
        match link.next_frame().await {
            Ok(Frame::Text(text)) => match GatewayMessage::from_json(&text) {
                Ok(message) => return Ok(message),
                Err(e) => tracing::warn!(error = %e, "Ignoring undecodable frame"),
            },
            Ok(Frame::Close { code, reason }) => return Err(closed(code, reason)),
            Err(e) => return Err(SessionEnd::Lost(e)),
        }
    }
}

async fn send_frame(link: &mut dyn LiveLink, message: &GatewayMessage) -> Result<(), TransportError> {
    link.send(message.to_json()?).await
}

fn closed(code: Option<u16>, reason: String) -> SessionEnd {
    if CloseCode::action_for(code) == CloseAction::Reauthenticate {
        return SessionEnd::AuthRejected;
    }
    tracing::debug!(code = ?code, reason = %reason, "Link closed by server");
    SessionEnd::Lost(TransportError::Closed { code, reason })
}
