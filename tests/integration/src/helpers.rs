//! Test helpers for integration tests
//!
//! An in-memory gateway: [`FakeGateway`] plays the connector, and every
//! connection it accepts shows up on the test side as a [`ServerLink`] that
//! scripts the server half of the protocol.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::{broadcast, mpsc};

use chat_core::ScopeKey;
use chat_sync::SyncUpdate;
use chat_transport::protocol::HelloPayload;
use chat_transport::{
    Connector, Frame, GatewayMessage, LiveLink, OpCode, TransportError, TransportResult,
    TransportSignal, READY_EVENT,
};

/// How long a test waits for something that should happen promptly
pub const WAIT: Duration = Duration::from_secs(5);

/// Heartbeat interval long enough to stay out of the way
pub const QUIET_HEARTBEAT_MS: u64 = 600_000;

// ============================================================================
// Fake gateway
// ============================================================================

/// Connector handing each accepted connection to the test
pub struct FakeGateway {
    accepted: mpsc::UnboundedSender<ServerLink>,
    refuse: AtomicU32,
    attempts: AtomicU32,
}

impl FakeGateway {
    /// Create a gateway and the stream of its accepted connections
    pub fn start() -> (Arc<Self>, mpsc::UnboundedReceiver<ServerLink>) {
        let (accepted, rx) = mpsc::unbounded_channel();
        let gateway = Arc::new(Self {
            accepted,
            refuse: AtomicU32::new(0),
            attempts: AtomicU32::new(0),
        });
        (gateway, rx)
    }

    /// Refuse the next `count` connection attempts
    pub fn refuse_next(&self, count: u32) {
        self.refuse.store(count, Ordering::SeqCst);
    }

    /// Refuse every attempt from now on
    pub fn refuse_all(&self) {
        self.refuse.store(u32::MAX, Ordering::SeqCst);
    }

    /// Connection attempts so far, refused ones included
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for FakeGateway {
    async fn connect(&self, _url: &str) -> TransportResult<Box<dyn LiveLink>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let refused = self
            .refuse
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(TransportError::Connect("connection refused".to_string()));
        }

        let (client_tx, server_rx) = mpsc::unbounded_channel();
        let (server_tx, client_rx) = mpsc::unbounded_channel();
        self.accepted
            .send(ServerLink {
                frames: server_rx,
                outbound: server_tx,
            })
            .map_err(|_| TransportError::Connect("gateway gone".to_string()))?;

        Ok(Box::new(FakeLink {
            outgoing: client_tx,
            incoming: client_rx,
        }))
    }
}

struct FakeLink {
    outgoing: mpsc::UnboundedSender<String>,
    incoming: mpsc::UnboundedReceiver<Frame>,
}

#[async_trait]
impl LiveLink for FakeLink {
    async fn send(&mut self, text: String) -> TransportResult<()> {
        self.outgoing
            .send(text)
            .map_err(|_| TransportError::Link("server gone".to_string()))
    }

    async fn next_frame(&mut self) -> TransportResult<Frame> {
        Ok(self.incoming.recv().await.unwrap_or(Frame::Close {
            code: None,
            reason: "server gone".to_string(),
        }))
    }

    async fn close(&mut self) {
        self.incoming.close();
    }
}

/// Server half of one connection
pub struct ServerLink {
    frames: mpsc::UnboundedReceiver<String>,
    outbound: mpsc::UnboundedSender<Frame>,
}

impl ServerLink {
    /// Send a frame to the client
    pub fn send(&self, message: &GatewayMessage) {
        let text = message.to_json().unwrap_or_default();
        let _ = self.outbound.send(Frame::Text(text));
    }

    /// Next frame from the client, `None` once the client hung up
    pub async fn recv(&mut self) -> Option<GatewayMessage> {
        let text = self.frames.recv().await?;
        GatewayMessage::from_json(&text).ok()
    }

    /// Next frame that is not a heartbeat; heartbeats are acknowledged
    pub async fn recv_skipping_heartbeats(&mut self) -> Option<GatewayMessage> {
        loop {
            let message = self.recv().await?;
            if message.op == OpCode::Heartbeat {
                self.send(&GatewayMessage::heartbeat_ack());
                continue;
            }
            return Some(message);
        }
    }

    /// Run the server side of the handshake for `user_id`
    pub async fn accept(&mut self, user_id: &str, heartbeat_ms: u64) {
        self.send(&GatewayMessage::hello(HelloPayload::with_interval(heartbeat_ms)));
        let identify = self.recv().await.and_then(|m| m.as_identify());
        assert!(identify.is_some(), "client did not identify");
        self.send(&GatewayMessage::dispatch(READY_EVENT, 1, json!({ "user_id": user_id })));
    }

    /// Reject the credential during the handshake
    pub async fn reject(&mut self) {
        self.send(&GatewayMessage::hello(HelloPayload::with_interval(QUIET_HEARTBEAT_MS)));
        let _ = self.recv().await;
        self.send(&GatewayMessage::invalid_session());
    }

    /// Deliver an event
    pub fn dispatch(&self, event_type: &str, sequence: u64, data: Value) {
        self.send(&GatewayMessage::dispatch(event_type, sequence, data));
    }

    /// Close with a close code
    pub fn close(&self, code: u16) {
        let _ = self.outbound.send(Frame::Close {
            code: Some(code),
            reason: "closed by test".to_string(),
        });
    }

    /// Scopes joined by the next `count` non-heartbeat frames, sorted
    pub async fn joined(&mut self, count: usize) -> Vec<ScopeKey> {
        let mut scopes = Vec::with_capacity(count);
        while scopes.len() < count {
            let message = self
                .recv_skipping_heartbeats()
                .await
                .unwrap_or_else(|| panic!("link closed after {} joins", scopes.len()));
            if message.op == OpCode::JoinScope {
                scopes.extend(message.as_scope());
            }
        }
        scopes.sort();
        scopes
    }
}

// ============================================================================
// Waiting
// ============================================================================

/// Accept the next connection, failing the test after [`WAIT`]
pub async fn next_link(links: &mut mpsc::UnboundedReceiver<ServerLink>) -> ServerLink {
    tokio::time::timeout(WAIT, links.recv())
        .await
        .ok()
        .flatten()
        .unwrap_or_else(|| panic!("no connection within {WAIT:?}"))
}

/// First signal matching `pred`
pub async fn wait_signal<F>(signals: &mut broadcast::Receiver<TransportSignal>, mut pred: F) -> TransportSignal
where
    F: FnMut(&TransportSignal) -> bool,
{
    let found = tokio::time::timeout(WAIT, async {
        loop {
            match signals.recv().await {
                Ok(signal) if pred(&signal) => return Some(signal),
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    })
    .await;
    found
        .ok()
        .flatten()
        .unwrap_or_else(|| panic!("expected signal not seen within {WAIT:?}"))
}

/// First update matching `pred`
pub async fn wait_update<F>(updates: &mut broadcast::Receiver<SyncUpdate>, mut pred: F) -> SyncUpdate
where
    F: FnMut(&SyncUpdate) -> bool,
{
    let found = tokio::time::timeout(WAIT, async {
        loop {
            match updates.recv().await {
                Ok(update) if pred(&update) => return Some(update),
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    })
    .await;
    found
        .ok()
        .flatten()
        .unwrap_or_else(|| panic!("expected update not seen within {WAIT:?}"))
}

/// Message ids of a scope update, if `update` is one for `scope` that finished loading
pub fn loaded_ids(update: &SyncUpdate, scope: &ScopeKey) -> Option<Vec<String>> {
    match update {
        SyncUpdate::Scope(snapshot) if &snapshot.scope == scope && !snapshot.loading => {
            Some(snapshot.messages.iter().map(|m| m.id.to_string()).collect())
        }
        _ => None,
    }
}
