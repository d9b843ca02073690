//! Scope subscriptions over the live connection
//!
//! Keeps the set of scopes the session is interested in, sends joins and
//! leaves, replays every join after a (re)connect, and forwards only the
//! dispatches that concern a subscribed scope.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::sync::mpsc;

use chat_core::{LiveChannel, LiveEvent, ScopeKey};

use crate::connection::{ConnectionListener, ListenerHandle, TransportClient};
use crate::protocol::{GatewayMessage, READY_EVENT};

/// Subscription set plus relevance filter for inbound events
pub struct SubscriptionManager {
    client: TransportClient,
    active: RwLock<HashSet<ScopeKey>>,
    events: mpsc::UnboundedSender<LiveEvent>,
    registration: Mutex<Option<ListenerHandle>>,
}

impl SubscriptionManager {
    /// Create a manager and register it with the client.
    ///
    /// Decoded events for subscribed scopes are sent to `events`.
    pub fn new(client: TransportClient, events: mpsc::UnboundedSender<LiveEvent>) -> Arc<Self> {
        let manager = Arc::new(Self {
            client: client.clone(),
            active: RwLock::new(HashSet::new()),
            events,
            registration: Mutex::new(None),
        });
        let handle = client.add_listener(&manager);
        *manager.registration.lock() = Some(handle);
        manager
    }

    /// Subscribed scopes, sorted
    pub fn active_scopes(&self) -> Vec<ScopeKey> {
        let mut scopes: Vec<ScopeKey> = self.active.read().iter().cloned().collect();
        scopes.sort();
        scopes
    }

    pub fn is_subscribed(&self, scope: &ScopeKey) -> bool {
        self.active.read().contains(scope)
    }

    /// Stop receiving connection notifications
    pub fn detach(&self) {
        self.registration.lock().take();
    }

    fn deliver(&self, event_type: &str, data: &Value) {
        let event = match LiveEvent::from_dispatch(event_type, data.clone()) {
            Ok(Some(event)) => event,
            Ok(None) => {
                tracing::trace!(event_type, "Ignoring unknown event type");
                return;
            }
            Err(e) => {
                tracing::warn!(event_type, error = %e, "Failed to decode event");
                return;
            }
        };

        let relevant = {
            let active = self.active.read();
            event.scopes().iter().any(|scope| active.contains(scope))
        };
        if !relevant {
            tracing::trace!(event_type, channel_id = %event.channel_id(), "Dropping event for unsubscribed scope");
            return;
        }

        if self.events.send(event).is_err() {
            tracing::debug!(event_type, "Event receiver gone");
        }
    }
}

impl LiveChannel for SubscriptionManager {
    fn subscribe(&self, scope: &ScopeKey) {
        if !self.active.write().insert(scope.clone()) {
            return;
        }
        tracing::debug!(scope = %scope, "Subscribed");
        if self.client.is_connected() {
            self.client.send(GatewayMessage::join_scope(scope));
        }
    }

    fn unsubscribe(&self, scope: &ScopeKey) {
        if !self.active.write().remove(scope) {
            return;
        }
        tracing::debug!(scope = %scope, "Unsubscribed");
        if self.client.is_connected() {
            self.client.send(GatewayMessage::leave_scope(scope));
        }
    }

    fn send_typing(&self, scope: &ScopeKey) -> bool {
        self.client.is_connected() && self.client.send(GatewayMessage::typing(scope))
    }
}

impl ConnectionListener for SubscriptionManager {
    fn on_connected(&self) {
        let scopes = self.active_scopes();
        tracing::debug!(count = scopes.len(), "Replaying scope joins");
        for scope in &scopes {
            self.client.send(GatewayMessage::join_scope(scope));
        }
    }

    fn on_disconnected(&self) {
        tracing::debug!(count = self.active.read().len(), "Keeping subscriptions for replay");
    }

    fn on_dispatch(&self, event_type: &str, data: &Value) {
        if event_type == READY_EVENT {
            return;
        }
        self.deliver(event_type, data);
    }
}

impl std::fmt::Debug for SubscriptionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionManager")
            .field("active", &self.active.read().len())
            .finish()
    }
}
