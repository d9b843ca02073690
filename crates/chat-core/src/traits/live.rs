//! Live channel port - the push half of the synchronization sources

use crate::value_objects::ScopeKey;

/// Subscription control over the live event connection.
///
/// Calls never block; the transport remembers the subscription set and
/// replays it after every reconnect.
pub trait LiveChannel: Send + Sync {
    /// Start receiving events for a scope
    fn subscribe(&self, scope: &ScopeKey);

    /// Stop receiving events for a scope
    fn unsubscribe(&self, scope: &ScopeKey);

    /// Announce that the local user is typing; `false` if not connected
    fn send_typing(&self, scope: &ScopeKey) -> bool;
}
