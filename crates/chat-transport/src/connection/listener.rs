//! Connection listeners
//!
//! Listeners are held weakly; dropping the [`ListenerHandle`] returned at
//! registration unregisters the listener.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use serde_json::Value;

/// Receives connection lifecycle notifications and dispatches
pub trait ConnectionListener: Send + Sync {
    /// Runs on every transition into Connected, reconnects included
    fn on_connected(&self) {}

    /// Runs when an established connection is lost or closed
    fn on_disconnected(&self) {}

    /// Runs for every Dispatch frame after the handshake
    fn on_dispatch(&self, _event_type: &str, _data: &Value) {}
}

#[derive(Default)]
pub(crate) struct ListenerRegistry {
    next_id: AtomicU64,
    listeners: RwLock<Vec<(u64, Weak<dyn ConnectionListener>)>>,
}

impl ListenerRegistry {
    pub(crate) fn add(self: &Arc<Self>, listener: Weak<dyn ConnectionListener>) -> ListenerHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.write().push((id, listener));
        ListenerHandle {
            id,
            registry: Arc::downgrade(self),
        }
    }

    fn remove(&self, id: u64) {
        self.listeners.write().retain(|(lid, _)| *lid != id);
    }

    pub(crate) fn len(&self) -> usize {
        self.listeners.read().len()
    }

    // Upgraded outside the lock so callbacks may use the client freely
    pub(crate) fn each(&self, mut f: impl FnMut(&dyn ConnectionListener)) {
        let live: Vec<Arc<dyn ConnectionListener>> = self
            .listeners
            .read()
            .iter()
            .filter_map(|(_, weak)| weak.upgrade())
            .collect();
        for listener in live {
            f(listener.as_ref());
        }
    }
}

/// Registration of a listener; unregisters on drop
#[must_use = "dropping the handle unregisters the listener"]
pub struct ListenerHandle {
    id: u64,
    registry: Weak<ListenerRegistry>,
}

impl ListenerHandle {
    /// Unregister now
    pub fn remove(self) {}
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.id);
        }
    }
}

impl std::fmt::Debug for ListenerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerHandle").field("id", &self.id).finish()
    }
}
