//! Ephemeral typing indicators
//!
//! Nothing here is persisted or fetched. Entries disappear when they expire,
//! when a stop event arrives, or when the user's message lands.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use chat_core::{ScopeKey, UserId};

/// Who is typing where, with per-user expiry
#[derive(Debug)]
pub struct TypingTracker {
    own_user: UserId,
    ttl: Duration,
    scopes: HashMap<ScopeKey, HashMap<UserId, Instant>>,
    last_sent: HashMap<ScopeKey, Instant>,
}

impl TypingTracker {
    pub fn new(own_user: UserId, ttl: Duration) -> Self {
        Self {
            own_user,
            ttl,
            scopes: HashMap::new(),
            last_sent: HashMap::new(),
        }
    }

    /// A typing-started event; returns `true` if the visible set changed
    pub fn started(&mut self, scope: &ScopeKey, user_id: &UserId, now: Instant) -> bool {
        if user_id == &self.own_user {
            return false;
        }
        self.scopes
            .entry(scope.clone())
            .or_default()
            .insert(user_id.clone(), now + self.ttl)
            .is_none()
    }

    /// A typing-stopped event or a message from the user
    pub fn stopped(&mut self, scope: &ScopeKey, user_id: &UserId) -> bool {
        let Some(users) = self.scopes.get_mut(scope) else {
            return false;
        };
        let removed = users.remove(user_id).is_some();
        if users.is_empty() {
            self.scopes.remove(scope);
        }
        removed
    }

    /// Prune expired entries; returns the scopes whose set changed
    pub fn expire(&mut self, now: Instant) -> Vec<ScopeKey> {
        let mut changed = Vec::new();
        self.scopes.retain(|scope, users| {
            let before = users.len();
            users.retain(|_, expires_at| *expires_at > now);
            if users.len() != before {
                changed.push(scope.clone());
            }
            !users.is_empty()
        });
        changed
    }

    /// Users currently typing in a scope, sorted by id
    pub fn typing_users(&self, scope: &ScopeKey) -> Vec<UserId> {
        let mut users: Vec<UserId> = self
            .scopes
            .get(scope)
            .map(|users| users.keys().cloned().collect())
            .unwrap_or_default();
        users.sort();
        users
    }

    /// Earliest pending expiry
    pub fn next_expiry(&self) -> Option<Instant> {
        self.scopes.values().flat_map(|users| users.values()).min().copied()
    }

    /// Forget a scope entirely
    pub fn clear(&mut self, scope: &ScopeKey) -> bool {
        self.last_sent.remove(scope);
        self.scopes.remove(scope).is_some()
    }

    /// Outbound throttle: at most one typing notice per half TTL per scope
    pub fn should_send(&mut self, scope: &ScopeKey, now: Instant) -> bool {
        let interval = self.ttl / 2;
        match self.last_sent.get(scope) {
            Some(last) if now.saturating_duration_since(*last) < interval => false,
            _ => {
                self.last_sent.insert(scope.clone(), now);
                true
            }
        }
    }

    /// Reset the throttle after the local user sent a message
    pub fn reset_outbound(&mut self, scope: &ScopeKey) {
        self.last_sent.remove(scope);
    }
}
