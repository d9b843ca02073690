//! Test fixtures and data generators
//!
//! Message builders, a fixed configuration, and a scripted in-memory
//! implementation of the message API.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use tokio::sync::Notify;

use chat_common::{AppConfig, SyncSettings};
use chat_core::{
    ApiResult, ChannelId, DomainError, LiveEvent, Message, MessageApi, MessageId, MessagePage,
    ReactionChangedEvent, ScopeKey, SendMessagePayload, TypingEvent, UserId,
};

/// Counter for unique test data
static COUNTER: AtomicU64 = AtomicU64::new(1);

/// Get a unique suffix for test data
pub fn unique_suffix() -> u64 {
    COUNTER.fetch_add(1, Ordering::SeqCst)
}

// ============================================================================
// Messages
// ============================================================================

/// Fixed point in time plus `secs`
pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_714_564_800 + secs, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

/// Root message in `channel`, created `secs` after the fixed epoch
pub fn message(id: &str, channel: &str, author: &str, secs: i64) -> Message {
    Message::new(id, channel, author, format!("message {id}")).with_created_at(at(secs))
}

/// Reply in the thread rooted at `root`
pub fn reply(id: &str, channel: &str, root: &str, author: &str, secs: i64) -> Message {
    message(id, channel, author, secs).in_thread(root)
}

/// `count` root messages `m000`, `m001`, ... one second apart
pub fn history(channel: &str, count: usize) -> Vec<Message> {
    (0..count)
        .map(|i| message(&format!("m{i:03}"), channel, "u2", i as i64))
        .collect()
}

/// Ids of a message list, in order
pub fn ids(messages: &[Message]) -> Vec<String> {
    messages.iter().map(|m| m.id.to_string()).collect()
}

pub fn reaction_event(message_id: &str, channel: &str, user: &str, emoji: &str, added: bool) -> LiveEvent {
    LiveEvent::ReactionChanged(ReactionChangedEvent {
        message_id: MessageId::from(message_id),
        channel_id: ChannelId::from(channel),
        thread_id: None,
        user_id: UserId::from(user),
        emoji: emoji.to_string(),
        added,
    })
}

pub fn typing_event(channel: &str, user: &str) -> LiveEvent {
    LiveEvent::TypingStarted(TypingEvent {
        channel_id: ChannelId::from(channel),
        thread_id: None,
        user_id: UserId::from(user),
    })
}

// ============================================================================
// Configuration
// ============================================================================

/// Engine settings used by most tests
pub fn test_settings() -> SyncSettings {
    SyncSettings {
        page_size: 50,
        tombstone_capacity: 64,
        typing_ttl: Duration::from_secs(10),
    }
}

/// Full configuration with short reconnect delays
pub fn test_config() -> AppConfig {
    let vars: HashMap<&str, &str> = [
        ("API_BASE_URL", "http://127.0.0.1:9/api"),
        ("GATEWAY_URL", "ws://127.0.0.1:9/gateway"),
        ("AUTH_TOKEN", "test-token"),
        ("RECONNECT_INITIAL_DELAY_MS", "10"),
        ("RECONNECT_MAX_DELAY_MS", "100"),
        ("RECONNECT_MAX_ATTEMPTS", "3"),
    ]
    .into_iter()
    .collect();
    AppConfig::from_lookup(|key| vars.get(key).map(|v| (*v).to_string()))
        .unwrap_or_else(|e| panic!("test config: {e}"))
}

// ============================================================================
// Scripted message API
// ============================================================================

/// Which API call a scripted failure applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiCall {
    List,
    Send,
    Edit,
    Delete,
    AddReaction,
    RemoveReaction,
}

/// In-memory server history with failure injection and gated fetches
pub struct ScriptedApi {
    author: UserId,
    history: Mutex<HashMap<ScopeKey, Vec<Message>>>,
    failures: Mutex<HashMap<ApiCall, VecDeque<DomainError>>>,
    gates: Mutex<HashMap<ScopeKey, Arc<Notify>>>,
    calls: Mutex<Vec<String>>,
    next_id: AtomicU64,
}

impl ScriptedApi {
    /// Server for a client signed in as `author`
    pub fn new(author: &str) -> Self {
        Self {
            author: UserId::from(author),
            history: Mutex::new(HashMap::new()),
            failures: Mutex::new(HashMap::new()),
            gates: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Seed the server-side history of a scope
    #[must_use]
    pub fn with_history(self, scope: ScopeKey, mut messages: Vec<Message>) -> Self {
        messages.sort_by(Message::chronological_cmp);
        self.history.lock().insert(scope, messages);
        self
    }

    /// Fail the next `call` with `error`
    pub fn fail_next(&self, call: ApiCall, error: DomainError) {
        self.failures.lock().entry(call).or_default().push_back(error);
    }

    /// Hold list requests for `scope` until the returned gate is notified
    pub fn gate(&self, scope: ScopeKey) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.gates.lock().insert(scope, Arc::clone(&gate));
        gate
    }

    /// Add a message to the server history, as if another client sent it
    pub fn push_history(&self, message: Message) {
        let mut history = self.history.lock();
        let messages = history.entry(message.scope()).or_default();
        messages.push(message);
        messages.sort_by(Message::chronological_cmp);
    }

    /// Server copy of a message this client sent, by content
    pub fn sent(&self, content: &str) -> Option<Message> {
        self.history
            .lock()
            .values()
            .flatten()
            .find(|m| m.nonce.is_some() && m.content == content)
            .cloned()
    }

    /// Calls seen so far, e.g. `list channel:c1`
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    /// Number of calls starting with `prefix`
    pub fn count(&self, prefix: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.starts_with(prefix)).count()
    }

    fn record(&self, call: String) {
        self.calls.lock().push(call);
    }

    fn injected(&self, call: ApiCall) -> ApiResult<()> {
        match self.failures.lock().get_mut(&call).and_then(VecDeque::pop_front) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn find_scope(&self, id: &MessageId) -> Option<ScopeKey> {
        self.history
            .lock()
            .iter()
            .find(|(_, messages)| messages.iter().any(|m| &m.id == id))
            .map(|(scope, _)| scope.clone())
    }
}

#[async_trait]
impl MessageApi for ScriptedApi {
    async fn list_messages(
        &self,
        scope: &ScopeKey,
        before: Option<&MessageId>,
        limit: usize,
    ) -> ApiResult<MessagePage> {
        self.record(format!("list {scope}"));
        let gate = self.gates.lock().get(scope).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.injected(ApiCall::List)?;

        let history = self.history.lock();
        let all = history.get(scope).map(Vec::as_slice).unwrap_or_default();
        let end = match before {
            Some(cursor) => all.iter().position(|m| &m.id == cursor).unwrap_or(all.len()),
            None => all.len(),
        };
        let start = end.saturating_sub(limit);
        Ok(MessagePage {
            messages: all[start..end].to_vec(),
            has_more: start > 0,
        })
    }

    async fn send_message(&self, payload: &SendMessagePayload) -> ApiResult<Message> {
        self.record(format!("send {}", payload.content));
        self.injected(ApiCall::Send)?;

        let id = format!("srv-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        let mut message = Message::new(
            id,
            payload.channel_id.clone(),
            self.author.clone(),
            payload.content.clone(),
        )
        .with_nonce(payload.nonce.clone());
        message.thread_id = payload.thread_id.clone();
        message.parent_id = payload.parent_id.clone().or_else(|| payload.thread_id.clone());

        self.history
            .lock()
            .entry(message.scope())
            .or_default()
            .push(message.clone());
        Ok(message)
    }

    async fn edit_message(&self, id: &MessageId, content: &str) -> ApiResult<Message> {
        self.record(format!("edit {id}"));
        self.injected(ApiCall::Edit)?;

        let mut history = self.history.lock();
        let message = history
            .values_mut()
            .flat_map(|messages| messages.iter_mut())
            .find(|m| &m.id == id)
            .ok_or_else(|| DomainError::MessageNotFound(id.clone()))?;
        message.edit(content, Utc::now());
        Ok(message.clone())
    }

    async fn delete_message(&self, id: &MessageId) -> ApiResult<()> {
        self.record(format!("delete {id}"));
        self.injected(ApiCall::Delete)?;

        let scope = self
            .find_scope(id)
            .ok_or_else(|| DomainError::MessageNotFound(id.clone()))?;
        if let Some(messages) = self.history.lock().get_mut(&scope) {
            messages.retain(|m| &m.id != id);
        }
        Ok(())
    }

    async fn add_reaction(&self, id: &MessageId, emoji: &str) -> ApiResult<()> {
        self.record(format!("react+ {id} {emoji}"));
        self.injected(ApiCall::AddReaction)
    }

    async fn remove_reaction(&self, id: &MessageId, emoji: &str) -> ApiResult<()> {
        self.record(format!("react- {id} {emoji}"));
        self.injected(ApiCall::RemoveReaction)
    }
}
