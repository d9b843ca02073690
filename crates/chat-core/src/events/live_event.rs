//! Live events - decoded payloads of server dispatches
//!
//! The server pushes these over the live connection, unordered and possibly
//! duplicated. They carry enough routing information (channel and thread)
//! for the subscription layer to decide relevance without looking anything up.

use serde::{Deserialize, Serialize};

use crate::entities::Message;
use crate::value_objects::{ChannelId, MessageId, ScopeKey, UserId};

/// All live events the synchronization engine consumes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "t", content = "d", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LiveEvent {
    // =========================================================================
    // Message Events
    // =========================================================================
    MessageCreated(Message),
    MessageUpdated(Message),
    MessageDeleted(MessageDeletedEvent),

    // =========================================================================
    // Reaction Events
    // =========================================================================
    ReactionChanged(ReactionChangedEvent),

    // =========================================================================
    // Typing Events
    // =========================================================================
    TypingStarted(TypingEvent),
    TypingStopped(TypingEvent),
}

impl LiveEvent {
    /// Dispatch names this enum decodes
    pub const EVENT_TYPES: [&'static str; 6] = [
        "MESSAGE_CREATED",
        "MESSAGE_UPDATED",
        "MESSAGE_DELETED",
        "REACTION_CHANGED",
        "TYPING_STARTED",
        "TYPING_STOPPED",
    ];

    /// Get the event type name
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::MessageCreated(_) => "MESSAGE_CREATED",
            Self::MessageUpdated(_) => "MESSAGE_UPDATED",
            Self::MessageDeleted(_) => "MESSAGE_DELETED",
            Self::ReactionChanged(_) => "REACTION_CHANGED",
            Self::TypingStarted(_) => "TYPING_STARTED",
            Self::TypingStopped(_) => "TYPING_STOPPED",
        }
    }

    /// Channel the event happened in
    pub fn channel_id(&self) -> &ChannelId {
        match self {
            Self::MessageCreated(m) | Self::MessageUpdated(m) => &m.channel_id,
            Self::MessageDeleted(e) => &e.channel_id,
            Self::ReactionChanged(e) => &e.channel_id,
            Self::TypingStarted(e) | Self::TypingStopped(e) => &e.channel_id,
        }
    }

    /// Scopes this event is relevant to.
    ///
    /// Thread events are also relevant to the parent channel. A deleted
    /// message is also relevant to the thread rooted at it.
    pub fn scopes(&self) -> Vec<ScopeKey> {
        let (channel_id, thread_id) = match self {
            Self::MessageCreated(m) | Self::MessageUpdated(m) => {
                (&m.channel_id, m.thread_id.as_ref())
            }
            Self::MessageDeleted(e) => (&e.channel_id, e.thread_id.as_ref()),
            Self::ReactionChanged(e) => (&e.channel_id, e.thread_id.as_ref()),
            Self::TypingStarted(e) | Self::TypingStopped(e) => {
                (&e.channel_id, e.thread_id.as_ref())
            }
        };

        let mut scopes = vec![ScopeKey::Channel(channel_id.clone())];
        if let Some(root) = thread_id {
            scopes.push(ScopeKey::Thread(root.clone()));
        }
        if let Self::MessageDeleted(e) = self {
            if e.thread_id.is_none() {
                scopes.push(ScopeKey::Thread(e.message_id.clone()));
            }
        }
        scopes
    }

    /// Decode a dispatch by event type name.
    ///
    /// Returns `Ok(None)` for event types this enum does not model.
    pub fn from_dispatch(
        event_type: &str,
        data: serde_json::Value,
    ) -> Result<Option<Self>, serde_json::Error> {
        if !Self::EVENT_TYPES.contains(&event_type) {
            return Ok(None);
        }
        let tagged = serde_json::json!({ "t": event_type, "d": data });
        serde_json::from_value(tagged).map(Some)
    }
}

/// Payload of `MESSAGE_DELETED`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageDeletedEvent {
    pub message_id: MessageId,
    pub channel_id: ChannelId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<MessageId>,
}

/// Payload of `REACTION_CHANGED`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionChangedEvent {
    pub message_id: MessageId,
    pub channel_id: ChannelId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<MessageId>,
    pub user_id: UserId,
    pub emoji: String,
    /// `true` when the user now reacts with `emoji`, `false` when they stopped
    pub added: bool,
}

/// Payload of `TYPING_STARTED` and `TYPING_STOPPED`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypingEvent {
    pub channel_id: ChannelId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<MessageId>,
    pub user_id: UserId,
}
