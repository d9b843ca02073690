//! Message API port - the request/response half of the synchronization sources
//!
//! The engine only needs a handful of calls; the HTTP implementation lives in
//! `chat-transport`, tests use an in-memory implementation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::entities::{Attachment, Message};
use crate::error::DomainError;
use crate::value_objects::{ChannelId, MessageId, ScopeKey, UserId};

/// Result type for message API calls
pub type ApiResult<T> = Result<T, DomainError>;

/// One page of historical messages, newest page first on the server side
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePage {
    pub messages: Vec<Message>,
    /// Server hint; the engine derives has-more from the page length
    #[serde(default)]
    pub has_more: bool,
}

impl MessagePage {
    /// Create a page
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            has_more: false,
        }
    }

    /// Number of messages in the page
    #[inline]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Check if the page is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Body of a send request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendMessagePayload {
    pub channel_id: ChannelId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<MessageId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<MessageId>,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mentions: Vec<UserId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    /// Correlation id the server echoes on the created message
    pub nonce: String,
}

#[async_trait]
pub trait MessageApi: Send + Sync {
    /// Fetch up to `limit` messages of a scope older than `before` (newest when `None`)
    async fn list_messages(
        &self,
        scope: &ScopeKey,
        before: Option<&MessageId>,
        limit: usize,
    ) -> ApiResult<MessagePage>;

    /// Create a message, returning the server's copy
    async fn send_message(&self, payload: &SendMessagePayload) -> ApiResult<Message>;

    /// Replace a message body, returning the server's copy
    async fn edit_message(&self, id: &MessageId, content: &str) -> ApiResult<Message>;

    /// Delete a message
    async fn delete_message(&self, id: &MessageId) -> ApiResult<()>;

    /// Add the caller's reaction
    async fn add_reaction(&self, id: &MessageId, emoji: &str) -> ApiResult<()>;

    /// Remove the caller's reaction
    async fn remove_reaction(&self, id: &MessageId, emoji: &str) -> ApiResult<()>;
}
