//! Message entity - represents a chat message in a channel or thread

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::reaction::Reaction;
use crate::error::DomainError;
use crate::value_objects::{ChannelId, MessageId, ScopeKey, UserId};

/// Maximum message body length in characters
pub const MAX_CONTENT_LENGTH: usize = 2000;
/// Maximum number of distinct mention targets per message
pub const MAX_MENTIONS: usize = 100;

/// Message entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub channel_id: ChannelId,
    /// Root message of the thread this message replies in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<MessageId>,
    /// Message this one directly replies to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<MessageId>,
    pub author_id: UserId,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mentions: Vec<UserId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reactions: Vec<Reaction>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub edited: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edited_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    /// Client correlation id, echoed back by the server for messages this client sent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
}

impl Message {
    /// Create a new root message
    pub fn new(
        id: impl Into<MessageId>,
        channel_id: impl Into<ChannelId>,
        author_id: impl Into<UserId>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            channel_id: channel_id.into(),
            thread_id: None,
            parent_id: None,
            author_id: author_id.into(),
            content: content.into(),
            mentions: Vec::new(),
            reactions: Vec::new(),
            attachments: Vec::new(),
            edited: false,
            edited_at: None,
            created_at: Utc::now(),
            nonce: None,
        }
    }

    /// Set the creation timestamp
    #[must_use]
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Place the message in a thread (replying to the root unless a parent is set later)
    #[must_use]
    pub fn in_thread(mut self, root_id: impl Into<MessageId>) -> Self {
        let root_id = root_id.into();
        if self.parent_id.is_none() {
            self.parent_id = Some(root_id.clone());
        }
        self.thread_id = Some(root_id);
        self
    }

    /// Set the message this one replies to
    #[must_use]
    pub fn replying_to(mut self, parent_id: impl Into<MessageId>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    /// Set mention targets (duplicates removed, first occurrence kept)
    #[must_use]
    pub fn with_mentions(mut self, mentions: impl IntoIterator<Item = UserId>) -> Self {
        self.mentions = dedup_mentions(mentions);
        self
    }

    /// Attach a file reference
    #[must_use]
    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// Set the client correlation id
    #[must_use]
    pub fn with_nonce(mut self, nonce: impl Into<String>) -> Self {
        self.nonce = Some(nonce.into());
        self
    }

    /// Scope whose list this message belongs to
    pub fn scope(&self) -> ScopeKey {
        match &self.thread_id {
            Some(root) => ScopeKey::Thread(root.clone()),
            None => ScopeKey::Channel(self.channel_id.clone()),
        }
    }

    /// Check if message is a thread reply
    #[inline]
    pub fn is_reply(&self) -> bool {
        self.thread_id.is_some()
    }

    /// Check if message has been edited
    #[inline]
    pub fn is_edited(&self) -> bool {
        self.edited
    }

    /// Check if this is an optimistic message not yet confirmed by the server
    #[inline]
    pub fn is_provisional(&self) -> bool {
        self.id.is_provisional()
    }

    /// Edit the message content
    pub fn edit(&mut self, content: impl Into<String>, at: DateTime<Utc>) {
        self.content = content.into();
        self.edited = true;
        self.edited_at = Some(at);
    }

    /// Fold in another copy of this message.
    ///
    /// Body and edit fields follow whichever copy carries the later edit; on
    /// a tie the current copy stays, so copies can arrive in any order.
    /// Reactions are left alone: once a message is held they are maintained
    /// by reaction events, which a page or update copy may predate.
    pub fn absorb(&mut self, incoming: &Message) -> bool {
        let mut changed = false;
        if self.nonce.is_none() && incoming.nonce.is_some() {
            self.nonce.clone_from(&incoming.nonce);
            changed = true;
        }
        if incoming.edit_stamp() > self.edit_stamp() {
            changed |= self.take_edit(incoming);
        }
        changed
    }

    /// Copy body and edit fields from another copy, keeping reactions
    pub fn take_edit(&mut self, other: &Message) -> bool {
        if self.content == other.content
            && self.edited == other.edited
            && self.edited_at == other.edited_at
            && self.mentions == other.mentions
            && self.attachments == other.attachments
        {
            return false;
        }
        self.content.clone_from(&other.content);
        self.edited = other.edited;
        self.edited_at = other.edited_at;
        self.mentions.clone_from(&other.mentions);
        self.attachments.clone_from(&other.attachments);
        true
    }

    fn edit_stamp(&self) -> (Option<DateTime<Utc>>, bool) {
        (self.edited_at, self.edited)
    }

    /// Check if a user is mentioned
    pub fn mentions_user(&self, user_id: &UserId) -> bool {
        self.mentions.contains(user_id)
    }

    /// Reaction for an emoji, if anyone reacted with it
    pub fn reaction(&self, emoji: &str) -> Option<&Reaction> {
        self.reactions.iter().find(|r| r.is_emoji(emoji))
    }

    /// Emoji a user currently reacts with, if any
    pub fn reaction_of(&self, user_id: &UserId) -> Option<&str> {
        self.reactions
            .iter()
            .find(|r| r.contains(user_id))
            .map(|r| r.emoji.as_str())
    }

    /// Ordering used by every message list: creation time, then id
    pub fn chronological_cmp(&self, other: &Self) -> Ordering {
        self.created_at
            .cmp(&other.created_at)
            .then_with(|| self.id.cmp(&other.id))
    }

    /// Get a truncated preview of the message (for notifications)
    pub fn preview(&self, max_len: usize) -> &str {
        if self.content.len() <= max_len {
            &self.content
        } else {
            let mut end = max_len;
            while !self.content.is_char_boundary(end) && end > 0 {
                end -= 1;
            }
            &self.content[..end]
        }
    }

    /// Check if message content is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.content.trim().is_empty()
    }

    /// Validate a message body before it leaves the client
    pub fn validate_content(content: &str) -> Result<(), DomainError> {
        if content.trim().is_empty() {
            return Err(DomainError::EmptyContent);
        }
        if content.chars().count() > MAX_CONTENT_LENGTH {
            return Err(DomainError::ContentTooLong {
                max: MAX_CONTENT_LENGTH,
            });
        }
        Ok(())
    }
}

fn dedup_mentions(mentions: impl IntoIterator<Item = UserId>) -> Vec<UserId> {
    let mut out: Vec<UserId> = Vec::new();
    for user in mentions {
        if !out.contains(&user) {
            out.push(user);
        }
    }
    out
}

/// Attachment reference (the file itself lives in external storage)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: String,
    pub filename: String,
    pub content_type: String,
    pub size: u64,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

impl Attachment {
    /// Create a new Attachment
    pub fn new(
        id: impl Into<String>,
        filename: impl Into<String>,
        content_type: impl Into<String>,
        size: u64,
        url: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            filename: filename.into(),
            content_type: content_type.into(),
            size,
            url: url.into(),
            width: None,
            height: None,
        }
    }

    /// Check if attachment is an image
    pub fn is_image(&self) -> bool {
        self.content_type.starts_with("image/")
    }

    /// Check if attachment is a video
    pub fn is_video(&self) -> bool {
        self.content_type.starts_with("video/")
    }

    /// Check if attachment has dimensions (is an image/video)
    pub fn has_dimensions(&self) -> bool {
        self.width.is_some() && self.height.is_some()
    }
}
