//! Command objects for local mutations
//!
//! Every user-initiated mutation is validated here before any optimistic
//! change touches the store.

use validator::{Validate, ValidationError, ValidationErrors};

use chat_core::{
    validate_emoji, Attachment, ChannelId, DomainError, Message, MessageId, ScopeKey, UserId,
    MAX_CONTENT_LENGTH, MAX_MENTIONS,
};

/// Send a message to a channel or a thread
#[derive(Debug, Clone, Validate)]
pub struct SendMessage {
    pub channel_id: ChannelId,
    /// Thread root, for replies
    pub thread_id: Option<MessageId>,
    /// Message directly replied to (defaults to the thread root)
    pub parent_id: Option<MessageId>,

    #[validate(
        length(max = 2000, message = "Message must be at most 2000 characters"),
        custom(function = "not_blank")
    )]
    pub content: String,

    #[validate(length(max = 100, message = "At most 100 mentions"))]
    pub mentions: Vec<UserId>,

    pub attachments: Vec<Attachment>,
}

impl SendMessage {
    /// Root message in a channel
    pub fn new(channel_id: impl Into<ChannelId>, content: impl Into<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
            thread_id: None,
            parent_id: None,
            content: content.into(),
            mentions: Vec::new(),
            attachments: Vec::new(),
        }
    }

    /// Reply in the thread rooted at `root_id`
    #[must_use]
    pub fn in_thread(mut self, root_id: impl Into<MessageId>) -> Self {
        self.thread_id = Some(root_id.into());
        self
    }

    #[must_use]
    pub fn replying_to(mut self, parent_id: impl Into<MessageId>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    #[must_use]
    pub fn with_mentions(mut self, mentions: impl IntoIterator<Item = UserId>) -> Self {
        self.mentions = mentions.into_iter().collect();
        self
    }

    #[must_use]
    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// Scope the message will appear in
    pub fn scope(&self) -> ScopeKey {
        match &self.thread_id {
            Some(root) => ScopeKey::Thread(root.clone()),
            None => ScopeKey::Channel(self.channel_id.clone()),
        }
    }

    pub fn check(&self) -> Result<(), DomainError> {
        self.validate().map_err(|e| into_domain(&e, &self.content))
    }
}

/// Replace a message body
#[derive(Debug, Clone, Validate)]
pub struct EditMessage {
    pub message_id: MessageId,

    #[validate(
        length(max = 2000, message = "Message must be at most 2000 characters"),
        custom(function = "not_blank")
    )]
    pub content: String,
}

impl EditMessage {
    pub fn new(message_id: impl Into<MessageId>, content: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            content: content.into(),
        }
    }

    pub fn check(&self) -> Result<(), DomainError> {
        self.validate().map_err(|e| into_domain(&e, &self.content))?;
        confirmed(&self.message_id)
    }
}

/// Delete a message
#[derive(Debug, Clone)]
pub struct DeleteMessage {
    pub message_id: MessageId,
}

impl DeleteMessage {
    pub fn new(message_id: impl Into<MessageId>) -> Self {
        Self {
            message_id: message_id.into(),
        }
    }

    pub fn check(&self) -> Result<(), DomainError> {
        confirmed(&self.message_id)
    }
}

/// Toggle the local user's reaction on a message
#[derive(Debug, Clone, Validate)]
pub struct ToggleReaction {
    pub message_id: MessageId,

    #[validate(custom(function = "emoji_format"))]
    pub emoji: String,
}

impl ToggleReaction {
    pub fn new(message_id: impl Into<MessageId>, emoji: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            emoji: emoji.into(),
        }
    }

    pub fn check(&self) -> Result<(), DomainError> {
        self.validate()
            .map_err(|_| DomainError::InvalidEmoji(self.emoji.clone()))?;
        confirmed(&self.message_id)
    }
}

fn not_blank(content: &str) -> Result<(), ValidationError> {
    if content.trim().is_empty() {
        return Err(ValidationError::new("blank").with_message("Message must not be empty".into()));
    }
    Ok(())
}

fn emoji_format(emoji: &str) -> Result<(), ValidationError> {
    validate_emoji(emoji).map_err(|_| ValidationError::new("emoji"))
}

fn confirmed(id: &MessageId) -> Result<(), DomainError> {
    if id.is_provisional() {
        return Err(DomainError::MessageNotConfirmed(id.clone()));
    }
    Ok(())
}

// Map field failures onto the domain's validation variants
fn into_domain(errors: &ValidationErrors, content: &str) -> DomainError {
    let fields = errors.field_errors();
    if fields.contains_key("content") {
        return match Message::validate_content(content) {
            Err(e) => e,
            Ok(()) => DomainError::ContentTooLong {
                max: MAX_CONTENT_LENGTH,
            },
        };
    }
    if fields.contains_key("mentions") {
        return DomainError::TooManyMentions { max: MAX_MENTIONS };
    }
    DomainError::ValidationError(errors.to_string())
}
