//! Reaction entity - one emoji on a message and the users who reacted with it

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::value_objects::UserId;

/// Maximum emoji length in bytes (covers custom `name:id` emoji)
pub const MAX_EMOJI_LENGTH: usize = 64;

/// Reaction entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    pub emoji: String,
    #[serde(default)]
    pub users: BTreeSet<UserId>,
    /// Always equal to `users.len()` after [`Reaction::recount`]
    #[serde(default)]
    pub count: usize,
}

impl Reaction {
    /// Create an empty reaction
    pub fn new(emoji: impl Into<String>) -> Self {
        Self {
            emoji: emoji.into(),
            users: BTreeSet::new(),
            count: 0,
        }
    }

    /// Add a user (builder form, used by fixtures and decoders)
    #[must_use]
    pub fn with_user(mut self, user_id: impl Into<UserId>) -> Self {
        self.users.insert(user_id.into());
        self.recount();
        self
    }

    /// Check if reaction uses a specific emoji
    #[inline]
    pub fn is_emoji(&self, emoji: &str) -> bool {
        self.emoji == emoji
    }

    /// Check if a user is in this reaction's set
    #[inline]
    pub fn contains(&self, user_id: &UserId) -> bool {
        self.users.contains(user_id)
    }

    /// Check if nobody reacts with this emoji any more
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Recompute the count from the user set
    pub fn recount(&mut self) {
        self.count = self.users.len();
    }
}

/// Aggregated reaction view for display
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReactionSummary {
    pub emoji: String,
    pub count: usize,
    pub me: bool,
}

impl ReactionSummary {
    /// Summarize a reaction from the point of view of `viewer`
    pub fn for_viewer(reaction: &Reaction, viewer: &UserId) -> Self {
        Self {
            emoji: reaction.emoji.clone(),
            count: reaction.users.len(),
            me: reaction.contains(viewer),
        }
    }
}

/// Reject malformed emoji before any optimistic mutation
pub fn validate_emoji(emoji: &str) -> Result<(), DomainError> {
    if emoji.is_empty()
        || emoji.len() > MAX_EMOJI_LENGTH
        || emoji.chars().any(|c| c.is_whitespace() || c.is_control())
    {
        return Err(DomainError::InvalidEmoji(emoji.to_string()));
    }
    Ok(())
}
