//! Scope keys
//!
//! A scope is either a channel's root message list or one thread's reply list.
//! It is the unit of pagination and of live-event subscription.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use super::{ChannelId, MessageId};

/// Wire prefix for channel scopes
pub const CHANNEL_SCOPE_PREFIX: &str = "channel:";
/// Wire prefix for thread scopes
pub const THREAD_SCOPE_PREFIX: &str = "thread:";

/// Key of a message list
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ScopeKey {
    /// Root messages of a channel
    Channel(ChannelId),
    /// Replies of a thread, keyed by the thread's root message id
    Thread(MessageId),
}

impl ScopeKey {
    /// Create a channel scope
    #[must_use]
    pub fn channel(channel_id: impl Into<ChannelId>) -> Self {
        Self::Channel(channel_id.into())
    }

    /// Create a thread scope
    #[must_use]
    pub fn thread(root_id: impl Into<MessageId>) -> Self {
        Self::Thread(root_id.into())
    }

    /// Check if this is a thread scope
    #[inline]
    pub fn is_thread(&self) -> bool {
        matches!(self, Self::Thread(_))
    }

    /// Channel id, if this is a channel scope
    pub fn channel_id(&self) -> Option<&ChannelId> {
        match self {
            Self::Channel(id) => Some(id),
            Self::Thread(_) => None,
        }
    }

    /// Wire name used in join/leave requests
    #[must_use]
    pub fn name(&self) -> String {
        match self {
            Self::Channel(id) => format!("{CHANNEL_SCOPE_PREFIX}{id}"),
            Self::Thread(id) => format!("{THREAD_SCOPE_PREFIX}{id}"),
        }
    }

    /// Parse a wire name back to a `ScopeKey`
    pub fn parse(name: &str) -> Result<Self, ScopeParseError> {
        if let Some(id) = name.strip_prefix(CHANNEL_SCOPE_PREFIX) {
            if !id.is_empty() {
                return Ok(Self::Channel(ChannelId::from(id)));
            }
        }

        if let Some(id) = name.strip_prefix(THREAD_SCOPE_PREFIX) {
            if !id.is_empty() {
                return Ok(Self::Thread(MessageId::from(id)));
            }
        }

        Err(ScopeParseError::InvalidFormat(name.to_string()))
    }
}

/// Error when parsing a scope wire name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScopeParseError {
    #[error("invalid scope name: {0}")]
    InvalidFormat(String),
}

impl fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScopeKey {
    type Err = ScopeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// Serialized as its wire name
impl Serialize for ScopeKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.name())
    }
}

impl<'de> Deserialize<'de> for ScopeKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let name = String::deserialize(deserializer)?;
        Self::parse(&name).map_err(serde::de::Error::custom)
    }
}
