//! # chat-core
//!
//! Domain layer for the message synchronization client: messages, reactions,
//! scope keys, live events, and the ports the engine talks through.
//! This crate has zero dependencies on infrastructure (HTTP, WebSocket, runtime).

pub mod entities;
pub mod error;
pub mod events;
pub mod traits;
pub mod value_objects;

// Re-export commonly used types at crate root
pub use entities::{
    validate_emoji, Attachment, Message, Reaction, ReactionSummary, MAX_CONTENT_LENGTH,
    MAX_EMOJI_LENGTH, MAX_MENTIONS,
};
pub use error::DomainError;
pub use events::{
    LiveEvent, MessageDeletedEvent, ReactionChangedEvent, TypingEvent,
};
pub use traits::{
    ApiResult, AuthProvider, Credential, LiveChannel, MessageApi, MessagePage,
    SendMessagePayload,
};
pub use value_objects::{ChannelId, MessageId, ScopeKey, ScopeParseError, UserId};
