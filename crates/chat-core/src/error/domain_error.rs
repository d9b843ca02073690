//! Domain errors - error types for the synchronization domain

use thiserror::Error;

use crate::value_objects::{MessageId, ScopeKey};

/// Domain layer errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    // =========================================================================
    // Not Found Errors
    // =========================================================================
    #[error("Message not found: {0}")]
    MessageNotFound(MessageId),

    #[error("Scope not loaded: {0}")]
    ScopeNotLoaded(ScopeKey),

    // =========================================================================
    // Validation Errors
    // =========================================================================
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Message content is empty")]
    EmptyContent,

    #[error("Content too long: max {max} characters")]
    ContentTooLong { max: usize },

    #[error("Too many mentions: max {max}")]
    TooManyMentions { max: usize },

    #[error("Invalid emoji: {0:?}")]
    InvalidEmoji(String),

    #[error("Message not yet confirmed: {0}")]
    MessageNotConfirmed(MessageId),

    // =========================================================================
    // Conflict Errors
    // =========================================================================
    #[error("Conflict: {0}")]
    Conflict(String),

    // =========================================================================
    // Remote Errors
    // =========================================================================
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Credential rejected")]
    Unauthenticated,

    #[error("Request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl DomainError {
    /// Get an error code string for logs and UI mapping
    pub fn code(&self) -> &'static str {
        match self {
            // Not Found
            Self::MessageNotFound(_) => "UNKNOWN_MESSAGE",
            Self::ScopeNotLoaded(_) => "SCOPE_NOT_LOADED",

            // Validation
            Self::ValidationError(_) => "VALIDATION_ERROR",
            Self::EmptyContent => "EMPTY_CONTENT",
            Self::ContentTooLong { .. } => "CONTENT_TOO_LONG",
            Self::TooManyMentions { .. } => "TOO_MANY_MENTIONS",
            Self::InvalidEmoji(_) => "INVALID_EMOJI",
            Self::MessageNotConfirmed(_) => "MESSAGE_NOT_CONFIRMED",

            // Conflict
            Self::Conflict(_) => "CONFLICT",

            // Remote
            Self::Network(_) => "NETWORK_ERROR",
            Self::Timeout => "TIMEOUT",
            Self::Unauthenticated => "UNAUTHENTICATED",
            Self::Rejected { .. } => "REJECTED",
            Self::InvalidResponse(_) => "INVALID_RESPONSE",
        }
    }

    /// Check if this is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::MessageNotFound(_) | Self::ScopeNotLoaded(_))
    }

    /// Check if this is a validation error
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::ValidationError(_)
                | Self::EmptyContent
                | Self::ContentTooLong { .. }
                | Self::TooManyMentions { .. }
                | Self::InvalidEmoji(_)
                | Self::MessageNotConfirmed(_)
        )
    }

    /// Check if this is a conflict error
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// Check if the credential was rejected
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Unauthenticated)
    }

    /// Check if retrying the same request may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout => true,
            Self::Rejected { status, .. } => *status >= 500,
            _ => false,
        }
    }
}
