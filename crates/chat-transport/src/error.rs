//! Transport error types

use chat_core::DomainError;

/// Errors raised by the live connection and HTTP client setup
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Connection closed (code {code:?}): {reason}")]
    Closed { code: Option<u16>, reason: String },

    #[error("Failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Protocol violation: {0}")]
    Protocol(String),

    #[error("Heartbeat not acknowledged")]
    HeartbeatTimeout,

    #[error("Link error: {0}")]
    Link(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

impl TransportError {
    /// Close code sent by the server, if any
    pub fn close_code(&self) -> Option<u16> {
        match self {
            Self::Closed { code, .. } => *code,
            _ => None,
        }
    }
}

impl From<TransportError> for DomainError {
    fn from(err: TransportError) -> Self {
        Self::Network(err.to_string())
    }
}

/// Result type for transport operations
pub type TransportResult<T> = Result<T, TransportError>;
