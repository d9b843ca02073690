//! Application error types
//!
//! Unified error handling for the client session.

use chat_core::{DomainError, ScopeKey};
use std::fmt;

use crate::config::ConfigError;

/// Application-wide error type
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    // Connection errors
    #[error("Not connected")]
    NotConnected,

    #[error("Reconnect abandoned after {attempts} attempts")]
    ReconnectExhausted { attempts: u32 },

    #[error("Credential rejected, re-authentication required")]
    Unauthenticated,

    // Engine errors
    #[error("Scope not open: {0}")]
    ScopeNotOpen(ScopeKey),

    #[error("Stale response for scope {0}")]
    StaleResponse(ScopeKey),

    #[error("Sync worker stopped")]
    WorkerStopped,

    // Domain errors
    #[error(transparent)]
    Domain(#[from] DomainError),

    // Internal errors
    #[error("Internal error")]
    Internal(#[source] anyhow::Error),
}

impl AppError {
    /// Get error code for logs and UI mapping
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Config(_) => "CONFIG_ERROR",
            Self::NotConnected => "NOT_CONNECTED",
            Self::ReconnectExhausted { .. } => "RECONNECT_EXHAUSTED",
            Self::Unauthenticated => "UNAUTHENTICATED",
            Self::ScopeNotOpen(_) => "SCOPE_NOT_OPEN",
            Self::StaleResponse(_) => "STALE_RESPONSE",
            Self::WorkerStopped => "WORKER_STOPPED",
            Self::Internal(_) => "INTERNAL_ERROR",
            Self::Domain(e) => e.code(),
        }
    }

    /// Check if the user can usefully retry the failed action
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::NotConnected => true,
            Self::Domain(e) => e.is_transient(),
            _ => false,
        }
    }

    /// Check if the session cannot continue without outside intervention
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Config(_)
            | Self::Unauthenticated
            | Self::ReconnectExhausted { .. }
            | Self::WorkerStopped => true,
            Self::Domain(e) => e.is_auth(),
            _ => false,
        }
    }

    /// Create an internal error from any error
    pub fn internal(err: impl Into<anyhow::Error>) -> Self {
        Self::Internal(err.into())
    }

    /// Create an internal error from a message
    #[must_use]
    pub fn internal_msg(msg: impl fmt::Display) -> Self {
        Self::Internal(anyhow::anyhow!("{msg}"))
    }
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;
