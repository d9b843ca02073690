//! Frame payload definitions

use serde::{Deserialize, Serialize};

use chat_core::{ScopeKey, UserId};

/// Payload for op 10 (Hello)
///
/// Sent by the server immediately after connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelloPayload {
    /// Heartbeat interval in milliseconds
    pub heartbeat_interval: u64,
}

impl HelloPayload {
    /// Default heartbeat interval (45 seconds)
    pub const DEFAULT_HEARTBEAT_INTERVAL: u64 = 45_000;

    #[must_use]
    pub fn new() -> Self {
        Self {
            heartbeat_interval: Self::DEFAULT_HEARTBEAT_INTERVAL,
        }
    }

    #[must_use]
    pub fn with_interval(heartbeat_interval: u64) -> Self {
        Self { heartbeat_interval }
    }
}

impl Default for HelloPayload {
    fn default() -> Self {
        Self::new()
    }
}

/// Payload for op 2 (Identify)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentifyPayload {
    /// Authentication token (Bearer token)
    pub token: String,

    /// Optional client properties
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<IdentifyProperties>,
}

impl IdentifyPayload {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            properties: Some(IdentifyProperties::current()),
        }
    }
}

/// Client connection properties
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentifyProperties {
    /// Operating system
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,

    /// Client name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client: Option<String>,
}

impl IdentifyProperties {
    /// Properties of this build
    #[must_use]
    pub fn current() -> Self {
        Self {
            os: Some(std::env::consts::OS.to_string()),
            client: Some(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).to_string()),
        }
    }
}

/// Payload for op 3 (Typing), op 4 (Join Scope) and op 6 (Leave Scope)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopePayload {
    pub scope: ScopeKey,
}

/// Data of the `READY` dispatch that completes the handshake
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadyPayload {
    pub user_id: UserId,
    #[serde(default)]
    pub session_id: Option<String>,
}
