//! Frame format
//!
//! Every text frame on the live connection is one `GatewayMessage`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use chat_core::ScopeKey;

use super::{HelloPayload, IdentifyPayload, OpCode, ScopePayload};

/// Event type of the dispatch that completes the handshake
pub const READY_EVENT: &str = "READY";

/// Live connection frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayMessage {
    /// Operation code
    pub op: OpCode,

    /// Event type (only for op=0 Dispatch)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,

    /// Sequence number (only for op=0 Dispatch)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s: Option<u64>,

    /// Event data payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub d: Option<Value>,
}

impl GatewayMessage {
    fn bare(op: OpCode) -> Self {
        Self {
            op,
            t: None,
            s: None,
            d: None,
        }
    }

    fn with_data(op: OpCode, data: impl Serialize) -> Self {
        Self {
            d: Some(serde_json::to_value(data).unwrap_or_default()),
            ..Self::bare(op)
        }
    }

    // === Client Messages ===

    /// Create an Identify message (op=2)
    #[must_use]
    pub fn identify(payload: IdentifyPayload) -> Self {
        Self::with_data(OpCode::Identify, payload)
    }

    /// Create a Heartbeat message (op=1) carrying the last seen sequence
    #[must_use]
    pub fn heartbeat(last_sequence: Option<u64>) -> Self {
        Self {
            d: last_sequence.map(|s| Value::Number(s.into())),
            ..Self::bare(OpCode::Heartbeat)
        }
    }

    /// Create a Join Scope message (op=4)
    #[must_use]
    pub fn join_scope(scope: &ScopeKey) -> Self {
        Self::with_data(OpCode::JoinScope, ScopePayload { scope: scope.clone() })
    }

    /// Create a Leave Scope message (op=6)
    #[must_use]
    pub fn leave_scope(scope: &ScopeKey) -> Self {
        Self::with_data(OpCode::LeaveScope, ScopePayload { scope: scope.clone() })
    }

    /// Create a Typing message (op=3)
    #[must_use]
    pub fn typing(scope: &ScopeKey) -> Self {
        Self::with_data(OpCode::Typing, ScopePayload { scope: scope.clone() })
    }

    // === Server Messages ===

    /// Create a Dispatch message (op=0)
    #[must_use]
    pub fn dispatch(event_type: impl Into<String>, sequence: u64, data: Value) -> Self {
        Self {
            op: OpCode::Dispatch,
            t: Some(event_type.into()),
            s: Some(sequence),
            d: Some(data),
        }
    }

    /// Create a Hello message (op=10)
    #[must_use]
    pub fn hello(payload: HelloPayload) -> Self {
        Self::with_data(OpCode::Hello, payload)
    }

    /// Create a Heartbeat ACK message (op=11)
    #[must_use]
    pub fn heartbeat_ack() -> Self {
        Self::bare(OpCode::HeartbeatAck)
    }

    /// Create a Reconnect message (op=5)
    #[must_use]
    pub fn reconnect() -> Self {
        Self::bare(OpCode::Reconnect)
    }

    /// Create an Invalid Session message (op=7)
    #[must_use]
    pub fn invalid_session() -> Self {
        Self::with_data(OpCode::InvalidSession, false)
    }

    // === Parsing ===

    /// Try to parse as a Hello payload (op=10)
    pub fn as_hello(&self) -> Option<HelloPayload> {
        if self.op != OpCode::Hello {
            return None;
        }
        self.d.as_ref().and_then(|d| serde_json::from_value(d.clone()).ok())
    }

    /// Try to parse as an Identify payload (op=2)
    pub fn as_identify(&self) -> Option<IdentifyPayload> {
        if self.op != OpCode::Identify {
            return None;
        }
        self.d.as_ref().and_then(|d| serde_json::from_value(d.clone()).ok())
    }

    /// Scope of a Join, Leave or Typing message
    pub fn as_scope(&self) -> Option<ScopeKey> {
        if !matches!(self.op, OpCode::JoinScope | OpCode::LeaveScope | OpCode::Typing) {
            return None;
        }
        self.d
            .as_ref()
            .and_then(|d| serde_json::from_value::<ScopePayload>(d.clone()).ok())
            .map(|p| p.scope)
    }

    /// Event type and data of a Dispatch message
    pub fn as_dispatch(&self) -> Option<(&str, &Value)> {
        if self.op != OpCode::Dispatch {
            return None;
        }
        match (&self.t, &self.d) {
            (Some(t), Some(d)) => Some((t.as_str(), d)),
            _ => None,
        }
    }

    /// Check if this is the `READY` dispatch
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.op == OpCode::Dispatch && self.t.as_deref() == Some(READY_EVENT)
    }

    // === Utilities ===

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl std::fmt::Display for GatewayMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(t) = &self.t {
            write!(f, "GatewayMessage(op={}, t={}", self.op, t)?;
            if let Some(s) = self.s {
                write!(f, ", s={s}")?;
            }
            write!(f, ")")
        } else {
            write!(f, "GatewayMessage(op={})", self.op)
        }
    }
}
