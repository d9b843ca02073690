//! Live connection operation codes

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Frame type, the `op` field of every frame.
///
/// Client frames: Heartbeat, Identify, Typing, JoinScope, LeaveScope.
/// Everything else only comes from the server, Heartbeat flows both ways.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    /// An event for a joined scope
    Dispatch = 0,
    /// Keep-alive carrying the last sequence seen
    Heartbeat = 1,
    /// Present the bearer credential
    Identify = 2,
    /// The local user is typing in a scope
    Typing = 3,
    /// Start receiving a scope's events
    JoinScope = 4,
    /// Server asks for a fresh connection
    Reconnect = 5,
    /// Stop receiving a scope's events
    LeaveScope = 6,
    /// The credential was not accepted
    InvalidSession = 7,
    /// First frame; carries the heartbeat interval
    Hello = 10,
    HeartbeatAck = 11,
}

impl OpCode {
    /// Create an `OpCode` from a raw integer value
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Dispatch),
            1 => Some(Self::Heartbeat),
            2 => Some(Self::Identify),
            3 => Some(Self::Typing),
            4 => Some(Self::JoinScope),
            5 => Some(Self::Reconnect),
            6 => Some(Self::LeaveScope),
            7 => Some(Self::InvalidSession),
            10 => Some(Self::Hello),
            11 => Some(Self::HeartbeatAck),
            _ => None,
        }
    }

    /// Get the raw integer value
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

impl Serialize for OpCode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u8(self.as_u8())
    }
}

impl<'de> Deserialize<'de> for OpCode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = u8::deserialize(deserializer)?;
        Self::from_u8(value).ok_or_else(|| serde::de::Error::custom(format!("invalid op code: {value}")))
    }
}

impl std::fmt::Display for OpCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?} ({})", self.as_u8())
    }
}
