//! Connection state and lifecycle signals

use std::time::Duration;

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection and none pending
    Disconnected,
    /// Opening the link and identifying
    Connecting,
    /// Identified; frames flow both ways
    Connected,
    /// Waiting out a backoff delay before the next attempt
    Reconnecting,
    /// Tearing down on request
    Disconnecting,
    /// The credential was rejected; terminal until a new credential arrives
    Unauthenticated,
}

impl ConnectionState {
    /// A connection exists or is being established
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Connecting | Self::Connected | Self::Reconnecting)
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Disconnecting => "disconnecting",
            Self::Unauthenticated => "unauthenticated",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Lifecycle signal broadcast by the transport client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportSignal {
    Connected,
    Disconnected,
    /// A reconnect attempt is scheduled after `delay`
    Reconnecting { attempt: u32, delay: Duration },
    /// The credential was rejected; fatal for the session
    AuthRejected,
    /// Reconnect abandoned; fatal for the session
    ReconnectFailed { attempts: u32 },
}

impl TransportSignal {
    /// Signals after which the connection will not come back on its own
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::AuthRejected | Self::ReconnectFailed { .. })
    }
}
