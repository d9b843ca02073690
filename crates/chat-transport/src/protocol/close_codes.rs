//! Close codes the gateway ends a connection with, and what the client does
//! about each one

/// Application close codes in the 4000 range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum CloseCode {
    UnknownError = 4000,
    UnknownOpcode = 4001,
    DecodeError = 4002,
    /// A frame arrived before Identify
    NotAuthenticated = 4003,
    /// The credential was rejected
    AuthenticationFailed = 4004,
    AlreadyAuthenticated = 4005,
    RateLimited = 4008,
    /// Heartbeats stopped arriving on the server side
    SessionTimeout = 4009,
}

/// How the transport reacts to a close
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseAction {
    /// Back off and dial again with the same credential
    Reconnect,
    /// Stop; the credential has to be replaced first
    Reauthenticate,
}

impl CloseCode {
    #[must_use]
    pub fn from_u16(value: u16) -> Option<Self> {
        let code = match value {
            4000 => Self::UnknownError,
            4001 => Self::UnknownOpcode,
            4002 => Self::DecodeError,
            4003 => Self::NotAuthenticated,
            4004 => Self::AuthenticationFailed,
            4005 => Self::AlreadyAuthenticated,
            4008 => Self::RateLimited,
            4009 => Self::SessionTimeout,
            _ => return None,
        };
        Some(code)
    }

    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    #[must_use]
    pub const fn action(self) -> CloseAction {
        match self {
            Self::AuthenticationFailed => CloseAction::Reauthenticate,
            _ => CloseAction::Reconnect,
        }
    }

    /// Action for a raw close frame. Missing, standard (1000-range) and
    /// unrecognised codes all reconnect.
    #[must_use]
    pub fn action_for(code: Option<u16>) -> CloseAction {
        code.and_then(Self::from_u16)
            .map_or(CloseAction::Reconnect, Self::action)
    }
}

impl std::fmt::Display for CloseCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?} ({})", self.as_u16())
    }
}
