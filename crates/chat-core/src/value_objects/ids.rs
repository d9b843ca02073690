//! Opaque string identifiers
//!
//! Ids are issued by the server and never interpreted by the client. The only
//! exception is the provisional prefix the client puts on optimistic messages.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Prefix of client-generated ids for messages not yet confirmed by the server
pub const PROVISIONAL_PREFIX: &str = "local:";

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create an id from any string-like value
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the raw id
            #[inline]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Check if the id is empty
            #[inline]
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }

            /// Take the raw id
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Message id (server-issued, or provisional while a send is in flight)
    MessageId
);

string_id!(
    /// Channel id
    ChannelId
);

string_id!(
    /// User id
    UserId
);

impl MessageId {
    /// Build a provisional id from a client-generated token
    pub fn provisional(token: impl fmt::Display) -> Self {
        Self(format!("{PROVISIONAL_PREFIX}{token}"))
    }

    /// Check if this id was generated locally for an optimistic message
    #[inline]
    pub fn is_provisional(&self) -> bool {
        self.0.starts_with(PROVISIONAL_PREFIX)
    }
}
