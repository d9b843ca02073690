//! Authentication port - issuance is external, the client only carries a token

use std::fmt;

/// Bearer credential presented to the API and the live connection
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Wrap a raw token
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Raw token
    pub fn token(&self) -> &str {
        &self.0
    }

    /// Value for an `Authorization` header
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

// Never print the token
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Source of the current credential
pub trait AuthProvider: Send + Sync {
    /// Current credential, `None` once invalidated
    fn credential(&self) -> Option<Credential>;

    /// Drop the credential after the server rejected it
    fn invalidate(&self);
}
