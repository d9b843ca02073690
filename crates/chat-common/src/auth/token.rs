//! Static bearer token provider

use chat_core::{AuthProvider, Credential};
use parking_lot::RwLock;

/// Holds a pre-issued token until the server rejects it
#[derive(Debug, Default)]
pub struct TokenAuth {
    credential: RwLock<Option<Credential>>,
}

impl TokenAuth {
    /// Create a provider holding `token`
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            credential: RwLock::new(Some(Credential::new(token))),
        }
    }

    /// Replace the token after the user re-authenticated
    pub fn set_token(&self, token: impl Into<String>) {
        *self.credential.write() = Some(Credential::new(token));
    }
}

impl AuthProvider for TokenAuth {
    fn credential(&self) -> Option<Credential> {
        self.credential.read().clone()
    }

    fn invalidate(&self) {
        if self.credential.write().take().is_some() {
            tracing::info!("Credential invalidated");
        }
    }
}
