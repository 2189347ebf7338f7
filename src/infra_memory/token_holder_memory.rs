use crate::domain_model::AccessToken;
use crate::domain_port::TokenHolder;
use std::sync::{PoisonError, RwLock};

/// Keeps the access token in process memory only; it is never written to disk.
#[derive(Debug, Default)]
pub struct MemoryTokenHolder {
    token: RwLock<Option<AccessToken>>,
}

impl MemoryTokenHolder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: AccessToken) -> Self {
        Self {
            token: RwLock::new(Some(token)),
        }
    }
}

impl TokenHolder for MemoryTokenHolder {
    fn get(&self) -> Option<AccessToken> {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set(&self, token: AccessToken) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = Some(token);
    }

    fn clear(&self) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}
