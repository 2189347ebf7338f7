use crate::domain_model::AccessToken;

/// Owner of the current access token. Replacing it is atomic for readers.
pub trait TokenHolder: Send + Sync {
    fn get(&self) -> Option<AccessToken>;
    fn set(&self, token: AccessToken);
    fn clear(&self);
}
