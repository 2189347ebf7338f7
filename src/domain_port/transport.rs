use crate::domain_model::*;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("request failed: {0}")]
    Request(String),
    #[error("failed to read response body: {0}")]
    Body(String),
}

/// Executes a single HTTP exchange against the configured server origin.
///
/// Implementations return `Ok` for every status the server answers with;
/// only failures to complete the exchange are errors. Cookies set by the
/// server (the refresh token) must be replayed automatically.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: &OutboundRequest) -> Result<InboundResponse, TransportError>;
}
