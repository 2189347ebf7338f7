use crate::application_port::RefreshError;
use crate::domain_model::*;
use crate::domain_port::TransportError;
use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("rate limited: {message}")]
    RateLimited { message: String },
    #[error("unauthorized")]
    Unauthorized,
    #[error("token refresh failed: {0}")]
    RefreshFailed(#[source] RefreshError),
    #[error("network failure: {0}")]
    NetworkFailure(String),
    #[error("server responded with {status}")]
    Status {
        status: StatusCode,
        message: Option<String>,
    },
    #[error("malformed response body: {0}")]
    MalformedBody(String),
}

impl SessionError {
    /// The session can no longer be renewed; the user has to log in again.
    pub fn requires_reauthentication(&self) -> bool {
        matches!(self, SessionError::Unauthorized | SessionError::RefreshFailed(_))
    }

    pub fn user_message(&self) -> String {
        match self {
            SessionError::RateLimited { message } => message.clone(),
            SessionError::Unauthorized | SessionError::RefreshFailed(_) => {
                "Your session has expired. Please log in again.".to_string()
            }
            SessionError::NetworkFailure(_) => "Could not reach the server.".to_string(),
            SessionError::Status {
                message: Some(message),
                ..
            } => message.clone(),
            SessionError::Status { status, .. } => format!("Request failed ({})", status),
            SessionError::MalformedBody(_) => "Unexpected response from the server.".to_string(),
        }
    }
}

impl From<TransportError> for SessionError {
    fn from(err: TransportError) -> Self {
        SessionError::NetworkFailure(err.to_string())
    }
}

impl From<RefreshError> for SessionError {
    fn from(err: RefreshError) -> Self {
        SessionError::RefreshFailed(err)
    }
}

#[async_trait::async_trait]
pub trait SessionClient: Send + Sync {
    /// Sends a request on behalf of the signed-in user, renewing the access
    /// token once if the server rejects it.
    async fn send(&self, request: OutboundRequest) -> Result<InboundResponse, SessionError>;
}
