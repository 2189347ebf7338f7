use crate::domain_model::*;
use reqwest::StatusCode;

#[derive(Debug, Clone, thiserror::Error)]
pub enum RefreshError {
    #[error("failed to fetch csrf token: {0}")]
    CsrfFetchFailed(String),
    #[error("refresh rejected with status {status}")]
    RefreshRejected { status: StatusCode },
    #[error("refresh response carried no access token")]
    MalformedToken,
    #[error("refresh request failed: {0}")]
    Transport(String),
}

/// Progress of one refresh cycle. `Success` and `Failed` are terminal.
#[derive(Debug)]
pub enum RefreshState {
    Idle,
    FetchingCsrf,
    Refreshing { csrf: CsrfToken },
    Success(AccessToken),
    Failed(RefreshError),
}

impl RefreshState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RefreshState::Success(_) | RefreshState::Failed(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            RefreshState::Idle => "idle",
            RefreshState::FetchingCsrf => "fetching_csrf",
            RefreshState::Refreshing { .. } => "refreshing",
            RefreshState::Success(_) => "success",
            RefreshState::Failed(_) => "failed",
        }
    }
}

#[async_trait::async_trait]
pub trait TokenRefresher: Send + Sync {
    /// Obtains a new access token and stores it in the token holder.
    ///
    /// `stale` is the token the rejected request was sent with, `None` when it
    /// went out unauthenticated.
    async fn refresh(&self, stale: Option<&AccessToken>) -> Result<AccessToken, RefreshError>;
}
