use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use reqwest::header::{HeaderName, HeaderValue};
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub const CSRF_TOKEN_PATH: &str = "/csrf/csrfToken";
pub const TOKEN_REFRESH_PATH: &str = "/auth/token/refresh";
pub const CSRF_HEADER: &str = "x-csrf-token";

/// Renews the access token with the cookie-borne refresh token.
///
/// A cycle walks `Idle -> FetchingCsrf -> Refreshing -> Success | Failed`.
/// Both calls go straight to the transport, so they never carry the stale
/// bearer token and never trigger a nested refresh.
///
/// With `single_flight` enabled, cycles are serialized. A caller that queued
/// behind a running cycle takes that cycle's outcome, success or failure, and
/// a caller whose stale token was already replaced reuses the new token.
pub struct RefreshCoordinator {
    transport: Arc<dyn Transport>,
    token_holder: Arc<dyn TokenHolder>,
    single_flight: bool,
    flights: AtomicU64,
    last_flight: Mutex<Option<Result<AccessToken, RefreshError>>>,
}

impl RefreshCoordinator {
    pub fn new(
        transport: Arc<dyn Transport>,
        token_holder: Arc<dyn TokenHolder>,
        single_flight: bool,
    ) -> Self {
        Self {
            transport,
            token_holder,
            single_flight,
            flights: AtomicU64::new(0),
            last_flight: Mutex::new(None),
        }
    }

    /// Performs one transition. Terminal states are returned unchanged.
    pub async fn advance(&self, state: RefreshState) -> RefreshState {
        match state {
            RefreshState::Idle => RefreshState::FetchingCsrf,
            RefreshState::FetchingCsrf => match self.fetch_csrf().await {
                Ok(csrf) => RefreshState::Refreshing { csrf },
                Err(e) => RefreshState::Failed(e),
            },
            RefreshState::Refreshing { csrf } => match self.request_token(&csrf).await {
                Ok(token) => {
                    self.token_holder.set(token.clone());
                    RefreshState::Success(token)
                }
                Err(e) => RefreshState::Failed(e),
            },
            terminal => terminal,
        }
    }

    pub async fn run_cycle(&self) -> Result<AccessToken, RefreshError> {
        let mut state = RefreshState::Idle;
        loop {
            let from = state.name();
            let next = self.advance(state).await;
            debug!(from, to = next.name(), "refresh state changed");

            state = match next {
                RefreshState::Success(token) => {
                    info!("access token refreshed");
                    return Ok(token);
                }
                RefreshState::Failed(e) => {
                    warn!(error = %e, "refresh cycle failed");
                    return Err(e);
                }
                other => other,
            };
        }
    }

    async fn fetch_csrf(&self) -> Result<CsrfToken, RefreshError> {
        let request = OutboundRequest::get(CSRF_TOKEN_PATH);
        let response = self
            .transport
            .execute(&request)
            .await
            .map_err(|e| RefreshError::CsrfFetchFailed(e.to_string()))?;
        if !response.is_success() {
            return Err(RefreshError::CsrfFetchFailed(format!(
                "server responded with {}",
                response.status
            )));
        }

        let body: CsrfTokenBody = response
            .decode()
            .map_err(|e| RefreshError::CsrfFetchFailed(e.to_string()))?;
        body.csrf_token
            .filter(|csrf| !csrf.as_str().is_empty())
            .ok_or_else(|| RefreshError::CsrfFetchFailed("response carried no csrfToken".into()))
    }

    async fn request_token(&self, csrf: &CsrfToken) -> Result<AccessToken, RefreshError> {
        let mut value = HeaderValue::from_str(csrf.as_str())
            .map_err(|e| RefreshError::CsrfFetchFailed(e.to_string()))?;
        value.set_sensitive(true);
        let request = OutboundRequest::post(TOKEN_REFRESH_PATH, json!({}))
            .with_header(HeaderName::from_static(CSRF_HEADER), value);

        let response = self
            .transport
            .execute(&request)
            .await
            .map_err(|e| RefreshError::Transport(e.to_string()))?;
        if !response.is_success() {
            return Err(RefreshError::RefreshRejected {
                status: response.status,
            });
        }

        let body: RefreshTokenBody = response
            .decode()
            .map_err(|_| RefreshError::MalformedToken)?;
        body.access_token
            .filter(|token| !token.as_str().is_empty())
            .ok_or(RefreshError::MalformedToken)
    }
}

#[async_trait::async_trait]
impl TokenRefresher for RefreshCoordinator {
    async fn refresh(&self, stale: Option<&AccessToken>) -> Result<AccessToken, RefreshError> {
        if !self.single_flight {
            return self.run_cycle().await;
        }

        let queued_at = self.flights.load(Ordering::Acquire);
        let mut last_flight = self.last_flight.lock().await;
        if self.flights.load(Ordering::Acquire) != queued_at {
            if let Some(outcome) = last_flight.as_ref() {
                debug!("sharing the outcome of a concurrent refresh");
                return outcome.clone();
            }
        }
        if let Some(current) = self.token_holder.get() {
            if Some(&current) != stale {
                debug!("access token already renewed by a concurrent refresh");
                return Ok(current);
            }
        }

        let outcome = self.run_cycle().await;
        *last_flight = Some(outcome.clone());
        self.flights.fetch_add(1, Ordering::Release);
        outcome
    }
}
