use crate::application_impl::{Middleware, Next, PipelineResult};
use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use reqwest::StatusCode;
use std::sync::Arc;
use tracing::{debug, warn};

/// Attaches the currently held access token as a bearer credential.
pub struct AttachBearer {
    token_holder: Arc<dyn TokenHolder>,
}

impl AttachBearer {
    pub fn new(token_holder: Arc<dyn TokenHolder>) -> Self {
        Self { token_holder }
    }
}

#[async_trait::async_trait]
impl Middleware for AttachBearer {
    fn name(&self) -> &'static str {
        "attach_bearer"
    }

    async fn handle(&self, mut request: OutboundRequest, next: Next<'_>) -> PipelineResult {
        match self.token_holder.get() {
            Some(token) => {
                if let Err(e) = request.attach_bearer(&token) {
                    warn!(error = %e, "held access token is not a valid header value");
                    request.detach_bearer();
                }
            }
            None => request.detach_bearer(),
        }
        next.run(request).await
    }
}

/// Turns 429 responses into a user notice and a `RateLimited` error.
pub struct RateLimitNotice {
    notifier: Arc<dyn UserNotifier>,
    default_message: String,
}

impl RateLimitNotice {
    pub fn new(notifier: Arc<dyn UserNotifier>, default_message: impl Into<String>) -> Self {
        Self {
            notifier,
            default_message: default_message.into(),
        }
    }
}

#[async_trait::async_trait]
impl Middleware for RateLimitNotice {
    fn name(&self) -> &'static str {
        "rate_limit_notice"
    }

    async fn handle(&self, request: OutboundRequest, next: Next<'_>) -> PipelineResult {
        let response = next.run(request).await?;
        if response.status != StatusCode::TOO_MANY_REQUESTS {
            return Ok(response);
        }

        let message = response
            .message()
            .unwrap_or_else(|| self.default_message.clone());
        warn!(%message, "request rate limited");
        self.notifier.notify(&message);
        Err(SessionError::RateLimited { message })
    }
}

/// On 401, renews the access token once and replays the request from the
/// first stage. A request that was already replayed is not renewed again.
pub struct RefreshOnUnauthorized {
    refresher: Arc<dyn TokenRefresher>,
}

impl RefreshOnUnauthorized {
    pub fn new(refresher: Arc<dyn TokenRefresher>) -> Self {
        Self { refresher }
    }
}

#[async_trait::async_trait]
impl Middleware for RefreshOnUnauthorized {
    fn name(&self) -> &'static str {
        "refresh_on_unauthorized"
    }

    async fn handle(&self, request: OutboundRequest, next: Next<'_>) -> PipelineResult {
        let mut retry = request.clone();
        let response = next.run(request).await?;
        if response.status != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        if !retry.mark_retry() {
            debug!("unauthorized after token refresh, giving up");
            return Err(SessionError::Unauthorized);
        }

        let stale = retry.bearer().cloned();
        let token = self.refresher.refresh(stale.as_ref()).await.map_err(|e| {
            warn!(error = %e, "access token refresh failed");
            SessionError::RefreshFailed(e)
        })?;

        if let Err(e) = retry.attach_bearer(&token) {
            warn!(error = %e, "refreshed access token is not a valid header value");
        }
        debug!("replaying request with refreshed access token");
        next.replay(retry).await
    }
}
