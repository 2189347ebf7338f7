use crate::application_impl::*;
use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use reqwest::StatusCode;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::{Arc, OnceLock};
use tracing::{Instrument, info, info_span};

pub const DEFAULT_RATE_LIMIT_MESSAGE: &str = "Too many requests. Please try again later.";

/// HTTP session on behalf of the signed-in user.
///
/// Until [`AuthSession::setup_interceptors`] is called, requests go straight to
/// the transport. Setup installs the bearer, rate-limit and refresh stages
/// exactly once; later calls are no-ops.
pub struct AuthSession {
    transport: Arc<dyn Transport>,
    token_holder: Arc<dyn TokenHolder>,
    refresher: Arc<dyn TokenRefresher>,
    notifier: Arc<dyn UserNotifier>,
    rate_limit_message: String,
    bare: Pipeline,
    interceptors: OnceLock<Pipeline>,
}

impl AuthSession {
    pub fn new(
        transport: Arc<dyn Transport>,
        token_holder: Arc<dyn TokenHolder>,
        refresher: Arc<dyn TokenRefresher>,
        notifier: Arc<dyn UserNotifier>,
        rate_limit_message: impl Into<String>,
    ) -> Self {
        Self {
            bare: Pipeline::new(transport.clone()),
            transport,
            token_holder,
            refresher,
            notifier,
            rate_limit_message: rate_limit_message.into(),
            interceptors: OnceLock::new(),
        }
    }

    /// Returns `true` only for the call that actually installed the stages.
    pub fn setup_interceptors(&self) -> bool {
        let mut installed = false;
        self.interceptors.get_or_init(|| {
            installed = true;
            let pipeline = Pipeline::new(self.transport.clone())
                .with(Arc::new(AttachBearer::new(self.token_holder.clone())))
                .with(Arc::new(RateLimitNotice::new(
                    self.notifier.clone(),
                    self.rate_limit_message.clone(),
                )))
                .with(Arc::new(RefreshOnUnauthorized::new(self.refresher.clone())));
            info!(stages = ?pipeline.stage_names(), "session interceptors installed");
            pipeline
        });
        installed
    }

    pub fn interceptors_installed(&self) -> bool {
        self.interceptors.get().is_some()
    }

    pub fn sign_in(&self, token: AccessToken) {
        self.token_holder.set(token);
    }

    /// Forgets the access token. The refresh cookie stays with the server.
    pub fn sign_out(&self) {
        self.token_holder.clear();
        info!("session signed out");
    }

    pub fn access_token(&self) -> Option<AccessToken> {
        self.token_holder.get()
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, SessionError> {
        let response = self.send(OutboundRequest::get(path)).await?;
        decode_body(&response)
    }

    pub async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, SessionError> {
        let body =
            serde_json::to_value(body).map_err(|e| SessionError::MalformedBody(e.to_string()))?;
        let response = self.send(OutboundRequest::post(path, body)).await?;
        decode_body(&response)
    }

    fn pipeline(&self) -> &Pipeline {
        self.interceptors.get().unwrap_or(&self.bare)
    }

    fn settle(&self, response: InboundResponse) -> Result<InboundResponse, SessionError> {
        if response.is_success() {
            return Ok(response);
        }
        match response.status {
            StatusCode::UNAUTHORIZED => Err(SessionError::Unauthorized),
            StatusCode::TOO_MANY_REQUESTS => Err(SessionError::RateLimited {
                message: response
                    .message()
                    .unwrap_or_else(|| self.rate_limit_message.clone()),
            }),
            status => Err(SessionError::Status {
                status,
                message: response.message(),
            }),
        }
    }
}

fn decode_body<T: DeserializeOwned>(response: &InboundResponse) -> Result<T, SessionError> {
    response
        .decode()
        .map_err(|e| SessionError::MalformedBody(e.to_string()))
}

#[async_trait::async_trait]
impl SessionClient for AuthSession {
    async fn send(&self, request: OutboundRequest) -> Result<InboundResponse, SessionError> {
        let span = info_span!(
            "request",
            id = %request.id,
            method = %request.method,
            path = %request.path
        );
        let response = self.pipeline().execute(request).instrument(span).await?;
        self.settle(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra_http::FakeTransport;
    use crate::infra_memory::{FakeNotifier, MemoryTokenHolder};
    use reqwest::header::AUTHORIZATION;
    use serde_json::json;
    use std::time::Duration;

    struct Harness {
        transport: Arc<FakeTransport>,
        holder: Arc<MemoryTokenHolder>,
        notifier: Arc<FakeNotifier>,
        session: AuthSession,
    }

    fn harness(token: Option<&str>, single_flight: bool) -> Harness {
        let transport = Arc::new(FakeTransport::new());
        let holder = Arc::new(match token {
            Some(token) => MemoryTokenHolder::with_token(AccessToken::new(token)),
            None => MemoryTokenHolder::new(),
        });
        let notifier = Arc::new(FakeNotifier::new());
        let refresher = Arc::new(RefreshCoordinator::new(
            transport.clone(),
            holder.clone(),
            single_flight,
        ));
        let session = AuthSession::new(
            transport.clone(),
            holder.clone(),
            refresher,
            notifier.clone(),
            DEFAULT_RATE_LIMIT_MESSAGE,
        );
        session.setup_interceptors();
        Harness {
            transport,
            holder,
            notifier,
            session,
        }
    }

    fn script_refresh(transport: &FakeTransport, csrf: &str, token: &str) {
        transport
            .respond_json(CSRF_TOKEN_PATH, StatusCode::OK, json!({ "csrfToken": csrf }))
            .respond_json(TOKEN_REFRESH_PATH, StatusCode::OK, json!({ "accessToken": token }));
    }

    fn authorization(request: &OutboundRequest) -> Option<String> {
        request
            .headers
            .get(AUTHORIZATION)
            .map(|v| v.to_str().unwrap().to_string())
    }

    #[tokio::test]
    async fn attaches_held_token() {
        let h = harness(Some("t1"), true);
        h.transport.respond_status("/jobs", StatusCode::OK);

        h.session.send(OutboundRequest::get("/jobs")).await.unwrap();

        let sent = h.transport.requests_to("/jobs");
        assert_eq!(authorization(&sent[0]).as_deref(), Some("Bearer t1"));
    }

    #[tokio::test]
    async fn post_json_sends_serialized_body() {
        #[derive(serde::Serialize)]
        struct NewMessage<'a> {
            text: &'a str,
        }

        let h = harness(Some("t1"), true);
        h.transport
            .respond_json("/chat/messages", StatusCode::CREATED, json!({ "id": 7 }));

        let created: serde_json::Value = h
            .session
            .post_json("/chat/messages", &NewMessage { text: "hello" })
            .await
            .unwrap();

        assert_eq!(created, json!({ "id": 7 }));
        let sent = h.transport.requests_to("/chat/messages");
        assert_eq!(sent[0].method, reqwest::Method::POST);
        assert_eq!(sent[0].body, Some(json!({ "text": "hello" })));
    }

    #[tokio::test]
    async fn sends_unauthenticated_without_token() {
        let h = harness(None, true);
        h.transport.respond_status("/jobs", StatusCode::OK);
        let request = OutboundRequest::get("/jobs").with_header(
            AUTHORIZATION,
            reqwest::header::HeaderValue::from_static("Bearer leftover"),
        );

        h.session.send(request).await.unwrap();

        assert_eq!(authorization(&h.transport.requests_to("/jobs")[0]), None);
    }

    #[tokio::test]
    async fn unauthorized_refreshes_once_and_retries_with_new_token() {
        let h = harness(Some("stale"), true);
        h.transport
            .respond_status("/jobs", StatusCode::UNAUTHORIZED)
            .respond_json("/jobs", StatusCode::OK, json!([{ "id": 1 }]));
        script_refresh(&h.transport, "abc", "new123");

        let jobs: serde_json::Value = h.session.get_json("/jobs").await.unwrap();

        assert_eq!(jobs, json!([{ "id": 1 }]));
        assert_eq!(h.transport.count(CSRF_TOKEN_PATH), 1);
        assert_eq!(h.transport.count(TOKEN_REFRESH_PATH), 1);
        let sent = h.transport.requests_to("/jobs");
        assert_eq!(sent.len(), 2);
        assert_eq!(authorization(&sent[0]).as_deref(), Some("Bearer stale"));
        assert_eq!(authorization(&sent[1]).as_deref(), Some("Bearer new123"));
        assert_eq!(sent[0].id, sent[1].id);
        assert_eq!(h.holder.get(), Some(AccessToken::new("new123")));
    }

    #[tokio::test]
    async fn second_unauthorized_is_not_refreshed_again() {
        let h = harness(Some("stale"), true);
        h.transport
            .respond_status("/jobs", StatusCode::UNAUTHORIZED)
            .respond_status("/jobs", StatusCode::UNAUTHORIZED);
        script_refresh(&h.transport, "abc", "new123");
        script_refresh(&h.transport, "def", "newer");

        let result = h.session.send(OutboundRequest::get("/jobs")).await;

        assert!(matches!(result, Err(SessionError::Unauthorized)));
        assert_eq!(h.transport.count(CSRF_TOKEN_PATH), 1);
        assert_eq!(h.transport.count(TOKEN_REFRESH_PATH), 1);
        assert_eq!(h.transport.count("/jobs"), 2);
    }

    #[tokio::test]
    async fn failed_refresh_surfaces_refresh_error_without_retry() {
        let h = harness(Some("stale"), true);
        h.transport
            .respond_status("/jobs", StatusCode::UNAUTHORIZED)
            .respond_json(CSRF_TOKEN_PATH, StatusCode::OK, json!({ "csrfToken": "abc" }))
            .respond_status(TOKEN_REFRESH_PATH, StatusCode::FORBIDDEN);

        let result = h.session.send(OutboundRequest::get("/jobs")).await;

        let Err(SessionError::RefreshFailed(RefreshError::RefreshRejected { status })) = result
        else {
            panic!("expected refresh failure, got {:?}", result);
        };
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(h.transport.count("/jobs"), 1);
    }

    #[tokio::test]
    async fn failed_csrf_fetch_surfaces_refresh_failure() {
        let h = harness(Some("stale"), true);
        h.transport
            .respond_status("/jobs", StatusCode::UNAUTHORIZED)
            .fail(CSRF_TOKEN_PATH, "connection reset");

        let result = h.session.send(OutboundRequest::get("/jobs")).await;

        assert!(matches!(
            result,
            Err(SessionError::RefreshFailed(RefreshError::CsrfFetchFailed(_)))
        ));
        assert!(result.unwrap_err().requires_reauthentication());
        assert_eq!(h.transport.count(TOKEN_REFRESH_PATH), 0);
    }

    #[tokio::test]
    async fn rate_limit_uses_server_message_and_never_refreshes() {
        let h = harness(Some("t1"), true);
        h.transport.respond_json(
            "/jobs",
            StatusCode::TOO_MANY_REQUESTS,
            json!({ "message": "Slow down" }),
        );

        let result = h.session.send(OutboundRequest::get("/jobs")).await;

        assert!(matches!(
            result,
            Err(SessionError::RateLimited { ref message }) if message == "Slow down"
        ));
        assert_eq!(h.notifier.messages(), vec!["Slow down"]);
        assert_eq!(h.transport.count(CSRF_TOKEN_PATH), 0);
        assert_eq!(h.transport.count("/jobs"), 1);
    }

    #[tokio::test]
    async fn rate_limit_without_message_uses_default() {
        let h = harness(Some("t1"), true);
        h.transport.respond_status("/jobs", StatusCode::TOO_MANY_REQUESTS);

        let result = h.session.send(OutboundRequest::get("/jobs")).await;

        assert!(matches!(
            result,
            Err(SessionError::RateLimited { ref message }) if message == DEFAULT_RATE_LIMIT_MESSAGE
        ));
        assert_eq!(h.notifier.messages(), vec![DEFAULT_RATE_LIMIT_MESSAGE]);
    }

    #[tokio::test]
    async fn rate_limited_retry_is_reported_as_rate_limit() {
        let h = harness(Some("stale"), true);
        h.transport
            .respond_status("/jobs", StatusCode::UNAUTHORIZED)
            .respond_status("/jobs", StatusCode::TOO_MANY_REQUESTS);
        script_refresh(&h.transport, "abc", "new123");

        let result = h.session.send(OutboundRequest::get("/jobs")).await;

        assert!(matches!(result, Err(SessionError::RateLimited { .. })));
        assert_eq!(h.notifier.messages().len(), 1);
    }

    #[tokio::test]
    async fn repeated_setup_installs_stages_once() {
        let h = harness(Some("stale"), true);
        assert!(!h.session.setup_interceptors());
        assert!(!h.session.setup_interceptors());
        h.transport
            .respond_status("/jobs", StatusCode::UNAUTHORIZED)
            .respond_status("/jobs", StatusCode::OK);
        script_refresh(&h.transport, "abc", "new123");
        script_refresh(&h.transport, "def", "newer");

        h.session.send(OutboundRequest::get("/jobs")).await.unwrap();

        assert_eq!(h.transport.count(CSRF_TOKEN_PATH), 1);
        assert_eq!(h.transport.count(TOKEN_REFRESH_PATH), 1);
    }

    #[tokio::test]
    async fn without_setup_requests_bypass_interceptors() {
        let transport = Arc::new(FakeTransport::new());
        let holder = Arc::new(MemoryTokenHolder::with_token(AccessToken::new("t1")));
        let refresher = Arc::new(RefreshCoordinator::new(
            transport.clone(),
            holder.clone(),
            true,
        ));
        let session = AuthSession::new(
            transport.clone(),
            holder,
            refresher,
            Arc::new(FakeNotifier::new()),
            DEFAULT_RATE_LIMIT_MESSAGE,
        );
        transport.respond_status("/jobs", StatusCode::UNAUTHORIZED);

        let result = session.send(OutboundRequest::get("/jobs")).await;

        assert!(!session.interceptors_installed());
        assert!(matches!(result, Err(SessionError::Unauthorized)));
        assert_eq!(authorization(&transport.requests_to("/jobs")[0]), None);
        assert_eq!(transport.count(CSRF_TOKEN_PATH), 0);
    }

    #[tokio::test]
    async fn concurrent_unauthorized_share_one_refresh() {
        let h = harness(Some("stale"), true);
        h.transport
            .delay(CSRF_TOKEN_PATH, Duration::from_millis(20))
            .respond_status("/jobs", StatusCode::UNAUTHORIZED)
            .respond_status("/jobs", StatusCode::UNAUTHORIZED)
            .respond_status("/jobs", StatusCode::OK)
            .respond_status("/jobs", StatusCode::OK);
        script_refresh(&h.transport, "abc", "new123");
        script_refresh(&h.transport, "def", "newer");

        let (a, b) = tokio::join!(
            h.session.send(OutboundRequest::get("/jobs")),
            h.session.send(OutboundRequest::get("/jobs")),
        );

        assert!(a.is_ok());
        assert!(b.is_ok());
        assert_eq!(h.transport.count(CSRF_TOKEN_PATH), 1);
        assert_eq!(h.transport.count(TOKEN_REFRESH_PATH), 1);
        let retried: Vec<_> = h.transport.requests_to("/jobs")[2..]
            .iter()
            .map(authorization)
            .collect();
        assert_eq!(
            retried,
            vec![Some("Bearer new123".to_string()), Some("Bearer new123".to_string())]
        );
    }

    #[tokio::test]
    async fn concurrent_unauthorized_share_one_rejected_refresh() {
        let h = harness(Some("stale"), true);
        h.transport
            .delay(CSRF_TOKEN_PATH, Duration::from_millis(20))
            .respond_status("/jobs", StatusCode::UNAUTHORIZED)
            .respond_status("/jobs", StatusCode::UNAUTHORIZED)
            .respond_status("/jobs", StatusCode::UNAUTHORIZED)
            .respond_json(CSRF_TOKEN_PATH, StatusCode::OK, json!({ "csrfToken": "abc" }))
            .respond_status(TOKEN_REFRESH_PATH, StatusCode::FORBIDDEN);

        let (a, b, c) = tokio::join!(
            h.session.send(OutboundRequest::get("/jobs")),
            h.session.send(OutboundRequest::get("/jobs")),
            h.session.send(OutboundRequest::get("/jobs")),
        );

        for result in [a, b, c] {
            assert!(matches!(
                result,
                Err(SessionError::RefreshFailed(RefreshError::RefreshRejected { .. }))
            ));
        }
        assert_eq!(h.transport.count(CSRF_TOKEN_PATH), 1);
        assert_eq!(h.transport.count(TOKEN_REFRESH_PATH), 1);
        assert_eq!(h.transport.count("/jobs"), 3);
    }

    #[tokio::test]
    async fn refresh_network_failure_is_not_retried() {
        let h = harness(Some("stale"), true);
        h.transport
            .respond_status("/jobs", StatusCode::UNAUTHORIZED)
            .respond_json(CSRF_TOKEN_PATH, StatusCode::OK, json!({ "csrfToken": "abc" }))
            .fail(TOKEN_REFRESH_PATH, "connection reset");

        let result = h.session.send(OutboundRequest::get("/jobs")).await;

        let Err(error) = result else {
            panic!("expected refresh failure, got {:?}", result);
        };
        assert!(matches!(
            error,
            SessionError::RefreshFailed(RefreshError::Transport(_))
        ));
        assert!(error.requires_reauthentication());
        assert_eq!(h.transport.count("/jobs"), 1);
        assert_eq!(h.session.access_token(), Some(AccessToken::new("stale")));
    }

    #[tokio::test]
    async fn concurrent_unauthorized_refresh_independently_without_single_flight() {
        let h = harness(Some("stale"), false);
        h.transport
            .delay(CSRF_TOKEN_PATH, Duration::from_millis(20))
            .respond_status("/jobs", StatusCode::UNAUTHORIZED)
            .respond_status("/jobs", StatusCode::UNAUTHORIZED)
            .respond_status("/jobs", StatusCode::OK)
            .respond_status("/jobs", StatusCode::OK);
        script_refresh(&h.transport, "abc", "new123");
        script_refresh(&h.transport, "def", "newer");

        let (a, b) = tokio::join!(
            h.session.send(OutboundRequest::get("/jobs")),
            h.session.send(OutboundRequest::get("/jobs")),
        );

        assert!(a.is_ok());
        assert!(b.is_ok());
        assert_eq!(h.transport.count(CSRF_TOKEN_PATH), 2);
        assert_eq!(h.transport.count(TOKEN_REFRESH_PATH), 2);
    }

    #[tokio::test]
    async fn network_failure_is_propagated() {
        let h = harness(Some("t1"), true);
        h.transport.fail("/jobs", "connection refused");

        let result = h.session.send(OutboundRequest::get("/jobs")).await;

        assert!(matches!(result, Err(SessionError::NetworkFailure(_))));
    }

    #[tokio::test]
    async fn other_errors_pass_through_with_status() {
        let h = harness(Some("t1"), true);
        h.transport.respond_json(
            "/jobs",
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({ "message": "boom" }),
        );

        let result = h.session.send(OutboundRequest::get("/jobs")).await;

        let Err(SessionError::Status { status, message }) = result else {
            panic!("expected status error, got {:?}", result);
        };
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(message.as_deref(), Some("boom"));
        assert_eq!(h.transport.count(CSRF_TOKEN_PATH), 0);
    }

    #[tokio::test]
    async fn sign_out_sends_next_request_unauthenticated() {
        let h = harness(None, true);
        h.transport
            .respond_status("/jobs", StatusCode::OK)
            .respond_status("/jobs", StatusCode::OK);

        h.session.sign_in(AccessToken::new("t1"));
        h.session.send(OutboundRequest::get("/jobs")).await.unwrap();
        h.session.sign_out();
        h.session.send(OutboundRequest::get("/jobs")).await.unwrap();

        let sent = h.transport.requests_to("/jobs");
        assert_eq!(authorization(&sent[0]).as_deref(), Some("Bearer t1"));
        assert_eq!(authorization(&sent[1]), None);
        assert!(h.session.access_token().is_none());
    }

    #[tokio::test]
    async fn malformed_success_body_is_reported() {
        let h = harness(Some("t1"), true);
        h.transport
            .respond("/jobs", InboundResponse::new(StatusCode::OK, "not json"));

        let result: Result<Vec<u32>, _> = h.session.get_json("/jobs").await;

        assert!(matches!(result, Err(SessionError::MalformedBody(_))));
    }
}
