use crate::domain_model::AccessToken;
use nanoid::nanoid;
use reqwest::header::{
    AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, InvalidHeaderValue,
};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use std::fmt;

const REQUEST_ID_ALPHABET: [char; 16] = [
    '1', '2', '3', '4', '5', '6', '7', '8', '9', '0', 'a', 'b', 'c', 'd', 'e', 'f',
];

/// Identifies one logical request across its retry, for log correlation only.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn generate() -> Self {
        Self(nanoid!(10, &REQUEST_ID_ALPHABET))
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A request as it travels through the pipeline.
///
/// Besides what goes on the wire it carries the token it was authorized with
/// and the retry marker, which is set at most once per logical request.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub id: RequestId,
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub body: Option<serde_json::Value>,
    bearer: Option<AccessToken>,
    retried: bool,
}

impl OutboundRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            id: RequestId::generate(),
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            body: None,
            bearer: None,
            retried: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self::new(Method::POST, path).with_body(body)
    }

    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Sets `Authorization: Bearer <token>` and remembers which token was used.
    pub fn attach_bearer(&mut self, token: &AccessToken) -> Result<(), InvalidHeaderValue> {
        let mut value = HeaderValue::from_str(&token.bearer())?;
        value.set_sensitive(true);
        self.headers.insert(AUTHORIZATION, value);
        self.bearer = Some(token.clone());
        Ok(())
    }

    pub fn detach_bearer(&mut self) {
        self.headers.remove(AUTHORIZATION);
        self.bearer = None;
    }

    pub fn bearer(&self) -> Option<&AccessToken> {
        self.bearer.as_ref()
    }

    pub fn is_retry(&self) -> bool {
        self.retried
    }

    /// Returns `false` when the marker was already set.
    pub fn mark_retry(&mut self) -> bool {
        !std::mem::replace(&mut self.retried, true)
    }
}

#[derive(Debug, Clone)]
pub struct InboundResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl InboundResponse {
    pub fn new(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    pub fn empty(status: StatusCode) -> Self {
        Self::new(status, Vec::new())
    }

    pub fn json(status: StatusCode, value: &serde_json::Value) -> Self {
        let mut response = Self::new(status, value.to_string());
        response
            .headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        response
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// The server-supplied `message` field of a JSON error body, if any.
    pub fn message(&self) -> Option<String> {
        let value: serde_json::Value = self.decode().ok()?;
        value
            .get("message")
            .and_then(|m| m.as_str())
            .filter(|m| !m.is_empty())
            .map(str::to_owned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn retry_marker_is_set_once() {
        let mut request = OutboundRequest::get("/jobs");
        assert!(!request.is_retry());
        assert!(request.mark_retry());
        assert!(!request.mark_retry());
        assert!(request.is_retry());
    }

    #[test]
    fn attach_and_detach_bearer() {
        let mut request = OutboundRequest::get("/jobs");
        request.attach_bearer(&AccessToken::new("t1")).unwrap();
        assert_eq!(request.headers[AUTHORIZATION], "Bearer t1");
        assert_eq!(request.bearer(), Some(&AccessToken::new("t1")));

        request.detach_bearer();
        assert!(request.headers.get(AUTHORIZATION).is_none());
        assert!(request.bearer().is_none());
    }

    #[test]
    fn message_reads_non_empty_string_field() {
        let status = StatusCode::TOO_MANY_REQUESTS;
        let with = InboundResponse::json(status, &json!({"message": "slow down"}));
        let blank = InboundResponse::json(status, &json!({"message": ""}));
        let plain = InboundResponse::new(status, "busy");

        assert_eq!(with.message().as_deref(), Some("slow down"));
        assert_eq!(blank.message(), None);
        assert_eq!(plain.message(), None);
    }
}
