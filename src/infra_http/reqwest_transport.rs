use crate::domain_model::*;
use crate::domain_port::*;
use reqwest::{Client, Url};
use tracing::debug;

/// HTTP transport backed by `reqwest` with a cookie jar, so the HTTP-only
/// refresh cookie set by the server is sent back on every call.
pub struct ReqwestTransport {
    client: Client,
    base_url: Url,
}

impl ReqwestTransport {
    pub fn new(base_url: &str) -> Result<Self, TransportError> {
        let base_url =
            Url::parse(base_url).map_err(|e| TransportError::InvalidUrl(e.to_string()))?;
        let client = Client::builder()
            .cookie_store(true)
            .build()
            .map_err(|e| TransportError::Request(e.to_string()))?;
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, TransportError> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let url = format!("{}/{}", base, path.trim_start_matches('/'));
        Url::parse(&url).map_err(|e| TransportError::InvalidUrl(e.to_string()))
    }
}

#[async_trait::async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, request: &OutboundRequest) -> Result<InboundResponse, TransportError> {
        let url = self.endpoint(&request.path)?;
        let mut builder = self
            .client
            .request(request.method.clone(), url)
            .headers(request.headers.clone());
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::Body(e.to_string()))?;
        debug!(%status, bytes = body.len(), "response received");

        Ok(InboundResponse {
            status,
            headers,
            body: body.to_vec(),
        })
    }
}
