use crate::domain_model::*;
use crate::domain_port::*;
use reqwest::StatusCode;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

enum Scripted {
    Respond(InboundResponse),
    Fail(String),
}

/// In-memory transport answering from per-path queues of scripted replies.
///
/// Every request is recorded. A path with no reply left answers 404.
#[derive(Default)]
pub struct FakeTransport {
    replies: Mutex<HashMap<String, VecDeque<Scripted>>>,
    delays: Mutex<HashMap<String, Duration>>,
    received: Mutex<Vec<OutboundRequest>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, path: &str, response: InboundResponse) -> &Self {
        self.push(path, Scripted::Respond(response));
        self
    }

    pub fn respond_json(&self, path: &str, status: StatusCode, body: serde_json::Value) -> &Self {
        self.respond(path, InboundResponse::json(status, &body))
    }

    pub fn respond_status(&self, path: &str, status: StatusCode) -> &Self {
        self.respond(path, InboundResponse::empty(status))
    }

    pub fn fail(&self, path: &str, reason: &str) -> &Self {
        self.push(path, Scripted::Fail(reason.to_string()));
        self
    }

    /// Suspends every call to `path` for `delay` before answering.
    pub fn delay(&self, path: &str, delay: Duration) -> &Self {
        self.delays
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.to_string(), delay);
        self
    }

    pub fn requests(&self) -> Vec<OutboundRequest> {
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<OutboundRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.path == path)
            .collect()
    }

    pub fn count(&self, path: &str) -> usize {
        self.requests_to(path).len()
    }

    fn push(&self, path: &str, reply: Scripted) {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(path.to_string())
            .or_default()
            .push_back(reply);
    }
}

#[async_trait::async_trait]
impl Transport for FakeTransport {
    async fn execute(&self, request: &OutboundRequest) -> Result<InboundResponse, TransportError> {
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());

        let delay = self
            .delays
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&request.path)
            .copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let reply = self
            .replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(&request.path)
            .and_then(VecDeque::pop_front);
        match reply {
            Some(Scripted::Respond(response)) => Ok(response),
            Some(Scripted::Fail(reason)) => Err(TransportError::Request(reason)),
            None => Ok(InboundResponse::empty(StatusCode::NOT_FOUND)),
        }
    }
}
