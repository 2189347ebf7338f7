use crate::application_port::SessionError;
use crate::domain_model::*;
use crate::domain_port::Transport;
use futures_util::future::BoxFuture;
use std::sync::Arc;

pub type PipelineResult = Result<InboundResponse, SessionError>;

/// One stage of the request pipeline.
///
/// A stage may rewrite the request, hand it to the rest of the pipeline with
/// [`Next::run`], inspect the outcome, or start the request over from the
/// first stage with [`Next::replay`].
#[async_trait::async_trait]
pub trait Middleware: Send + Sync {
    fn name(&self) -> &'static str;
    async fn handle(&self, request: OutboundRequest, next: Next<'_>) -> PipelineResult;
}

#[derive(Clone, Copy)]
pub struct Next<'a> {
    pipeline: &'a Pipeline,
    index: usize,
}

impl<'a> Next<'a> {
    /// Passes the request to the following stage, or to the transport.
    pub fn run(self, request: OutboundRequest) -> BoxFuture<'a, PipelineResult> {
        self.pipeline.dispatch(request, self.index)
    }

    /// Sends the request through every stage again, starting from the first.
    pub fn replay(self, request: OutboundRequest) -> BoxFuture<'a, PipelineResult> {
        self.pipeline.dispatch(request, 0)
    }
}

/// Ordered middleware stages terminated by a transport.
pub struct Pipeline {
    stages: Vec<Arc<dyn Middleware>>,
    transport: Arc<dyn Transport>,
}

impl Pipeline {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            stages: Vec::new(),
            transport,
        }
    }

    pub fn with(mut self, stage: Arc<dyn Middleware>) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    pub fn execute(&self, request: OutboundRequest) -> BoxFuture<'_, PipelineResult> {
        self.dispatch(request, 0)
    }

    fn dispatch(&self, request: OutboundRequest, index: usize) -> BoxFuture<'_, PipelineResult> {
        match self.stages.get(index) {
            Some(stage) => stage.handle(
                request,
                Next {
                    pipeline: self,
                    index: index + 1,
                },
            ),
            None => Box::pin(async move {
                let response = self.transport.execute(&request).await?;
                Ok(response)
            }),
        }
    }
}
