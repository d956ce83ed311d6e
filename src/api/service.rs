use crate::types::CompletionRequest;
use anyhow::Result;
use futures::Stream;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Text fragments of one completion, in arrival order. Exhaustion means the
/// service finished normally; an `Err` item means it failed mid-stream.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Hosted streaming text-generation API.
///
/// The outer future fails when the request cannot be started at all. No
/// cancellation handle is offered; callers that need one race the stream
/// against their own signal.
pub trait CompletionService: Send + Sync {
    fn stream_text(
        &self,
        request: &CompletionRequest,
    ) -> impl Future<Output = Result<FragmentStream>> + Send;
}

impl<T: CompletionService> CompletionService for Arc<T> {
    fn stream_text(
        &self,
        request: &CompletionRequest,
    ) -> impl Future<Output = Result<FragmentStream>> + Send {
        self.as_ref().stream_text(request)
    }
}
