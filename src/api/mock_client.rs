use super::service::{CompletionService, FragmentStream};
use super::stream::{fragment_stream, ByteStream};
use crate::types::CompletionRequest;
use anyhow::{anyhow, Result};
use bytes::Bytes;
use futures::{stream, StreamExt};
use std::sync::{Arc, Mutex, MutexGuard};

/// One scripted answer from [`MockCompletionService`].
#[derive(Debug, Clone)]
pub enum MockReply {
    Fragments(Vec<String>),
    /// Raw SSE frames, decoded through the real stream parser.
    Sse(Vec<String>),
    FailBeforeStream(String),
    FailAfter(Vec<String>, String),
    /// Delivers the fragments and then never settles.
    Hang(Vec<String>),
}

impl MockReply {
    pub fn fragments<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Fragments(fragments.into_iter().map(Into::into).collect())
    }
}

#[derive(Clone, Default)]
pub struct MockCompletionService {
    replies: Arc<Mutex<Vec<MockReply>>>,
    requests: Arc<Mutex<Vec<CompletionRequest>>>,
}

impl MockCompletionService {
    pub fn new(replies: Vec<MockReply>) -> Self {
        Self {
            replies: Arc::new(Mutex::new(replies)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        lock(&self.requests).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.requests).len()
    }

    fn next_reply(&self, request: &CompletionRequest) -> Result<MockReply> {
        lock(&self.requests).push(request.clone());
        let mut replies = lock(&self.replies);
        if replies.is_empty() {
            return Err(anyhow!(
                "MockCompletionService: No more replies configured"
            ));
        }
        Ok(replies.remove(0))
    }
}

impl CompletionService for MockCompletionService {
    async fn stream_text(&self, request: &CompletionRequest) -> Result<FragmentStream> {
        let stream: FragmentStream = match self.next_reply(request)? {
            MockReply::Fragments(fragments) => Box::pin(stream::iter(
                fragments.into_iter().map(Ok).collect::<Vec<_>>(),
            )),
            MockReply::Sse(frames) => fragment_stream(sse_byte_stream(frames)),
            MockReply::FailBeforeStream(message) => return Err(anyhow!(message)),
            MockReply::FailAfter(fragments, message) => {
                let mut items: Vec<Result<String>> = fragments.into_iter().map(Ok).collect();
                items.push(Err(anyhow!(message)));
                Box::pin(stream::iter(items))
            }
            MockReply::Hang(fragments) => Box::pin(
                stream::iter(fragments.into_iter().map(Ok).collect::<Vec<_>>())
                    .chain(stream::pending()),
            ),
        };
        Ok(stream)
    }
}

fn sse_byte_stream(frames: Vec<String>) -> ByteStream {
    let chunks: Vec<Result<Bytes>> = frames
        .into_iter()
        .map(|s| {
            let framed = if s.ends_with("\n\n") {
                s
            } else {
                format!("{s}\n\n")
            };
            Ok(Bytes::from(framed))
        })
        .collect();

    Box::pin(stream::iter(chunks))
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> CompletionRequest {
        CompletionRequest {
            prompt: "prompt".to_string(),
            model: "mock-model".to_string(),
            max_tokens: 150,
        }
    }

    #[tokio::test]
    async fn test_mock_replays_scripts_in_order_and_records_requests() {
        let mock = MockCompletionService::new(vec![
            MockReply::fragments(["a", "b"]),
            MockReply::FailBeforeStream("offline".to_string()),
        ]);

        let first = mock
            .stream_text(&request())
            .await
            .expect("first script streams");
        let fragments: Vec<String> = first.map(|item| item.expect("fragment")).collect().await;
        assert_eq!(fragments, vec!["a", "b"]);

        assert!(mock.stream_text(&request()).await.is_err());
        assert!(mock.stream_text(&request()).await.is_err());
        assert_eq!(mock.call_count(), 3);
        assert_eq!(mock.requests()[0].model, "mock-model");
    }

    #[tokio::test]
    async fn test_mock_sse_script_goes_through_parser() {
        let mock = MockCompletionService::new(vec![MockReply::Sse(vec![
            r#"data: {"choices":[{"delta":{"content":"Hi"}}]}"#.to_string(),
            "data: [DONE]".to_string(),
        ])]);

        let stream = mock.stream_text(&request()).await.expect("stream");
        let fragments: Vec<String> = stream.map(|item| item.expect("fragment")).collect().await;
        assert_eq!(fragments, vec!["Hi"]);
    }
}
