use super::logging::{debug_payload_enabled, emit_debug_payload};
use super::service::{CompletionService, FragmentStream};
use super::stream::{fragment_stream, ByteStream};
use crate::config::{ApiProtocol, Config};
use crate::types::{ApiMessage, CompletionRequest};
use crate::util::is_local_endpoint_url;
use anyhow::anyhow;
use anyhow::Result;
use futures::StreamExt;
use serde_json::json;
use serde_json::Value;

/// reqwest-backed client for a hosted streaming completion endpoint.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    api_key: Option<String>,
    api_url: String,
    anthropic_version: String,
    api_protocol: ApiProtocol,
}

impl ApiClient {
    pub fn new(config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|error| anyhow!("failed to build HTTP client: {error}"))?;

        Ok(Self {
            http,
            api_key: config.api_key.clone(),
            api_url: config.api_url.clone(),
            anthropic_version: config.anthropic_version.clone(),
            api_protocol: config.api_protocol,
        })
    }

    pub fn protocol(&self) -> ApiProtocol {
        self.api_protocol
    }

    pub fn is_local_endpoint(&self) -> bool {
        is_local_endpoint_url(&self.api_url)
    }

    pub async fn create_stream(&self, request: &CompletionRequest) -> Result<ByteStream> {
        let request_url = self.request_url();
        let payload = build_payload(request);

        let mut http_request = self
            .http
            .post(&request_url)
            .header("content-type", "application/json")
            .header("accept", "text/event-stream")
            .json(&payload);

        if debug_payload_enabled() {
            emit_debug_payload(&request_url, &payload);
        }

        match self.api_protocol {
            ApiProtocol::AnthropicMessages => {
                if let Some(api_key) = &self.api_key {
                    http_request = http_request.header("x-api-key", api_key);
                }
                if !self.anthropic_version.trim().is_empty() {
                    http_request =
                        http_request.header("anthropic-version", &self.anthropic_version);
                }
            }
            ApiProtocol::OpenAiChatCompletions => {
                if let Some(api_key) = &self.api_key {
                    http_request =
                        http_request.header("authorization", format!("Bearer {api_key}"));
                }
            }
        }

        let response = http_request
            .send()
            .await
            .map_err(|error| map_api_request_error(error, &request_url))?
            .error_for_status()
            .map_err(|error| map_api_request_error(error, &request_url))?;

        let request_url_for_stream = request_url.clone();
        let stream = response.bytes_stream().map(move |item| {
            item.map_err(|error| map_api_request_error(error, &request_url_for_stream))
        });
        Ok(Box::pin(stream))
    }

    fn request_url(&self) -> String {
        match self.api_protocol {
            ApiProtocol::AnthropicMessages => self.api_url.clone(),
            ApiProtocol::OpenAiChatCompletions => {
                adapt_to_openai_chat_completions_url(&self.api_url)
            }
        }
    }
}

impl CompletionService for ApiClient {
    async fn stream_text(&self, request: &CompletionRequest) -> Result<FragmentStream> {
        let bytes = self.create_stream(request).await?;
        Ok(fragment_stream(bytes))
    }
}

fn build_payload(request: &CompletionRequest) -> Value {
    // Both protocols accept the same single-turn body.
    json!({
        "model": request.model,
        "max_tokens": request.max_tokens,
        "stream": true,
        "messages": [ApiMessage::user(request.prompt.clone())],
    })
}

fn map_api_request_error(error: reqwest::Error, request_url: &str) -> anyhow::Error {
    if error.is_connect() && is_local_endpoint_url(request_url) {
        return anyhow!(
            "cannot reach local completion endpoint '{}': {}. Start your local server or update CALLAGENT_API_URL.",
            request_url,
            error
        );
    }
    if error.is_connect() {
        return anyhow!("cannot reach completion endpoint '{}': {}", request_url, error);
    }
    if error.is_timeout() {
        return anyhow!("completion request to '{}' timed out: {}", request_url, error);
    }
    if let Some(status) = error.status() {
        return anyhow!(
            "completion endpoint '{}' returned HTTP {}: {}",
            request_url,
            status,
            error
        );
    }
    anyhow!("completion request to '{}' failed: {}", request_url, error)
}

fn adapt_to_openai_chat_completions_url(api_url: &str) -> String {
    let normalized = api_url.trim_end_matches('/');
    if normalized.ends_with("/chat/completions") {
        return normalized.to_string();
    }
    if let Some(prefix) = normalized.strip_suffix("/messages") {
        return format!("{prefix}/chat/completions");
    }
    if normalized.ends_with("/v1") {
        return format!("{normalized}/chat/completions");
    }
    normalized.to_string()
}
