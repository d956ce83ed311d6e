use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::prompt::{DEFAULT_MAX_TOKENS, DEFAULT_MODEL};
use crate::util::is_local_endpoint_url;

const DEFAULT_API_URL: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_ANTHROPIC_VERSION: &str = "2023-06-01";
const MIN_MAX_TOKENS: u32 = 16;
const MAX_MAX_TOKENS: u32 = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiProtocol {
    OpenAiChatCompletions,
    AnthropicMessages,
}

impl ApiProtocol {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "anthropic" | "anthropic_messages" | "messages" | "v1/messages" => {
                Some(Self::AnthropicMessages)
            }
            "openai" | "chat" | "chat_completions" | "openai_chat_completions" => {
                Some(Self::OpenAiChatCompletions)
            }
            _ => None,
        }
    }

    pub fn infer(api_url: &str) -> Self {
        let normalized = api_url.trim().to_ascii_lowercase();
        if normalized.trim_end_matches('/').ends_with("/messages") {
            Self::AnthropicMessages
        } else {
            Self::OpenAiChatCompletions
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub api_key: Option<String>,
    pub model: String,
    pub api_url: String,
    pub api_protocol: ApiProtocol,
    pub anthropic_version: String,
    pub max_tokens: u32,
    /// `None` keeps the historical behavior: a reply that never settles
    /// leaves the call waiting forever.
    pub reply_timeout: Option<Duration>,
}

impl Config {
    pub fn load() -> Result<Self> {
        let api_url =
            std::env::var("CALLAGENT_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());
        let api_key = std::env::var("CALLAGENT_API_KEY").ok().and_then(|v| {
            if v.trim().is_empty() {
                None
            } else {
                Some(v)
            }
        });
        let model =
            std::env::var("CALLAGENT_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let api_protocol = std::env::var("CALLAGENT_API_PROTOCOL")
            .ok()
            .and_then(|v| ApiProtocol::parse(&v))
            .unwrap_or_else(|| ApiProtocol::infer(&api_url));
        let anthropic_version = std::env::var("CALLAGENT_ANTHROPIC_VERSION")
            .unwrap_or_else(|_| DEFAULT_ANTHROPIC_VERSION.to_string());
        let max_tokens = resolve_max_tokens();
        let reply_timeout = resolve_reply_timeout();

        Ok(Self {
            api_key,
            model,
            api_url,
            api_protocol,
            anthropic_version,
            max_tokens,
            reply_timeout,
        })
    }

    pub fn validate(&self) -> Result<()> {
        if !self.api_url.starts_with("http://") && !self.api_url.starts_with("https://") {
            bail!(
                "Invalid CALLAGENT_API_URL '{}': expected http:// or https:// URL",
                self.api_url
            );
        }

        if !self.is_local_endpoint() && self.api_key.is_none() {
            bail!(
                "CALLAGENT_API_KEY must be set for non-local endpoints (url: '{}')",
                self.api_url
            );
        }

        if self.model.trim().is_empty() {
            bail!("CALLAGENT_MODEL must not be empty");
        }

        Ok(())
    }

    pub fn is_local_endpoint(&self) -> bool {
        is_local_endpoint_url(&self.api_url)
    }
}

fn resolve_max_tokens() -> u32 {
    std::env::var("CALLAGENT_MAX_TOKENS")
        .ok()
        .and_then(|v| v.trim().parse::<u32>().ok())
        .map(|v| v.clamp(MIN_MAX_TOKENS, MAX_MAX_TOKENS))
        .unwrap_or(DEFAULT_MAX_TOKENS)
}

fn resolve_reply_timeout() -> Option<Duration> {
    std::env::var("CALLAGENT_REPLY_TIMEOUT_SECS")
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
}
