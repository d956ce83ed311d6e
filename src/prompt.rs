use crate::types::CompletionRequest;
use serde::{Deserialize, Serialize};

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_MAX_TOKENS: u32 = 150;

/// Static facts about the call the assistant is placing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallContext {
    pub business_name: String,
    pub business_phone: String,
    /// How the other party is labelled in the transcript and the prompt.
    pub counterparty_label: String,
    /// What the assistant is doing, e.g. "talking to a restaurant to place a pizza order".
    pub task: String,
    pub details: String,
}

impl CallContext {
    pub fn pizza_order() -> Self {
        Self {
            business_name: "Tony's Pizza".to_string(),
            business_phone: "(555) 123-PIZZA".to_string(),
            counterparty_label: "Restaurant".to_string(),
            task: "talking to a restaurant to place a pizza order".to_string(),
            details: "You are ordering for your user who wants a large pepperoni pizza and Caesar salad for delivery.".to_string(),
        }
    }

    pub fn status_line(&self, connected: bool) -> String {
        if connected {
            format!("Connected - {}", self.business_name)
        } else {
            "Connecting...".to_string()
        }
    }
}

impl Default for CallContext {
    fn default() -> Self {
        Self::pizza_order()
    }
}

pub fn build_reply_prompt(utterance: &str, context: &CallContext) -> String {
    format!(
        "You are an AI assistant making a phone call on behalf of your user. You are currently {task}. \n\
         \n\
         Context: {details}\n\
         \n\
         {label} just said: \"{utterance}\"\n\
         \n\
         Respond naturally and conversationally as if you're on a phone call. Keep responses concise and natural.",
        task = context.task,
        details = context.details,
        label = context.counterparty_label,
    )
}

pub fn reply_request(
    utterance: &str,
    context: &CallContext,
    model: &str,
    max_tokens: u32,
) -> CompletionRequest {
    CompletionRequest {
        prompt: build_reply_prompt(utterance, context),
        model: model.to_string(),
        max_tokens,
    }
}
