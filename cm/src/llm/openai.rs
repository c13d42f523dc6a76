//! OpenAI-compatible chat completions provider
//!
//! Works against OpenAI itself and any server exposing the same
//! `/v1/chat/completions` contract (set `base-url` accordingly).

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use super::http::Transport;
use super::{CompletionRequest, CompletionResponse, LlmClient, LlmError, StopReason, TokenUsage};
use crate::config::LlmConfig;

/// Chat completions over HTTP
pub struct OpenAIClient {
    transport: Transport,
    model: String,
    token_ceiling: u32,
    temperature: Option<f32>,
}

impl OpenAIClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        debug!(model = %config.model, "OpenAIClient::from_config: called");
        let key = config.get_api_key().map_err(|e| LlmError::Config(e.to_string()))?;
        let auth = [("authorization", format!("Bearer {}", key))];
        let transport = Transport::new(config, "/v1/chat/completions", &auth)?;
        Ok(Self {
            transport,
            model: config.model.clone(),
            token_ceiling: config.max_tokens,
            temperature: config.temperature,
        })
    }

    /// Reasoning models only accept `max_completion_tokens`
    fn token_field(&self) -> &'static str {
        let reasoning = ["o1", "o3", "o4", "gpt-5"].iter().any(|p| self.model.starts_with(p));
        if reasoning { "max_completion_tokens" } else { "max_tokens" }
    }

    fn payload(&self, request: &CompletionRequest) -> Value {
        let system = (!request.system_prompt.is_empty())
            .then(|| json!({ "role": "system", "content": request.system_prompt }));
        let turns: Vec<Value> = system
            .into_iter()
            .chain(
                request
                    .messages
                    .iter()
                    .map(|m| json!({ "role": m.role.as_str(), "content": m.content })),
            )
            .collect();
        debug!(model = %self.model, turns = turns.len(), "OpenAIClient::payload: called");

        let mut payload = json!({ "model": self.model, "messages": turns });
        payload[self.token_field()] = json!(request.max_tokens.min(self.token_ceiling));
        if let Some(t) = request.temperature.or(self.temperature) {
            payload["temperature"] = json!(t);
        }
        payload
    }
}

impl ChatReply {
    fn into_response(self) -> CompletionResponse {
        let first = self.choices.into_iter().next();
        let stop_reason = StopReason::from_openai(first.as_ref().and_then(|c| c.finish_reason.as_deref()));
        CompletionResponse {
            content: first.and_then(|c| c.message.content),
            stop_reason,
            usage: TokenUsage::new(self.usage.prompt_tokens, self.usage.completion_tokens),
        }
    }
}

#[async_trait]
impl LlmClient for OpenAIClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        debug!(model = %self.model, "OpenAIClient::complete: called");
        let reply: ChatReply = self.transport.post(&self.payload(&request)).await?;
        Ok(reply.into_response())
    }
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: ChatUsage,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChatUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}
