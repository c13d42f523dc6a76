//! Anthropic Messages API provider

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use super::http::Transport;
use super::{CompletionRequest, CompletionResponse, LlmClient, LlmError, Role, StopReason, TokenUsage};
use crate::config::LlmConfig;

const API_VERSION: &str = "2023-06-01";

/// Messages API over HTTP
pub struct AnthropicClient {
    transport: Transport,
    model: String,
    token_ceiling: u32,
    temperature: Option<f32>,
}

impl AnthropicClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        debug!(model = %config.model, "AnthropicClient::from_config: called");
        let key = config.get_api_key().map_err(|e| LlmError::Config(e.to_string()))?;
        let transport = Transport::new(
            config,
            "/v1/messages",
            &[("x-api-key", key), ("anthropic-version", API_VERSION.to_string())],
        )?;
        Ok(Self {
            transport,
            model: config.model.clone(),
            token_ceiling: config.max_tokens,
            temperature: config.temperature,
        })
    }

    /// The API has no system role inside `messages`, so system turns join
    /// the top-level `system` string.
    fn payload(&self, request: &CompletionRequest) -> Value {
        let (system_turns, turns): (Vec<_>, Vec<_>) = request.messages.iter().partition(|m| m.role == Role::System);
        debug!(model = %self.model, turns = turns.len(), "AnthropicClient::payload: called");

        let system: Vec<&str> = std::iter::once(request.system_prompt.as_str())
            .chain(system_turns.iter().map(|m| m.content.as_str()))
            .filter(|s| !s.is_empty())
            .collect();
        let turns: Vec<Value> = turns
            .iter()
            .map(|m| json!({ "role": m.role.as_str(), "content": m.content }))
            .collect();

        let mut payload = json!({
            "model": self.model,
            "max_tokens": request.max_tokens.min(self.token_ceiling),
            "messages": turns,
        });
        if !system.is_empty() {
            payload["system"] = json!(system.join("\n"));
        }
        if let Some(t) = request.temperature.or(self.temperature) {
            payload["temperature"] = json!(t);
        }
        payload
    }
}

impl MessagesReply {
    fn into_response(self) -> CompletionResponse {
        let text: Vec<String> = self
            .content
            .into_iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text),
                ContentBlock::Other => None,
            })
            .collect();
        CompletionResponse {
            content: (!text.is_empty()).then(|| text.concat()),
            stop_reason: StopReason::from_anthropic(self.stop_reason.as_deref().unwrap_or("end_turn")),
            usage: TokenUsage::new(self.usage.input_tokens, self.usage.output_tokens),
        }
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        debug!(model = %self.model, "AnthropicClient::complete: called");
        let reply: MessagesReply = self.transport.post(&self.payload(&request)).await?;
        Ok(reply.into_response())
    }
}

#[derive(Debug, Deserialize)]
struct MessagesReply {
    #[serde(default)]
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
    #[serde(default)]
    usage: MessagesUsage,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Default, Deserialize)]
struct MessagesUsage {
    input_tokens: u64,
    output_tokens: u64,
}
