//! LLM request/response types for CatMiner
//!
//! Provider-agnostic shapes for one completion call. The extraction chain only
//! ever deals in plain text turns, so there are no tool or content-block types.

use std::ops::AddAssign;

use serde::{Deserialize, Serialize};

/// One completion call: the system prompt plus the turns the model should see
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// System prompt (empty string means "send none")
    pub system_prompt: String,

    /// User/assistant turns in dialogue order
    pub messages: Vec<Message>,

    /// Answer length cap; providers clamp it to their configured ceiling
    pub max_tokens: u32,

    /// Sampling temperature, provider default when unset
    pub temperature: Option<f32>,
}

impl CompletionRequest {
    /// The text of the final user turn, if any
    pub fn last_user_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }
}

/// A message in the conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            content: text.into(),
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, text)
    }

    /// A question turn
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    /// A recorded model answer
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text)
    }
}

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What came back from one completion call
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    /// Answer text; `None` counts as a failed call
    pub content: Option<String>,

    /// Why the model stopped
    pub stop_reason: StopReason,

    /// Token usage for this call
    pub usage: TokenUsage,
}

impl CompletionResponse {
    /// Plain text response with the given usage, mostly for mocks
    pub fn text(content: impl Into<String>, input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            content: Some(content.into()),
            stop_reason: StopReason::EndTurn,
            usage: TokenUsage {
                input_tokens,
                output_tokens,
            },
        }
    }
}

/// Why the model stopped generating
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    StopSequence,
}

impl StopReason {
    /// Anthropic `stop_reason`
    pub fn from_anthropic(s: &str) -> Self {
        match s {
            "max_tokens" => Self::MaxTokens,
            "stop_sequence" => Self::StopSequence,
            _ => Self::EndTurn,
        }
    }

    /// OpenAI `finish_reason`; a filtered completion counts as stopped early
    pub fn from_openai(s: Option<&str>) -> Self {
        match s.unwrap_or("stop") {
            "length" => Self::MaxTokens,
            "content_filter" => Self::StopSequence,
            _ => Self::EndTurn,
        }
    }
}

/// Token usage counters
///
/// Monotonic: only ever grows by adding the usage of successful calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

impl AddAssign for TokenUsage {
    fn add_assign(&mut self, rhs: Self) {
        self.input_tokens += rhs.input_tokens;
        self.output_tokens += rhs.output_tokens;
    }
}
