//! Shared fixtures for chain tests
//!
//! Templates are replaced by short tagged lines so a scripted mock can tell
//! which question it is answering from the first few characters.

use std::sync::Arc;

use crate::document::{ContextParams, Document};
use crate::llm::client::mock::MockLlmClient;
use crate::llm::{CompletionRequest, CompletionResponse, LlmError, Role};
use crate::prompts::{PromptLoader, PromptName};
use crate::targets::{Target, TargetSpec};

use super::{ExtractionChain, ExtractionOptions, FollowUps};

pub const SENTENCE: &str = "The catalyst achieved 85% C2 yield at 700°C.";

pub fn tagged_prompts() -> Arc<PromptLoader> {
    let mut loader = PromptLoader::embedded_only();
    let templates = [
        (PromptName::System, "SYS {{property}}"),
        (PromptName::Classify, "[P1] {{property}}:"),
        (PromptName::ExtractValues, "[P2] {{property}}:"),
        (PromptName::ExtractMaterials, "[P3] {{propertyValue}}:"),
        (PromptName::ExtractCondition, "[P4] {{operatingCondition}} | {{material}}:"),
        (PromptName::ExtractConditionFallback, "[IPS] {{operatingCondition}} | {{material}}:"),
        (PromptName::FollowupComplete, "[F1] {{material}}"),
        (PromptName::FollowupSpecific, "[F2] {{material}}"),
        (PromptName::FollowupPairing, "[F3] {{material}} {{propertyValue}}"),
        (PromptName::FollowupPairingNoChat, "[F3N] {{material}} {{propertyValue}}:"),
        (
            PromptName::FollowupCondition,
            "[F4] {{operatingCondition}}={{operatingConditionValue}} | {{material}}",
        ),
        (
            PromptName::FollowupConditionNoChat,
            "[F4N] {{operatingCondition}}={{operatingConditionValue}} | {{material}}:",
        ),
    ];
    for (name, text) in templates {
        loader.set_template(name, text);
    }
    Arc::new(loader)
}

pub fn temperature() -> Target {
    Target::new("reaction operating temperature", ContextParams::new(0, 0, false), &["°C"])
}

pub fn space_velocity() -> Target {
    Target::new("gas hourly space velocity", ContextParams::new(0, 1, false), &["GHSV"])
}

pub fn spec(conditions: Vec<Target>) -> TargetSpec {
    TargetSpec::new(
        Target::new("C2 yield", ContextParams::new(1, 0, true), &["C2 yield"]),
        conditions,
    )
}

pub fn document(sentences: &[&str]) -> Document {
    let mut text = String::from("Oxidative coupling of methane over supported tungstates\n");
    for s in sentences {
        text.push_str(s);
        text.push('\n');
    }
    Document::parse("paper.txt", &text)
}

pub fn options(followups: FollowUps) -> ExtractionOptions {
    ExtractionOptions {
        followups,
        ..ExtractionOptions::default()
    }
}

/// A mock answering by question text; `None` fails the call
pub fn scripted<F>(answer: F) -> Arc<MockLlmClient>
where
    F: Fn(&str) -> Option<String> + Send + Sync + 'static,
{
    Arc::new(MockLlmClient::from_fn(move |req| {
        let question = req.last_user_text().unwrap_or_default();
        match answer(question) {
            Some(text) => Ok(CompletionResponse::text(text, 10, 2)),
            None => Err(LlmError::ApiError {
                status: 500,
                message: "upstream failure".to_string(),
            }),
        }
    }))
}

/// Answers for the happy path: one value, one material, every check passes
pub fn happy(question: &str) -> Option<String> {
    let answer = match tag(question) {
        "[P1]" => "Yes",
        "[P2]" => "85%",
        "[P3]" => "Na2WO4/SiO2",
        "[P4]" => "700°C",
        "[IPS]" => "750°C",
        _ => "Yes",
    };
    Some(answer.to_string())
}

/// The leading `[..]` tag of a question
pub fn tag(question: &str) -> &str {
    question.split_whitespace().next().unwrap_or_default()
}

pub fn chain(client: Arc<MockLlmClient>, options: ExtractionOptions) -> ExtractionChain {
    ExtractionChain::new(client, tagged_prompts(), options)
}

/// Requests whose question carries `tag`
pub fn with_tag(requests: &[CompletionRequest], wanted: &str) -> Vec<CompletionRequest> {
    requests
        .iter()
        .filter(|r| tag(r.last_user_text().unwrap_or_default()) == wanted)
        .cloned()
        .collect()
}

/// User-turn texts of a request's history, oldest first
pub fn user_turns(request: &CompletionRequest) -> Vec<String> {
    request
        .messages
        .iter()
        .filter(|m| m.role == Role::User)
        .map(|m| m.content.clone())
        .collect()
}
