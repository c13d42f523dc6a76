//! ExtractionChain - drives the prompt chain over one document
//!
//! Per sentence: classify (P1), list values (P2), then for every value the
//! materials (P3), and for every material the conditions (P4, with the
//! inter-paragraph fallback) and the enabled follow-ups. Sibling branches
//! restart from the checkpoint of their fan-out level, so they never see each
//! other's turns.

use std::sync::Arc;

use eyre::Result;
use tracing::{debug, info, warn};

use crate::answer;
use crate::conversation::{Conversation, Turn};
use crate::document::{Document, contains_any};
use crate::llm::{CompletionRequest, LlmClient, Role, StopReason, TokenUsage};
use crate::prompts::{PromptContext, PromptLoader, PromptName};
use crate::records::{AuditEntry, ConditionEntry, Record, RecordTable};
use crate::targets::TargetSpec;
use crate::trace::Trace;

use super::ExtractionOptions;
use super::conditions::ConditionOutcome;

/// System turn used when system prompts are switched off
pub const NEUTRAL_SYSTEM_PROMPT: &str = "You are a helpful assistant.";

/// Everything one document/property job produced
#[derive(Debug)]
pub struct DocumentOutcome {
    pub source: String,
    pub property: String,
    pub records: RecordTable,
    pub trace: Trace,
    /// Summed over successful calls only
    pub usage: TokenUsage,
    pub calls: usize,
    pub failed_calls: usize,
}

/// The prompt chain, shared by every job of a run
pub struct ExtractionChain {
    llm: Arc<dyn LlmClient>,
    prompts: Arc<PromptLoader>,
    options: ExtractionOptions,
    max_tokens: u32,
    temperature: Option<f32>,
}

impl ExtractionChain {
    pub fn new(llm: Arc<dyn LlmClient>, prompts: Arc<PromptLoader>, options: ExtractionOptions) -> Self {
        debug!(?options, "ExtractionChain::new: called");
        Self {
            llm,
            prompts,
            options,
            max_tokens: 512,
            temperature: None,
        }
    }

    /// Set the per-call response budget and sampling temperature
    pub fn with_limits(mut self, max_tokens: u32, temperature: Option<f32>) -> Self {
        debug!(%max_tokens, ?temperature, "ExtractionChain::with_limits: called");
        self.max_tokens = max_tokens;
        self.temperature = temperature;
        self
    }

    pub fn options(&self) -> &ExtractionOptions {
        &self.options
    }

    /// The system turn for a property
    ///
    /// With system prompts on, `custom` (a property's prompt file) wins over
    /// the `system` template. With them off, the neutral prompt is used.
    pub fn system_prompt(&self, property: &str, custom: Option<&str>) -> Result<String> {
        debug!(%property, has_custom = custom.is_some(), "ExtractionChain::system_prompt: called");
        if !self.options.use_system_prompt {
            return Ok(NEUTRAL_SYSTEM_PROMPT.to_string());
        }
        match custom {
            Some(text) => Ok(text.trim().to_string()),
            None => Ok(self
                .prompts
                .render(PromptName::System, &PromptContext::property(property))?
                .trim()
                .to_string()),
        }
    }

    /// Run the chain over every sentence of `doc` for one target spec
    ///
    /// Never fails: gateway and template errors are traced and abandon only
    /// the unit they happened in.
    pub async fn extract(&self, doc: &Document, spec: &TargetSpec, system_prompt: &str) -> DocumentOutcome {
        debug!(source = %doc.source, property = %spec.property.name, "ExtractionChain::extract: called");
        info!(
            "Extracting {} from {} ({} sentences)",
            spec.property.name,
            doc.source,
            doc.len()
        );

        let mut session = Session {
            chain: self,
            doc,
            spec,
            root: Conversation::with_system(system_prompt),
            records: RecordTable::new(spec, self.options.audit),
            trace: Trace::new(),
            usage: TokenUsage::default(),
            calls: 0,
            failed_calls: 0,
        };
        session.trace.note(format!("Document: {}", doc.source));
        session.trace.note(format!("Property: {}", spec.property.name));
        session.run().await;

        info!(
            "Finished {} / {}: {} records, {} calls ({} failed), {} tokens",
            doc.source,
            spec.property.name,
            session.records.len(),
            session.calls,
            session.failed_calls,
            session.usage.total()
        );
        DocumentOutcome {
            source: doc.source.clone(),
            property: spec.property.name.clone(),
            records: session.records,
            trace: session.trace,
            usage: session.usage,
            calls: session.calls,
            failed_calls: session.failed_calls,
        }
    }
}

/// One question and its answer
pub(super) struct Exchange {
    pub answer: String,
    /// The conversation extended by the question and the answer
    pub state: Conversation,
}

/// Mutable state of one job; single writer, dropped when the job ends
pub(super) struct Session<'a> {
    pub chain: &'a ExtractionChain,
    pub doc: &'a Document,
    pub spec: &'a TargetSpec,
    /// Just the system turn; every sentence starts here
    pub root: Conversation,
    pub records: RecordTable,
    pub trace: Trace,
    pub usage: TokenUsage,
    pub calls: usize,
    pub failed_calls: usize,
}

/// Question text: the rendered template, then the text it asks about
fn compose(rendered: &str, attachment: Option<&str>) -> String {
    match attachment {
        Some(text) => format!("{}\n{}", rendered.trim_end(), text),
        None => rendered.trim_end().to_string(),
    }
}

impl<'a> Session<'a> {
    /// Ask one question on top of `state`
    ///
    /// Usage is added only when the call succeeds. Both sides are traced.
    /// Returns `None` if rendering or the gateway failed, or the model sent no
    /// text; the caller abandons its unit.
    pub async fn ask(
        &mut self,
        state: &Conversation,
        prompt: PromptName,
        ctx: &PromptContext,
        attachment: Option<&str>,
    ) -> Option<Exchange> {
        debug!(%prompt, "Session::ask: called");
        let question = match self.chain.prompts.render(prompt, ctx) {
            Ok(rendered) => compose(&rendered, attachment),
            Err(e) => {
                warn!(source = %self.doc.source, %prompt, error = %e, "Prompt could not be rendered");
                self.trace.note(format!("{} could not be rendered: {}", prompt.label(), e));
                self.failed_calls += 1;
                return None;
            }
        };

        let asked = state.append(Turn::user(question.clone()));
        let sent = if self.chain.options.chat {
            asked.clone()
        } else {
            self.root.append(Turn::user(question.clone()))
        };
        self.trace.turn(Role::User, &format!("({}) {}", prompt.label(), question));

        let (system_prompt, messages) = sent.to_request_parts();
        let request = CompletionRequest {
            system_prompt,
            messages,
            max_tokens: self.chain.max_tokens,
            temperature: self.chain.temperature,
        };
        self.calls += 1;

        match self.chain.llm.complete(request).await {
            Ok(response) => match response.content {
                Some(text) => {
                    self.usage += response.usage;
                    self.trace.turn(Role::Assistant, &text);
                    if response.stop_reason == StopReason::MaxTokens {
                        warn!(source = %self.doc.source, %prompt, "Answer hit the token limit");
                        self.trace.note(format!("{} answer truncated at the token limit", prompt.label()));
                    }
                    let state = asked.append(Turn::assistant(text.clone()));
                    Some(Exchange { answer: text, state })
                }
                None => {
                    warn!(source = %self.doc.source, %prompt, "Completion returned no text");
                    self.trace.note(format!("{} returned no text", prompt.label()));
                    self.failed_calls += 1;
                    None
                }
            },
            Err(e) => {
                warn!(source = %self.doc.source, %prompt, error = %e, "Completion failed");
                self.trace.note(format!("{} failed: {}", prompt.label(), e));
                self.failed_calls += 1;
                None
            }
        }
    }

    async fn run(&mut self) {
        debug!(source = %self.doc.source, "Session::run: called");
        let doc = self.doc;
        let spec = self.spec;
        let phrases = &spec.property.required_phrases;
        for (index, sentence) in doc.sentences.iter().enumerate() {
            if !contains_any(sentence, phrases) {
                continue;
            }
            self.trace.note(format!("Sentence {}: {}", index + 1, sentence));
            self.process_sentence(index, sentence).await;
            self.trace.separator();
        }
    }

    async fn process_sentence(&mut self, index: usize, sentence: &'a str) {
        debug!(%index, "Session::process_sentence: called");
        let spec = self.spec;
        let property = &spec.property.name;
        let ctx = PromptContext::property(property);
        let root = self.root.clone();

        let Some(classified) = self.ask(&root, PromptName::Classify, &ctx, Some(sentence)).await else {
            self.trace.note(format!("Sentence {} abandoned", index + 1));
            return;
        };
        if answer::is_negative(&classified.answer) {
            self.trace
                .note(format!("Skipped sentence {}: does not report {}", index + 1, property));
            return;
        }

        let Some(listed) = self
            .ask(&classified.state, PromptName::ExtractValues, &ctx, Some(sentence))
            .await
        else {
            self.trace.note(format!("Sentence {} abandoned", index + 1));
            return;
        };
        if answer::is_none(&listed.answer) {
            self.trace
                .note(format!("Skipped sentence {}: no {} value found", index + 1, property));
            return;
        }

        let Exchange {
            answer: values,
            state: trunk_value,
        } = listed;
        for value in answer::split_values(&values) {
            if answer::is_blank_or_none(&value) {
                self.trace.note(format!("Skipped empty value '{}'", value));
                continue;
            }
            self.process_value(index, sentence, &value, &trunk_value).await;
        }
    }

    async fn process_value(&mut self, index: usize, sentence: &'a str, value: &str, trunk_value: &Conversation) {
        debug!(%index, %value, "Session::process_value: called");
        let excerpt = self.doc.excerpt(index, &self.spec.property.context);
        let ctx = PromptContext::property(&self.spec.property.name).with_value(value);

        let Some(found) = self
            .ask(trunk_value, PromptName::ExtractMaterials, &ctx, Some(&excerpt))
            .await
        else {
            self.trace.note(format!("Value '{}' abandoned", value));
            return;
        };
        if answer::is_none(&found.answer) {
            self.trace.note(format!("Skipped value '{}': no material found", value));
            return;
        }

        let Exchange {
            answer: materials,
            state: trunk_material,
        } = found;
        for material in answer::split_materials(&materials) {
            if material.is_empty() {
                self.trace.note(format!("Skipped empty material for value '{}'", value));
                continue;
            }
            self.process_material(index, sentence, value, &material, &trunk_material, &excerpt)
                .await;
        }
    }

    async fn process_material(
        &mut self,
        index: usize,
        sentence: &'a str,
        value: &str,
        material: &str,
        trunk_material: &Conversation,
        excerpt: &str,
    ) {
        debug!(%index, %value, %material, "Session::process_material: called");
        let spec = self.spec;
        let options = self.chain.options;

        let mut conditions: Vec<ConditionOutcome> = Vec::with_capacity(spec.conditions.len());
        for target in &spec.conditions {
            let outcome = self
                .extract_condition(index, value, material, target, trunk_material)
                .await;
            conditions.push(outcome);
        }

        let ctx = PromptContext::property(&spec.property.name)
            .with_value(value)
            .with_material(material);
        let pairing = if options.chat {
            (PromptName::FollowupPairing, None)
        } else {
            (PromptName::FollowupPairingNoChat, Some(excerpt))
        };
        let checks = [
            (options.followups.complete_name, PromptName::FollowupComplete, None),
            (options.followups.specific_name, PromptName::FollowupSpecific, None),
            (options.followups.pairing, pairing.0, pairing.1),
        ];

        let mut audit_answers: [Option<String>; 3] = Default::default();
        for (slot, (enabled, prompt, attachment)) in checks.into_iter().enumerate() {
            if !enabled {
                continue;
            }
            let verdict = self.ask(trunk_material, prompt, &ctx, attachment).await;
            if options.audit {
                audit_answers[slot] = Some(verdict.map_or_else(|| answer::ERROR.to_string(), |e| e.answer));
                continue;
            }
            match verdict {
                None => {
                    self.trace
                        .note(format!("Discarded material '{}': {} failed", material, prompt.label()));
                    return;
                }
                Some(e) if answer::is_negative(&e.answer) => {
                    self.trace.note(format!(
                        "Discarded material '{}': {} answered '{}'",
                        material,
                        prompt.label(),
                        e.answer.trim()
                    ));
                    return;
                }
                Some(_) => {}
            }
        }

        if options.followups.condition_pairing {
            for (target, outcome) in spec.conditions.iter().zip(conditions.iter_mut()) {
                self.verify_condition(value, material, target, outcome).await;
            }
        }

        let audit = options.audit.then(|| {
            let [f1, f2, f3] = audit_answers;
            AuditEntry {
                f1,
                f2,
                f3,
                conditions: conditions.iter().map(|c| c.audit.clone()).collect(),
            }
        });
        let record = Record {
            source: self.doc.source.clone(),
            sentence: sentence.to_string(),
            property: spec.property.name.clone(),
            property_value: value.trim().to_string(),
            material: material.trim().to_string(),
            conditions: spec
                .conditions
                .iter()
                .zip(conditions)
                .map(|(target, outcome)| ConditionEntry {
                    name: target.name.clone(),
                    value: outcome.value,
                })
                .collect(),
            audit,
        };
        self.trace.note(format!(
            "Committed record: {} = {} for '{}'",
            record.property, record.property_value, record.material
        ));
        self.records.push(record);
    }
}
