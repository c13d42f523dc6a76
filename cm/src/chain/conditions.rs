//! Condition extraction, inter-paragraph fallback and condition follow-up
//!
//! Each condition of a material is asked from the material checkpoint, never
//! from another condition's answer. Its accepted answer keeps its own
//! checkpoint so follow-up 4 can verify it in the dialogue that produced it.

use tracing::debug;

use crate::answer;
use crate::conversation::Conversation;
use crate::document::filter_sentences;
use crate::prompts::{PromptContext, PromptName};
use crate::records::{ConditionAudit, ConditionValue};
use crate::targets::Target;

use super::engine::{Exchange, Session};

/// Where an accepted condition value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Origin {
    Primary,
    InterParagraph,
}

/// One condition's result for one material
#[derive(Debug, Clone)]
pub(super) struct ConditionOutcome {
    pub value: ConditionValue,
    /// Dialogue ending with the answer that produced `value`
    checkpoint: Option<Conversation>,
    /// Text that answer was read from
    excerpt: String,
    origin: Origin,
    pub audit: ConditionAudit,
}

impl ConditionOutcome {
    fn new(value: ConditionValue, excerpt: String) -> Self {
        Self {
            value,
            checkpoint: None,
            excerpt,
            origin: Origin::Primary,
            audit: ConditionAudit::default(),
        }
    }

    fn accept(&mut self, exchange: Exchange, excerpt: String, origin: Origin) {
        self.value = ConditionValue::from_answer(&exchange.answer);
        self.checkpoint = Some(exchange.state);
        self.excerpt = excerpt;
        self.origin = origin;
    }
}

impl Session<'_> {
    /// P4 for one condition, falling back to inter-paragraph search on "none"
    pub(super) async fn extract_condition(
        &mut self,
        index: usize,
        value: &str,
        material: &str,
        target: &Target,
        trunk_material: &Conversation,
    ) -> ConditionOutcome {
        debug!(%index, condition = %target.name, %material, "Session::extract_condition: called");
        let ctx = PromptContext::property(&self.spec.property.name)
            .with_value(value)
            .with_material(material)
            .with_condition(&target.name);
        let excerpt = self.doc.excerpt(index, &target.context);

        let Some(primary) = self
            .ask(trunk_material, PromptName::ExtractCondition, &ctx, Some(&excerpt))
            .await
        else {
            return ConditionOutcome::new(ConditionValue::Error, excerpt);
        };

        let mut outcome = ConditionOutcome::new(ConditionValue::NotFound, String::new());
        outcome.accept(primary, excerpt, Origin::Primary);
        if outcome.value != ConditionValue::NotFound || !self.chain.options().inter_paragraph_search {
            return outcome;
        }

        self.inter_paragraph_search(&ctx, target, trunk_material, &mut outcome)
            .await;
        outcome
    }

    /// Re-ask a missing condition against every sentence mentioning it
    async fn inter_paragraph_search(
        &mut self,
        ctx: &PromptContext,
        target: &Target,
        trunk_material: &Conversation,
        outcome: &mut ConditionOutcome,
    ) {
        debug!(condition = %target.name, "Session::inter_paragraph_search: called");
        let excerpt = filter_sentences(&self.doc.sentences, &target.required_phrases);
        if excerpt.is_empty() {
            self.trace.note(format!(
                "Inter-paragraph search for '{}' skipped: no sentence matches its phrases",
                target.name
            ));
            return;
        }

        let Some(fallback) = self
            .ask(trunk_material, PromptName::ExtractConditionFallback, ctx, Some(&excerpt))
            .await
        else {
            outcome.value = ConditionValue::Error;
            outcome.checkpoint = None;
            outcome.audit.fallback_value = Some(answer::ERROR.to_string());
            return;
        };

        outcome.audit.fallback_value = Some(fallback.answer.clone());
        if answer::is_none(&fallback.answer) {
            return;
        }
        self.trace.note(format!(
            "Inter-paragraph search found '{}' = {}",
            target.name,
            fallback.answer.trim()
        ));
        outcome.accept(fallback, excerpt, Origin::InterParagraph);
    }

    /// Follow-up 4: is the condition value really the one used?
    ///
    /// A "no" voids only this condition. A failed call keeps the value.
    pub(super) async fn verify_condition(
        &mut self,
        value: &str,
        material: &str,
        target: &Target,
        outcome: &mut ConditionOutcome,
    ) {
        let ConditionValue::Found(found) = &outcome.value else {
            return;
        };
        let Some(checkpoint) = outcome.checkpoint.clone() else {
            return;
        };
        debug!(condition = %target.name, %found, "Session::verify_condition: called");

        let found = found.clone();
        let ctx = PromptContext::property(&self.spec.property.name)
            .with_value(value)
            .with_material(material)
            .with_condition(&target.name)
            .with_condition_value(&found);
        let (prompt, attachment) = if self.chain.options().chat {
            (PromptName::FollowupCondition, None)
        } else {
            (PromptName::FollowupConditionNoChat, Some(outcome.excerpt.as_str()))
        };

        let verdict = self.ask(&checkpoint, prompt, &ctx, attachment).await;

        if self.chain.options().audit {
            let slot = match outcome.origin {
                Origin::Primary => &mut outcome.audit.f4,
                Origin::InterParagraph => &mut outcome.audit.fallback_f4,
            };
            *slot = Some(verdict.map_or_else(|| answer::ERROR.to_string(), |e| e.answer));
            return;
        }

        match verdict {
            None => {
                self.trace.note(format!(
                    "Kept '{}' = {} for '{}' unverified",
                    target.name, found, material
                ));
            }
            Some(e) if answer::is_negative(&e.answer) => {
                self.trace
                    .note(format!("Voided '{}' = {} for '{}'", target.name, found, material));
                outcome.value = ConditionValue::Voided;
            }
            Some(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::chain::FollowUps;
    use crate::chain::testing::*;
    use crate::document::ContextParams;
    use crate::records::ConditionValue;
    use crate::targets::Target;

    const DISTANT: &str = "All runs were carried out at 750°C.";

    #[tokio::test]
    async fn test_fallback_fills_missing_condition() {
        let client = scripted(|q| match tag(q) {
            "[P4]" => Some("none".to_string()),
            _ => happy(q),
        });
        let chain = chain(client.clone(), options(FollowUps::none()));
        let doc = document(&["Na2WO4/SiO2 gave 85% C2 yield.", DISTANT]);

        let outcome = chain.extract(&doc, &spec(vec![temperature()]), "sys").await;

        assert_eq!(outcome.records.len(), 1);
        let record = &outcome.records.rows()[0];
        assert_eq!(record.conditions[0].value, ConditionValue::Found("750°C".to_string()));

        let requests = client.requests();
        let fallback = with_tag(&requests, "[IPS]");
        assert_eq!(fallback.len(), 1);
        assert!(fallback[0].last_user_text().unwrap().ends_with(DISTANT));
        // Restored from the material checkpoint, not from the failed P4
        assert!(user_turns(&fallback[0]).iter().all(|t| !t.starts_with("[P4]")));
    }

    #[tokio::test]
    async fn test_fallback_disabled_keeps_none() {
        let client = scripted(|q| match tag(q) {
            "[P4]" => Some("None".to_string()),
            _ => happy(q),
        });
        let mut opts = options(FollowUps::none());
        opts.inter_paragraph_search = false;
        let chain = chain(client.clone(), opts);
        let doc = document(&["Na2WO4/SiO2 gave 85% C2 yield.", DISTANT]);

        let outcome = chain.extract(&doc, &spec(vec![temperature()]), "sys").await;

        assert!(with_tag(&client.requests(), "[IPS]").is_empty());
        assert_eq!(outcome.records.rows()[0].conditions[0].value, ConditionValue::NotFound);
    }

    #[tokio::test]
    async fn test_fallback_without_phrases_is_skipped() {
        let client = scripted(|q| match tag(q) {
            "[P4]" => Some("none".to_string()),
            _ => happy(q),
        });
        let chain = chain(client.clone(), options(FollowUps::none()));
        let doc = document(&[SENTENCE, DISTANT]);
        let pressure = Target::new("pressure", ContextParams::default(), &[]);

        let outcome = chain.extract(&doc, &spec(vec![pressure]), "sys").await;

        assert!(with_tag(&client.requests(), "[IPS]").is_empty());
        assert_eq!(outcome.records.rows()[0].conditions[0].value, ConditionValue::NotFound);
        assert!(outcome.trace.contains("Inter-paragraph search for 'pressure' skipped"));
    }

    #[tokio::test]
    async fn test_condition_failure_marks_error_and_commits() {
        let client = scripted(|q| match tag(q) {
            "[P4]" if q.contains("temperature") => None,
            "[P4]" => Some("10000 h-1".to_string()),
            _ => happy(q),
        });
        let chain = chain(client.clone(), options(FollowUps::none()));
        let doc = document(&["Na2WO4/SiO2 gave 85% C2 yield.", "The GHSV was 10000 h-1."]);

        let outcome = chain.extract(&doc, &spec(vec![temperature(), space_velocity()]), "sys").await;

        assert_eq!(outcome.records.len(), 1);
        let cells = outcome.records.cells(&outcome.records.rows()[0]);
        assert_eq!(cells[6], "error");
        assert_eq!(cells[8], "10000 h-1");
    }

    #[tokio::test]
    async fn test_condition_followup_voids_only_its_condition() {
        let client = scripted(|q| match tag(q) {
            "[P4]" if q.contains("temperature") => Some("700°C".to_string()),
            "[P4]" => Some("10000 h-1".to_string()),
            "[F4]" if q.contains("temperature") => Some("No".to_string()),
            _ => happy(q),
        });
        let chain = chain(client.clone(), options(FollowUps::from_numbers(&[4]).unwrap()));
        let doc = document(&[SENTENCE, "The GHSV was 10000 h-1."]);

        let outcome = chain.extract(&doc, &spec(vec![temperature(), space_velocity()]), "sys").await;

        assert_eq!(outcome.records.len(), 1);
        let record = &outcome.records.rows()[0];
        assert_eq!(record.conditions[0].value, ConditionValue::Voided);
        assert_eq!(record.conditions[1].value, ConditionValue::Found("10000 h-1".to_string()));
        assert_eq!(outcome.records.cells(record)[6], "none");
        assert!(outcome.trace.contains("Voided 'reaction operating temperature'"));
    }

    #[tokio::test]
    async fn test_condition_followup_uses_own_checkpoint() {
        let client = scripted(|q| match tag(q) {
            "[P4]" if q.contains("velocity") => Some("10000 h-1".to_string()),
            _ => happy(q),
        });
        let chain = chain(client.clone(), options(FollowUps::from_numbers(&[3, 4]).unwrap()));
        let doc = document(&[SENTENCE, "The GHSV was 10000 h-1."]);

        chain.extract(&doc, &spec(vec![temperature(), space_velocity()]), "sys").await;

        let requests = client.requests();
        let f4 = with_tag(&requests, "[F4]");
        assert_eq!(f4.len(), 2);
        for request in &f4 {
            let question = request.last_user_text().unwrap();
            let turns = user_turns(request);
            // P1, P2, P3, own P4, F4
            assert_eq!(turns.len(), 5);
            assert!(turns.iter().all(|t| !t.starts_with("[F3]")));
            let p4 = &turns[3];
            assert!(p4.starts_with("[P4]"));
            if question.contains("temperature") {
                assert!(p4.contains("temperature"));
                assert_eq!(request.messages[7].content, "700°C");
            } else {
                assert!(p4.contains("velocity"));
                assert_eq!(request.messages[7].content, "10000 h-1");
            }
        }
    }

    #[tokio::test]
    async fn test_condition_followup_skips_missing_values() {
        let client = scripted(|q| match tag(q) {
            "[P4]" | "[IPS]" => Some("none".to_string()),
            _ => happy(q),
        });
        let chain = chain(client.clone(), options(FollowUps::from_numbers(&[4]).unwrap()));
        let doc = document(&[SENTENCE]);

        let outcome = chain.extract(&doc, &spec(vec![temperature()]), "sys").await;

        assert!(with_tag(&client.requests(), "[F4]").is_empty());
        assert_eq!(outcome.records.rows()[0].conditions[0].value, ConditionValue::NotFound);
    }

    #[tokio::test]
    async fn test_condition_followup_failure_keeps_value() {
        let client = scripted(|q| match tag(q) {
            "[F4]" => None,
            _ => happy(q),
        });
        let chain = chain(client.clone(), options(FollowUps::from_numbers(&[4]).unwrap()));
        let doc = document(&[SENTENCE]);

        let outcome = chain.extract(&doc, &spec(vec![temperature()]), "sys").await;

        assert_eq!(
            outcome.records.rows()[0].conditions[0].value,
            ConditionValue::Found("700°C".to_string())
        );
        assert!(outcome.trace.contains("unverified"));
    }

    #[tokio::test]
    async fn test_audit_mode_records_fallback_answers() {
        let client = scripted(|q| match tag(q) {
            "[P4]" => Some("none".to_string()),
            "[F4]" => Some("no".to_string()),
            _ => happy(q),
        });
        let mut opts = options(FollowUps::from_numbers(&[4]).unwrap());
        opts.audit = true;
        let chain = chain(client.clone(), opts);
        let doc = document(&[SENTENCE, DISTANT]);

        let outcome = chain.extract(&doc, &spec(vec![temperature()]), "sys").await;

        let record = &outcome.records.rows()[0];
        assert_eq!(record.conditions[0].value, ConditionValue::Found("750°C".to_string()));
        let audit = &record.audit.as_ref().unwrap().conditions[0];
        assert_eq!(audit.fallback_value.as_deref(), Some("750°C"));
        assert_eq!(audit.f4, None);
        assert_eq!(audit.fallback_f4.as_deref(), Some("no"));
    }
}
