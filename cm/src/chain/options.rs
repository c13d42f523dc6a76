//! Validated chain settings

use eyre::{Result, eyre};
use tracing::debug;

/// Which follow-up questions are asked, by number
///
/// 1: is the material name complete? 2: is it specific? 3: is it really
/// paired with the value? 4: is each condition value correctly associated?
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FollowUps {
    pub complete_name: bool,
    pub specific_name: bool,
    pub pairing: bool,
    pub condition_pairing: bool,
}

impl FollowUps {
    /// No follow-ups at all
    pub fn none() -> Self {
        Self::default()
    }

    pub fn all() -> Self {
        Self {
            complete_name: true,
            specific_name: true,
            pairing: true,
            condition_pairing: true,
        }
    }

    /// Parse a list of follow-up numbers; each must be 1-4 and appear once
    pub fn from_numbers(numbers: &[u8]) -> Result<Self> {
        debug!(?numbers, "FollowUps::from_numbers: called");
        let mut followups = Self::none();
        for &n in numbers {
            let slot = match n {
                1 => &mut followups.complete_name,
                2 => &mut followups.specific_name,
                3 => &mut followups.pairing,
                4 => &mut followups.condition_pairing,
                other => return Err(eyre!("Unknown follow-up {} (expected 1-4)", other)),
            };
            if *slot {
                return Err(eyre!("Follow-up {} is listed more than once", n));
            }
            *slot = true;
        }
        Ok(followups)
    }

    /// The enabled follow-up numbers, ascending
    pub fn numbers(&self) -> Vec<u8> {
        [self.complete_name, self.specific_name, self.pairing, self.condition_pairing]
            .iter()
            .zip(1u8..)
            .filter(|(enabled, _)| **enabled)
            .map(|(_, n)| n)
            .collect()
    }
}

/// Everything that changes how the chain talks to the model
///
/// Built once from configuration by [`crate::config::ExtractionConfig::options`];
/// the chain trusts it as given.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractionOptions {
    /// Use the property's system prompt instead of a neutral one
    pub use_system_prompt: bool,
    /// Send the running dialogue with every call. When off, each call carries
    /// only the system turn and the current question.
    pub chat: bool,
    pub followups: FollowUps,
    /// Re-ask a missing condition against every sentence of the document
    /// that contains one of its phrases
    pub inter_paragraph_search: bool,
    /// Ask every enabled follow-up but never discard or void; keep answers
    pub audit: bool,
}

impl Default for ExtractionOptions {
    fn default() -> Self {
        Self {
            use_system_prompt: true,
            chat: true,
            followups: FollowUps {
                pairing: true,
                ..FollowUps::none()
            },
            inter_paragraph_search: true,
            audit: false,
        }
    }
}
