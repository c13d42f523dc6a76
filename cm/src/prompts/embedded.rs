//! Embedded prompts
//!
//! These are compiled into the binary from .pmt files at build time.

use tracing::debug;

pub const SYSTEM: &str = include_str!("../../prompts/system.pmt");
pub const CLASSIFY: &str = include_str!("../../prompts/classify.pmt");
pub const EXTRACT_VALUES: &str = include_str!("../../prompts/extract-values.pmt");
pub const EXTRACT_MATERIALS: &str = include_str!("../../prompts/extract-materials.pmt");
pub const EXTRACT_CONDITION: &str = include_str!("../../prompts/extract-condition.pmt");
pub const EXTRACT_CONDITION_FALLBACK: &str = include_str!("../../prompts/extract-condition-fallback.pmt");
pub const FOLLOWUP_COMPLETE: &str = include_str!("../../prompts/followup-complete.pmt");
pub const FOLLOWUP_SPECIFIC: &str = include_str!("../../prompts/followup-specific.pmt");
pub const FOLLOWUP_PAIRING: &str = include_str!("../../prompts/followup-pairing.pmt");
pub const FOLLOWUP_PAIRING_NOCHAT: &str = include_str!("../../prompts/followup-pairing-nochat.pmt");
pub const FOLLOWUP_CONDITION: &str = include_str!("../../prompts/followup-condition.pmt");
pub const FOLLOWUP_CONDITION_NOCHAT: &str = include_str!("../../prompts/followup-condition-nochat.pmt");

/// Get the embedded prompt by name
pub fn get_embedded(name: &str) -> Option<&'static str> {
    debug!(%name, "get_embedded: called");
    let found = match name {
        "system" => Some(SYSTEM),
        "classify" => Some(CLASSIFY),
        "extract-values" => Some(EXTRACT_VALUES),
        "extract-materials" => Some(EXTRACT_MATERIALS),
        "extract-condition" => Some(EXTRACT_CONDITION),
        "extract-condition-fallback" => Some(EXTRACT_CONDITION_FALLBACK),
        "followup-complete" => Some(FOLLOWUP_COMPLETE),
        "followup-specific" => Some(FOLLOWUP_SPECIFIC),
        "followup-pairing" => Some(FOLLOWUP_PAIRING),
        "followup-pairing-nochat" => Some(FOLLOWUP_PAIRING_NOCHAT),
        "followup-condition" => Some(FOLLOWUP_CONDITION),
        "followup-condition-nochat" => Some(FOLLOWUP_CONDITION_NOCHAT),
        _ => None,
    };
    if found.is_none() {
        debug!(%name, "get_embedded: no match found");
    }
    found
}
