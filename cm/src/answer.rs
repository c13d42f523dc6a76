//! Reading the model's free-text answers
//!
//! The chain talks to the model in plain language, so its control flow hangs
//! on a few literal conventions. They all live here.

use std::collections::HashSet;

/// Sentinel the model uses for "nothing found"
pub const NONE: &str = "none";

/// Cell text for a unit whose gateway call failed
pub const ERROR: &str = "error";

/// Separator for list answers
pub const LIST_SEPARATOR: char = ';';

/// A yes/no answer counts as "no" when it contains "no" anywhere, any case
///
/// This is a substring test: "No.", "not really" and "none" all count.
pub fn is_negative(answer: &str) -> bool {
    answer.trim().to_lowercase().contains("no")
}

/// The answer is exactly the "none" sentinel (trimmed, any case)
pub fn is_none(answer: &str) -> bool {
    answer.trim().eq_ignore_ascii_case(NONE)
}

/// A list item that should not be pursued: blank or "none"
pub fn is_blank_or_none(item: &str) -> bool {
    let item = item.trim();
    item.is_empty() || is_none(item)
}

/// Split a property-value list and drop duplicates
///
/// Items are trimmed; two items are duplicates when they match ignoring case.
/// The first spelling seen is kept and first-seen order is preserved, though
/// callers must not attach meaning to that order.
pub fn split_values(answer: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    answer
        .split(LIST_SEPARATOR)
        .map(str::trim)
        .filter(|v| seen.insert(v.to_lowercase()))
        .map(str::to_string)
        .collect()
}

/// Split a material list; no deduplication at this level
pub fn split_materials(answer: &str) -> Vec<String> {
    answer.split(LIST_SEPARATOR).map(|m| m.trim().to_string()).collect()
}
