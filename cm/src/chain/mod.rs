//! The extraction prompt chain
//!
//! A stateful question chain over one document: classify, list values, find
//! materials, extract conditions, then verify. Every gateway failure is
//! contained to the unit it happened in; the chain always returns a
//! well-formed record table.

mod conditions;
mod engine;
mod options;
#[cfg(test)]
mod testing;

pub use engine::{DocumentOutcome, ExtractionChain, NEUTRAL_SYSTEM_PROMPT};
pub use options::{ExtractionOptions, FollowUps};
