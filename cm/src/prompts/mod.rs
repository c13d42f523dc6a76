//! Prompt Template System
//!
//! Loads and renders the `.pmt` templates of the extraction chain.
//!
//! Template loading chain:
//! 1. Templates set in code (tests, preloaded cache)
//! 2. `extraction.prompts-dir/{name}.pmt` (configured override)
//! 3. `.catminer/prompts/{name}.pmt` (project override)
//! 4. Embedded fallback in code
//!
//! Templates use Handlebars syntax for variable substitution. Texts that a
//! template asks about (sentence, excerpt) are appended after rendering, so
//! templates never see raw paper text.

pub mod embedded;
mod loader;

pub use loader::{PromptContext, PromptLoader, PromptName};
