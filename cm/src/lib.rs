//! CatMiner - catalyst data extraction through an LLM question chain
//!
//! CatMiner reads papers as a title plus one sentence per line and walks a
//! fixed chain of questions over every candidate sentence: does it report the
//! property, which values, which catalysts, under which conditions, and do
//! those answers survive the follow-up checks. Surviving facts become rows of
//! a fixed-shape table.
//!
//! # Core Concepts
//!
//! - **Checkpointed dialogue**: sibling branches restart from a shared prefix
//!   and never see each other's turns
//! - **Contained failures**: a failed model call abandons only the unit it
//!   belongs to (condition, material, value or sentence)
//! - **Audit trail**: every question, answer and decision goes to the trace
//!
//! # Modules
//!
//! - [`document`] - Sentence corpus, excerpts, phrase search
//! - [`targets`] - What to extract, and where to look
//! - [`conversation`] - Branchable conversation state
//! - [`answer`] - Reading the model's sentinel answers
//! - [`llm`] - Completion gateway trait and HTTP providers
//! - [`prompts`] - Prompt templates
//! - [`chain`] - The extraction prompt chain
//! - [`records`] - Output table
//! - [`trace`] - Per-job trace log
//! - [`runner`] - Batch driver over many papers
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod answer;
pub mod chain;
pub mod cli;
pub mod config;
pub mod conversation;
pub mod document;
pub mod llm;
pub mod prompts;
pub mod records;
pub mod runner;
pub mod targets;
pub mod trace;

pub use chain::{DocumentOutcome, ExtractionChain, ExtractionOptions, FollowUps};
pub use config::Config;
pub use document::{ContextParams, Document};
pub use llm::{LlmClient, LlmError, TokenUsage};
pub use records::{Record, RecordTable};
pub use runner::{RunSummary, Runner};
pub use targets::{Target, TargetSpec, TargetsFile};
