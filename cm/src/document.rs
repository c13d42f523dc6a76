//! Sentence corpus and excerpt building
//!
//! A document is a title plus its sentences in reading order. Input files put
//! the title on the first line and one sentence on each following line.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Errors reading a document
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("Failed to read document {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// How much text surrounds an anchor sentence in an excerpt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextParams {
    /// Sentences taken before the anchor
    #[serde(default)]
    pub before: usize,

    /// Sentences taken after the anchor
    #[serde(default)]
    pub after: usize,

    /// Prepend the document title
    #[serde(default)]
    pub title: bool,
}

impl ContextParams {
    pub fn new(before: usize, after: usize, title: bool) -> Self {
        Self { before, after, title }
    }
}

impl Default for ContextParams {
    fn default() -> Self {
        Self::new(0, 0, false)
    }
}

/// An immutable, index-addressable sentence corpus
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Where the document came from (file path or caller label)
    pub source: String,
    pub title: String,
    pub sentences: Vec<String>,
}

impl Document {
    /// Parse document text: line 1 is the title (possibly blank), every
    /// further non-blank line is one sentence
    ///
    /// An empty text is a document with an empty title and no sentences.
    pub fn parse(source: impl Into<String>, text: &str) -> Self {
        let source = source.into();
        debug!(%source, text_len = text.len(), "Document::parse: called");

        let mut lines = text.lines().map(|l| l.trim());
        let title = lines.next().unwrap_or_default().to_string();
        let sentences: Vec<String> = lines.filter(|l| !l.is_empty()).map(str::to_string).collect();

        debug!(%source, sentence_count = sentences.len(), "Document::parse: parsed");
        Self {
            source,
            title,
            sentences,
        }
    }

    /// Read and parse a document file
    pub fn read(path: impl AsRef<Path>) -> Result<Self, DocumentError> {
        let path = path.as_ref();
        debug!(?path, "Document::read: called");
        let source = path.display().to_string();
        let text = fs::read_to_string(path).map_err(|e| DocumentError::Io {
            path: source.clone(),
            source: e,
        })?;
        Ok(Self::parse(source, &text))
    }

    pub fn len(&self) -> usize {
        self.sentences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sentences.is_empty()
    }

    /// Excerpt around one of this document's sentences
    pub fn excerpt(&self, anchor: usize, params: &ContextParams) -> String {
        build_excerpt(&self.title, &self.sentences, anchor, params)
    }
}

/// Build the text window `[anchor - before, anchor + after]` around a sentence
///
/// Bounds clip to the corpus silently; an anchor past the end yields only the
/// sentences that fall inside the corpus (possibly none). Sentences are joined
/// with single spaces; a non-blank title, when requested, goes on its own
/// first line.
pub fn build_excerpt(title: &str, sentences: &[String], anchor: usize, params: &ContextParams) -> String {
    let len = sentences.len();
    let start = anchor.saturating_sub(params.before).min(len);
    let end = anchor.saturating_add(params.after).saturating_add(1).min(len);

    let body = if start < end { sentences[start..end].join(" ") } else { String::new() };

    if !params.title || title.is_empty() {
        body
    } else if body.is_empty() {
        title.to_string()
    } else {
        format!("{}\n{}", title, body)
    }
}

/// Whether `sentence` contains at least one of `phrases` (plain substring)
///
/// An empty phrase list matches nothing; an empty phrase matches everything.
pub fn contains_any(sentence: &str, phrases: &[String]) -> bool {
    phrases.iter().any(|p| sentence.contains(p.as_str()))
}

/// Inter-paragraph search: every sentence in the corpus that contains one of
/// the phrases, in reading order, joined with single spaces
///
/// The search is deliberately not windowed around any anchor sentence.
pub fn filter_sentences(sentences: &[String], phrases: &[String]) -> String {
    debug!(sentence_count = sentences.len(), phrase_count = phrases.len(), "filter_sentences: called");
    let matched: Vec<&str> = sentences
        .iter()
        .filter(|s| contains_any(s, phrases))
        .map(String::as_str)
        .collect();
    debug!(matched = matched.len(), "filter_sentences: done");
    matched.join(" ")
}
