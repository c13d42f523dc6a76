//! Per-document audit trace
//!
//! Every prompt, answer and control decision of one extraction job, as plain
//! text lines. Kept in memory and written out once the job finishes.

use std::fs::OpenOptions;
use std::path::Path;

use eyre::{Context, Result};
use tracing::debug;

use crate::llm::Role;

/// Append-only list of trace lines
#[derive(Debug, Clone, Default)]
pub struct Trace {
    entries: Vec<String>,
}

impl Trace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one conversation turn
    pub fn turn(&mut self, role: Role, text: &str) {
        self.push(format!("{}: {}", role.as_str().to_uppercase(), text));
    }

    /// Record a control decision (skip, discard, commit, ...)
    pub fn note(&mut self, message: impl Into<String>) {
        self.push(message.into());
    }

    /// Blank line between sentences, to keep the log readable
    pub fn separator(&mut self) {
        self.entries.push(String::new());
    }

    fn push(&mut self, line: String) {
        debug!(trace = %line, "Trace::push");
        self.entries.push(line);
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether any entry contains `needle`
    pub fn contains(&self, needle: &str) -> bool {
        self.entries.iter().any(|e| e.contains(needle))
    }

    /// Append the trace to a one-column CSV file, writing the header if new
    pub fn append_csv(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        debug!(?path, entries = self.entries.len(), "Trace::append_csv: called");

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).context(format!("Failed to create {}", parent.display()))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .context(format!("Failed to open trace file {}", path.display()))?;
        let needs_header = file.metadata().map(|m| m.len() == 0).unwrap_or(true);

        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        if needs_header {
            writer.write_record(["Trace"])?;
        }
        for entry in &self.entries {
            writer.write_record([entry])?;
        }
        writer.flush().context("Failed to flush trace file")?;
        Ok(())
    }
}
