//! Record accumulator and CSV output
//!
//! The table schema is fixed when the table is created: five leading columns,
//! then two per condition target, then (in audit mode) the follow-up answers.

use std::fs::OpenOptions;
use std::path::Path;

use eyre::{Context, Result, eyre};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::answer;
use crate::targets::TargetSpec;

/// Outcome of extracting one condition for one material
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionValue {
    /// The model named a value
    Found(String),
    /// The model answered "none" (primary and fallback, if tried)
    NotFound,
    /// A gateway call for this condition failed
    Error,
    /// A value was found but failed verification
    Voided,
}

impl ConditionValue {
    /// Build from a raw model answer
    pub fn from_answer(answer: &str) -> Self {
        if answer::is_none(answer) {
            ConditionValue::NotFound
        } else {
            ConditionValue::Found(answer.trim().to_string())
        }
    }

    /// Text written to the table cell
    pub fn as_cell(&self) -> &str {
        match self {
            ConditionValue::Found(v) => v,
            ConditionValue::NotFound | ConditionValue::Voided => answer::NONE,
            ConditionValue::Error => answer::ERROR,
        }
    }
}

/// One condition column pair in a record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionEntry {
    pub name: String,
    pub value: ConditionValue,
}

/// Raw follow-up answers kept in audit mode
///
/// `None` means the question was not asked (disabled, not applicable, or
/// nothing to verify) and renders as "none"; a failed call holds "error".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub f1: Option<String>,
    pub f2: Option<String>,
    pub f3: Option<String>,
    pub conditions: Vec<ConditionAudit>,
}

/// Per-condition audit columns
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionAudit {
    /// Answer from the inter-paragraph fallback, when it ran
    pub fallback_value: Option<String>,
    /// F4 answer against the primary value
    pub f4: Option<String>,
    /// F4 answer against the fallback value
    pub fallback_f4: Option<String>,
}

/// One committed fact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub source: String,
    pub sentence: String,
    pub property: String,
    pub property_value: String,
    pub material: String,
    pub conditions: Vec<ConditionEntry>,
    pub audit: Option<AuditEntry>,
}

fn cell(answer: &Option<String>) -> String {
    answer.as_deref().map(str::trim).unwrap_or(answer::NONE).to_string()
}

/// Append-only, fixed-schema table of records
#[derive(Debug, Clone)]
pub struct RecordTable {
    condition_names: Vec<String>,
    audit: bool,
    rows: Vec<Record>,
}

impl RecordTable {
    /// Empty table with columns for every condition in `spec`
    pub fn new(spec: &TargetSpec, audit: bool) -> Self {
        debug!(conditions = spec.conditions.len(), %audit, "RecordTable::new: called");
        Self {
            condition_names: spec.conditions.iter().map(|c| c.name.clone()).collect(),
            audit,
            rows: Vec::new(),
        }
    }

    /// Column names, in order
    pub fn header(&self) -> Vec<String> {
        let mut header: Vec<String> = ["Source", "Sentence", "Property", "PropertyValue", "Material"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        for i in 1..=self.condition_names.len() {
            header.push(format!("Condition{}", i));
            header.push(format!("Condition{}Value", i));
        }
        if self.audit {
            header.extend(["F1Response", "F2Response", "F3Response"].iter().map(|s| s.to_string()));
            for i in 1..=self.condition_names.len() {
                header.push(format!("Condition{}FallbackValue", i));
                header.push(format!("Condition{}F4Response", i));
                header.push(format!("Condition{}FallbackF4Response", i));
            }
        }
        header
    }

    /// Append a record; its condition list must follow the table's targets
    pub fn push(&mut self, record: Record) {
        debug_assert_eq!(record.conditions.len(), self.condition_names.len());
        debug!(material = %record.material, value = %record.property_value, "RecordTable::push: called");
        self.rows.push(record);
    }

    pub fn rows(&self) -> &[Record] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// A record rendered as table cells, matching [`RecordTable::header`]
    pub fn cells(&self, record: &Record) -> Vec<String> {
        let mut cells = vec![
            record.source.clone(),
            record.sentence.clone(),
            record.property.clone(),
            record.property_value.clone(),
            record.material.clone(),
        ];
        for (i, name) in self.condition_names.iter().enumerate() {
            let value = record.conditions.get(i).map(|c| c.value.as_cell()).unwrap_or(answer::NONE);
            cells.push(name.clone());
            cells.push(value.to_string());
        }
        if self.audit {
            let audit = record.audit.clone().unwrap_or_default();
            cells.push(cell(&audit.f1));
            cells.push(cell(&audit.f2));
            cells.push(cell(&audit.f3));
            for i in 0..self.condition_names.len() {
                let cond = audit.conditions.get(i).cloned().unwrap_or_default();
                cells.push(cell(&cond.fallback_value));
                cells.push(cell(&cond.f4));
                cells.push(cell(&cond.fallback_f4));
            }
        }
        cells
    }

    /// Append all rows to a CSV file, writing the header if the file is new
    pub fn append_csv(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        debug!(?path, rows = self.rows.len(), "RecordTable::append_csv: called");

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).context(format!("Failed to create {}", parent.display()))?;
        }

        let needs_header = std::fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);
        if !needs_header {
            self.check_existing_header(path)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .context(format!("Failed to open records file {}", path.display()))?;

        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        if needs_header {
            writer.write_record(self.header())?;
        }
        for record in &self.rows {
            writer.write_record(self.cells(record))?;
        }
        writer.flush().context("Failed to flush records file")?;
        Ok(())
    }

    /// Refuse to append rows whose columns differ from the file's header
    fn check_existing_header(&self, path: &Path) -> Result<()> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(path)
            .context(format!("Failed to read records file {}", path.display()))?;
        let existing: Vec<String> = reader.headers()?.iter().map(String::from).collect();
        if existing != self.header() {
            return Err(eyre!(
                "{} has columns [{}] but this run writes [{}]; use another records path or --overwrite",
                path.display(),
                existing.join(", "),
                self.header().join(", ")
            ));
        }
        Ok(())
    }
}
