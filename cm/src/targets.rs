//! Target specification: what to extract and where to look
//!
//! A targets file names one or more properties and the reaction conditions to
//! pair with them. Each property becomes its own [`TargetSpec`]; conditions
//! are shared so every record in a run has the same columns.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::document::ContextParams;

/// Errors loading or validating a targets file
#[derive(Debug, Error)]
pub enum TargetsError {
    #[error("Failed to read targets file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse targets file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Targets file defines no properties")]
    NoProperties,

    #[error("A {0} target has an empty name")]
    EmptyName(&'static str),

    #[error("Property '{0}' has no required phrases; use [\"\"] to consider every sentence")]
    NoPropertyPhrases(String),

    #[error("Condition '{0}' is listed more than once")]
    DuplicateCondition(String),
}

/// One thing to extract: a name, its excerpt window and its gating phrases
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub name: String,

    #[serde(default)]
    pub context: ContextParams,

    #[serde(rename = "required-phrases", default)]
    pub required_phrases: Vec<String>,
}

impl Target {
    pub fn new(name: impl Into<String>, context: ContextParams, required_phrases: &[&str]) -> Self {
        Self {
            name: name.into(),
            context,
            required_phrases: required_phrases.iter().map(|p| p.to_string()).collect(),
        }
    }
}

/// A property entry in the targets file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyTarget {
    #[serde(flatten)]
    pub target: Target,

    /// System prompt file used when system prompts are enabled
    #[serde(rename = "system-prompt", default)]
    pub system_prompt: Option<PathBuf>,
}

/// Property plus the ordered condition targets extracted alongside it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetSpec {
    pub property: Target,
    pub conditions: Vec<Target>,
}

impl TargetSpec {
    pub fn new(property: Target, conditions: Vec<Target>) -> Self {
        Self { property, conditions }
    }
}

/// The targets file as a whole
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetsFile {
    #[serde(default)]
    pub conditions: Vec<Target>,

    #[serde(default)]
    pub properties: Vec<PropertyTarget>,
}

impl TargetsFile {
    /// Load, resolve relative system-prompt paths against the file's
    /// directory, and validate
    pub fn load(path: impl AsRef<Path>) -> Result<Self, TargetsError> {
        let path = path.as_ref();
        debug!(?path, "TargetsFile::load: called");
        let shown = path.display().to_string();

        let content = fs::read_to_string(path).map_err(|e| TargetsError::Io {
            path: shown.clone(),
            source: e,
        })?;
        let mut file: Self = serde_yaml::from_str(&content).map_err(|e| TargetsError::Parse {
            path: shown.clone(),
            source: e,
        })?;

        if let Some(base) = path.parent() {
            for prop in &mut file.properties {
                if let Some(sp) = prop.system_prompt.as_mut()
                    && sp.is_relative()
                {
                    *sp = base.join(&*sp);
                }
            }
        }

        file.validate()?;
        info!(
            "Loaded {} properties and {} conditions from {}",
            file.properties.len(),
            file.conditions.len(),
            shown
        );
        Ok(file)
    }

    /// Check the invariants the chain relies on
    pub fn validate(&self) -> Result<(), TargetsError> {
        debug!("TargetsFile::validate: called");
        if self.properties.is_empty() {
            return Err(TargetsError::NoProperties);
        }
        for prop in &self.properties {
            if prop.target.name.trim().is_empty() {
                return Err(TargetsError::EmptyName("property"));
            }
            if prop.target.required_phrases.is_empty() {
                return Err(TargetsError::NoPropertyPhrases(prop.target.name.clone()));
            }
        }
        for (i, cond) in self.conditions.iter().enumerate() {
            if cond.name.trim().is_empty() {
                return Err(TargetsError::EmptyName("condition"));
            }
            if self.conditions[..i].iter().any(|c| c.name == cond.name) {
                return Err(TargetsError::DuplicateCondition(cond.name.clone()));
            }
        }
        Ok(())
    }

    /// Non-fatal problems worth telling the user about
    pub fn warnings(&self, inter_paragraph_search: bool) -> Vec<String> {
        if !inter_paragraph_search {
            return Vec::new();
        }
        self.conditions
            .iter()
            .filter(|c| c.required_phrases.is_empty())
            .map(|c| {
                format!(
                    "Condition '{}' has no required phrases; inter-paragraph search will never find it",
                    c.name
                )
            })
            .collect()
    }

    /// The spec for the property at `index`
    pub fn spec(&self, index: usize) -> Option<TargetSpec> {
        self.properties
            .get(index)
            .map(|p| TargetSpec::new(p.target.clone(), self.conditions.clone()))
    }

    /// One spec per property, in file order
    pub fn specs(&self) -> Vec<TargetSpec> {
        (0..self.properties.len()).filter_map(|i| self.spec(i)).collect()
    }
}
