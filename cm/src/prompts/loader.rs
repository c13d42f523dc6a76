//! Prompt Loader
//!
//! Loads prompt templates from files or falls back to embedded defaults.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use eyre::{Result, eyre};
use handlebars::Handlebars;
use serde::Serialize;
use tracing::{debug, info};

use super::embedded;

/// Every template the extraction chain sends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptName {
    /// Extraction system prompt (used when no per-property file is given)
    System,
    /// P1: does the sentence report the property?
    Classify,
    /// P2: which property values?
    ExtractValues,
    /// P3: which materials for this value?
    ExtractMaterials,
    /// P4: which condition value?
    ExtractCondition,
    /// P4 re-asked against the inter-paragraph excerpt
    ExtractConditionFallback,
    /// F1: is the material name complete?
    FollowupComplete,
    /// F2: is the material specific?
    FollowupSpecific,
    /// F3: is material really paired with the value?
    FollowupPairing,
    /// F3 without dialogue history (excerpt appended)
    FollowupPairingNoChat,
    /// F4: is the condition value correctly associated?
    FollowupCondition,
    /// F4 without dialogue history (excerpt appended)
    FollowupConditionNoChat,
}

impl PromptName {
    pub const ALL: [PromptName; 12] = [
        PromptName::System,
        PromptName::Classify,
        PromptName::ExtractValues,
        PromptName::ExtractMaterials,
        PromptName::ExtractCondition,
        PromptName::ExtractConditionFallback,
        PromptName::FollowupComplete,
        PromptName::FollowupSpecific,
        PromptName::FollowupPairing,
        PromptName::FollowupPairingNoChat,
        PromptName::FollowupCondition,
        PromptName::FollowupConditionNoChat,
    ];

    /// Get the template file stem for this prompt
    pub fn template_name(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::Classify => "classify",
            Self::ExtractValues => "extract-values",
            Self::ExtractMaterials => "extract-materials",
            Self::ExtractCondition => "extract-condition",
            Self::ExtractConditionFallback => "extract-condition-fallback",
            Self::FollowupComplete => "followup-complete",
            Self::FollowupSpecific => "followup-specific",
            Self::FollowupPairing => "followup-pairing",
            Self::FollowupPairingNoChat => "followup-pairing-nochat",
            Self::FollowupCondition => "followup-condition",
            Self::FollowupConditionNoChat => "followup-condition-nochat",
        }
    }

    /// Short label used in trace lines and logs
    pub fn label(&self) -> &'static str {
        match self {
            Self::System => "System",
            Self::Classify => "Prompt 1",
            Self::ExtractValues => "Prompt 2",
            Self::ExtractMaterials => "Prompt 3",
            Self::ExtractCondition => "Prompt 4",
            Self::ExtractConditionFallback => "Prompt 4-IP",
            Self::FollowupComplete => "Follow-up 1",
            Self::FollowupSpecific => "Follow-up 2",
            Self::FollowupPairing | Self::FollowupPairingNoChat => "Follow-up 3",
            Self::FollowupCondition | Self::FollowupConditionNoChat => "Follow-up 4",
        }
    }

    pub fn from_template_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.template_name() == name)
    }
}

impl std::fmt::Display for PromptName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.template_name())
    }
}

/// Placeholder values for rendering prompt templates
///
/// Serialized in camelCase: `property`, `propertyValue`, `material`,
/// `operatingCondition`, `operatingConditionValue`.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptContext {
    pub property: String,
    pub property_value: Option<String>,
    pub material: Option<String>,
    pub operating_condition: Option<String>,
    pub operating_condition_value: Option<String>,
}

impl PromptContext {
    pub fn property(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            ..Self::default()
        }
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.property_value = Some(value.into());
        self
    }

    pub fn with_material(mut self, material: impl Into<String>) -> Self {
        self.material = Some(material.into());
        self
    }

    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.operating_condition = Some(condition.into());
        self
    }

    pub fn with_condition_value(mut self, value: impl Into<String>) -> Self {
        self.operating_condition_value = Some(value.into());
        self
    }

    /// Every placeholder filled, for dry-run rendering
    pub fn sample() -> Self {
        Self::property("C2 yield")
            .with_value("85%")
            .with_material("Na2WO4/SiO2")
            .with_condition("reaction operating temperature")
            .with_condition_value("700°C")
    }
}

/// Loads and renders prompt templates
pub struct PromptLoader {
    /// Handlebars template engine (HTML escaping off: prompts are plain text)
    hbs: Handlebars<'static>,
    /// Templates set in code or preloaded; checked before any directory
    templates: HashMap<String, String>,
    /// Configured override directory (`extraction.prompts-dir`)
    user_dir: Option<PathBuf>,
    /// Project-local directory (`.catminer/prompts/`)
    repo_dir: Option<PathBuf>,
}

impl PromptLoader {
    /// Create a loader checking `prompts_dir`, then `.catminer/prompts/`
    /// under `root`, then the embedded defaults
    pub fn new(root: impl AsRef<Path>, prompts_dir: Option<&Path>) -> Self {
        let root = root.as_ref();
        debug!(?root, ?prompts_dir, "PromptLoader::new: called");
        let repo_dir = root.join(".catminer/prompts");
        let repo_dir_exists = repo_dir.exists();
        debug!(?repo_dir, %repo_dir_exists, "PromptLoader::new: checking directories");

        Self {
            hbs: Self::engine(),
            templates: HashMap::new(),
            user_dir: prompts_dir.map(Path::to_path_buf),
            repo_dir: if repo_dir_exists { Some(repo_dir) } else { None },
        }
    }

    /// Create a loader that only uses embedded prompts (for testing)
    pub fn embedded_only() -> Self {
        debug!("PromptLoader::embedded_only: called");
        Self {
            hbs: Self::engine(),
            templates: HashMap::new(),
            user_dir: None,
            repo_dir: None,
        }
    }

    fn engine() -> Handlebars<'static> {
        let mut hbs = Handlebars::new();
        hbs.register_escape_fn(handlebars::no_escape);
        hbs
    }

    /// Set a template's text directly, taking precedence over files
    pub fn set_template(&mut self, name: PromptName, text: impl Into<String>) {
        debug!(%name, "PromptLoader::set_template: called");
        self.templates.insert(name.template_name().to_string(), text.into());
    }

    /// Load a template by name
    ///
    /// Checks in order:
    /// 1. Templates set in code or preloaded
    /// 2. Configured directory: `{prompts-dir}/{name}.pmt`
    /// 3. Project directory: `.catminer/prompts/{name}.pmt`
    /// 4. Embedded fallback
    pub fn load_template(&self, name: &str) -> Result<String> {
        debug!(%name, "PromptLoader::load_template: called");
        if let Some(text) = self.templates.get(name) {
            return Ok(text.clone());
        }

        for dir in [self.user_dir.as_ref(), self.repo_dir.as_ref()].into_iter().flatten() {
            let path = dir.join(format!("{}.pmt", name));
            if path.exists() {
                debug!(?path, "PromptLoader::load_template: found on disk");
                return std::fs::read_to_string(&path)
                    .map_err(|e| eyre!("Failed to read prompt {}: {}", path.display(), e));
            }
            debug!(?path, "PromptLoader::load_template: not found on disk");
        }

        debug!("PromptLoader::load_template: trying embedded fallback");
        if let Some(content) = embedded::get_embedded(name) {
            return Ok(content.to_string());
        }

        debug!(%name, "PromptLoader::load_template: not found anywhere");
        Err(eyre!("Prompt template not found: {}", name))
    }

    /// Resolve every template once so later renders never touch the disk
    pub fn preload(&mut self) -> Result<()> {
        debug!("PromptLoader::preload: called");
        for name in PromptName::ALL {
            let text = self.load_template(name.template_name())?;
            self.templates.insert(name.template_name().to_string(), text);
        }
        info!("Preloaded {} prompt templates", PromptName::ALL.len());
        Ok(())
    }

    /// Render every template with sample values to surface syntax errors early
    pub fn check(&self) -> Result<()> {
        debug!("PromptLoader::check: called");
        let ctx = PromptContext::sample();
        for name in PromptName::ALL {
            self.render(name, &ctx)?;
        }
        Ok(())
    }

    /// Render a template with the given context
    pub fn render(&self, name: PromptName, context: &PromptContext) -> Result<String> {
        debug!(%name, property = %context.property, "PromptLoader::render: called");
        let template = self.load_template(name.template_name())?;
        self.hbs
            .render_template(&template, context)
            .map_err(|e| eyre!("Failed to render template {}: {}", name, e))
    }
}
