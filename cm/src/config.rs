//! CatMiner configuration types and loading

use eyre::{Context, Result, eyre};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::chain::{ExtractionOptions, FollowUps};

/// Main CatMiner configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error); CLI flag wins
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,

    /// LLM provider configuration
    pub llm: LlmConfig,

    /// Prompt-chain toggles
    pub extraction: ExtractionConfig,

    /// Batch run settings
    pub run: RunConfig,
}

impl Config {
    /// Validate configuration before use
    ///
    /// Structural checks only; see [`Config::validate_credentials`] for the
    /// API key check that `extract` needs on top.
    pub fn validate(&self) -> Result<()> {
        self.extraction.options().context("Invalid extraction settings")?;
        if self.run.max_concurrent_documents == 0 {
            return Err(eyre!("run.max-concurrent-documents must be at least 1"));
        }
        if self.llm.max_tokens == 0 {
            return Err(eyre!("llm.max-tokens must be at least 1"));
        }
        Ok(())
    }

    /// Check that the configured API key variable is set
    pub fn validate_credentials(&self) -> Result<()> {
        self.llm
            .get_api_key()
            .map(|_| ())
            .context("LLM API key not found; export it or change llm.api-key-env")
    }

    /// Project then user config files, in lookup order
    fn candidate_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(".catminer.yml")];
        paths.extend(dirs::config_dir().map(|d| d.join("catminer").join("catminer.yml")));
        paths
    }

    /// Load the explicit file, else the first readable candidate, else defaults
    ///
    /// An explicit path must load. A broken candidate is logged and skipped.
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        for path in Self::candidate_paths().into_iter().filter(|p| p.exists()) {
            match Self::load_from_file(&path) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Config::load: skipping unreadable config")
                }
            }
        }

        tracing::info!("Config::load: no config file found, using defaults");
        Ok(Self::default())
    }

    /// Read just the log level, before logging is set up
    ///
    /// Errors are swallowed; the full load reports them once logging works.
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        Self::load(config_path).ok().and_then(|c| c.log_level)
    }

    fn load_from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).context("Failed to read config file")?;
        let config = serde_yaml::from_str(&text).context("Failed to parse config file")?;
        tracing::info!(path = %path.display(), "Config::load_from_file: loaded");
        Ok(config)
    }
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider name ("openai" or "anthropic")
    pub provider: String,

    /// Model identifier
    pub model: String,

    /// Environment variable containing the API key
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,

    /// API base URL
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Maximum tokens per response
    #[serde(rename = "max-tokens")]
    pub max_tokens: u32,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,

    /// Sampling temperature; omitted from requests when unset
    pub temperature: Option<f32>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            base_url: "https://api.openai.com".to_string(),
            max_tokens: 512,
            timeout_ms: 120_000,
            temperature: None,
        }
    }
}

impl LlmConfig {
    /// Read the API key from the configured environment variable
    pub fn get_api_key(&self) -> Result<String> {
        std::env::var(&self.api_key_env)
            .map_err(|_| eyre!("API key environment variable {} is not set", self.api_key_env))
    }
}

/// Prompt-chain toggles
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Use the per-property system prompt file (neutral default otherwise)
    #[serde(rename = "system-prompt")]
    pub system_prompt: bool,

    /// Send the running dialogue with each call instead of single turns
    pub chat: bool,

    /// Enabled follow-up questions, by number (1-4)
    pub followups: Vec<u8>,

    /// Re-ask missing conditions against a whole-document phrase search
    #[serde(rename = "inter-paragraph-search")]
    pub inter_paragraph_search: bool,

    /// Record every follow-up answer instead of acting on it
    pub audit: bool,

    /// Directory of `.pmt` templates overriding the embedded ones
    #[serde(rename = "prompts-dir")]
    pub prompts_dir: Option<PathBuf>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            system_prompt: true,
            chat: true,
            followups: vec![3],
            inter_paragraph_search: true,
            audit: false,
            prompts_dir: None,
        }
    }
}

impl ExtractionConfig {
    /// Validate and convert into the options the chain runs with
    pub fn options(&self) -> Result<ExtractionOptions> {
        let followups = FollowUps::from_numbers(&self.followups)?;
        Ok(ExtractionOptions {
            use_system_prompt: self.system_prompt,
            chat: self.chat,
            followups,
            inter_paragraph_search: self.inter_paragraph_search,
            audit: self.audit,
        })
    }
}

/// Batch run settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Documents processed concurrently (each with its own conversation)
    #[serde(rename = "max-concurrent-documents")]
    pub max_concurrent_documents: usize,

    /// CSV file records are appended to
    #[serde(rename = "records-path")]
    pub records_path: PathBuf,

    /// CSV file trace logs are appended to
    #[serde(rename = "trace-path")]
    pub trace_path: PathBuf,

    /// Whether to persist trace logs at all
    #[serde(rename = "write-trace")]
    pub write_trace: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_concurrent_documents: 1,
            records_path: PathBuf::from("records.csv"),
            trace_path: PathBuf::from("log.csv"),
            write_trace: true,
        }
    }
}
