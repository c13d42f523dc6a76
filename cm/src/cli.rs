//! CLI command definitions and subcommands

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use eyre::Result;
use tracing::debug;

use crate::config::Config;

/// CatMiner - catalyst data extraction through an LLM question chain
#[derive(Parser)]
#[command(
    name = "cm",
    about = "Extract catalyst, property and reaction-condition records from papers",
    version = env!("CARGO_PKG_VERSION"),
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the extraction chain over papers
    Extract {
        /// Targets file (properties and conditions to extract)
        targets: PathBuf,

        /// Paper files or glob patterns (title on line 1, one sentence per line)
        #[arg(required = true)]
        papers: Vec<String>,

        #[command(flatten)]
        overrides: ExtractOverrides,
    },

    /// Validate config, targets and prompt templates without calling the model
    Check {
        /// Targets file to validate
        targets: PathBuf,
    },

    /// Print the effective prompt templates
    Prompts {
        /// Template name (all templates when omitted)
        name: Option<String>,
    },
}

/// Command-line overrides for the extraction settings of the config file
#[derive(Debug, Clone, Default, clap::Args)]
pub struct ExtractOverrides {
    /// Follow-ups to ask, comma separated (e.g. 1,2,3,4); empty for none
    #[arg(short, long, value_delimiter = ',', num_args = 0..)]
    pub followups: Option<Vec<u8>>,

    /// Disable inter-paragraph search
    #[arg(long)]
    pub no_ips: bool,

    /// Send each question without the dialogue history
    #[arg(long)]
    pub no_chat: bool,

    /// Use the neutral system prompt
    #[arg(long)]
    pub no_system_prompt: bool,

    /// Keep every follow-up answer and never discard
    #[arg(long)]
    pub audit: bool,

    /// Records CSV path
    #[arg(short, long)]
    pub records: Option<PathBuf>,

    /// Trace CSV path
    #[arg(short, long)]
    pub trace: Option<PathBuf>,

    /// Do not write the trace
    #[arg(long)]
    pub no_trace: bool,

    /// Papers processed at the same time
    #[arg(short = 'j', long)]
    pub concurrency: Option<usize>,

    /// Remove existing output files first instead of appending
    #[arg(long)]
    pub overwrite: bool,
}

impl ExtractOverrides {
    /// Apply the overrides on top of a loaded config, then re-validate
    pub fn apply(&self, config: &mut Config) -> Result<()> {
        debug!(?self, "ExtractOverrides::apply: called");
        if let Some(followups) = &self.followups {
            config.extraction.followups = followups.clone();
        }
        if self.no_ips {
            config.extraction.inter_paragraph_search = false;
        }
        if self.no_chat {
            config.extraction.chat = false;
        }
        if self.no_system_prompt {
            config.extraction.system_prompt = false;
        }
        if self.audit {
            config.extraction.audit = true;
        }
        if let Some(records) = &self.records {
            config.run.records_path = records.clone();
        }
        if let Some(trace) = &self.trace {
            config.run.trace_path = trace.clone();
        }
        if self.no_trace {
            config.run.write_trace = false;
        }
        if let Some(concurrency) = self.concurrency {
            config.run.max_concurrent_documents = concurrency;
        }
        config.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_extract() {
        let cli = Cli::try_parse_from([
            "cm",
            "extract",
            "targets.yml",
            "papers/*.txt",
            "extra.txt",
            "--followups",
            "1,3",
            "--no-ips",
            "-j",
            "4",
        ])
        .unwrap();

        match cli.command {
            Command::Extract {
                targets,
                papers,
                overrides,
            } => {
                assert_eq!(targets, PathBuf::from("targets.yml"));
                assert_eq!(papers, vec!["papers/*.txt", "extra.txt"]);
                assert_eq!(overrides.followups, Some(vec![1, 3]));
                assert!(overrides.no_ips);
                assert_eq!(overrides.concurrency, Some(4));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_extract_requires_papers() {
        assert!(Cli::try_parse_from(["cm", "extract", "targets.yml"]).is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["cm", "check", "targets.yml", "-l", "debug", "-c", "my.yml"]).unwrap();
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert_eq!(cli.config, Some(PathBuf::from("my.yml")));
    }

    #[test]
    fn test_apply_overrides() {
        let mut config = Config::default();
        let overrides = ExtractOverrides {
            followups: Some(vec![]),
            no_chat: true,
            audit: true,
            no_trace: true,
            concurrency: Some(3),
            ..ExtractOverrides::default()
        };
        overrides.apply(&mut config).unwrap();

        assert!(config.extraction.followups.is_empty());
        assert!(!config.extraction.chat);
        assert!(config.extraction.audit);
        assert!(!config.run.write_trace);
        assert_eq!(config.run.max_concurrent_documents, 3);
    }

    #[test]
    fn test_apply_overrides_validates() {
        let mut config = Config::default();
        let overrides = ExtractOverrides {
            followups: Some(vec![7]),
            ..ExtractOverrides::default()
        };
        assert!(overrides.apply(&mut config).is_err());
    }
}
