//! CatMiner - catalyst data extraction
//!
//! CLI entry point for running and checking extraction jobs.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use colored::*;
use eyre::{Context, Result, eyre};
use tracing::{debug, info};

use catminer::cli::{Cli, Command, ExtractOverrides};
use catminer::config::Config;
use catminer::llm::create_client;
use catminer::prompts::{PromptLoader, PromptName};
use catminer::runner::{RunSummary, Runner, expand_inputs};
use catminer::{ExtractionChain, TargetsFile};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Note: Can't log params here since logging isn't initialized yet
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("catminer")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level).map(|s| s.to_uppercase()) {
        Some(s) => match s.as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::File::create(log_dir.join("catminer.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

/// Prompt loader honouring `extraction.prompts-dir` and `.catminer/prompts/`
fn prompt_loader(config: &Config) -> PromptLoader {
    PromptLoader::new(".", config.extraction.prompts_dir.as_deref())
}

/// Load the targets file and print its warnings
fn load_targets(path: &Path, config: &Config) -> Result<TargetsFile> {
    let targets = TargetsFile::load(path).context(format!("Failed to load targets from {}", path.display()))?;
    for warning in targets.warnings(config.extraction.inter_paragraph_search) {
        eprintln!("{} {}", "warning:".yellow(), warning);
    }
    Ok(targets)
}

async fn cmd_extract(
    mut config: Config,
    targets: &Path,
    papers: &[String],
    overrides: &ExtractOverrides,
) -> Result<()> {
    debug!(?targets, ?papers, "cmd_extract: called");
    overrides.apply(&mut config).context("Invalid settings")?;
    config.validate_credentials()?;

    let targets = load_targets(targets, &config)?;
    let papers = expand_inputs(papers)?;

    let mut prompts = prompt_loader(&config);
    prompts.preload()?;
    prompts.check().context("Prompt templates failed to render")?;

    let client = create_client(&config.llm)?;
    let options = config.extraction.options()?;
    let chain = ExtractionChain::new(client, Arc::new(prompts), options)
        .with_limits(config.llm.max_tokens, config.llm.temperature);
    let runner = Runner::new(chain, targets, config.run.clone());
    if overrides.overwrite {
        runner.reset_outputs()?;
    }

    println!(
        "{} {} papers with {} / {}",
        "Extracting".cyan().bold(),
        papers.len(),
        config.llm.provider,
        config.llm.model
    );
    let summary = runner.run(&papers).await?;
    print_summary(&summary, &config);
    Ok(())
}

fn print_summary(summary: &RunSummary, config: &Config) {
    for job in &summary.jobs {
        let failed = if job.failed_calls > 0 {
            format!(" ({} failed calls)", job.failed_calls).red().to_string()
        } else {
            String::new()
        };
        println!(
            "  {} [{}] {} records, {} in / {} out tokens{}",
            job.source,
            job.property.cyan(),
            job.records.to_string().green(),
            job.usage.input_tokens,
            job.usage.output_tokens,
            failed
        );
    }
    for (path, reason) in &summary.failed_documents {
        println!("  {} {}: {}", "✗".red(), path, reason);
    }
    println!(
        "{} {} records from {} papers, {} in / {} out tokens",
        "✓".green(),
        summary.records,
        summary.documents,
        summary.usage.input_tokens,
        summary.usage.output_tokens
    );
    println!("  records: {}", config.run.records_path.display());
    if config.run.write_trace {
        println!("  trace:   {}", config.run.trace_path.display());
    }
}

fn cmd_check(config: &Config, targets: &Path) -> Result<()> {
    debug!(?targets, "cmd_check: called");
    config.validate()?;
    println!("{} config", "✓".green());

    let targets = load_targets(targets, config)?;
    println!(
        "{} targets: {} properties, {} conditions",
        "✓".green(),
        targets.properties.len(),
        targets.conditions.len()
    );
    for prop in &targets.properties {
        if let Some(path) = &prop.system_prompt
            && !path.exists()
        {
            return Err(eyre!(
                "System prompt {} for '{}' does not exist",
                path.display(),
                prop.target.name
            ));
        }
    }

    prompt_loader(config).check()?;
    println!("{} {} prompt templates", "✓".green(), PromptName::ALL.len());

    if let Err(e) = config.validate_credentials() {
        println!("{} {:#}", "warning:".yellow(), e);
    }
    Ok(())
}

fn cmd_prompts(config: &Config, name: Option<&str>) -> Result<()> {
    debug!(?name, "cmd_prompts: called");
    let loader = prompt_loader(config);
    let names: Vec<PromptName> = match name {
        Some(n) => vec![PromptName::from_template_name(n).ok_or_else(|| eyre!("Unknown prompt template: {}", n))?],
        None => PromptName::ALL.to_vec(),
    };
    for name in names {
        println!("{} {}", "==".dimmed(), name.to_string().cyan());
        println!("{}", loader.load_template(name.template_name())?.trim_end());
        println!();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load log level from config file early (before full config load)
    let config_log_level = Config::load_log_level(cli.config.as_ref());
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    info!("CatMiner loaded config: provider={} model={}", config.llm.provider, config.llm.model);

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Extract {
            targets,
            papers,
            overrides,
        } => cmd_extract(config, &targets, &papers, &overrides).await,
        Command::Check { targets } => cmd_check(&config, &targets),
        Command::Prompts { name } => cmd_prompts(&config, name.as_deref()),
    }
}
