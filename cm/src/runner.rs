//! Batch driver: every property of the targets file over every paper
//!
//! Documents run concurrently up to `run.max-concurrent-documents`; the
//! properties of one document run one after another. Results are written by
//! this driver alone, as each document finishes, so output files have a
//! single writer and a crash loses at most the documents still in flight.

use std::fs;
use std::path::{Path, PathBuf};

use eyre::{Context, Result, eyre};
use futures::StreamExt;
use futures::stream;
use tracing::{debug, info, warn};

use crate::chain::{DocumentOutcome, ExtractionChain};
use crate::config::RunConfig;
use crate::document::{Document, DocumentError};
use crate::llm::TokenUsage;
use crate::targets::{TargetSpec, TargetsFile};

/// Per document/property job figures
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobReport {
    pub source: String,
    pub property: String,
    pub records: usize,
    pub calls: usize,
    pub failed_calls: usize,
    pub usage: TokenUsage,
}

/// Totals for a whole run
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub documents: usize,
    pub jobs: Vec<JobReport>,
    pub records: usize,
    pub usage: TokenUsage,
    /// Documents that could not be read, with the reason
    pub failed_documents: Vec<(String, String)>,
}

impl RunSummary {
    fn add(&mut self, outcome: &DocumentOutcome) {
        self.records += outcome.records.len();
        self.usage += outcome.usage;
        self.jobs.push(JobReport {
            source: outcome.source.clone(),
            property: outcome.property.clone(),
            records: outcome.records.len(),
            calls: outcome.calls,
            failed_calls: outcome.failed_calls,
            usage: outcome.usage,
        });
    }

    pub fn failed_calls(&self) -> usize {
        self.jobs.iter().map(|j| j.failed_calls).sum()
    }
}

/// Expand file arguments; each may be a path or a glob pattern
///
/// The result is sorted and free of duplicates. A pattern matching nothing is
/// an error, so a typo never turns into an empty run.
pub fn expand_inputs(patterns: &[String]) -> Result<Vec<PathBuf>> {
    debug!(?patterns, "expand_inputs: called");
    let mut paths = Vec::new();
    for pattern in patterns {
        let mut matched = 0;
        for entry in glob::glob(pattern).context(format!("Invalid glob pattern: {}", pattern))? {
            let path = entry?;
            if path.is_file() {
                paths.push(path);
                matched += 1;
            }
        }
        if matched == 0 {
            return Err(eyre!("No papers match {}", pattern));
        }
    }
    paths.sort();
    paths.dedup();
    Ok(paths)
}

/// Runs the chain over a set of papers and persists the results
pub struct Runner {
    chain: ExtractionChain,
    targets: TargetsFile,
    settings: RunConfig,
}

impl Runner {
    pub fn new(chain: ExtractionChain, targets: TargetsFile, settings: RunConfig) -> Self {
        debug!(properties = targets.properties.len(), "Runner::new: called");
        Self {
            chain,
            targets,
            settings,
        }
    }

    /// Delete previous output files so the run starts from empty tables
    pub fn reset_outputs(&self) -> Result<()> {
        debug!("Runner::reset_outputs: called");
        for path in [&self.settings.records_path, &self.settings.trace_path] {
            if path.exists() {
                fs::remove_file(path).context(format!("Failed to remove {}", path.display()))?;
                info!("Removed previous output {}", path.display());
            }
        }
        Ok(())
    }

    /// The system turn of every property, in targets order
    ///
    /// Prompt files are read once, before any document, so a missing file
    /// stops the run instead of failing every job.
    pub fn system_prompts(&self) -> Result<Vec<String>> {
        debug!("Runner::system_prompts: called");
        self.targets
            .properties
            .iter()
            .map(|prop| {
                let custom = match (&prop.system_prompt, self.chain.options().use_system_prompt) {
                    (Some(path), true) => Some(
                        fs::read_to_string(path)
                            .context(format!("Failed to read system prompt {}", path.display()))?,
                    ),
                    _ => None,
                };
                self.chain.system_prompt(&prop.target.name, custom.as_deref())
            })
            .collect()
    }

    /// Extract every property from every paper
    pub async fn run(&self, papers: &[PathBuf]) -> Result<RunSummary> {
        debug!(papers = papers.len(), "Runner::run: called");
        let specs = self.targets.specs();
        let system_prompts = self.system_prompts()?;
        let concurrency = self.settings.max_concurrent_documents.max(1);
        info!(
            "Running {} properties over {} papers ({} at a time, follow-ups {:?})",
            specs.len(),
            papers.len(),
            concurrency,
            self.chain.options().followups.numbers()
        );

        let mut summary = RunSummary::default();
        let mut finished = stream::iter(papers)
            .map(|path| self.process_document(path, &specs, &system_prompts))
            .buffer_unordered(concurrency);

        while let Some((path, result)) = finished.next().await {
            match result {
                Ok(outcomes) => {
                    summary.documents += 1;
                    for outcome in &outcomes {
                        self.persist(outcome)?;
                        summary.add(outcome);
                    }
                }
                Err(e) => {
                    warn!("Skipping {}: {}", path.display(), e);
                    summary.failed_documents.push((path.display().to_string(), e.to_string()));
                }
            }
        }

        info!(
            "Run complete: {} documents, {} records, {} tokens",
            summary.documents,
            summary.records,
            summary.usage.total()
        );
        Ok(summary)
    }

    async fn process_document<'p>(
        &self,
        path: &'p Path,
        specs: &[TargetSpec],
        system_prompts: &[String],
    ) -> (&'p Path, Result<Vec<DocumentOutcome>, DocumentError>) {
        debug!(?path, "Runner::process_document: called");
        let doc = match Document::read(path) {
            Ok(doc) => doc,
            Err(e) => return (path, Err(e)),
        };

        let mut outcomes = Vec::with_capacity(specs.len());
        for (spec, system_prompt) in specs.iter().zip(system_prompts) {
            outcomes.push(self.chain.extract(&doc, spec, system_prompt).await);
        }
        (path, Ok(outcomes))
    }

    fn persist(&self, outcome: &DocumentOutcome) -> Result<()> {
        debug!(source = %outcome.source, property = %outcome.property, "Runner::persist: called");
        outcome.records.append_csv(&self.settings.records_path)?;
        if self.settings.write_trace {
            outcome.trace.append_csv(&self.settings.trace_path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{ExtractionOptions, FollowUps};
    use crate::document::ContextParams;
    use crate::llm::CompletionResponse;
    use crate::llm::client::mock::MockLlmClient;
    use crate::prompts::PromptLoader;
    use crate::targets::{PropertyTarget, Target};
    use std::sync::Arc;

    fn targets(system_prompt: Option<PathBuf>) -> TargetsFile {
        TargetsFile {
            conditions: vec![Target::new(
                "reaction operating temperature",
                ContextParams::default(),
                &["°C"],
            )],
            properties: vec![PropertyTarget {
                target: Target::new("C2 yield", ContextParams::default(), &["yield"]),
                system_prompt,
            }],
        }
    }

    fn runner(dir: &Path, targets: TargetsFile) -> (Runner, Arc<MockLlmClient>) {
        let client = Arc::new(MockLlmClient::from_fn(|req| {
            let question = req.last_user_text().unwrap_or_default();
            let answer = if question.starts_with("Which catalyst") {
                "Li/MgO"
            } else if question.starts_with("List every value") {
                "20%"
            } else if question.starts_with("What reaction operating temperature") {
                "800°C"
            } else {
                "yes"
            };
            Ok(CompletionResponse::text(answer, 5, 1))
        }));
        let options = ExtractionOptions {
            followups: FollowUps::none(),
            ..ExtractionOptions::default()
        };
        let chain = ExtractionChain::new(client.clone(), Arc::new(PromptLoader::embedded_only()), options);
        let settings = RunConfig {
            max_concurrent_documents: 2,
            records_path: dir.join("out/records.csv"),
            trace_path: dir.join("out/log.csv"),
            write_trace: true,
        };
        (Runner::new(chain, targets, settings), client)
    }

    fn write_paper(dir: &Path, name: &str, sentence: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, format!("A title\n{}\n", sentence)).unwrap();
        path
    }

    #[test]
    fn test_expand_inputs_globs_and_dedups() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_paper(dir.path(), "a.txt", "x");
        let b = write_paper(dir.path(), "b.txt", "y");
        let pattern = dir.path().join("*.txt").display().to_string();

        let paths = expand_inputs(&[pattern, a.display().to_string()]).unwrap();
        assert_eq!(paths, vec![a, b]);
    }

    #[test]
    fn test_expand_inputs_rejects_empty_match() {
        let dir = tempfile::tempdir().unwrap();
        let pattern = dir.path().join("*.md").display().to_string();
        assert!(expand_inputs(&[pattern]).is_err());
    }

    #[tokio::test]
    async fn test_run_writes_records_and_trace() {
        let dir = tempfile::tempdir().unwrap();
        let papers = vec![
            write_paper(dir.path(), "a.txt", "Li/MgO gave a C2 yield of 20% at 800°C."),
            write_paper(dir.path(), "b.txt", "Nothing relevant here."),
        ];
        let (runner, client) = runner(dir.path(), targets(None));

        let summary = runner.run(&papers).await.unwrap();

        assert_eq!(summary.documents, 2);
        assert_eq!(summary.jobs.len(), 2);
        assert_eq!(summary.records, 1);
        assert_eq!(summary.usage, TokenUsage::new(5 * client.call_count() as u64, client.call_count() as u64));

        let records = fs::read_to_string(dir.path().join("out/records.csv")).unwrap();
        assert_eq!(records.lines().count(), 2);
        assert!(records.contains("Li/MgO"));
        assert!(records.contains("800°C"));
        assert!(dir.path().join("out/log.csv").exists());
    }

    #[tokio::test]
    async fn test_unreadable_document_does_not_stop_run() {
        let dir = tempfile::tempdir().unwrap();
        let papers = vec![
            dir.path().join("missing.txt"),
            write_paper(dir.path(), "a.txt", "Li/MgO gave a C2 yield of 20% at 800°C."),
        ];
        let (runner, _client) = runner(dir.path(), targets(None));

        let summary = runner.run(&papers).await.unwrap();

        assert_eq!(summary.documents, 1);
        assert_eq!(summary.failed_documents.len(), 1);
        assert_eq!(summary.records, 1);
    }

    #[tokio::test]
    async fn test_empty_document_completes_without_records() {
        let dir = tempfile::tempdir().unwrap();
        let empty = dir.path().join("empty.txt");
        fs::write(&empty, "").unwrap();
        let (runner, client) = runner(dir.path(), targets(None));

        let summary = runner.run(&[empty]).await.unwrap();

        assert_eq!(summary.documents, 1);
        assert!(summary.failed_documents.is_empty());
        assert_eq!(summary.records, 0);
        assert_eq!(client.call_count(), 0);
    }

    #[test]
    fn test_system_prompts_read_property_files() {
        let dir = tempfile::tempdir().unwrap();
        let prompt = dir.path().join("yield.txt");
        fs::write(&prompt, "You read OCM papers.\n").unwrap();
        let (runner, _client) = runner(dir.path(), targets(Some(prompt)));

        assert_eq!(runner.system_prompts().unwrap(), vec!["You read OCM papers."]);
    }

    #[test]
    fn test_system_prompts_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let (runner, _client) = runner(dir.path(), targets(Some(dir.path().join("nope.txt"))));
        assert!(runner.system_prompts().is_err());
    }

    #[test]
    fn test_reset_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let (runner, _client) = runner(dir.path(), targets(None));
        fs::create_dir_all(dir.path().join("out")).unwrap();
        fs::write(dir.path().join("out/records.csv"), "old").unwrap();

        runner.reset_outputs().unwrap();
        assert!(!dir.path().join("out/records.csv").exists());
    }
}
