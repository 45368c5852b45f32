//! Report orchestration — structure generation, concurrent section
//! fan-out, completion-order fan-in, and final assembly.
//!
//! The engine never returns an error from a run: structure failures,
//! worker timeouts, and worker panics all degrade to a smaller (or
//! placeholder) report instead of aborting. Sections are independent by
//! construction, so a lost worker costs exactly one section.

use super::compile::{CompiledReport, ReportCompiler};
use super::consolidate::consolidate;
use super::reference::Reference;
use super::worker::SectionWorker;
use crate::config::EngineConfig;
use crate::llm::ModelClient;
use crate::search::SearchProvider;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{info, warn};

/// Drives a full report run for one topic.
pub struct ReportEngine {
    model: Arc<dyn ModelClient>,
    search: Arc<dyn SearchProvider>,
    config: EngineConfig,
    local_docs: Vec<Reference>,
}

impl ReportEngine {
    pub fn new(
        model: Arc<dyn ModelClient>,
        search: Arc<dyn SearchProvider>,
        config: EngineConfig,
    ) -> Self {
        Self {
            model,
            search,
            config,
            local_docs: Vec::new(),
        }
    }

    /// Seed every section with locally ingested evidence documents.
    pub fn with_local_documents(mut self, docs: Vec<Reference>) -> Self {
        self.local_docs = docs;
        self
    }

    /// Run the full pipeline for `topic`.
    ///
    /// Always yields a report: when the structure cannot be generated, is
    /// empty, or every section worker is lost, the placeholder report is
    /// returned instead.
    pub async fn run(&self, topic: &str) -> CompiledReport {
        info!(topic, "Starting report run");

        let tasks = match self.model.generate_structure(topic).await {
            Ok(tasks) => tasks,
            Err(e) => {
                warn!(error = %e, "Structure generation failed; emitting placeholder report");
                return ReportCompiler::placeholder(topic);
            }
        };
        if tasks.is_empty() {
            warn!("Structure generation produced no sections; emitting placeholder report");
            return ReportCompiler::placeholder(topic);
        }
        info!(sections = tasks.len(), "Report structure generated");

        let semaphore = Arc::new(Semaphore::new(
            self.config.report.max_concurrent_sections.max(1),
        ));
        let worker = SectionWorker::new(
            self.model.clone(),
            self.search.clone(),
            self.config.clone(),
        );
        let section_timeout = Duration::from_secs(self.config.report.section_timeout_secs);

        let mut join_set = JoinSet::new();
        for task in tasks {
            let worker = worker.clone();
            let semaphore = semaphore.clone();
            let topic = topic.to_string();
            let seed = self.local_docs.clone();
            join_set.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return None,
                };
                let title = task.title.clone();
                match timeout(section_timeout, worker.run(&topic, task, seed)).await {
                    Ok(output) => Some(output),
                    Err(_) => {
                        warn!(
                            section = %title,
                            timeout_secs = section_timeout.as_secs(),
                            "Section timed out; excluded from report"
                        );
                        None
                    }
                }
            });
        }

        // Fan-in: sections accumulate in completion order. A timed-out or
        // panicked worker is dropped rather than included half-done.
        let mut completed = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(Some(output)) => {
                    info!(section = %output.title, "Section joined");
                    completed.push(output);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(error = %e, "Section worker panicked; excluded from report");
                }
            }
        }

        if completed.is_empty() {
            warn!("No sections completed; emitting placeholder report");
            return ReportCompiler::placeholder(topic);
        }

        let (references, sections) =
            consolidate(&completed, &self.config.report.citation_separators);
        info!(
            sections = sections.len(),
            references = references.len(),
            "Report assembled"
        );
        ReportCompiler::compile(topic, &sections, &references)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use crate::llm::{Critique, DraftRequest, MockModelClient, QueryPlan};
    use crate::report::section::SectionTask;
    use crate::search::StaticSearchProvider;
    use async_trait::async_trait;

    /// A deterministic model: derives queries and drafts from the section
    /// title, so assertions hold regardless of completion order.
    struct TitleEchoModel {
        structure: Vec<SectionTask>,
    }

    #[async_trait]
    impl ModelClient for TitleEchoModel {
        async fn generate_structure(&self, _topic: &str) -> Result<Vec<SectionTask>, LlmError> {
            Ok(self.structure.clone())
        }

        async fn derive_query(
            &self,
            topic: &str,
            task: &SectionTask,
        ) -> Result<QueryPlan, LlmError> {
            Ok(QueryPlan {
                query: format!("{topic} {}", task.title),
                reasoning: String::new(),
            })
        }

        async fn draft_section(&self, request: DraftRequest<'_>) -> Result<String, LlmError> {
            Ok(format!("{} body [[1]].", request.task.title))
        }

        async fn critique_section(
            &self,
            _task: &SectionTask,
            _content: &str,
        ) -> Result<Critique, LlmError> {
            Ok(Critique::accept())
        }
    }

    /// A model whose query derivation never completes. Used to force
    /// section timeouts.
    struct StalledModel;

    #[async_trait]
    impl ModelClient for StalledModel {
        async fn generate_structure(&self, _topic: &str) -> Result<Vec<SectionTask>, LlmError> {
            Ok(vec![SectionTask::new("Stuck", "never finishes")])
        }

        async fn derive_query(
            &self,
            _topic: &str,
            _task: &SectionTask,
        ) -> Result<QueryPlan, LlmError> {
            std::future::pending().await
        }

        async fn draft_section(&self, _request: DraftRequest<'_>) -> Result<String, LlmError> {
            std::future::pending().await
        }

        async fn critique_section(
            &self,
            _task: &SectionTask,
            _content: &str,
        ) -> Result<Critique, LlmError> {
            std::future::pending().await
        }
    }

    fn hit() -> crate::report::reference::RawHit {
        crate::report::reference::RawHit {
            title: Some("Shared Source".into()),
            url: Some("https://x/shared".into()),
            content: Some("sufficiently long evidence".into()),
            score: Some(0.5),
        }
    }

    #[tokio::test]
    async fn test_full_run_produces_sections_and_bibliography() {
        let model = TitleEchoModel {
            structure: vec![
                SectionTask::new("Overview", "summarize"),
                SectionTask::new("Details", "deep dive"),
            ],
        };
        let engine = ReportEngine::new(
            Arc::new(model),
            Arc::new(StaticSearchProvider::new(vec![hit()])),
            EngineConfig::default(),
        );

        let report = engine.run("Acme").await;

        assert!(report.body.starts_with("# Acme"));
        assert!(report.body.contains("## Overview"));
        assert!(report.body.contains("## Details"));
        // Both sections cite the same url: exactly one global reference,
        // cited as [[1]] from both bodies.
        assert!(report.body.contains("Overview body [[1]]."));
        assert!(report.body.contains("Details body [[1]]."));
        assert_eq!(
            report.bibliography,
            "### References\n\n1. [Shared Source](https://x/shared)"
        );
    }

    #[tokio::test]
    async fn test_structure_failure_yields_placeholder() {
        let model = MockModelClient::new();
        model.queue_structure(Err(LlmError::ApiRequest {
            message: "boom".into(),
        }));
        let engine = ReportEngine::new(
            Arc::new(model),
            Arc::new(StaticSearchProvider::default()),
            EngineConfig::default(),
        );
        let report = engine.run("Acme").await;
        assert!(report.body.contains("No sections were produced"));
    }

    #[tokio::test]
    async fn test_empty_structure_yields_placeholder() {
        let model = MockModelClient::new();
        model.queue_structure(Ok(Vec::new()));
        let engine = ReportEngine::new(
            Arc::new(model),
            Arc::new(StaticSearchProvider::default()),
            EngineConfig::default(),
        );
        let report = engine.run("Acme").await;
        assert!(report.body.contains("No sections were produced"));
    }

    #[tokio::test]
    async fn test_timed_out_sections_yield_placeholder() {
        let mut config = EngineConfig::default();
        config.report.section_timeout_secs = 0;
        let engine = ReportEngine::new(
            Arc::new(StalledModel),
            Arc::new(StaticSearchProvider::default()),
            config,
        );
        let report = engine.run("Acme").await;
        assert!(report.body.contains("No sections were produced"));
    }

    #[tokio::test]
    async fn test_local_documents_seed_every_section() {
        let model = TitleEchoModel {
            structure: vec![SectionTask::new("Overview", "summarize")],
        };
        let mut config = EngineConfig::default();
        config.search.enable_web = false;
        let engine = ReportEngine::new(
            Arc::new(model),
            Arc::new(StaticSearchProvider::default()),
            config,
        )
        .with_local_documents(vec![Reference::local("notes.txt", "local evidence")]);

        let report = engine.run("Acme").await;
        assert!(report.bibliography.contains("1. notes.txt"));
    }
}
