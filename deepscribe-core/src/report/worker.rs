//! Section worker — the per-section search → draft → reflect state machine.
//!
//! One worker owns one section's working state for its whole lifetime.
//! Every collaborator failure (query derivation, search, drafting,
//! reflection) is converted into a deterministic local fallback at the
//! call site, so the machine always makes progress and always terminates:
//! at most `max_reflections` draft/reflect iterations, with a
//! `max_graph_steps` ceiling on raw transitions as a second line of
//! defense.

use super::reference::Reference;
use super::section::{NextStep, SectionOutput, SectionPhase, SectionState, SectionTask};
use crate::config::EngineConfig;
use crate::llm::{DraftRequest, ModelClient};
use crate::search::SearchProvider;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Substituted when the model fails to produce a parseable draft.
const DRAFT_PLACEHOLDER: &str =
    "*Content generation failed for this section; the draft could not be produced.*";

/// Runs one section through the research loop and emits its output.
#[derive(Clone)]
pub struct SectionWorker {
    model: Arc<dyn ModelClient>,
    search: Arc<dyn SearchProvider>,
    config: EngineConfig,
}

impl SectionWorker {
    pub fn new(
        model: Arc<dyn ModelClient>,
        search: Arc<dyn SearchProvider>,
        config: EngineConfig,
    ) -> Self {
        Self {
            model,
            search,
            config,
        }
    }

    /// Drive the state machine from `Searching` to `Done` and package the
    /// result. `seed_refs` (locally ingested documents) are injected ahead
    /// of the first search and deduplicated like any other evidence.
    pub async fn run(
        &self,
        topic: &str,
        task: SectionTask,
        seed_refs: Vec<Reference>,
    ) -> SectionOutput {
        let title = task.title.clone();
        let mut state = SectionState::new(task, topic);
        state.append_references(seed_refs);

        let mut steps = 0usize;
        while state.phase != SectionPhase::Done {
            steps += 1;
            if steps > self.config.report.max_graph_steps {
                warn!(
                    section = %title,
                    steps,
                    "Transition ceiling reached; emitting section as-is"
                );
                break;
            }

            match state.phase {
                SectionPhase::Searching => {
                    self.search_step(&mut state).await;
                    state.phase = SectionPhase::Drafting;
                }
                SectionPhase::Drafting => {
                    self.draft_step(&mut state).await;
                    state.phase = SectionPhase::Reflecting;
                }
                SectionPhase::Reflecting => {
                    self.reflect_step(&mut state).await;
                    state.phase = match state.next_step(self.config.report.max_reflections) {
                        NextStep::Done => SectionPhase::Done,
                        NextStep::Search => SectionPhase::Searching,
                        NextStep::Rewrite => SectionPhase::Drafting,
                    };
                }
                SectionPhase::Done => {}
            }
        }

        info!(
            section = %title,
            iterations = state.iteration_count,
            references = state.search_results.len(),
            "Section complete"
        );
        state.into_output()
    }

    /// SEARCHING: resolve the query (pending feedback query first, then a
    /// model-derived one, then the topic+title fallback), execute the
    /// search, and append deduplicated evidence.
    async fn search_step(&self, state: &mut SectionState) {
        let query = match state.pending_feedback_query.take() {
            Some(feedback_query) => {
                debug!(section = %state.task.title, query = %feedback_query, "Follow-up search");
                feedback_query
            }
            None => match self.model.derive_query(&state.topic, &state.task).await {
                Ok(plan) => {
                    debug!(
                        section = %state.task.title,
                        query = %plan.query,
                        reasoning = %plan.reasoning,
                        "Derived initial query"
                    );
                    ensure_topic_mention(&state.topic, plan.query)
                }
                Err(e) => {
                    warn!(section = %state.task.title, error = %e, "Query derivation failed; using fallback");
                    format!("{} {}", state.topic, state.task.title)
                }
            },
        };
        state.query = query.clone();

        if !self.config.search.enable_web {
            debug!(section = %state.task.title, "Web search disabled; relying on local evidence");
            return;
        }

        let hits = match timeout(
            Duration::from_secs(self.config.search.timeout_secs),
            self.search
                .search(&query, self.config.search.max_results),
        )
        .await
        {
            Ok(Ok(hits)) => hits,
            Ok(Err(e)) => {
                warn!(section = %state.task.title, error = %e, "Search failed; continuing with accumulated evidence");
                Vec::new()
            }
            Err(_) => {
                warn!(
                    section = %state.task.title,
                    timeout_secs = self.config.search.timeout_secs,
                    "Search timed out; continuing with accumulated evidence"
                );
                Vec::new()
            }
        };

        let min_len = self.config.search.min_content_len;
        let added = state.append_references(
            hits.into_iter()
                .filter_map(|hit| Reference::normalize(hit, min_len)),
        );
        debug!(
            section = %state.task.title,
            added,
            total = state.search_results.len(),
            "Evidence accumulated"
        );
    }

    /// DRAFTING: compose the section from ALL accumulated evidence, with
    /// the prior critique as a correction directive. A model failure
    /// substitutes a placeholder instead of crashing the worker.
    async fn draft_step(&self, state: &mut SectionState) {
        let request = DraftRequest {
            task: &state.task,
            topic: &state.topic,
            references: &state.search_results,
            critique: state.critique.as_deref(),
        };
        match self.model.draft_section(request).await {
            Ok(content) => state.current_content = content,
            Err(e) => {
                warn!(section = %state.task.title, error = %e, "Drafting failed; substituting placeholder");
                state.current_content = DRAFT_PLACEHOLDER.to_string();
            }
        }
        state.iteration_count += 1;
    }

    /// REFLECTING: judge the draft. An evaluation failure defaults to
    /// satisfactory (fail-open) to guarantee termination.
    async fn reflect_step(&self, state: &mut SectionState) {
        match self
            .model
            .critique_section(&state.task, &state.current_content)
            .await
        {
            Ok(critique) if critique.satisfied => {
                debug!(section = %state.task.title, "Draft judged satisfactory");
                state.is_satisfactory = true;
                state.critique = None;
                state.pending_feedback_query = None;
            }
            Ok(critique) => {
                let follow_up = critique
                    .follow_up_query
                    .map(|q| ensure_topic_mention(&state.topic, q));
                debug!(
                    section = %state.task.title,
                    feedback = critique.feedback.as_deref().unwrap_or(""),
                    follow_up = follow_up.as_deref().unwrap_or(""),
                    "Draft judged unsatisfactory"
                );
                state.is_satisfactory = false;
                state.critique = critique.feedback;
                state.pending_feedback_query = follow_up;
            }
            Err(e) => {
                warn!(section = %state.task.title, error = %e, "Reflection failed; accepting draft (fail-open)");
                state.is_satisfactory = true;
                state.critique = None;
                state.pending_feedback_query = None;
            }
        }
    }
}

/// Guarantee a query mentions the subject of the overall report.
fn ensure_topic_mention(topic: &str, query: String) -> String {
    if query.contains(topic) {
        query
    } else {
        format!("{topic} {query}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SearchError;
    use crate::llm::{Critique, MockModelClient, QueryPlan};
    use crate::report::reference::RawHit;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records queries and replays one batch of hits per call.
    #[derive(Default)]
    struct RecordingSearch {
        queries: Mutex<Vec<String>>,
        batches: Mutex<Vec<Vec<RawHit>>>,
    }

    impl RecordingSearch {
        fn with_batches(batches: Vec<Vec<RawHit>>) -> Self {
            Self {
                queries: Mutex::new(Vec::new()),
                batches: Mutex::new(batches),
            }
        }

        fn recorded(&self) -> Vec<String> {
            self.queries.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SearchProvider for RecordingSearch {
        async fn search(&self, query: &str, _max: usize) -> Result<Vec<RawHit>, SearchError> {
            self.queries.lock().unwrap().push(query.to_string());
            let mut batches = self.batches.lock().unwrap();
            if batches.is_empty() {
                Ok(Vec::new())
            } else {
                Ok(batches.remove(0))
            }
        }
    }

    struct FailingSearch;

    #[async_trait]
    impl SearchProvider for FailingSearch {
        async fn search(&self, _query: &str, _max: usize) -> Result<Vec<RawHit>, SearchError> {
            Err(SearchError::Request {
                message: "backend down".into(),
            })
        }
    }

    fn hit(title: &str, url: &str) -> RawHit {
        RawHit {
            title: Some(title.to_string()),
            url: Some(url.to_string()),
            content: Some(format!("evidence content from {title}")),
            score: Some(0.5),
        }
    }

    fn task() -> SectionTask {
        SectionTask::new("Market Overview", "Summarize the competitive market")
    }

    fn worker(
        model: MockModelClient,
        search: impl SearchProvider + 'static,
    ) -> SectionWorker {
        SectionWorker::new(Arc::new(model), Arc::new(search), EngineConfig::default())
    }

    #[tokio::test]
    async fn test_single_iteration_happy_path() {
        let model = MockModelClient::new();
        model.queue_query(Ok(QueryPlan {
            query: "Acme market share".into(),
            reasoning: "direct".into(),
        }));
        model.queue_draft(Ok("The market is growing [[1]].".into()));
        model.queue_critique(Ok(Critique::accept()));

        let search = RecordingSearch::with_batches(vec![vec![hit("A", "https://x/1")]]);
        let output = worker(model, search).run("Acme", task(), Vec::new()).await;

        assert_eq!(output.title, "Market Overview");
        assert_eq!(output.content, "The market is growing [[1]].");
        assert_eq!(output.local_refs.len(), 1);
    }

    #[tokio::test]
    async fn test_query_gets_topic_prefixed() {
        let model = MockModelClient::new();
        model.queue_query(Ok(QueryPlan {
            query: "market share trends".into(), // omits the topic
            reasoning: String::new(),
        }));
        model.queue_draft(Ok("draft".into()));
        model.queue_critique(Ok(Critique::accept()));

        let search = Arc::new(RecordingSearch::default());
        let w = SectionWorker::new(
            Arc::new(model),
            search.clone(),
            EngineConfig::default(),
        );
        w.run("Acme Corp", task(), Vec::new()).await;

        assert_eq!(search.recorded(), vec!["Acme Corp market share trends"]);
    }

    #[tokio::test]
    async fn test_query_derivation_failure_uses_fallback() {
        let model = MockModelClient::new();
        // No query queued: derive_query errors.
        model.queue_draft(Ok("draft".into()));
        model.queue_critique(Ok(Critique::accept()));

        let search = Arc::new(RecordingSearch::default());
        let w = SectionWorker::new(
            Arc::new(model),
            search.clone(),
            EngineConfig::default(),
        );
        w.run("Acme Corp", task(), Vec::new()).await;

        assert_eq!(search.recorded(), vec!["Acme Corp Market Overview"]);
    }

    #[tokio::test]
    async fn test_feedback_query_drives_second_search_and_accumulates() {
        let model = MockModelClient::new();
        model.queue_query(Ok(QueryPlan {
            query: "Acme overview".into(),
            reasoning: String::new(),
        }));
        model.queue_draft(Ok("v1 [[1]]".into()));
        model.queue_critique(Ok(Critique {
            satisfied: false,
            feedback: Some("missing financials".into()),
            follow_up_query: Some("Acme quarterly revenue".into()),
        }));
        model.queue_draft(Ok("v2 [[1]] [[2]]".into()));
        model.queue_critique(Ok(Critique::accept()));

        // Second batch repeats the first url plus one new source.
        let search = RecordingSearch::with_batches(vec![
            vec![hit("A", "https://x/1")],
            vec![hit("A", "https://x/1"), hit("B", "https://x/2")],
        ]);
        let output = worker(model, search).run("Acme", task(), Vec::new()).await;

        assert_eq!(output.content, "v2 [[1]] [[2]]");
        // Dedup across loop iterations: two distinct references, not three.
        assert_eq!(output.local_refs.len(), 2);
    }

    #[tokio::test]
    async fn test_iteration_hard_cap() {
        let model = MockModelClient::new();
        model.queue_query(Ok(QueryPlan {
            query: "Acme".into(),
            reasoning: String::new(),
        }));
        for i in 0..5 {
            model.queue_draft(Ok(format!("draft v{i}")));
            model.queue_critique(Ok(Critique {
                satisfied: false,
                feedback: Some("never good enough".into()),
                follow_up_query: Some("Acme more".into()),
            }));
        }

        let search = RecordingSearch::default();
        let output = worker(model, search).run("Acme", task(), Vec::new()).await;

        // max_reflections = 3: exactly three drafts, then forced exit.
        assert_eq!(output.content, "draft v2");
    }

    #[tokio::test]
    async fn test_search_failure_leaves_refs_unchanged() {
        let model = MockModelClient::new();
        model.queue_query(Ok(QueryPlan {
            query: "Acme".into(),
            reasoning: String::new(),
        }));
        model.queue_draft(Ok("draft from local evidence".into()));
        model.queue_critique(Ok(Critique::accept()));

        let seed = vec![Reference::local("notes.txt", "seeded local evidence")];
        let output = worker(model, FailingSearch)
            .run("Acme", task(), seed.clone())
            .await;

        assert_eq!(output.local_refs, seed);
        assert_eq!(output.content, "draft from local evidence");
    }

    #[tokio::test]
    async fn test_draft_failure_substitutes_placeholder() {
        let model = MockModelClient::new();
        model.queue_query(Ok(QueryPlan {
            query: "Acme".into(),
            reasoning: String::new(),
        }));
        // No draft queued: draft_section errors.
        model.queue_critique(Ok(Critique::accept()));

        let output = worker(model, RecordingSearch::default())
            .run("Acme", task(), Vec::new())
            .await;
        assert_eq!(output.content, DRAFT_PLACEHOLDER);
    }

    #[tokio::test]
    async fn test_reflection_failure_is_fail_open() {
        let model = MockModelClient::new();
        model.queue_query(Ok(QueryPlan {
            query: "Acme".into(),
            reasoning: String::new(),
        }));
        model.queue_draft(Ok("only draft".into()));
        // No critique queued: critique_section errors -> accept.

        let output = worker(model, RecordingSearch::default())
            .run("Acme", task(), Vec::new())
            .await;
        assert_eq!(output.content, "only draft");
    }

    #[tokio::test]
    async fn test_rewrite_without_new_search() {
        let model = MockModelClient::new();
        model.queue_query(Ok(QueryPlan {
            query: "Acme".into(),
            reasoning: String::new(),
        }));
        model.queue_draft(Ok("v1".into()));
        // Unsatisfied but no follow-up query: loop goes straight back to drafting.
        model.queue_critique(Ok(Critique {
            satisfied: false,
            feedback: Some("tone is off".into()),
            follow_up_query: None,
        }));
        model.queue_draft(Ok("v2 rewritten".into()));
        model.queue_critique(Ok(Critique::accept()));

        let search = Arc::new(RecordingSearch::default());
        let w = SectionWorker::new(
            Arc::new(model),
            search.clone(),
            EngineConfig::default(),
        );
        let output = w.run("Acme", task(), Vec::new()).await;

        assert_eq!(output.content, "v2 rewritten");
        // Only the initial search ran.
        assert_eq!(search.recorded().len(), 1);
    }
}
