//! Language-model boundary.
//!
//! The engine consumes four logical model operations through the
//! [`ModelClient`] trait: structure generation, query derivation, section
//! drafting, and reflection. Concrete providers live in submodules;
//! [`MockModelClient`] provides scripted responses for tests.

pub mod openai_compat;
pub mod prompts;

use crate::error::LlmError;
use crate::report::reference::Reference;
use crate::report::section::SectionTask;
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

pub use openai_compat::OpenAiCompatibleClient;

/// A derived search query together with the model's reasoning.
#[derive(Debug, Clone)]
pub struct QueryPlan {
    pub query: String,
    pub reasoning: String,
}

/// Outcome of reflecting on a drafted section.
#[derive(Debug, Clone)]
pub struct Critique {
    /// Whether the draft satisfies the section instruction.
    pub satisfied: bool,
    /// Stated defect when unsatisfied.
    pub feedback: Option<String>,
    /// Follow-up search query when more evidence is needed.
    pub follow_up_query: Option<String>,
}

impl Critique {
    /// A critique that accepts the draft as-is.
    pub fn accept() -> Self {
        Self {
            satisfied: true,
            feedback: None,
            follow_up_query: None,
        }
    }
}

/// Inputs for drafting one section.
#[derive(Debug)]
pub struct DraftRequest<'a> {
    pub task: &'a SectionTask,
    /// Topic of the overall report.
    pub topic: &'a str,
    /// All evidence accumulated so far; position + 1 is the local citation
    /// number the draft must use.
    pub references: &'a [Reference],
    /// Correction directive from the previous reflection, if any.
    pub critique: Option<&'a str>,
}

/// Abstract contract for the drafting/query/reflection model.
///
/// Every operation may fail; callers convert failures into the
/// deterministic fallbacks the section state machine requires. No error
/// from this trait crosses a worker boundary.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Decompose the topic into an ordered list of section tasks.
    async fn generate_structure(&self, topic: &str) -> Result<Vec<SectionTask>, LlmError>;

    /// Derive the initial search query for a section.
    async fn derive_query(&self, topic: &str, task: &SectionTask) -> Result<QueryPlan, LlmError>;

    /// Compose section content from the accumulated evidence.
    async fn draft_section(&self, request: DraftRequest<'_>) -> Result<String, LlmError>;

    /// Evaluate a draft against its section instruction.
    async fn critique_section(
        &self,
        task: &SectionTask,
        content: &str,
    ) -> Result<Critique, LlmError>;
}

/// Execute an async operation with exponential backoff retry on transient
/// errors.
///
/// Retries on `LlmError::RateLimited` (respects `retry_after_secs`),
/// `LlmError::Connection`, and `LlmError::Timeout`. Permanent errors
/// (auth, parse) return immediately.
pub async fn with_retry<F, Fut, T>(max_retries: u32, operation: F) -> Result<T, LlmError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, LlmError>>,
{
    let mut last_err = None;
    for attempt in 0..=max_retries {
        match operation().await {
            Ok(val) => return Ok(val),
            Err(e) => {
                if !is_retryable(&e) || attempt == max_retries {
                    return Err(e);
                }

                let backoff_ms = compute_backoff(attempt, &e);
                tracing::warn!(
                    attempt = attempt + 1,
                    max = max_retries,
                    backoff_ms = backoff_ms,
                    error = %e,
                    "Retrying after transient error"
                );
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                last_err = Some(e);
            }
        }
    }
    Err(last_err.unwrap_or(LlmError::Connection {
        message: "All retry attempts exhausted".to_string(),
    }))
}

/// Check if an error is retryable (transient).
fn is_retryable(err: &LlmError) -> bool {
    matches!(
        err,
        LlmError::RateLimited { .. } | LlmError::Connection { .. } | LlmError::Timeout { .. }
    )
}

/// Compute backoff delay, respecting rate limit retry-after headers.
fn compute_backoff(attempt: u32, err: &LlmError) -> u64 {
    let exponential = 500u64.saturating_mul(2u64.saturating_pow(attempt)).min(8_000);
    if let LlmError::RateLimited { retry_after_secs } = err {
        (retry_after_secs * 1000).max(exponential)
    } else {
        exponential
    }
}

/// A scripted model client for testing and development.
///
/// Responses are queued per operation and consumed in order; an empty
/// queue yields an `LlmError::Connection` so fallback paths get exercised.
#[derive(Default)]
pub struct MockModelClient {
    structures: std::sync::Mutex<Vec<Result<Vec<SectionTask>, LlmError>>>,
    queries: std::sync::Mutex<Vec<Result<QueryPlan, LlmError>>>,
    drafts: std::sync::Mutex<Vec<Result<String, LlmError>>>,
    critiques: std::sync::Mutex<Vec<Result<Critique, LlmError>>>,
}

impl MockModelClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_structure(&self, result: Result<Vec<SectionTask>, LlmError>) {
        self.structures.lock().unwrap().push(result);
    }

    pub fn queue_query(&self, result: Result<QueryPlan, LlmError>) {
        self.queries.lock().unwrap().push(result);
    }

    pub fn queue_draft(&self, result: Result<String, LlmError>) {
        self.drafts.lock().unwrap().push(result);
    }

    pub fn queue_critique(&self, result: Result<Critique, LlmError>) {
        self.critiques.lock().unwrap().push(result);
    }

    fn pop<T>(queue: &std::sync::Mutex<Vec<Result<T, LlmError>>>) -> Result<T, LlmError> {
        let mut queue = queue.lock().unwrap();
        if queue.is_empty() {
            Err(LlmError::Connection {
                message: "mock queue exhausted".to_string(),
            })
        } else {
            queue.remove(0)
        }
    }
}

#[async_trait]
impl ModelClient for MockModelClient {
    async fn generate_structure(&self, _topic: &str) -> Result<Vec<SectionTask>, LlmError> {
        Self::pop(&self.structures)
    }

    async fn derive_query(&self, _topic: &str, _task: &SectionTask) -> Result<QueryPlan, LlmError> {
        Self::pop(&self.queries)
    }

    async fn draft_section(&self, _request: DraftRequest<'_>) -> Result<String, LlmError> {
        Self::pop(&self.drafts)
    }

    async fn critique_section(
        &self,
        _task: &SectionTask,
        _content: &str,
    ) -> Result<Critique, LlmError> {
        Self::pop(&self.critiques)
    }
}
