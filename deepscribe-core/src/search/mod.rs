//! Evidence-search boundary.
//!
//! A [`SearchProvider`] turns a query into loosely-typed raw hits; the
//! report pipeline normalizes and deduplicates them. Search is best-effort:
//! an empty result list or an error never stops a section from drafting.

pub mod duckduckgo;
pub mod ingest;

use crate::error::SearchError;
use crate::report::reference::RawHit;
use async_trait::async_trait;

pub use duckduckgo::DuckDuckGoSearch;
pub use ingest::DocumentLoader;

/// Abstract contract for a full-text/web search backend.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Search for evidence. May legitimately return an empty list.
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<RawHit>, SearchError>;
}

/// A provider that returns the same canned hits for every query.
/// Useful for tests and offline runs.
#[derive(Default)]
pub struct StaticSearchProvider {
    hits: Vec<RawHit>,
}

impl StaticSearchProvider {
    pub fn new(hits: Vec<RawHit>) -> Self {
        Self { hits }
    }
}

#[async_trait]
impl SearchProvider for StaticSearchProvider {
    async fn search(&self, _query: &str, max_results: usize) -> Result<Vec<RawHit>, SearchError> {
        Ok(self.hits.iter().take(max_results).cloned().collect())
    }
}
