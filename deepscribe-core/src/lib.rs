//! # Deepscribe Core
//!
//! Core library for the Deepscribe research-report engine.
//! Decomposes a topic into sections, researches and drafts each section
//! concurrently through a bounded search/draft/reflect loop, then merges
//! all sections into one document with a globally consistent,
//! deduplicated citation list.

pub mod config;
pub mod error;
pub mod llm;
pub mod report;
pub mod search;

// Re-export commonly used types at the crate root.
pub use config::{EngineConfig, LlmConfig, ReportConfig, SearchConfig};
pub use error::{DeepscribeError, Result};
pub use llm::{Critique, MockModelClient, ModelClient, QueryPlan};
pub use report::{
    CompiledReport, GlobalReferences, RawHit, Reference, ReportEngine, SectionOutput, SectionTask,
};
pub use search::{DocumentLoader, DuckDuckGoSearch, SearchProvider};
