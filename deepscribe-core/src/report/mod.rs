//! Report pipeline — section research, fan-out orchestration, and
//! citation consolidation.
//!
//! The pipeline has five stages:
//! 1. **Structure** — the model decomposes the topic into section tasks
//! 2. **Research** — one worker per section loops search → draft → reflect
//! 3. **Join** — completed sections accumulate in completion order
//! 4. **Consolidate** — per-section citations are renumbered against one
//!    global, deduplicated reference table
//! 5. **Compile** — sections and bibliography become the final document

pub mod compile;
pub mod consolidate;
pub mod orchestrator;
pub mod reference;
pub mod section;
pub mod worker;

pub use compile::{CompiledReport, ReportCompiler};
pub use consolidate::{consolidate, GlobalReferences, RewrittenSection};
pub use orchestrator::ReportEngine;
pub use reference::{RawHit, Reference, LOCAL_SOURCE_URL};
pub use section::{SectionOutput, SectionTask};
pub use worker::SectionWorker;
