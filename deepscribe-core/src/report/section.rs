//! Section tasks, working state, and the exit decision of the
//! search → draft → reflect loop.

use super::reference::Reference;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Immutable input to a section worker, produced by structure generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionTask {
    /// Section heading in the final report.
    pub title: String,
    /// Free-text guidance on what the section must contain
    /// (e.g. "include a financial table").
    pub instruction: String,
}

impl SectionTask {
    pub fn new(title: impl Into<String>, instruction: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            instruction: instruction.into(),
        }
    }
}

/// Immutable result a worker hands back to the orchestrator.
///
/// `content` carries local citation markers `[[1]]`, `[[2]]`, ... numbered
/// by the order references were added in this section: local citation `i`
/// refers to `local_refs[i - 1]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionOutput {
    pub title: String,
    pub content: String,
    pub local_refs: Vec<Reference>,
}

/// Current phase of a section worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionPhase {
    /// Gathering evidence.
    Searching,
    /// Composing the section text.
    Drafting,
    /// Critiquing the draft against the instruction.
    Reflecting,
    /// Loop finished; output can be emitted.
    Done,
}

/// Where the loop goes after a reflect step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextStep {
    /// Research again with the pending feedback query.
    Search,
    /// Rewrite without new evidence.
    Rewrite,
    /// Emit the section output.
    Done,
}

/// Mutable working state, owned exclusively by one section worker for its
/// lifetime and converted into a [`SectionOutput`] on loop exit.
#[derive(Debug, Clone)]
pub struct SectionState {
    pub task: SectionTask,
    /// Topic of the overall report.
    pub topic: String,
    /// The most recent search query issued for this section.
    pub query: String,
    /// Append-only evidence list, deduplicated by key.
    pub search_results: Vec<Reference>,
    /// Latest draft of the section body.
    pub current_content: String,
    /// Defect stated by the last reflection, if any.
    pub critique: Option<String>,
    /// Completed draft/reflect iterations.
    pub iteration_count: usize,
    /// Whether the last reflection judged the draft complete.
    pub is_satisfactory: bool,
    /// Follow-up query requested by the last reflection, if any.
    pub pending_feedback_query: Option<String>,
    /// Current phase of the state machine.
    pub phase: SectionPhase,
}

impl SectionState {
    pub fn new(task: SectionTask, topic: impl Into<String>) -> Self {
        Self {
            task,
            topic: topic.into(),
            query: String::new(),
            search_results: Vec::new(),
            current_content: String::new(),
            critique: None,
            iteration_count: 0,
            is_satisfactory: false,
            pending_feedback_query: None,
            phase: SectionPhase::Searching,
        }
    }

    /// Append references whose dedup key is not already present, preserving
    /// insertion order. Returns how many were actually added.
    pub fn append_references(&mut self, incoming: impl IntoIterator<Item = Reference>) -> usize {
        let mut seen: HashSet<String> = self
            .search_results
            .iter()
            .map(|r| r.dedup_key().to_string())
            .collect();

        let mut added = 0;
        for reference in incoming {
            let key = reference.dedup_key().to_string();
            if seen.insert(key) {
                self.search_results.push(reference);
                added += 1;
            }
        }
        added
    }

    /// Exit decision after a reflect step.
    ///
    /// The iteration cap overrides satisfaction so the loop always
    /// terminates regardless of model behavior.
    pub fn next_step(&self, max_reflections: usize) -> NextStep {
        if self.iteration_count >= max_reflections {
            return NextStep::Done;
        }
        if self.is_satisfactory {
            return NextStep::Done;
        }
        if self.pending_feedback_query.is_some() {
            NextStep::Search
        } else {
            NextStep::Rewrite
        }
    }

    /// Package the state as a section output. No further mutation occurs.
    pub fn into_output(self) -> SectionOutput {
        SectionOutput {
            title: self.task.title,
            content: self.current_content,
            local_refs: self.search_results,
        }
    }
}
