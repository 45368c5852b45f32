//! Final document assembly.
//!
//! Takes the consolidated sections and the global reference table and
//! renders the report as markdown: title, section bodies separated by
//! horizontal rules, and a numbered bibliography. Local documents are
//! listed by title only; web sources get their url as a link.

use super::consolidate::{GlobalReferences, RewrittenSection};
use serde::{Deserialize, Serialize};

/// The finished report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompiledReport {
    /// Title and section bodies, citations in global numbering.
    pub body: String,
    /// Numbered reference list, empty when nothing was cited.
    pub bibliography: String,
}

impl CompiledReport {
    /// The full document as a single markdown string.
    pub fn to_markdown(&self) -> String {
        if self.bibliography.is_empty() {
            self.body.clone()
        } else {
            format!("{}\n\n{}", self.body, self.bibliography)
        }
    }
}

/// Renders consolidated sections into a [`CompiledReport`].
pub struct ReportCompiler;

impl ReportCompiler {
    pub fn compile(
        topic: &str,
        sections: &[RewrittenSection],
        references: &GlobalReferences,
    ) -> CompiledReport {
        let rendered: Vec<String> = sections
            .iter()
            .map(|s| format!("## {}\n\n{}", s.title, s.content))
            .collect();
        let body = format!("# {}\n\n{}", topic, rendered.join("\n\n---\n\n"));

        let bibliography = if references.is_empty() {
            String::new()
        } else {
            let mut out = String::from("### References\n");
            for (id, reference) in references.iter() {
                if reference.is_local() {
                    out.push_str(&format!("\n{}. {}", id, reference.title));
                } else {
                    out.push_str(&format!(
                        "\n{}. [{}]({})",
                        id, reference.title, reference.url
                    ));
                }
            }
            out
        };

        CompiledReport { body, bibliography }
    }

    /// The report emitted when no sections could be produced at all.
    pub fn placeholder(topic: &str) -> CompiledReport {
        CompiledReport {
            body: format!(
                "# {topic}\n\nNo sections were produced for this topic. \
                 The report structure could not be generated or every \
                 section failed."
            ),
            bibliography: String::new(),
        }
    }
}
