//! Citation consolidation.
//!
//! Workers number citations locally: `[[i]]` in a section's content refers
//! to `local_refs[i - 1]` of that section. Consolidation merges every
//! section's references into one global, deduplicated table (first-seen
//! order), rewrites each section's citation markers to the global
//! numbering, and collapses the repeated citations that appear once two
//! local sources resolve to the same global entry.

use super::reference::Reference;
use super::section::SectionOutput;
use regex::{Captures, Regex};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Collapse passes are bounded so a pathological input cannot loop.
const MAX_COLLAPSE_PASSES: usize = 10;

/// The global, deduplicated reference table. Entry `i` (0-based) carries
/// global citation id `i + 1`.
#[derive(Debug, Default)]
pub struct GlobalReferences {
    entries: Vec<Reference>,
}

impl GlobalReferences {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries as `(global_id, reference)` pairs, ids starting at 1.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &Reference)> {
        self.entries.iter().enumerate().map(|(i, r)| (i + 1, r))
    }

    pub fn entries(&self) -> &[Reference] {
        &self.entries
    }
}

/// A section whose content now carries global citation ids.
#[derive(Debug, Clone)]
pub struct RewrittenSection {
    pub title: String,
    pub content: String,
}

/// Merge section references into a global table and rewrite every
/// section's citations against it.
///
/// `separators` is the set of punctuation characters (in addition to
/// whitespace) that may sit between two citation markers without breaking
/// their adjacency.
pub fn consolidate(
    sections: &[SectionOutput],
    separators: &str,
) -> (GlobalReferences, Vec<RewrittenSection>) {
    let citation =
        Regex::new(r"\[(\d+)\]").expect("citation marker pattern is valid");
    let collapser = CitationCollapser::new(separators);

    let mut entries: Vec<Reference> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut rewritten = Vec::with_capacity(sections.len());

    for section in sections {
        // Local position (1-based) -> global id, registering unseen
        // sources in first-seen order.
        let mut local_to_global: HashMap<usize, usize> = HashMap::new();
        for (pos, reference) in section.local_refs.iter().enumerate() {
            let key = reference.dedup_key().to_string();
            let global_id = *index.entry(key).or_insert_with(|| {
                entries.push(reference.clone());
                entries.len()
            });
            local_to_global.insert(pos + 1, global_id);
        }

        // `[N]` matches the inner brackets of `[[N]]` too, so one pass
        // renumbers both marker shapes. Ids with no local mapping are left
        // untouched rather than dropped.
        let remapped = citation.replace_all(&section.content, |caps: &Captures| {
            caps[1]
                .parse::<usize>()
                .ok()
                .and_then(|local| local_to_global.get(&local))
                .map(|global| format!("[{global}]"))
                .unwrap_or_else(|| caps[0].to_string())
        });

        rewritten.push(RewrittenSection {
            title: section.title.clone(),
            content: collapser.collapse(&remapped),
        });
    }

    debug!(
        sections = sections.len(),
        global_references = entries.len(),
        "Citations consolidated"
    );
    (GlobalReferences { entries }, rewritten)
}

/// Collapse repeated citations of the same global source.
///
/// Convenience wrapper for callers that only need the text pass.
pub fn collapse_repeated_citations(content: &str, separators: &str) -> String {
    CitationCollapser::new(separators).collapse(content)
}

/// Compiled patterns for the three collapse passes. Built once per
/// consolidation run.
struct CitationCollapser {
    double_adjacent: Regex,
    single_adjacent: Regex,
    block: Regex,
    block_id: Regex,
    block_sep: Regex,
}

impl CitationCollapser {
    fn new(separators: &str) -> Self {
        // Whitespace plus the configured punctuation. Brackets are never
        // part of the class, so markers cannot be matched across.
        let sep = format!(r"[\s{}]", regex::escape(separators));
        Self {
            double_adjacent: Regex::new(&format!(r"\[\[(\d+)\]\]({sep}*)\[\[(\d+)\]\]"))
                .expect("adjacent double-bracket pattern is valid"),
            single_adjacent: Regex::new(&format!(r"\[(\d+)\]({sep}*)\[(\d+)\]"))
                .expect("adjacent single-bracket pattern is valid"),
            block: Regex::new(&format!(r"\[\[\d+\]\](?:{sep}+\[\[\d+\]\])*"))
                .expect("citation block pattern is valid"),
            block_id: Regex::new(r"\[\[(\d+)\]\]").expect("block id pattern is valid"),
            block_sep: Regex::new(&format!(r"\]\]({sep}+)\[\["))
                .expect("block separator pattern is valid"),
        }
    }

    fn collapse(&self, content: &str) -> String {
        let text = self.collapse_adjacent(content, &self.double_adjacent, true);
        let text = self.collapse_blocks(&text);
        self.collapse_adjacent(&text, &self.single_adjacent, false)
    }

    /// Collapse immediately adjacent identical pairs, repeating until the
    /// text stops changing (a collapse can create a new adjacency).
    fn collapse_adjacent(&self, content: &str, pattern: &Regex, double: bool) -> String {
        let mut current = content.to_string();
        for _ in 0..MAX_COLLAPSE_PASSES {
            let next = pattern
                .replace_all(&current, |caps: &Captures| {
                    if caps[1] == caps[3] {
                        if double {
                            format!("[[{}]]", &caps[1])
                        } else {
                            format!("[{}]", &caps[1])
                        }
                    } else {
                        caps[0].to_string()
                    }
                })
                .into_owned();
            if next == current {
                break;
            }
            current = next;
        }
        current
    }

    /// Collapse runs of separator-joined double-bracket citations to their
    /// first occurrences, preserving order and the separator observed in
    /// the run.
    fn collapse_blocks(&self, content: &str) -> String {
        self.block
            .replace_all(content, |caps: &Captures| {
                let block_text = &caps[0];
                let mut seen = HashSet::new();
                let mut unique = Vec::new();
                for id in self.block_id.captures_iter(block_text) {
                    let id = id[1].to_string();
                    if seen.insert(id.clone()) {
                        unique.push(id);
                    }
                }
                let separator = self
                    .block_sep
                    .captures(block_text)
                    .map(|c| c[1].to_string())
                    .unwrap_or_else(|| " ".to_string());
                unique
                    .iter()
                    .map(|id| format!("[[{id}]]"))
                    .collect::<Vec<_>>()
                    .join(&separator)
            })
            .into_owned()
    }
}
