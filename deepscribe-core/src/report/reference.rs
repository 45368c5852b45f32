//! Canonical reference records and deduplication keys.
//!
//! Every piece of evidence — web search hit or locally ingested document —
//! is normalized into a [`Reference`] before it enters a section's working
//! state. The dedup key decides whether two references denote the same
//! source, both within one section and across the whole report.

use serde::{Deserialize, Serialize};

/// Sentinel url for evidence that did not come from the web.
pub const LOCAL_SOURCE_URL: &str = "local";

/// Score assigned to locally ingested documents. Local evidence always
/// outranks web hits.
pub const LOCAL_SOURCE_SCORE: f64 = 10.0;

/// A url shorter than this cannot serve as a dedup key; the title is used
/// instead.
const MIN_URL_KEY_LEN: usize = 6;

/// A loosely-typed record from any evidence source, prior to normalization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawHit {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub score: Option<f64>,
}

/// Canonical record of one piece of retrieved evidence. Immutable once
/// created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    /// Source title; never empty.
    pub title: String,
    /// Source url, or [`LOCAL_SOURCE_URL`] for non-web evidence.
    pub url: String,
    /// Trimmed evidence text.
    pub content: String,
    /// Relevance score as reported by the backend.
    pub score: f64,
}

impl Reference {
    /// Normalize a raw hit into a canonical reference.
    ///
    /// Returns `None` when the trimmed content is shorter than
    /// `min_content_len` — such hits are noise and must be discarded
    /// rather than cited.
    pub fn normalize(raw: RawHit, min_content_len: usize) -> Option<Self> {
        let content = raw.content.unwrap_or_default().trim().to_string();
        if content.len() < min_content_len {
            return None;
        }

        let title = match raw.title {
            Some(t) if !t.trim().is_empty() => t.trim().to_string(),
            _ => "unknown".to_string(),
        };
        let url = match raw.url {
            Some(u) if !u.trim().is_empty() => u.trim().to_string(),
            _ => LOCAL_SOURCE_URL.to_string(),
        };

        Some(Self {
            title,
            url,
            content,
            score: raw.score.unwrap_or(0.0),
        })
    }

    /// Build a reference for a locally ingested document.
    pub fn local(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: LOCAL_SOURCE_URL.to_string(),
            content: content.into(),
            score: LOCAL_SOURCE_SCORE,
        }
    }

    /// Whether this reference points at non-web evidence.
    pub fn is_local(&self) -> bool {
        self.url == LOCAL_SOURCE_URL
    }

    /// The key used to decide whether two references denote the same
    /// source: the url when it is present, long enough to be meaningful,
    /// and not the local sentinel; the title otherwise.
    pub fn dedup_key(&self) -> &str {
        if self.url.len() >= MIN_URL_KEY_LEN && !self.is_local() {
            &self.url
        } else {
            &self.title
        }
    }
}
