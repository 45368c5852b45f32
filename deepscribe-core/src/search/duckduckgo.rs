//! DuckDuckGo instant-answer search backend.
//!
//! No API key required, privacy-first: queries go directly to DuckDuckGo.
//! Returns loosely-typed hits built from the abstract answer, related
//! topics, and result entries of the instant-answer payload.

use super::SearchProvider;
use crate::error::SearchError;
use crate::report::reference::RawHit;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

pub struct DuckDuckGoSearch {
    client: Client,
    timeout_secs: u64,
}

impl DuckDuckGoSearch {
    pub fn new(timeout_secs: u64) -> Result<Self, SearchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent("Deepscribe/0.1")
            .build()
            .map_err(|e| SearchError::Request {
                message: format!("Failed to create HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            timeout_secs,
        })
    }

    fn hit(title: &str, url: &str, content: &str, score: f64) -> RawHit {
        RawHit {
            title: Some(title.to_string()),
            url: Some(url.to_string()),
            content: Some(content.to_string()),
            score: Some(score),
        }
    }
}

#[async_trait]
impl SearchProvider for DuckDuckGoSearch {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<RawHit>, SearchError> {
        let url = format!(
            "https://api.duckduckgo.com/?q={}&format=json&no_html=1&skip_disambig=1",
            urlencoding::encode(query)
        );

        let response = self.client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                SearchError::Timeout {
                    timeout_secs: self.timeout_secs,
                }
            } else {
                SearchError::Request {
                    message: format!("Search request failed: {e}"),
                }
            }
        })?;

        let body: Value = response.json().await.map_err(|e| SearchError::ResponseParse {
            message: format!("Failed to parse search response: {e}"),
        })?;

        let mut hits = Vec::new();

        // Abstract (main answer) ranks highest.
        if let Some(abstract_text) = body.get("AbstractText").and_then(|v| v.as_str()) {
            if !abstract_text.is_empty() {
                let source = body
                    .get("AbstractSource")
                    .and_then(|v| v.as_str())
                    .unwrap_or("Unknown");
                let url = body
                    .get("AbstractURL")
                    .and_then(|v| v.as_str())
                    .unwrap_or("");
                hits.push(Self::hit(source, url, abstract_text, 1.0));
            }
        }

        // Related topics.
        if let Some(topics) = body.get("RelatedTopics").and_then(|v| v.as_array()) {
            for topic in topics.iter().take(max_results.saturating_sub(hits.len())) {
                if let Some(text) = topic.get("Text").and_then(|v| v.as_str()) {
                    let url = topic.get("FirstURL").and_then(|v| v.as_str()).unwrap_or("");
                    hits.push(Self::hit(text, url, text, 0.5));
                }
            }
        }

        // Plain results.
        if let Some(results) = body.get("Results").and_then(|v| v.as_array()) {
            for result in results.iter().take(max_results.saturating_sub(hits.len())) {
                if let Some(text) = result.get("Text").and_then(|v| v.as_str()) {
                    let url = result
                        .get("FirstURL")
                        .and_then(|v| v.as_str())
                        .unwrap_or("");
                    hits.push(Self::hit(text, url, text, 0.5));
                }
            }
        }

        hits.truncate(max_results);
        debug!(query, hits = hits.len(), "DuckDuckGo search complete");
        Ok(hits)
    }
}
