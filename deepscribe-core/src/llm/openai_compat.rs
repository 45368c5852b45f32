//! OpenAI-compatible model client.
//!
//! Works against OpenAI, Azure OpenAI, Ollama, vLLM, LM Studio, and any
//! endpoint that follows the OpenAI chat completions API format. All four
//! engine operations are issued as JSON-mode completions and decoded into
//! typed results.

use super::prompts;
use super::{with_retry, Critique, DraftRequest, ModelClient, QueryPlan};
use crate::config::LlmConfig;
use crate::error::LlmError;
use crate::report::reference::Reference;
use crate::report::section::SectionTask;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

/// OpenAI-compatible model client.
pub struct OpenAiCompatibleClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    timeout_secs: u64,
    max_retries: u32,
}

impl OpenAiCompatibleClient {
    /// Create a new client from configuration.
    ///
    /// Reads the API key from the environment variable named in
    /// `config.api_key_env`. Local endpoints (Ollama, vLLM, LM Studio)
    /// don't require a key; a dummy bearer token is used for them.
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let is_local = config
            .base_url
            .as_ref()
            .map(|u| u.contains("localhost") || u.contains("127.0.0.1"))
            .unwrap_or(false);

        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .or_else(|| {
                if is_local {
                    debug!("No API key set for local provider; using dummy bearer token");
                    Some("ollama".to_string())
                } else {
                    None
                }
            })
            .ok_or_else(|| LlmError::AuthFailed {
                provider: format!(
                    "OpenAI-compatible: env var '{}' not set",
                    config.api_key_env
                ),
            })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent("Deepscribe/0.1")
            .build()
            .map_err(|e| LlmError::Connection {
                message: format!("Failed to create HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            timeout_secs: config.timeout_secs,
            max_retries: config.max_retries,
        })
    }

    /// Issue one JSON-mode chat completion and decode the assistant
    /// message content as a JSON value.
    async fn complete_json(&self, system: &str, user: &str) -> Result<Value, LlmError> {
        let body = json!({
            "model": self.model,
            "temperature": self.temperature,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout {
                        timeout_secs: self.timeout_secs,
                    }
                } else {
                    LlmError::Connection {
                        message: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if status.as_u16() == 429 {
            let retry_after_secs = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(10);
            return Err(LlmError::RateLimited { retry_after_secs });
        }
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(LlmError::AuthFailed {
                provider: self.model.clone(),
            });
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(LlmError::ApiRequest {
                message: format!("HTTP {status}: {text}"),
            });
        }

        let envelope: Value = response.json().await.map_err(|e| LlmError::ResponseParse {
            message: format!("Invalid completion envelope: {e}"),
        })?;

        let content = envelope["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| LlmError::ResponseParse {
                message: "Missing choices[0].message.content".to_string(),
            })?;

        serde_json::from_str(content).map_err(|e| LlmError::ResponseParse {
            message: format!("Assistant message is not valid JSON: {e}"),
        })
    }

    /// Format accumulated evidence as numbered reference blocks so the
    /// model can cite by local id.
    fn format_references(references: &[Reference]) -> String {
        let mut out = String::new();
        for (i, reference) in references.iter().enumerate() {
            out.push_str(&format!(
                "Reference [{}]\nSource: {}\nURL: {}\nContent: {}\n\n",
                i + 1,
                reference.title,
                reference.url,
                reference.content,
            ));
        }
        out
    }
}

#[derive(Debug, Deserialize)]
struct StructureResponse {
    #[serde(default, alias = "items")]
    sections: Vec<SectionTaskJson>,
}

#[derive(Debug, Deserialize)]
struct SectionTaskJson {
    title: String,
    #[serde(alias = "content")]
    instruction: String,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    search_query: String,
    #[serde(default)]
    reasoning: String,
}

#[derive(Debug, Deserialize)]
struct DraftResponse {
    content: String,
}

#[derive(Debug, Deserialize)]
struct CritiqueResponse {
    satisfied: bool,
    #[serde(default)]
    feedback: Option<String>,
    #[serde(default)]
    follow_up_query: Option<String>,
}

/// Decode a structure payload, tolerating both `{"sections": [...]}` (or
/// `{"items": [...]}`) and a bare top-level array.
fn parse_structure(value: Value) -> Result<Vec<SectionTask>, LlmError> {
    let sections: Vec<SectionTaskJson> = if value.is_array() {
        serde_json::from_value(value)
    } else {
        serde_json::from_value::<StructureResponse>(value).map(|r| r.sections)
    }
    .map_err(|e| LlmError::ResponseParse {
        message: format!("Unrecognized structure payload: {e}"),
    })?;

    Ok(sections
        .into_iter()
        .map(|s| SectionTask::new(s.title, s.instruction))
        .collect())
}

#[async_trait]
impl ModelClient for OpenAiCompatibleClient {
    async fn generate_structure(&self, topic: &str) -> Result<Vec<SectionTask>, LlmError> {
        let user = format!("Plan a research report on: {topic}");
        let value = with_retry(self.max_retries, || {
            self.complete_json(prompts::STRUCTURE_SYSTEM_PROMPT, &user)
        })
        .await?;
        parse_structure(value)
    }

    async fn derive_query(&self, topic: &str, task: &SectionTask) -> Result<QueryPlan, LlmError> {
        let user = json!({
            "topic": topic,
            "title": task.title,
            "instruction": task.instruction,
        })
        .to_string();
        let value = with_retry(self.max_retries, || {
            self.complete_json(prompts::QUERY_SYSTEM_PROMPT, &user)
        })
        .await?;
        let parsed: QueryResponse =
            serde_json::from_value(value).map_err(|e| LlmError::ResponseParse {
                message: format!("Unrecognized query payload: {e}"),
            })?;
        Ok(QueryPlan {
            query: parsed.search_query,
            reasoning: parsed.reasoning,
        })
    }

    async fn draft_section(&self, request: DraftRequest<'_>) -> Result<String, LlmError> {
        let mut instruction = request.task.instruction.clone();
        if let Some(critique) = request.critique {
            instruction.push_str(&format!(
                "\n\nCorrection directive - revise to address this defect: {critique}"
            ));
        }
        let user = json!({
            "topic": request.topic,
            "title": request.task.title,
            "instruction": instruction,
            "references": Self::format_references(request.references),
        })
        .to_string();
        let value = with_retry(self.max_retries, || {
            self.complete_json(prompts::DRAFT_SYSTEM_PROMPT, &user)
        })
        .await?;
        let parsed: DraftResponse =
            serde_json::from_value(value).map_err(|e| LlmError::ResponseParse {
                message: format!("Unrecognized draft payload: {e}"),
            })?;
        Ok(parsed.content)
    }

    async fn critique_section(
        &self,
        task: &SectionTask,
        content: &str,
    ) -> Result<Critique, LlmError> {
        let user = json!({
            "title": task.title,
            "instruction": task.instruction,
            "draft": content,
        })
        .to_string();
        let value = with_retry(self.max_retries, || {
            self.complete_json(prompts::CRITIQUE_SYSTEM_PROMPT, &user)
        })
        .await?;
        let parsed: CritiqueResponse =
            serde_json::from_value(value).map_err(|e| LlmError::ResponseParse {
                message: format!("Unrecognized critique payload: {e}"),
            })?;
        Ok(Critique {
            satisfied: parsed.satisfied,
            feedback: parsed.feedback.filter(|s| !s.trim().is_empty()),
            follow_up_query: parsed.follow_up_query.filter(|s| !s.trim().is_empty()),
        })
    }
}
