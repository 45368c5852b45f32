//! Configuration for the Deepscribe engine.
//!
//! Uses `figment` for layered configuration: defaults -> user config file ->
//! workspace config file -> environment variables -> explicit overrides.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration for a report run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub llm: LlmConfig,
    pub search: SearchConfig,
    pub report: ReportConfig,
}

/// Configuration for the language-model boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider name: "openai" or any OpenAI-compatible endpoint.
    pub provider: String,
    /// Model identifier (e.g., "gpt-4o-mini", "qwen2.5:14b").
    pub model: String,
    /// Environment variable name containing the API key.
    pub api_key_env: String,
    /// Optional base URL override for the API endpoint.
    pub base_url: Option<String>,
    /// Default temperature for generation.
    pub temperature: f32,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Maximum retries for transient errors (rate limit, connection, timeout).
    pub max_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            base_url: None,
            temperature: 0.7,
            timeout_secs: 60,
            max_retries: 2,
        }
    }
}

/// Configuration for the evidence-search boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Whether to query the web at all. When false, sections rely solely on
    /// locally ingested documents.
    pub enable_web: bool,
    /// Maximum results to request per search call.
    pub max_results: usize,
    /// Per-search timeout in seconds.
    pub timeout_secs: u64,
    /// Minimum content length for a hit to be kept; shorter hits are noise.
    pub min_content_len: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            enable_web: true,
            max_results: 5,
            timeout_secs: 15,
            min_content_len: 10,
        }
    }
}

/// Configuration for report orchestration and citation cleanup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Hard cap on reflect iterations per section.
    pub max_reflections: usize,
    /// Maximum number of section workers running at once.
    pub max_concurrent_sections: usize,
    /// Wall-clock budget for a single section; workers exceeding it are
    /// dropped from the join rather than included with partial content.
    pub section_timeout_secs: u64,
    /// Safety ceiling on state-machine transitions within one worker.
    pub max_graph_steps: usize,
    /// Punctuation characters (besides whitespace) treated as citation-list
    /// separators when collapsing repeated citation markers.
    pub citation_separators: String,
    /// Directory where the CLI writes finished reports.
    pub output_dir: PathBuf,
    /// Local files or directories to ingest as evidence before searching.
    pub local_files: Vec<PathBuf>,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            max_reflections: 3,
            max_concurrent_sections: 4,
            section_timeout_secs: 300,
            max_graph_steps: 50,
            citation_separators: "、，,".to_string(),
            output_dir: PathBuf::from("reports"),
            local_files: Vec::new(),
        }
    }
}

/// Load configuration with figment layering.
///
/// Priority (lowest to highest): built-in defaults, user-level config
/// (`~/.config/deepscribe/config.toml`), workspace config
/// (`<workspace>/.deepscribe/config.toml`), `DEEPSCRIBE_`-prefixed
/// environment variables (nested fields split on `__`, e.g.
/// `DEEPSCRIBE_LLM__MODEL`), then explicit overrides.
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&EngineConfig>,
) -> Result<EngineConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(EngineConfig::default()));

    // User-level config
    if let Some(config_dir) = directories::ProjectDirs::from("dev", "deepscribe", "deepscribe") {
        let user_config = config_dir.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    // Workspace-level config
    if let Some(ws) = workspace {
        let ws_config = ws.join(".deepscribe").join("config.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // Environment variables (DEEPSCRIBE_LLM__MODEL, DEEPSCRIBE_SEARCH__ENABLE_WEB, etc.)
    figment = figment.merge(Env::prefixed("DEEPSCRIBE_").split("__"));

    // Explicit overrides
    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    figment.extract().map_err(Box::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.report.max_reflections, 3);
        assert_eq!(config.search.max_results, 5);
        assert_eq!(config.search.min_content_len, 10);
        assert_eq!(config.report.max_graph_steps, 50);
        assert!(config.search.enable_web);
    }

    #[test]
    fn test_serialize_roundtrip() {
        let config = EngineConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.report.max_reflections, config.report.max_reflections);
        assert_eq!(back.llm.model, config.llm.model);
    }

    #[test]
    fn test_env_layer_overrides_defaults() {
        let figment = Figment::from(Serialized::defaults(EngineConfig::default()))
            .merge(("report.max_reflections", 5))
            .merge(("llm.model", "qwen2.5:14b"));
        let config: EngineConfig = figment.extract().expect("config extracts");
        assert_eq!(config.report.max_reflections, 5);
        assert_eq!(config.llm.model, "qwen2.5:14b");
    }

    #[test]
    fn test_explicit_overrides_win() {
        let overrides = EngineConfig {
            report: ReportConfig {
                max_concurrent_sections: 9,
                ..Default::default()
            },
            ..Default::default()
        };
        let config = load_config(None, Some(&overrides)).expect("config loads");
        assert_eq!(config.report.max_concurrent_sections, 9);
    }
}
