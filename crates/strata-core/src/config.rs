use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, StrataError};

/// Top-level Strata configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub analysis: AnalysisConfig,
    pub model: ModelConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub knowledge: KnowledgeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Directory for databases and saved reports (expand ~).
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_workload")]
    pub default_workload: String,
    /// Upper bound on knowledge base context spliced into one prompt.
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            default_workload: default_workload(),
            max_context_chars: default_max_context_chars(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    pub model_id: String,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Tried in order once the active credential hits a quota or rate limit.
    #[serde(default)]
    pub fallback_api_keys: Vec<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,
    /// Defaults to `<data_dir>/cache.db`.
    #[serde(default)]
    pub path: Option<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeConfig {
    /// Defaults to `<data_dir>/knowledge.db`.
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default = "default_chunk_chars")]
    pub chunk_chars: usize,
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            path: None,
            chunk_chars: default_chunk_chars(),
            search_limit: default_search_limit(),
        }
    }
}

fn default_data_dir() -> String {
    "~/.strata".to_string()
}

fn default_workload() -> String {
    "Kubernetes".to_string()
}

fn default_max_context_chars() -> usize {
    6_000
}

fn default_provider() -> String {
    "anthropic".to_string()
}

fn default_max_tokens() -> u32 {
    4_096
}

fn default_temperature() -> f32 {
    0.1
}

fn default_request_timeout() -> u64 {
    120
}

fn default_cache_enabled() -> bool {
    true
}

fn default_chunk_chars() -> usize {
    1_000
}

fn default_search_limit() -> usize {
    5
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| StrataError::ConfigNotFound(path.display().to_string()))?;

        // Expand ${ENV_VAR} references
        let expanded = expand_env_vars(&content);

        let config: AppConfig =
            toml::from_str(&expanded).map_err(|e| StrataError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.model.model_id.trim().is_empty() {
            return Err(StrataError::Config("model.model_id must not be empty".into()));
        }
        if self.model.api_key.is_none() && self.model.fallback_api_keys.is_empty() {
            return Err(StrataError::Config(
                "no API credential configured: set model.api_key or model.fallback_api_keys".into(),
            ));
        }
        Ok(())
    }

    /// Resolve the data directory (expand ~).
    pub fn data_dir(&self) -> PathBuf {
        let dir = &self.analysis.data_dir;
        if let Some(rest) = dir.strip_prefix("~/") {
            if let Some(home) = dirs_home() {
                return home.join(rest);
            }
        }
        PathBuf::from(dir)
    }

    pub fn cache_path(&self) -> PathBuf {
        match &self.cache.path {
            Some(p) => PathBuf::from(p),
            None => self.data_dir().join("cache.db"),
        }
    }

    pub fn knowledge_path(&self) -> PathBuf {
        match &self.knowledge.path {
            Some(p) => PathBuf::from(p),
            None => self.data_dir().join("knowledge.db"),
        }
    }

    pub fn reports_dir(&self) -> PathBuf {
        self.data_dir().join("reports")
    }
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                Err(_) => {
                    // Keep original if env var not set
                    result.push_str(&format!("${{{}}}", var_name));
                }
            }
        } else {
            result.push(c);
        }
    }
    result
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}
