//! Configuration schema definitions.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub prune: PruneConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Database location and index options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database file, or `:memory:`.
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,

    /// Create and use the vector index.
    #[serde(default = "default_true")]
    pub vector_index: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
            vector_index: true,
        }
    }
}

/// Default data directory (`~/.recall`).
pub fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".recall")
}

fn default_storage_path() -> PathBuf {
    default_data_dir().join("memory.db")
}

fn default_true() -> bool {
    true
}

/// Which embedding provider backs the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderKind {
    /// Local transformer model.
    Local,
    /// OpenAI-compatible HTTP endpoint.
    Openai,
    /// Deterministic feature hashing, no model.
    Hash,
    /// No embeddings; lexical search only.
    None,
}

impl Default for EmbeddingProviderKind {
    fn default() -> Self {
        Self::Local
    }
}

/// Embedding provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub provider: EmbeddingProviderKind,

    /// Local model name.
    #[serde(default = "default_model")]
    pub model: String,

    /// Directory for downloaded model files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,

    /// Upper bound for a single embedding call.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Prefix applied to queries before embedding them.
    #[serde(default = "default_query_instruction")]
    pub query_instruction: String,

    #[serde(default)]
    pub openai: OpenAIConfig,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderKind::default(),
            model: default_model(),
            cache_dir: None,
            timeout_secs: default_timeout_secs(),
            query_instruction: default_query_instruction(),
            openai: OpenAIConfig::default(),
        }
    }
}

fn default_model() -> String {
    "bge-small-en-v1.5".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_query_instruction() -> String {
    "Represent this sentence for searching relevant passages: ".to_string()
}

/// OpenAI-compatible embedding endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAIConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_openai_base_url")]
    pub base_url: String,

    #[serde(default = "default_openai_model")]
    pub model: String,
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_openai_base_url(),
            model: default_openai_model(),
        }
    }
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_openai_model() -> String {
    "text-embedding-3-small".to_string()
}

/// Ranking configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Weight of the vector list in fusion; lexical gets the remainder.
    #[serde(default = "default_vector_weight")]
    pub vector_weight: f64,

    /// Reciprocal rank fusion smoothing constant.
    #[serde(default = "default_rrf_k")]
    pub rrf_k: f64,

    #[serde(default = "default_limit")]
    pub default_limit: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            vector_weight: default_vector_weight(),
            rrf_k: default_rrf_k(),
            default_limit: default_limit(),
        }
    }
}

fn default_vector_weight() -> f64 {
    0.6
}

fn default_rrf_k() -> f64 {
    60.0
}

fn default_limit() -> usize {
    10
}

/// Pruning sweep defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PruneConfig {
    #[serde(default = "default_older_than_days")]
    pub older_than_days: u32,

    #[serde(default = "default_importance_below")]
    pub importance_below: f32,
}

impl Default for PruneConfig {
    fn default() -> Self {
        Self {
            older_than_days: default_older_than_days(),
            importance_below: default_importance_below(),
        }
    }
}

fn default_older_than_days() -> u32 {
    90
}

fn default_importance_below() -> f32 {
    0.3
}

/// Log output configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Directory for daily rolling log files. Console only when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,

    /// Default filter when `RUST_LOG` is not set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
}

#[cfg(test)]
#[path = "schema_tests.rs"]
mod tests;
