//! Building an engine from configuration.

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use recall_config::{Config, EmbeddingConfig, EmbeddingProviderKind};
use recall_memory_embedding::{
    DisabledEmbedding, EmbeddingProvider, HashEmbedding, LocalEmbedding, OpenAIEmbedding,
    OpenAIEmbeddingConfig,
};
use recall_memory_sqlite::SqliteMemoryStore;
use recall_protocols::MemoryError;

use crate::backend::{EngineOptions, MemoryEngine};

/// Construct the configured embedding provider.
///
/// Misconfiguration yields a [`DisabledEmbedding`] with the reason, so the
/// engine still opens and runs lexical-only.
pub fn build_provider(config: &EmbeddingConfig) -> Arc<dyn EmbeddingProvider> {
    match config.provider {
        EmbeddingProviderKind::Local => {
            match LocalEmbedding::new(&config.model, config.cache_dir.clone()) {
                Ok(provider) => {
                    if !provider.is_available() {
                        warn!(
                            "Local embeddings need a build with --features local-embeddings, \
                             searches will be lexical only"
                        );
                    }
                    Arc::new(provider.with_query_instruction(config.query_instruction.clone()))
                }
                Err(e) => {
                    warn!("Local embeddings disabled: {}", e);
                    Arc::new(DisabledEmbedding::new(e.to_string()))
                }
            }
        }
        EmbeddingProviderKind::Openai => match &config.openai.api_key {
            Some(api_key) => Arc::new(OpenAIEmbedding::new(
                OpenAIEmbeddingConfig::new(api_key.clone())
                    .with_model(config.openai.model.clone())
                    .with_base_url(config.openai.base_url.clone())
                    .with_query_instruction(config.query_instruction.clone()),
            )),
            None => {
                warn!("OpenAI embeddings selected without an api_key");
                Arc::new(DisabledEmbedding::new("missing OpenAI api_key"))
            }
        },
        EmbeddingProviderKind::Hash => Arc::new(HashEmbedding::default()),
        EmbeddingProviderKind::None => Arc::new(DisabledEmbedding::default()),
    }
}

impl From<&Config> for EngineOptions {
    fn from(config: &Config) -> Self {
        Self {
            vector_weight: config.search.vector_weight,
            rrf_k: config.search.rrf_k,
            embed_timeout: Duration::from_secs(config.embedding.timeout_secs),
            default_limit: config.search.default_limit,
            prune_older_than_days: config.prune.older_than_days,
            prune_importance_below: config.prune.importance_below,
        }
    }
}

impl MemoryEngine {
    /// Open the configured store and provider.
    pub async fn from_config(config: &Config) -> Result<Self, MemoryError> {
        let storage = &config.storage;
        let store = if storage.path.as_os_str() == ":memory:" {
            SqliteMemoryStore::open_in_memory(storage.vector_index).await?
        } else {
            SqliteMemoryStore::open(&storage.path, storage.vector_index).await?
        };

        let embedder = build_provider(&config.embedding);
        Ok(Self::new(store, embedder, EngineOptions::from(config)))
    }
}
