//! Local transformer embeddings.
//!
//! The model is loaded on the first embedding call, not at construction, so
//! opening an engine never blocks on a model download. A failed load marks
//! the provider unavailable for the rest of the process.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tracing::warn;

use crate::embedding::{DEFAULT_QUERY_INSTRUCTION, Embedding, EmbeddingError, EmbeddingProvider};

/// Local models that produce 384-dimensional vectors.
pub const SUPPORTED_LOCAL_MODELS: &[&str] = &["bge-small-en-v1.5", "all-minilm-l6-v2"];

#[cfg(feature = "local-embeddings")]
type SharedModel = std::sync::Arc<parking_lot::Mutex<fastembed::TextEmbedding>>;

/// Embeddings computed in-process with `fastembed`.
///
/// Without the `local-embeddings` feature this provider compiles but always
/// reports itself unavailable.
pub struct LocalEmbedding {
    model_name: String,
    cache_dir: Option<PathBuf>,
    query_instruction: String,
    load_failed: AtomicBool,
    #[cfg(feature = "local-embeddings")]
    model: tokio::sync::OnceCell<SharedModel>,
}

impl LocalEmbedding {
    /// Create a provider for one of [`SUPPORTED_LOCAL_MODELS`]. Nothing is loaded yet.
    pub fn new(model_name: &str, cache_dir: Option<PathBuf>) -> Result<Self, EmbeddingError> {
        if !SUPPORTED_LOCAL_MODELS.contains(&model_name) {
            return Err(EmbeddingError::InvalidInput(format!(
                "Unknown local embedding model '{}'. Supported: {}",
                model_name,
                SUPPORTED_LOCAL_MODELS.join(", ")
            )));
        }

        Ok(Self {
            model_name: model_name.to_string(),
            cache_dir,
            query_instruction: DEFAULT_QUERY_INSTRUCTION.to_string(),
            load_failed: AtomicBool::new(false),
            #[cfg(feature = "local-embeddings")]
            model: tokio::sync::OnceCell::new(),
        })
    }

    pub fn with_query_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.query_instruction = instruction.into();
        self
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Whether the model has been loaded into memory.
    pub fn is_loaded(&self) -> bool {
        #[cfg(feature = "local-embeddings")]
        {
            self.model.initialized()
        }
        #[cfg(not(feature = "local-embeddings"))]
        {
            false
        }
    }

    fn mark_failed(&self, error: &EmbeddingError) {
        if !self.load_failed.swap(true, Ordering::SeqCst) {
            warn!(
                "Local embedding model '{}' failed to load, continuing without vectors: {}",
                self.model_name, error
            );
        }
    }
}

#[cfg(feature = "local-embeddings")]
impl LocalEmbedding {
    fn resolve_model(&self) -> Result<fastembed::EmbeddingModel, EmbeddingError> {
        match self.model_name.as_str() {
            "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
            "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
            other => Err(EmbeddingError::InvalidInput(format!(
                "Unknown local embedding model '{}'",
                other
            ))),
        }
    }

    async fn load(&self) -> Result<SharedModel, EmbeddingError> {
        let model = self.resolve_model()?;
        let mut options = fastembed::InitOptions::new(model).with_show_download_progress(false);
        if let Some(dir) = &self.cache_dir {
            options = options.with_cache_dir(dir.clone());
        }

        tracing::info!("Loading local embedding model '{}'", self.model_name);
        let text_embedding = tokio::task::spawn_blocking(move || {
            fastembed::TextEmbedding::try_new(options)
                .map_err(|e| EmbeddingError::Unavailable(format!("Model load failed: {}", e)))
        })
        .await
        .map_err(|e| EmbeddingError::Failed(format!("spawn_blocking failed: {}", e)))??;

        Ok(std::sync::Arc::new(parking_lot::Mutex::new(text_embedding)))
    }

    async fn model(&self) -> Result<SharedModel, EmbeddingError> {
        match self.model.get_or_try_init(|| self.load()).await {
            Ok(model) => Ok(model.clone()),
            Err(e) => {
                self.mark_failed(&e);
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for LocalEmbedding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalEmbedding")
            .field("model", &self.model_name)
            .field("cache_dir", &self.cache_dir)
            .field("loaded", &self.is_loaded())
            .field("failed", &self.load_failed.load(Ordering::SeqCst))
            .finish()
    }
}

#[async_trait]
impl EmbeddingProvider for LocalEmbedding {
    #[cfg(feature = "local-embeddings")]
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>, EmbeddingError> {
        if !self.is_available() {
            return Err(EmbeddingError::Unavailable(format!(
                "local model '{}' is not loaded",
                self.model_name
            )));
        }
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let model = self.model().await?;
        let texts: Vec<String> = texts.iter().map(|t| t.to_string()).collect();

        let vectors = tokio::task::spawn_blocking(move || {
            let mut model = model.lock();
            model
                .embed(texts, None)
                .map_err(|e| EmbeddingError::Failed(format!("Batch embedding failed: {}", e)))
        })
        .await
        .map_err(|e| EmbeddingError::Failed(format!("spawn_blocking failed: {}", e)))??;

        Ok(vectors.into_iter().map(Embedding::normalized).collect())
    }

    #[cfg(not(feature = "local-embeddings"))]
    async fn embed_batch(&self, _texts: &[&str]) -> Result<Vec<Embedding>, EmbeddingError> {
        let error = EmbeddingError::Unavailable(
            "built without the local-embeddings feature".to_string(),
        );
        self.mark_failed(&error);
        Err(error)
    }

    fn query_instruction(&self) -> &str {
        &self.query_instruction
    }

    fn is_available(&self) -> bool {
        cfg!(feature = "local-embeddings") && !self.load_failed.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        &self.model_name
    }
}
