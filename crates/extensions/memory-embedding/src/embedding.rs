//! Embedding provider contract and the model-free providers.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use md5::{Digest, Md5};
use recall_protocols::EMBEDDING_DIM;
use serde::{Deserialize, Serialize};

/// Instruction prepended to queries for asymmetric retrieval models.
pub const DEFAULT_QUERY_INSTRUCTION: &str =
    "Represent this sentence for searching relevant passages: ";

/// Error type for embedding operations.
#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("Embedding provider unavailable: {0}")]
    Unavailable(String),

    #[error("Embedding failed: {0}")]
    Failed(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Embedding timed out after {0:?}")]
    Timeout(Duration),
}

/// Embedding result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding {
    /// Vector representation.
    pub vector: Vec<f32>,
    /// Dimension of the embedding.
    pub dimension: usize,
}

impl Embedding {
    pub fn new(vector: Vec<f32>) -> Self {
        let dimension = vector.len();
        Self { vector, dimension }
    }

    /// Scale to unit L2 norm. A zero vector is left as is.
    pub fn normalized(mut vector: Vec<f32>) -> Self {
        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        Self::new(vector)
    }

    pub fn is_zero(&self) -> bool {
        self.vector.iter().all(|v| *v == 0.0)
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.vector
    }
}

/// Trait for embedding providers.
///
/// Implementations return unit-normalized vectors of [`dimension`](Self::dimension)
/// floats, in input order. `embed` and `embed_batch` must agree for the same text.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate embeddings for multiple texts.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>, EmbeddingError>;

    /// Generate the embedding for a passage, along with how long it took.
    async fn embed(&self, text: &str) -> Result<(Embedding, Duration), EmbeddingError> {
        let started = Instant::now();
        let embedding = self
            .embed_batch(&[text])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::Failed("Empty response".to_string()))?;
        Ok((embedding, started.elapsed()))
    }

    /// Embed a search query with the retrieval instruction prefix.
    async fn embed_query(&self, query: &str) -> Result<Embedding, EmbeddingError> {
        let prefixed = format!("{}{}", self.query_instruction(), query);
        let (embedding, _) = self.embed(&prefixed).await?;
        Ok(embedding)
    }

    fn query_instruction(&self) -> &str {
        DEFAULT_QUERY_INSTRUCTION
    }

    /// Whether a call made now can be expected to succeed.
    fn is_available(&self) -> bool;

    /// Get the embedding dimension.
    fn dimension(&self) -> usize {
        EMBEDDING_DIM
    }

    /// Short provider name for logs.
    fn name(&self) -> &str;
}

/// Feature-hashing embedding: word unigrams and character trigrams folded
/// into a fixed number of signed buckets.
///
/// Not semantic, but deterministic and free of model downloads.
pub struct HashEmbedding {
    dimension: usize,
    query_instruction: String,
}

impl HashEmbedding {
    /// A zero dimension is raised to one.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
            query_instruction: String::new(),
        }
    }

    /// Queries are hashed with this prefix. Empty by default since the
    /// prefix words would otherwise match every query against each other.
    pub fn with_query_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.query_instruction = instruction.into();
        self
    }

    fn hash_text(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        let mut vector = vec![0.0f32; self.dimension];

        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let word = word.to_lowercase();
            self.add_feature(&mut vector, &word, 2.0);

            let chars: Vec<char> = format!("#{}#", word).chars().collect();
            for gram in chars.windows(3) {
                let gram: String = gram.iter().collect();
                self.add_feature(&mut vector, &gram, 1.0);
            }
        }

        let embedding = Embedding::normalized(vector);
        if embedding.is_zero() {
            return Err(EmbeddingError::InvalidInput(
                "text has no embeddable tokens".to_string(),
            ));
        }
        Ok(embedding)
    }

    fn add_feature(&self, vector: &mut [f32], feature: &str, weight: f32) {
        let (idx, sign) = self.bucket(feature);
        vector[idx] += sign * weight;
    }

    /// Bucket and sign for a feature. Stored vectors depend on this mapping,
    /// so it must not change between builds.
    fn bucket(&self, feature: &str) -> (usize, f32) {
        let mut hasher = Md5::new();
        hasher.update(feature.as_bytes());
        let hash = u128::from_be_bytes(hasher.finalize().into());

        let idx = (hash % self.dimension as u128) as usize;
        let sign = if hash >> 127 == 0 { 1.0 } else { -1.0 };
        (idx, sign)
    }
}

impl Default for HashEmbedding {
    fn default() -> Self {
        Self::new(EMBEDDING_DIM)
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedding {
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>, EmbeddingError> {
        texts.iter().map(|t| self.hash_text(t)).collect()
    }

    fn query_instruction(&self) -> &str {
        &self.query_instruction
    }

    fn is_available(&self) -> bool {
        true
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "hash"
    }
}

/// Provider that never produces embeddings.
pub struct DisabledEmbedding {
    reason: String,
}

impl DisabledEmbedding {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl Default for DisabledEmbedding {
    fn default() -> Self {
        Self::new("embeddings disabled")
    }
}

#[async_trait]
impl EmbeddingProvider for DisabledEmbedding {
    async fn embed_batch(&self, _texts: &[&str]) -> Result<Vec<Embedding>, EmbeddingError> {
        Err(EmbeddingError::Unavailable(self.reason.clone()))
    }

    fn is_available(&self) -> bool {
        false
    }

    fn name(&self) -> &str {
        "disabled"
    }
}

#[cfg(test)]
#[path = "embedding_tests.rs"]
mod tests;
