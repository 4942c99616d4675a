//! Hybrid memory engine implementation.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, info, warn};

use recall_memory_embedding::{Embedding, EmbeddingError, EmbeddingProvider};
use recall_memory_sqlite::SqliteMemoryStore;
use recall_protocols::{
    EMBEDDING_DIM, MemoryError, MemoryRecord, MemoryStats, NewMemory, SearchResult,
};

use crate::fusion::{DEFAULT_VECTOR_WEIGHT, FusionConfig, RRF_K, rrf_fusion};

/// Tunables for the hybrid memory engine.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Vector share of the fused score used by [`MemoryEngine::search`].
    ///
    /// At `1.0` lexical hits contribute nothing, so when no query vector is
    /// available they all score zero and come back in id order.
    pub vector_weight: f64,
    pub rrf_k: f64,
    /// Upper bound for a single embedding provider call.
    pub embed_timeout: Duration,
    pub default_limit: usize,
    pub prune_older_than_days: u32,
    pub prune_importance_below: f32,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            vector_weight: DEFAULT_VECTOR_WEIGHT,
            rrf_k: RRF_K,
            embed_timeout: Duration::from_secs(30),
            default_limit: 10,
            prune_older_than_days: 90,
            prune_importance_below: 0.3,
        }
    }
}

/// Memory engine combining the SQLite store with an embedding provider.
///
/// Embedding problems never fail a write or a search: the memory is stored
/// without a vector, and searches fall back to lexical-only fusion.
pub struct MemoryEngine {
    store: SqliteMemoryStore,
    embedder: Arc<dyn EmbeddingProvider>,
    options: EngineOptions,
}

impl MemoryEngine {
    pub fn new(
        store: SqliteMemoryStore,
        embedder: Arc<dyn EmbeddingProvider>,
        options: EngineOptions,
    ) -> Self {
        info!(
            provider = embedder.name(),
            available = embedder.is_available(),
            vectors = store.has_vector_index(),
            "Memory engine ready"
        );
        Self {
            store,
            embedder,
            options,
        }
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    /// Whether stored memories can carry vectors and be found by them.
    pub fn has_vector_index(&self) -> bool {
        self.store.has_vector_index()
    }

    fn vectors_usable(&self) -> bool {
        self.store.has_vector_index() && self.embedder.is_available()
    }

    /// Store a memory and return its id.
    ///
    /// A caller-supplied embedding is validated and stored as is. Otherwise
    /// the content is embedded when the provider is available.
    pub async fn add(&self, mut memory: NewMemory) -> Result<i64, MemoryError> {
        if memory.content.trim().is_empty() {
            return Err(MemoryError::EmptyContent);
        }

        if memory.embedding.is_none() && self.vectors_usable() {
            memory.embedding = self.embed_passage(&memory.content).await;
        }

        self.store.insert(memory).await
    }

    async fn embed_passage(&self, content: &str) -> Option<Vec<f32>> {
        match bounded(self.options.embed_timeout, self.embedder.embed(content)).await {
            Ok((embedding, elapsed)) => {
                debug!(elapsed_ms = elapsed.as_millis() as u64, "Embedded memory");
                self.checked(embedding)
            }
            Err(e) => {
                warn!("Embedding failed, storing memory without vector: {}", e);
                None
            }
        }
    }

    /// Query embedding with the retrieval instruction applied, or `None`
    /// when vectors are unavailable for any reason.
    pub async fn query_embedding(&self, query: &str) -> Option<Vec<f32>> {
        if !self.vectors_usable() || query.trim().is_empty() {
            return None;
        }

        match bounded(self.options.embed_timeout, self.embedder.embed_query(query)).await {
            Ok(embedding) => self.checked(embedding),
            Err(e) => {
                warn!("Query embedding failed, searching lexically: {}", e);
                None
            }
        }
    }

    /// Drop provider output that does not fit the vector index.
    fn checked(&self, embedding: Embedding) -> Option<Vec<f32>> {
        if embedding.vector.len() != EMBEDDING_DIM {
            warn!(
                provider = self.embedder.name(),
                expected = EMBEDDING_DIM,
                actual = embedding.vector.len(),
                "Embedding provider returned the wrong dimension, ignoring vector"
            );
            return None;
        }
        Some(embedding.into_vec())
    }

    /// Fetch a memory by id, recording the access.
    pub async fn get(&self, id: i64) -> Result<Option<MemoryRecord>, MemoryError> {
        self.store.get(id).await
    }

    /// Delete a memory and its index entries.
    pub async fn delete(&self, id: i64) -> Result<bool, MemoryError> {
        self.store.delete(id).await
    }

    /// Newest memories first, without access tracking.
    pub async fn recent(&self, limit: usize) -> Result<Vec<MemoryRecord>, MemoryError> {
        self.store.recent(limit).await
    }

    pub async fn prune(
        &self,
        older_than_days: u32,
        importance_below: f32,
    ) -> Result<usize, MemoryError> {
        self.store.prune(older_than_days, importance_below).await
    }

    /// Prune with the configured age and importance thresholds.
    pub async fn prune_with_defaults(&self) -> Result<usize, MemoryError> {
        self.prune(
            self.options.prune_older_than_days,
            self.options.prune_importance_below,
        )
        .await
    }

    pub async fn search_lexical(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SearchResult>, MemoryError> {
        self.store.search_lexical(query, limit).await
    }

    pub async fn search_vector(
        &self,
        embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<SearchResult>, MemoryError> {
        self.store.search_vector(embedding, limit).await
    }

    /// Weighted RRF over lexical and, when `embedding` is given, vector hits.
    ///
    /// Both lists are fetched at twice `limit`. A query embedding that cannot
    /// be used (wrong dimension, no vector index) only removes the vector
    /// list; storage errors still propagate.
    pub async fn search_hybrid(
        &self,
        query: &str,
        embedding: Option<&[f32]>,
        limit: usize,
        vector_weight: f64,
    ) -> Result<Vec<SearchResult>, MemoryError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let fetch = limit.saturating_mul(2);

        let lexical = self.store.search_lexical(query, fetch).await?;

        let vector = match embedding {
            Some(embedding) if self.store.has_vector_index() => {
                match self.store.search_vector(embedding, fetch).await {
                    Ok(results) => results,
                    Err(MemoryError::DimensionMismatch { expected, actual }) => {
                        warn!(
                            expected,
                            actual, "Query embedding has the wrong dimension, searching lexically"
                        );
                        Vec::new()
                    }
                    Err(e) => return Err(e),
                }
            }
            _ => Vec::new(),
        };

        debug!(
            lexical = lexical.len(),
            vector = vector.len(),
            "Fusing search results"
        );

        let config = FusionConfig::new(vector_weight).with_k(self.options.rrf_k);
        Ok(rrf_fusion(vector, lexical, &config, limit))
    }

    /// Embed the query when possible and run a hybrid search with the
    /// configured weight.
    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchResult>, MemoryError> {
        let embedding = self.query_embedding(query).await;
        self.search_hybrid(query, embedding.as_deref(), limit, self.options.vector_weight)
            .await
    }

    /// Embed memories that were stored without a vector. Returns how many
    /// gained one. Memories the provider cannot embed are skipped.
    pub async fn backfill_embeddings(&self, batch_size: usize) -> Result<usize, MemoryError> {
        if !self.vectors_usable() {
            warn!("Embeddings unavailable, nothing to backfill");
            return Ok(0);
        }

        let batch_size = batch_size.max(1);
        let mut cursor = 0;
        let mut stored = 0;

        loop {
            let batch = self.store.missing_embeddings(cursor, batch_size).await?;
            let Some((last_id, _)) = batch.last() else {
                break;
            };
            cursor = *last_id;

            for (id, embedding) in self.embed_batch(&batch).await {
                if self.store.put_embedding(id, &embedding).await? {
                    stored += 1;
                }
            }
        }

        info!(stored, "Backfilled embeddings");
        Ok(stored)
    }

    /// Embed a batch, falling back to one call per memory when the batch call
    /// fails so a single bad input does not block the rest.
    async fn embed_batch(&self, batch: &[(i64, String)]) -> Vec<(i64, Vec<f32>)> {
        let texts: Vec<&str> = batch.iter().map(|(_, content)| content.as_str()).collect();

        match bounded(self.options.embed_timeout, self.embedder.embed_batch(&texts)).await {
            Ok(embeddings) if embeddings.len() == batch.len() => {
                return batch
                    .iter()
                    .zip(embeddings)
                    .filter_map(|((id, _), embedding)| {
                        self.checked(embedding).map(|vector| (*id, vector))
                    })
                    .collect();
            }
            Ok(embeddings) => warn!(
                expected = batch.len(),
                actual = embeddings.len(),
                "Batch embedding returned the wrong count, embedding one by one"
            ),
            Err(e) => warn!("Batch embedding failed, embedding one by one: {}", e),
        }

        let mut embedded = Vec::with_capacity(batch.len());
        for (id, content) in batch {
            if let Some(vector) = self.embed_passage(content).await {
                embedded.push((*id, vector));
            }
        }
        embedded
    }

    pub async fn stats(&self) -> Result<MemoryStats, MemoryError> {
        self.store.stats().await
    }

    pub async fn count(&self) -> Result<usize, MemoryError> {
        self.store.count().await
    }
}

/// Run a provider call under `limit`, reporting expiry as
/// [`EmbeddingError::Timeout`].
pub(crate) async fn bounded<T>(
    limit: Duration,
    call: impl Future<Output = Result<T, EmbeddingError>>,
) -> Result<T, EmbeddingError> {
    timeout(limit, call)
        .await
        .unwrap_or(Err(EmbeddingError::Timeout(limit)))
}
