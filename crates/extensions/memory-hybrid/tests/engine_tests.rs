//! Behavioural tests for the hybrid memory engine.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use recall_memory_embedding::{
    DisabledEmbedding, Embedding, EmbeddingError, EmbeddingProvider, HashEmbedding,
};
use recall_memory_hybrid::{EngineOptions, MemoryEngine};
use recall_memory_sqlite::SqliteMemoryStore;
use recall_protocols::{EMBEDDING_DIM, MatchType, MemoryError, MemoryType, NewMemory};

async fn engine_with(embedder: Arc<dyn EmbeddingProvider>) -> MemoryEngine {
    let store = SqliteMemoryStore::in_memory().await.unwrap();
    MemoryEngine::new(store, embedder, EngineOptions::default())
}

async fn hash_engine() -> MemoryEngine {
    engine_with(Arc::new(HashEmbedding::default())).await
}

async fn degraded_engine() -> MemoryEngine {
    engine_with(Arc::new(DisabledEmbedding::new("forced off"))).await
}

fn unit(axis: usize) -> Vec<f32> {
    let mut v = vec![0.0f32; EMBEDDING_DIM];
    v[axis] = 1.0;
    v
}

/// Returns vectors of the wrong length.
struct WrongDimEmbedding;

#[async_trait]
impl EmbeddingProvider for WrongDimEmbedding {
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>, EmbeddingError> {
        Ok(texts.iter().map(|_| Embedding::normalized(vec![1.0; 16])).collect())
    }

    fn is_available(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "wrong-dim"
    }
}

/// Never answers within any reasonable timeout.
struct StalledEmbedding;

#[async_trait]
impl EmbeddingProvider for StalledEmbedding {
    async fn embed_batch(&self, _texts: &[&str]) -> Result<Vec<Embedding>, EmbeddingError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Err(EmbeddingError::Failed("unreachable".to_string()))
    }

    fn is_available(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "stalled"
    }
}

/// Available, counts calls, fails on demand.
struct FlakyEmbedding {
    inner: HashEmbedding,
    calls: AtomicUsize,
    fail: std::sync::atomic::AtomicBool,
}

impl FlakyEmbedding {
    fn new(fail: bool) -> Self {
        Self {
            inner: HashEmbedding::default(),
            calls: AtomicUsize::new(0),
            fail: std::sync::atomic::AtomicBool::new(fail),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for FlakyEmbedding {
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(EmbeddingError::Unavailable("flaky".to_string()));
        }
        self.inner.embed_batch(texts).await
    }

    fn query_instruction(&self) -> &str {
        ""
    }

    fn is_available(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "flaky"
    }
}

#[tokio::test]
async fn round_trip_preserves_fields() {
    let engine = hash_engine().await;
    let id = engine
        .add(
            NewMemory::new("Standup is at 9:30 every weekday")
                .with_importance(1.7)
                .with_type("event"),
        )
        .await
        .unwrap();

    let record = engine.get(id).await.unwrap().unwrap();
    assert_eq!(record.content, "Standup is at 9:30 every weekday");
    assert_eq!(record.importance, 1.0);
    assert_eq!(record.memory_type, MemoryType::Event);
    assert!(record.created_at <= Utc::now());
}

#[tokio::test]
async fn add_embeds_content_when_provider_available() {
    let engine = hash_engine().await;
    engine.add(NewMemory::new("embedded automatically")).await.unwrap();

    let stats = engine.stats().await.unwrap();
    assert_eq!(stats.total, 1);
    assert_eq!(stats.with_embeddings, 1);
}

#[tokio::test]
async fn access_count_equals_reads() {
    let engine = hash_engine().await;
    let id = engine.add(NewMemory::new("read me")).await.unwrap();

    for _ in 0..5 {
        engine.get(id).await.unwrap();
    }

    let record = engine.recent(1).await.unwrap().remove(0);
    assert_eq!(record.access_count, 5);
    assert!(record.last_accessed.is_some());
}

#[tokio::test]
async fn delete_removes_from_every_search() {
    let engine = hash_engine().await;
    let keep = engine.add(NewMemory::new("solar panel maintenance")).await.unwrap();
    let gone = engine
        .add(NewMemory::new("solar panel warranty").with_embedding(unit(42)))
        .await
        .unwrap();

    assert!(engine.delete(gone).await.unwrap());
    assert!(engine.get(gone).await.unwrap().is_none());

    let lexical = engine.search_lexical("solar", 10).await.unwrap();
    assert!(lexical.iter().all(|r| r.record.id != gone));
    assert!(lexical.iter().any(|r| r.record.id == keep));

    let vector = engine.search_vector(&unit(42), 10).await.unwrap();
    assert!(vector.iter().all(|r| r.record.id != gone));

    let hybrid = engine
        .search_hybrid("solar warranty", Some(&unit(42)), 10, 0.6)
        .await
        .unwrap();
    assert!(hybrid.iter().all(|r| r.record.id != gone));

    let searched = engine.search("solar warranty", 10).await.unwrap();
    assert!(searched.iter().all(|r| r.record.id != gone));
}

#[tokio::test]
async fn lexical_ranks_matching_record_first() {
    let engine = degraded_engine().await;
    engine.add(NewMemory::new("Groceries: milk, eggs, bread")).await.unwrap();
    let target = engine
        .add(NewMemory::new("The router admin password rotates monthly"))
        .await
        .unwrap();
    engine.add(NewMemory::new("Call the dentist on Friday")).await.unwrap();

    let results = engine.search_lexical("router", 10).await.unwrap();
    assert_eq!(results[0].record.id, target);
    assert_eq!(results.len(), 1);
}

#[tokio::test]
async fn vector_self_match_has_similarity_one() {
    let engine = hash_engine().await;
    let embedding = HashEmbedding::default()
        .embed("the cabin key is under the blue flowerpot")
        .await
        .unwrap()
        .0
        .into_vec();

    let id = engine
        .add(NewMemory::new("the cabin key is under the blue flowerpot").with_embedding(embedding.clone()))
        .await
        .unwrap();
    engine.add(NewMemory::new("quarterly tax filing deadline")).await.unwrap();

    let results = engine.search_vector(&embedding, 1).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].record.id, id);
    assert_eq!(results[0].match_type, MatchType::Vector);
    assert!((results[0].score - 1.0).abs() < 1e-4);
}

#[tokio::test]
async fn hybrid_is_deterministic() {
    let engine = hash_engine().await;
    for content in [
        "rust async runtime internals",
        "rust borrow checker errors",
        "tokio runtime configuration",
        "python asyncio event loop",
        "async rust book chapter",
    ] {
        engine.add(NewMemory::new(content)).await.unwrap();
    }

    let query_embedding = unit(3);
    let first = engine
        .search_hybrid("async runtime", Some(&query_embedding), 5, 0.6)
        .await
        .unwrap();
    assert!(!first.is_empty());

    for _ in 0..10 {
        let again = engine
            .search_hybrid("async runtime", Some(&query_embedding), 5, 0.6)
            .await
            .unwrap();
        let a: Vec<(i64, f64)> = first.iter().map(|r| (r.record.id, r.score)).collect();
        let b: Vec<(i64, f64)> = again.iter().map(|r| (r.record.id, r.score)).collect();
        assert_eq!(a, b);
    }
}

#[tokio::test]
async fn hybrid_worked_example() {
    let engine = degraded_engine().await;
    // Embeddings supplied explicitly; the provider itself is off.
    let a = engine
        .add(NewMemory::new("alpha bravo").with_embedding(unit(0)))
        .await
        .unwrap();
    let b = engine.add(NewMemory::new("charlie delta")).await.unwrap();

    let both = engine
        .search_hybrid("alpha", Some(&unit(0)), 10, 0.6)
        .await
        .unwrap();
    assert_eq!(both[0].record.id, a);
    assert_eq!(both[0].match_type, MatchType::Hybrid);
    assert!((both[0].score - 0.016393).abs() < 1e-6);

    let lexical_only = engine
        .search_hybrid("charlie", Some(&unit(200)), 10, 0.6)
        .await
        .unwrap();
    let b_hit = lexical_only.iter().find(|r| r.record.id == b).unwrap();
    assert!((b_hit.score - 0.006557).abs() < 1e-6);

    // A (vector rank 1, lexical rank 2) over B (lexical rank 1 only)
    let mixed = engine
        .search_hybrid("charlie alpha", Some(&unit(0)), 10, 0.6)
        .await
        .unwrap();
    assert_eq!(mixed[0].record.id, a);
}

#[tokio::test]
async fn hybrid_respects_limit_and_weight_clamp() {
    let engine = hash_engine().await;
    for i in 0..8 {
        engine
            .add(NewMemory::new(format!("shared keyword number {}", i)))
            .await
            .unwrap();
    }

    let results = engine
        .search_hybrid("shared keyword", None, 3, 7.5)
        .await
        .unwrap();
    assert_eq!(results.len(), 3);

    // Weight clamped to 1.0: with no vector list there is nothing to score
    assert!(results.iter().all(|r| r.score == 0.0));
    assert!(
        engine
            .search_hybrid("shared", None, 0, 0.6)
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn pruning_requires_age_and_low_importance() {
    let engine = hash_engine().await;
    let now = Utc::now();

    let a = engine
        .add(
            NewMemory::new("old and unimportant")
                .with_importance(0.2)
                .with_created_at(now - chrono::Duration::days(100)),
        )
        .await
        .unwrap();
    let b = engine
        .add(
            NewMemory::new("old but important")
                .with_importance(0.5)
                .with_created_at(now - chrono::Duration::days(100)),
        )
        .await
        .unwrap();
    let c = engine
        .add(
            NewMemory::new("recent and unimportant")
                .with_importance(0.1)
                .with_created_at(now - chrono::Duration::days(10)),
        )
        .await
        .unwrap();

    assert_eq!(engine.prune(90, 0.3).await.unwrap(), 1);
    assert!(engine.get(a).await.unwrap().is_none());
    assert!(engine.get(b).await.unwrap().is_some());
    assert!(engine.get(c).await.unwrap().is_some());

    let stats = engine.stats().await.unwrap();
    assert_eq!(stats.total, 2);
    assert_eq!(stats.with_embeddings, 2);
}

#[tokio::test]
async fn prune_with_defaults_uses_options() {
    let store = SqliteMemoryStore::in_memory().await.unwrap();
    let options = EngineOptions {
        prune_older_than_days: 5,
        prune_importance_below: 0.9,
        ..EngineOptions::default()
    };
    let engine = MemoryEngine::new(store, Arc::new(HashEmbedding::default()), options);

    engine
        .add(
            NewMemory::new("week old")
                .with_importance(0.8)
                .with_created_at(Utc::now() - chrono::Duration::days(7)),
        )
        .await
        .unwrap();
    engine.add(NewMemory::new("today")).await.unwrap();

    assert_eq!(engine.prune_with_defaults().await.unwrap(), 1);
    assert_eq!(engine.count().await.unwrap(), 1);
}

#[tokio::test]
async fn degraded_mode_stores_and_searches_lexically() {
    let engine = degraded_engine().await;
    let id = engine
        .add(NewMemory::new("The spare tire is in the trunk"))
        .await
        .unwrap();
    engine.add(NewMemory::new("Oil change due in March")).await.unwrap();

    assert_eq!(engine.stats().await.unwrap().with_embeddings, 0);

    let hybrid = engine.search("spare tire", 5).await.unwrap();
    let lexical = engine.search_lexical("spare tire", 10).await.unwrap();
    assert_eq!(hybrid[0].record.id, id);
    assert_eq!(
        hybrid.iter().map(|r| r.record.id).collect::<Vec<_>>(),
        lexical.iter().map(|r| r.record.id).collect::<Vec<_>>()
    );
    assert!((hybrid[0].score - 0.4 / 61.0).abs() < 1e-9);
}

#[tokio::test]
async fn failing_provider_does_not_block_writes() {
    let provider = Arc::new(FlakyEmbedding::new(true));
    let engine = engine_with(provider.clone()).await;

    let id = engine.add(NewMemory::new("written anyway")).await.unwrap();
    assert!(engine.get(id).await.unwrap().is_some());
    assert_eq!(engine.stats().await.unwrap().with_embeddings, 0);
    assert_eq!(provider.calls.load(Ordering::SeqCst), 1);

    let results = engine.search("written", 5).await.unwrap();
    assert_eq!(results.len(), 1);
}

#[tokio::test]
async fn wrong_dimension_from_provider_is_ignored() {
    let engine = engine_with(Arc::new(WrongDimEmbedding)).await;
    let id = engine.add(NewMemory::new("still stored")).await.unwrap();

    assert!(engine.get(id).await.unwrap().is_some());
    assert_eq!(engine.stats().await.unwrap().with_embeddings, 0);
    assert_eq!(engine.search("stored", 5).await.unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn stalled_provider_times_out() {
    let store = SqliteMemoryStore::in_memory().await.unwrap();
    let options = EngineOptions {
        embed_timeout: Duration::from_millis(50),
        ..EngineOptions::default()
    };
    let engine = MemoryEngine::new(store, Arc::new(StalledEmbedding), options);

    let id = engine.add(NewMemory::new("not waiting forever")).await.unwrap();
    assert!(engine.get(id).await.unwrap().is_some());
    assert_eq!(engine.search("waiting", 5).await.unwrap().len(), 1);
}

#[tokio::test]
async fn caller_embedding_dimension_guard() {
    let engine = hash_engine().await;
    let result = engine
        .add(NewMemory::new("bad embedding").with_embedding(vec![0.1; 383]))
        .await;

    assert!(matches!(
        result,
        Err(MemoryError::DimensionMismatch { expected: 384, actual: 383 })
    ));
    assert_eq!(engine.count().await.unwrap(), 0);
    assert!(engine.search_lexical("embedding", 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn query_embedding_dimension() {
    let engine = hash_engine().await;
    engine.add(NewMemory::new("dimension check")).await.unwrap();

    let vector = engine.search_vector(&[1.0, 0.0], 5).await;
    assert!(matches!(vector, Err(MemoryError::DimensionMismatch { .. })));

    let hybrid = engine
        .search_hybrid("dimension", Some(&[1.0, 0.0]), 5, 0.6)
        .await
        .unwrap();
    assert_eq!(hybrid.len(), 1);
}

#[tokio::test]
async fn empty_content_rejected() {
    let engine = hash_engine().await;
    assert!(matches!(
        engine.add(NewMemory::new("")).await,
        Err(MemoryError::EmptyContent)
    ));
}

#[tokio::test]
async fn backfill_embeds_memories_stored_while_degraded() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("memory.db");

    {
        let store = SqliteMemoryStore::open(&path, true).await.unwrap();
        let engine = MemoryEngine::new(
            store,
            Arc::new(DisabledEmbedding::default()),
            EngineOptions::default(),
        );
        for content in ["first memory", "second memory", "third memory", "!!!"] {
            engine.add(NewMemory::new(content)).await.unwrap();
        }
        assert_eq!(engine.backfill_embeddings(2).await.unwrap(), 0);
    }

    let store = SqliteMemoryStore::open(&path, true).await.unwrap();
    let engine = MemoryEngine::new(store, Arc::new(HashEmbedding::default()), EngineOptions::default());

    // "!!!" has no tokens for the hash embedder and is skipped
    assert_eq!(engine.backfill_embeddings(2).await.unwrap(), 3);
    assert_eq!(engine.stats().await.unwrap().with_embeddings, 3);
    assert_eq!(engine.backfill_embeddings(2).await.unwrap(), 0);
}

#[tokio::test]
async fn recent_is_newest_first() {
    let engine = degraded_engine().await;
    let first = engine.add(NewMemory::new("first")).await.unwrap();
    let second = engine.add(NewMemory::new("second")).await.unwrap();

    let recent = engine.recent(10).await.unwrap();
    assert_eq!(recent[0].id, second);
    assert_eq!(recent[1].id, first);
    assert_eq!(recent[0].access_count, 0);
}
