//! Hybrid memory engine for Recall.
//!
//! Combines SQLite FTS5 keyword search with sqlite-vec nearest-neighbour
//! search using weighted Reciprocal Rank Fusion (RRF).
//!
//! ## How It Works
//!
//! 1. The lexical and vector lists are each fetched at twice the requested limit
//! 2. Every result contributes `weight / (k + rank)` to its memory's fused score
//! 3. Memories are ordered by fused score, ties by id, and cut to the limit
//!
//! When no query embedding is available the vector list is simply empty and
//! the same formula ranks the lexical hits alone.

mod backend;
mod fusion;
mod setup;

pub use backend::{EngineOptions, MemoryEngine};
pub use fusion::{DEFAULT_VECTOR_WEIGHT, FusionConfig, RRF_K, rrf_fusion, rrf_score};
pub use setup::build_provider;
