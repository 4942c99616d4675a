//! Embedding providers for Recall.
//!
//! Every provider produces unit-normalized vectors of
//! [`EMBEDDING_DIM`](recall_protocols::EMBEDDING_DIM) floats and reports
//! through [`EmbeddingProvider::is_available`] whether it can currently do so.
//!
//! ## Providers
//!
//! - [`LocalEmbedding`]: BGE-small / MiniLM through `fastembed`, loaded on first use
//!   (requires the `local-embeddings` feature)
//! - [`OpenAIEmbedding`]: OpenAI-compatible `/embeddings` endpoint
//! - [`HashEmbedding`]: deterministic feature hashing, no model
//! - [`DisabledEmbedding`]: never available, forces lexical-only operation

mod embedding;
mod local;
mod openai;

pub use embedding::{
    DEFAULT_QUERY_INSTRUCTION, DisabledEmbedding, Embedding, EmbeddingError, EmbeddingProvider,
    HashEmbedding,
};
pub use local::{LocalEmbedding, SUPPORTED_LOCAL_MODELS};
pub use openai::{OpenAIEmbedding, OpenAIEmbeddingConfig};
