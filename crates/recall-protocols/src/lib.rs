//! # Recall Protocols
//!
//! Shared data model for the Recall memory engine.
//! Contains only type and error definitions - no storage or search code.
//!
//! ## Core Types
//!
//! - [`MemoryRecord`] - A stored memory with access bookkeeping
//! - [`NewMemory`] - Insert request for the record store
//! - [`SearchResult`] - A ranked hit tagged with its [`MatchType`]
//! - [`MemoryError`] - Error taxonomy shared by every memory crate

pub mod error;
pub mod memory;

pub use error::MemoryError;
pub use memory::{
    EMBEDDING_DIM, MatchType, MemoryRecord, MemoryStats, MemoryType, NewMemory, SearchResult,
    DEFAULT_IMPORTANCE,
};
