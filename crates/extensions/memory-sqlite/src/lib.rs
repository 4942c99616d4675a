//! SQLite record store for Recall.
//!
//! One database holds three co-located structures:
//!
//! - `memories`: the primary record table
//! - `memories_fts`: FTS5 index kept in sync by triggers
//! - `memory_vectors`: sqlite-vec `vec0` table keyed by memory id (optional)

mod backend;
mod schema;

pub use backend::SqliteMemoryStore;
pub use schema::SCHEMA_VERSION;
