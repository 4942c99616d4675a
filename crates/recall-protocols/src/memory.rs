//! Memory record definitions.
//!
//! A memory is a short piece of text that can be retrieved lexically,
//! by vector similarity, or through the fused hybrid ranking.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Dimension of every stored embedding.
pub const EMBEDDING_DIM: usize = 384;

/// Importance assigned when the caller does not provide one.
pub const DEFAULT_IMPORTANCE: f32 = 0.5;

/// Kind of memory.
///
/// Unknown tags are preserved in [`MemoryType::Other`] so that newer writers
/// can use tags this build does not know about.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MemoryType {
    #[default]
    General,
    Fact,
    Preference,
    Event,
    Other(String),
}

impl MemoryType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::General => "general",
            Self::Fact => "fact",
            Self::Preference => "preference",
            Self::Event => "event",
            Self::Other(tag) => tag,
        }
    }

    /// The type consumers should act on; unrecognized tags behave as `General`.
    pub fn effective(&self) -> MemoryType {
        match self {
            Self::Other(_) => Self::General,
            known => known.clone(),
        }
    }
}

impl From<&str> for MemoryType {
    fn from(tag: &str) -> Self {
        match tag {
            "general" => Self::General,
            "fact" => Self::Fact,
            "preference" => Self::Preference,
            "event" => Self::Event,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for MemoryType {
    fn from(tag: String) -> Self {
        Self::from(tag.as_str())
    }
}

impl From<MemoryType> for String {
    fn from(memory_type: MemoryType) -> Self {
        memory_type.as_str().to_string()
    }
}

impl fmt::Display for MemoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Store-assigned identifier.
    pub id: i64,

    /// Text content of the memory.
    pub content: String,

    /// Importance score (0.0 - 1.0).
    pub importance: f32,

    /// Type of memory.
    pub memory_type: MemoryType,

    /// Free-text provenance.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    /// Insert time, never updated.
    pub created_at: DateTime<Utc>,

    /// Last successful read by id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_accessed: Option<DateTime<Utc>>,

    /// Number of successful reads by id.
    pub access_count: u64,
}

/// Insert request for a memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMemory {
    pub content: String,

    #[serde(default = "default_importance")]
    pub importance: f32,

    #[serde(default)]
    pub memory_type: MemoryType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    /// Precomputed embedding. When absent the engine computes one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,

    /// Back-dated insert time for imports. Defaults to now.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

fn default_importance() -> f32 {
    DEFAULT_IMPORTANCE
}

impl NewMemory {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            importance: DEFAULT_IMPORTANCE,
            memory_type: MemoryType::General,
            source: None,
            embedding: None,
            created_at: None,
        }
    }

    pub fn with_importance(mut self, importance: f32) -> Self {
        self.importance = importance;
        self
    }

    pub fn with_type(mut self, memory_type: impl Into<MemoryType>) -> Self {
        self.memory_type = memory_type.into();
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    /// Importance clamped into `[0, 1]`; NaN falls back to the default.
    pub fn clamped_importance(&self) -> f32 {
        if self.importance.is_nan() {
            DEFAULT_IMPORTANCE
        } else {
            self.importance.clamp(0.0, 1.0)
        }
    }
}

/// Which retrieval path produced a result.
///
/// Scores are only comparable between results of the same match type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    Lexical,
    Vector,
    Hybrid,
}

impl fmt::Display for MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Lexical => "lexical",
            Self::Vector => "vector",
            Self::Hybrid => "hybrid",
        };
        f.write_str(name)
    }
}

/// Result from a memory search. Higher score means more relevant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub record: MemoryRecord,
    pub score: f64,
    pub match_type: MatchType,
}

/// Aggregate statistics about the store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryStats {
    pub total: usize,
    pub with_embeddings: usize,
    pub by_type: HashMap<String, usize>,
    pub avg_importance: f32,
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
