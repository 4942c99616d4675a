//! Result fusion algorithms.

use std::cmp::Ordering;
use std::collections::HashMap;

use recall_protocols::{MatchType, MemoryRecord, SearchResult};

/// Standard RRF smoothing constant.
pub const RRF_K: f64 = 60.0;

/// Share of the fused score given to the vector list by default.
pub const DEFAULT_VECTOR_WEIGHT: f64 = 0.6;

/// Configuration for result fusion.
#[derive(Debug, Clone, Copy)]
pub struct FusionConfig {
    /// Weight for vector results (0.0 - 1.0).
    /// Lexical results get weight (1.0 - vector_weight), so at 1.0 their
    /// rank order is lost.
    pub vector_weight: f64,
    /// RRF parameter k.
    pub k: f64,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            vector_weight: DEFAULT_VECTOR_WEIGHT,
            k: RRF_K,
        }
    }
}

impl FusionConfig {
    /// Weight is clamped into `[0, 1]`; NaN falls back to the default.
    pub fn new(vector_weight: f64) -> Self {
        let vector_weight = if vector_weight.is_nan() {
            DEFAULT_VECTOR_WEIGHT
        } else {
            vector_weight.clamp(0.0, 1.0)
        };
        Self {
            vector_weight,
            ..Self::default()
        }
    }

    pub fn with_k(mut self, k: f64) -> Self {
        if k.is_finite() && k > 0.0 {
            self.k = k;
        }
        self
    }

    pub fn lexical_weight(&self) -> f64 {
        1.0 - self.vector_weight
    }
}

/// Contribution of a single hit at 1-indexed `rank`.
pub fn rrf_score(weight: f64, k: f64, rank: usize) -> f64 {
    weight / (k + rank as f64)
}

/// Weighted Reciprocal Rank Fusion.
///
/// Each list is assumed to be ordered best first. A memory found in both
/// lists accumulates both contributions. Only ranks are used, never the
/// original scores.
pub fn rrf_fusion(
    vector_results: Vec<SearchResult>,
    lexical_results: Vec<SearchResult>,
    config: &FusionConfig,
    limit: usize,
) -> Vec<SearchResult> {
    let mut fused: HashMap<i64, (f64, MemoryRecord)> = HashMap::new();

    let lists = [
        (vector_results, config.vector_weight),
        (lexical_results, config.lexical_weight()),
    ];
    for (results, weight) in lists {
        for (index, result) in results.into_iter().enumerate() {
            let contribution = rrf_score(weight, config.k, index + 1);
            fused
                .entry(result.record.id)
                .or_insert((0.0, result.record))
                .0 += contribution;
        }
    }

    let mut results: Vec<SearchResult> = fused
        .into_values()
        .map(|(score, record)| SearchResult {
            record,
            score,
            match_type: MatchType::Hybrid,
        })
        .collect();

    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then(a.record.id.cmp(&b.record.id))
    });
    results.truncate(limit);
    results
}

#[cfg(test)]
#[path = "fusion_tests.rs"]
mod tests;
