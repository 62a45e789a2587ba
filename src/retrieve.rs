//! Retrieval and confidence gating.
//!
//! The retriever queries the knowledge store for the nearest chunks and
//! normalizes the store's raw scores onto a common `[0, 1]` similarity
//! scale. The confidence gate then makes the one decision the whole
//! pipeline branches on: answer grounded, or fall back.

use crate::models::RetrievedChunk;
use crate::store::KnowledgeStore;

/// Normalize a raw store score to a similarity in `[0, 1]`.
///
/// Two regimes, distinguished by the numeric test `s > 1.0`:
/// - bounded cosine-style distance in `[0, 1]` → `1 - s`
/// - unbounded distance (`s > 1`) → `1 / (1 + s)`
///
/// The `s > 1.0` test is a heuristic inherited from the original
/// deployment, where different index back-ends reported different
/// metrics; downstream thresholds are tuned against it, so it is kept
/// exactly as-is. Non-finite input maps to `0.0`.
pub fn score_to_similarity(raw: f64) -> f64 {
    if !raw.is_finite() {
        return 0.0;
    }
    if raw > 1.0 {
        1.0 / (1.0 + raw)
    } else {
        (1.0 - raw).clamp(0.0, 1.0)
    }
}

/// Fetch the `k` nearest chunks to `question_vector` and return them
/// with normalized similarities, descending.
///
/// Ties keep the store's original order (the sort is stable). An empty
/// store yields an empty sequence, not an error.
pub fn retrieve(store: &KnowledgeStore, question_vector: &[f32], k: usize) -> Vec<RetrievedChunk> {
    let mut results: Vec<RetrievedChunk> = store
        .query(question_vector, k)
        .into_iter()
        .map(|(chunk, raw)| RetrievedChunk {
            chunk,
            similarity: score_to_similarity(raw),
        })
        .collect();

    results.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    results
}

/// Outcome of the confidence gate.
#[derive(Debug)]
pub enum Decision {
    /// Proceed with grounded synthesis over these top results.
    Grounded(Vec<RetrievedChunk>),
    /// No snippet is confident enough; issue the fixed fallback reply.
    Fallback,
}

/// Threshold-based gate between grounded synthesis and fallback.
#[derive(Debug, Clone, Copy)]
pub struct ConfidenceGate {
    threshold: f64,
    max_sources: usize,
}

impl ConfidenceGate {
    pub fn new(threshold: f64, max_sources: usize) -> Self {
        Self {
            threshold,
            max_sources,
        }
    }

    /// Pure decision: Grounded iff the ranked results are non-empty and
    /// the top similarity meets the threshold (inclusive). Grounded
    /// carries at most `max_sources` results, in rank order.
    pub fn decide(&self, mut ranked: Vec<RetrievedChunk>) -> Decision {
        match ranked.first() {
            Some(top) if top.similarity >= self.threshold => {
                ranked.truncate(self.max_sources);
                Decision::Grounded(ranked)
            }
            _ => Decision::Fallback,
        }
    }
}
