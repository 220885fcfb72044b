//! Deduplication gate
//!
//! Combines the embedder and the similarity index into a single
//! accept/reject decision per candidate string. The gate is a pure read:
//! it persists nothing, and it hands the computed embedding back to the
//! caller so it is computed exactly once and reused for storage.

use super::similarity::SimilarityIndex;
use crate::providers::{Embedder, ProviderError};
use std::sync::Arc;

/// Ephemeral per-check decision
#[derive(Debug, Clone)]
pub struct SimilarityResult {
    pub is_duplicate: bool,
    /// Highest similarity found; None when the index was unreachable
    pub highest_similarity: Option<f32>,
    /// Text of the nearest existing question, when one was found
    pub matched_text: Option<String>,
}

/// Gate decision plus the candidate's embedding for reuse
#[derive(Debug, Clone)]
pub struct GateDecision {
    pub result: SimilarityResult,
    pub embedding: Vec<f32>,
    /// Embedding tokens billed for this check
    pub embedding_tokens: u32,
}

/// Accepts or rejects candidate strings against a similarity threshold
#[derive(Clone)]
pub struct DeduplicationGate {
    embedder: Arc<dyn Embedder>,
    index: SimilarityIndex,
    threshold: f32,
}

impl DeduplicationGate {
    pub fn new(embedder: Arc<dyn Embedder>, index: SimilarityIndex, threshold: f32) -> Self {
        Self {
            embedder,
            index,
            threshold,
        }
    }

    /// Check a candidate string, computing its embedding first
    ///
    /// An embedding failure propagates (the candidate cannot be stored
    /// without a vector); a similarity-index failure does not, see
    /// [`DeduplicationGate::evaluate`].
    pub async fn check(&self, text: &str) -> Result<GateDecision, ProviderError> {
        let batch = self.embedder.embed(&[text.to_string()]).await?;
        let embedding = batch
            .vectors
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::Parse("Embedder returned no vector".to_string()))?;

        let result = self.evaluate(&embedding).await;
        Ok(GateDecision {
            result,
            embedding,
            embedding_tokens: batch.total_tokens,
        })
    }

    /// Evaluate a precomputed embedding against the index
    ///
    /// Fails open: if the similarity query errors the candidate is accepted
    /// without a similarity score, and the degraded state is logged, rather
    /// than blocking generation entirely.
    pub async fn evaluate(&self, embedding: &[f32]) -> SimilarityResult {
        match self.index.nearest(embedding).await {
            Ok(Some(neighbor)) => SimilarityResult {
                is_duplicate: neighbor.similarity >= self.threshold,
                highest_similarity: Some(neighbor.similarity),
                matched_text: Some(neighbor.text),
            },
            Ok(None) => SimilarityResult {
                is_duplicate: false,
                highest_similarity: None,
                matched_text: None,
            },
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "Similarity index unavailable; accepting candidate without dedup check"
                );
                SimilarityResult {
                    is_duplicate: false,
                    highest_similarity: None,
                    matched_text: None,
                }
            }
        }
    }
}
