//! Similarity index over previously-accepted question vectors
//!
//! Nearest-neighbor lookup runs against the union of the live content
//! store and the pending queue, so a candidate is rejected both when it
//! duplicates something already published and when it duplicates something
//! still waiting to publish.

use crate::db::{questions, queue};
use opine_common::Result;
use sqlx::SqlitePool;

/// Best match for a candidate vector
#[derive(Debug, Clone)]
pub struct NearestNeighbor {
    /// Cosine similarity in [0, 1] (negative similarities clamp to 0)
    pub similarity: f32,
    /// Text of the matched existing question
    pub text: String,
}

/// Nearest-neighbor query interface over persisted embeddings
#[derive(Clone)]
pub struct SimilarityIndex {
    db: SqlitePool,
}

impl SimilarityIndex {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Find the nearest existing vector to `candidate`
    ///
    /// Returns `None` when no comparable vectors exist. Stored vectors with
    /// a different dimension are skipped (a model migration degrades to
    /// "no match" rather than failing the pipeline).
    pub async fn nearest(&self, candidate: &[f32]) -> Result<Option<NearestNeighbor>> {
        let mut corpus = questions::question_embeddings(&self.db).await?;
        corpus.extend(queue::pending_embeddings(&self.db).await?);

        let mut best: Option<NearestNeighbor> = None;

        for (text, vector) in corpus {
            if vector.len() != candidate.len() {
                tracing::debug!(
                    expected = candidate.len(),
                    found = vector.len(),
                    "Skipping stored vector with mismatched dimension"
                );
                continue;
            }

            let similarity = cosine_similarity(candidate, &vector).max(0.0);
            let is_better = best
                .as_ref()
                .map(|b| similarity > b.similarity)
                .unwrap_or(true);
            if is_better {
                best = Some(NearestNeighbor { similarity, text });
            }
        }

        Ok(best)
    }
}

/// Cosine similarity between two equal-length vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0_f32;
    let mut norm_a = 0.0_f32;
    let mut norm_b = 0.0_f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a.sqrt() * norm_b.sqrt())
}
