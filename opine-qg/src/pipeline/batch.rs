//! Batch question generation
//!
//! Drives the text generator with a category-sharded prompt, deduplicates
//! each candidate, and writes accepted ones to the generation queue.
//! Rejected candidates are persisted with their similarity scores for
//! audit, never silently discarded.

use super::dedup::DeduplicationGate;
use super::similarity::SimilarityIndex;
use crate::db::{queue, run_log, settings};
use crate::providers::{Embedder, ProviderError, TextGenerator};
use chrono::Utc;
use opine_common::db::models::{CandidateRecord, Category, QueueItem, RunStatus};
use sqlx::SqlitePool;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

const JOB_NAME: &str = "generate_batch";
const SINGLE_JOB_NAME: &str = "generate_single";
const GENERATION_MAX_TOKENS: u32 = 1024;
const GENERATION_TEMPERATURE: f32 = 0.9;

/// Candidate length bounds; lines outside them are malformed output
const MIN_CANDIDATE_CHARS: usize = 11; // >10
const MAX_CANDIDATE_CHARS: usize = 280;

/// Batch generation errors
#[derive(Debug, Error)]
pub enum BatchError {
    /// Upstream provider failure (text generation or embedding)
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Persistence failure
    #[error("Storage error: {0}")]
    Storage(#[from] opine_common::Error),
}

/// Outcome of one generation run
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub accepted: Vec<QueueItem>,
    pub rejected: Vec<CandidateRecord>,
}

/// Generates candidate questions and feeds the queue through the dedup gate
#[derive(Clone)]
pub struct BatchGenerator {
    db: SqlitePool,
    text: Arc<dyn TextGenerator>,
    embedder: Arc<dyn Embedder>,
}

impl BatchGenerator {
    pub fn new(db: SqlitePool, text: Arc<dyn TextGenerator>, embedder: Arc<dyn Embedder>) -> Self {
        Self { db, text, embedder }
    }

    /// Generate one candidate per category and queue the non-duplicates
    ///
    /// Embedding is all-or-nothing at batch granularity: one batched
    /// provider call covers every surviving candidate, and if that call
    /// fails nothing is queued this run; the next scheduled invocation
    /// retries from a clean prompt.
    pub async fn generate_batch(
        &self,
        categories: &[Category],
    ) -> Result<BatchOutcome, BatchError> {
        run_log::append(
            &self.db,
            JOB_NAME,
            RunStatus::Started,
            &format!("Generating {} candidates", categories.len()),
            serde_json::json!({ "categories": categories.len() }),
        )
        .await?;

        let prompt = build_batch_prompt(categories);

        let generated = match self.text.generate(&prompt, GENERATION_MAX_TOKENS, GENERATION_TEMPERATURE).await {
            Ok(g) => g,
            Err(e) => {
                self.log_error(JOB_NAME, &format!("Text generation failed: {}", e)).await;
                return Err(e.into());
            }
        };

        let candidates = parse_numbered_lines(&generated.text, categories);
        tracing::info!(
            raw_lines = generated.text.lines().count(),
            parsed = candidates.len(),
            "Parsed batch generation response"
        );

        if candidates.is_empty() {
            self.log_error(JOB_NAME, "Response contained no usable candidate lines").await;
            return Ok(BatchOutcome::default());
        }

        // Single batched embedding call for all surviving candidates
        let texts: Vec<String> = candidates.iter().map(|(_, t)| t.clone()).collect();
        let embeddings = match self.embedder.embed(&texts).await {
            Ok(batch) => batch,
            Err(e) => {
                self.log_error(JOB_NAME, &format!("Batch embedding failed, no candidates queued: {}", e))
                    .await;
                return Err(e.into());
            }
        };

        let threshold = settings::get_batch_similarity_threshold(&self.db).await?;
        let gate = DeduplicationGate::new(
            self.embedder.clone(),
            SimilarityIndex::new(self.db.clone()),
            threshold,
        );

        let mut outcome = BatchOutcome::default();

        for ((category, text), embedding) in
            candidates.into_iter().zip(embeddings.vectors.into_iter())
        {
            let decision = gate.evaluate(&embedding).await;

            if decision.is_duplicate {
                let record = CandidateRecord {
                    id: Uuid::new_v4(),
                    text,
                    category,
                    accepted: false,
                    similarity: decision.highest_similarity,
                    matched_text: decision.matched_text,
                    reason: Some("duplicate".to_string()),
                    created_at: Utc::now(),
                };
                queue::record_candidate(&self.db, &record).await?;
                outcome.rejected.push(record);
                continue;
            }

            let item = QueueItem {
                id: Uuid::new_v4(),
                text: text.clone(),
                category,
                embedding,
                created_at: Utc::now(),
                published_at: None,
            };
            queue::insert_queue_item(&self.db, &item).await?;
            queue::record_candidate(
                &self.db,
                &CandidateRecord {
                    id: Uuid::new_v4(),
                    text,
                    category,
                    accepted: true,
                    similarity: decision.highest_similarity,
                    matched_text: None,
                    reason: None,
                    created_at: item.created_at,
                },
            )
            .await?;
            outcome.accepted.push(item);
        }

        run_log::append(
            &self.db,
            JOB_NAME,
            RunStatus::Success,
            &format!(
                "{} accepted, {} rejected",
                outcome.accepted.len(),
                outcome.rejected.len()
            ),
            serde_json::json!({
                "accepted": outcome.accepted.len(),
                "rejected": outcome.rejected.len(),
                "input_tokens": generated.input_tokens,
                "output_tokens": generated.output_tokens,
                "embedding_tokens": embeddings.total_tokens,
                "text_provider": self.text.name(),
            }),
        )
        .await?;

        Ok(outcome)
    }

    /// Generate a single candidate for one category
    ///
    /// Uses the looser single-question threshold; returns `None` when the
    /// candidate was rejected as a duplicate or the response was malformed.
    pub async fn generate_single(
        &self,
        category: Category,
    ) -> Result<Option<QueueItem>, BatchError> {
        run_log::append(
            &self.db,
            SINGLE_JOB_NAME,
            RunStatus::Started,
            &format!("Generating one candidate for {}", category),
            serde_json::json!({ "category": category.as_str() }),
        )
        .await?;

        let prompt = build_single_prompt(category);
        let generated = match self.text.generate(&prompt, 256, GENERATION_TEMPERATURE).await {
            Ok(g) => g,
            Err(e) => {
                self.log_error(SINGLE_JOB_NAME, &format!("Text generation failed: {}", e)).await;
                return Err(e.into());
            }
        };

        let text = generated.text.trim().trim_matches('"').to_string();
        if text.len() < MIN_CANDIDATE_CHARS || text.len() > MAX_CANDIDATE_CHARS {
            self.log_error(SINGLE_JOB_NAME, "Response length out of bounds, discarded").await;
            return Ok(None);
        }

        let threshold = settings::get_single_similarity_threshold(&self.db).await?;
        let gate = DeduplicationGate::new(
            self.embedder.clone(),
            SimilarityIndex::new(self.db.clone()),
            threshold,
        );

        let decision = gate.check(&text).await?;

        if decision.result.is_duplicate {
            let record = CandidateRecord {
                id: Uuid::new_v4(),
                text,
                category,
                accepted: false,
                similarity: decision.result.highest_similarity,
                matched_text: decision.result.matched_text,
                reason: Some("duplicate".to_string()),
                created_at: Utc::now(),
            };
            queue::record_candidate(&self.db, &record).await?;
            run_log::append(
                &self.db,
                SINGLE_JOB_NAME,
                RunStatus::Success,
                "Candidate rejected as duplicate",
                serde_json::json!({ "similarity": decision.result.highest_similarity }),
            )
            .await?;
            return Ok(None);
        }

        let item = QueueItem {
            id: Uuid::new_v4(),
            text: text.clone(),
            category,
            embedding: decision.embedding,
            created_at: Utc::now(),
            published_at: None,
        };
        queue::insert_queue_item(&self.db, &item).await?;
        queue::record_candidate(
            &self.db,
            &CandidateRecord {
                id: Uuid::new_v4(),
                text,
                category,
                accepted: true,
                similarity: decision.result.highest_similarity,
                matched_text: None,
                reason: None,
                created_at: item.created_at,
            },
        )
        .await?;

        run_log::append(
            &self.db,
            SINGLE_JOB_NAME,
            RunStatus::Success,
            "Candidate accepted",
            serde_json::json!({
                "input_tokens": generated.input_tokens,
                "output_tokens": generated.output_tokens,
                "embedding_tokens": decision.embedding_tokens,
            }),
        )
        .await?;

        Ok(Some(item))
    }

    async fn log_error(&self, job: &str, message: &str) {
        if let Err(e) =
            run_log::append(&self.db, job, RunStatus::Error, message, serde_json::json!({})).await
        {
            tracing::error!(error = %e, "Failed to append run log entry");
        }
    }
}

/// Build the category-sharded batch prompt
///
/// The yes/no/should format constraint is enforced here, by the prompt
/// contract, not by post-hoc filtering.
fn build_batch_prompt(categories: &[Category]) -> String {
    let mut prompt = String::from(
        "You write poll questions for a social polling app where people vote yes or no.\n\
         Generate exactly one question per category listed below.\n\
         Rules:\n\
         - Every question must be answerable with yes or no (start with \"Should\", \"Is\", \"Do\", \"Can\", or similar).\n\
         - Never write comparison questions (\"A or B\").\n\
         - Keep each question under 280 characters.\n\
         - Respond with numbered lines only, one per category, in the given order. No other text.\n\n\
         Categories:\n",
    );
    for (i, category) in categories.iter().enumerate() {
        prompt.push_str(&format!("{}. {}\n", i + 1, category));
    }
    prompt
}

/// Build the single-question prompt
fn build_single_prompt(category: Category) -> String {
    format!(
        "You write poll questions for a social polling app where people vote yes or no.\n\
         Generate exactly one {} question.\n\
         It must be answerable with yes or no (start with \"Should\", \"Is\", \"Do\", \"Can\", or similar),\n\
         must not be a comparison question (\"A or B\"), and must be under 280 characters.\n\
         Respond with the question only, no numbering and no other text.",
        category
    )
}

/// Parse a numbered-line response into (category, text) pairs
///
/// The line number maps the candidate back to its category. Lines without
/// a parsable number, with a number outside the category list, or with a
/// length outside the sane bounds are discarded as malformed.
fn parse_numbered_lines(response: &str, categories: &[Category]) -> Vec<(Category, String)> {
    let mut candidates = Vec::new();

    for line in response.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let Some((number, rest)) = split_line_number(line) else {
            tracing::debug!(line = %line, "Discarding unnumbered line");
            continue;
        };

        if number == 0 || number > categories.len() {
            tracing::debug!(number, "Discarding line with out-of-range number");
            continue;
        }

        let text = rest.trim().trim_matches('"').to_string();
        if text.len() < MIN_CANDIDATE_CHARS || text.len() > MAX_CANDIDATE_CHARS {
            tracing::debug!(chars = text.len(), "Discarding line with out-of-bounds length");
            continue;
        }

        candidates.push((categories[number - 1], text));
    }

    candidates
}

/// Split a leading "N." / "N)" / "N:" prefix off a line
fn split_line_number(line: &str) -> Option<(usize, &str)> {
    let digits_end = line.find(|c: char| !c.is_ascii_digit())?;
    if digits_end == 0 {
        return None;
    }

    let rest = &line[digits_end..];
    let rest = rest
        .strip_prefix('.')
        .or_else(|| rest.strip_prefix(')'))
        .or_else(|| rest.strip_prefix(':'))?;

    let number = line[..digits_end].parse().ok()?;
    Some((number, rest))
}
