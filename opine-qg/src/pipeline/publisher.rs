//! Publisher
//!
//! Promotes the oldest queue item into the live content store on each
//! scheduled tick. An empty queue triggers generation instead of a
//! publish; a queue below the low-water mark after publishing triggers
//! replenishment generation in the background.

use super::batch::BatchGenerator;
use super::enrichment::EnrichmentFanout;
use crate::db::{questions, queue, run_log, settings};
use crate::providers::{Embedder, ImageGenerator, TextGenerator};
use crate::storage::ObjectStore;
use chrono::Utc;
use opine_common::db::models::{Category, Question, RunStatus};
use opine_common::Result;
use sqlx::SqlitePool;
use std::sync::Arc;
use uuid::Uuid;

const JOB_NAME: &str = "publish";

/// Result of one publish tick
#[derive(Debug)]
pub enum PublishOutcome {
    /// A queue item was promoted into the live content store
    Published {
        question_id: Uuid,
        queue_remaining: i64,
    },
    /// The queue was empty; batch generation was triggered instead
    QueueEmptyTriggeredGeneration,
}

/// Drives the publish state machine for one scheduler tick
#[derive(Clone)]
pub struct Publisher {
    db: SqlitePool,
    text: Arc<dyn TextGenerator>,
    embedder: Arc<dyn Embedder>,
    image: Arc<dyn ImageGenerator>,
    store: Arc<dyn ObjectStore>,
}

impl Publisher {
    pub fn new(
        db: SqlitePool,
        text: Arc<dyn TextGenerator>,
        embedder: Arc<dyn Embedder>,
        image: Arc<dyn ImageGenerator>,
        store: Arc<dyn ObjectStore>,
    ) -> Self {
        Self {
            db,
            text,
            embedder,
            image,
            store,
        }
    }

    /// Publish the oldest pending queue item
    ///
    /// Dequeue is strictly FIFO by creation time. The claim is a
    /// conditional update on `published_at` still being NULL, so two
    /// overlapping scheduler triggers can never promote the same item; a
    /// lost claim moves on to the next oldest item. The question insert
    /// happens only after the claim is won. A failure between the two
    /// writes leaves a claimed-but-uninserted row, which is logged for
    /// operator reconciliation and can never double-publish.
    pub async fn publish(&self) -> Result<PublishOutcome> {
        run_log::append(&self.db, JOB_NAME, RunStatus::Started, "Publish tick", serde_json::json!({}))
            .await?;

        let item = loop {
            let Some(candidate) = queue::oldest_pending(&self.db).await? else {
                // EmptyQueue: trigger generation, do not block on it
                tracing::info!("Queue empty; triggering batch generation");
                self.spawn_generation("queue empty");

                run_log::append(
                    &self.db,
                    JOB_NAME,
                    RunStatus::Success,
                    "Queue empty; generation triggered",
                    serde_json::json!({ "triggered_generation": true }),
                )
                .await?;

                return Ok(PublishOutcome::QueueEmptyTriggeredGeneration);
            };

            if queue::claim_for_publish(&self.db, candidate.id).await? {
                break candidate;
            }
            // Lost the race to a concurrent publisher; try the next oldest
            tracing::debug!(item_id = %candidate.id, "Queue item claimed elsewhere, retrying");
        };

        let question = Question {
            id: Uuid::new_v4(),
            text: item.text.clone(),
            category: item.category,
            embedding: item.embedding.clone(),
            author: None,
            created_at: Utc::now(),
            classified_category: None,
            auto_vote: None,
            auto_vote_reason: None,
            illustration_url: None,
            illustration_model: None,
        };

        if let Err(e) = questions::insert_question(&self.db, &question).await {
            // Claimed but not inserted: reconciled by operator inspection,
            // never retried automatically (retry risks double-publishing).
            tracing::error!(
                queue_item_id = %item.id,
                error = %e,
                "Question insert failed after queue claim; needs operator reconciliation"
            );
            run_log::append(
                &self.db,
                JOB_NAME,
                RunStatus::Error,
                &format!("Claimed {} but question insert failed: {}", item.id, e),
                serde_json::json!({ "queue_item_id": item.id }),
            )
            .await?;
            return Err(e);
        }

        tracing::info!(
            question_id = %question.id,
            category = %question.category,
            "Question published"
        );

        // Enriching: dispatched in the background, bounded by its own
        // per-branch timeouts; the publish response never waits on it and
        // enrichment failures never roll back the publish.
        self.spawn_enrichment(question.clone());

        // Replenishing
        let queue_remaining = queue::pending_count(&self.db).await?;
        let low_water_mark = settings::get_low_water_mark(&self.db).await?;
        if queue_remaining < low_water_mark {
            tracing::info!(
                queue_remaining,
                low_water_mark,
                "Queue below low-water mark; triggering replenishment"
            );
            self.spawn_generation("below low-water mark");
        }

        run_log::append(
            &self.db,
            JOB_NAME,
            RunStatus::Success,
            &format!("Published {}", question.id),
            serde_json::json!({
                "question_id": question.id,
                "queue_remaining": queue_remaining,
            }),
        )
        .await?;

        Ok(PublishOutcome::Published {
            question_id: question.id,
            queue_remaining,
        })
    }

    /// Build the batch generator that this publisher triggers
    pub fn batch_generator(&self) -> BatchGenerator {
        BatchGenerator::new(self.db.clone(), self.text.clone(), self.embedder.clone())
    }

    /// Fire-and-forget batch generation, observable via the run log
    fn spawn_generation(&self, cause: &'static str) {
        let generator = self.batch_generator();
        tokio::spawn(async move {
            if let Err(e) = generator.generate_batch(&Category::ALL).await {
                tracing::error!(cause, error = %e, "Background generation failed");
            }
        });
    }

    /// Fire-and-forget enrichment fanout
    fn spawn_enrichment(&self, question: Question) {
        let fanout = EnrichmentFanout::new(
            self.db.clone(),
            self.text.clone(),
            self.image.clone(),
            self.store.clone(),
        );
        tokio::spawn(async move {
            fanout.enrich(&question).await;
        });
    }
}

impl std::fmt::Debug for Publisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher")
            .field("text_provider", &self.text.name())
            .finish_non_exhaustive()
    }
}
