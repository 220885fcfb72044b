//! Post-publish enrichment fanout
//!
//! Three independent branches run concurrently against a newly published
//! question: topic classification, an automated stance vote with written
//! justification, and illustrative image generation. Each branch carries
//! its own timeout and failure isolation; one branch failing has zero
//! effect on the other two or on the already-live question.

use crate::db::{questions, run_log, settings};
use crate::providers::{ImageGenerator, ProviderError, TextGenerator};
use crate::storage::ObjectStore;
use anyhow::{Context, Result};
use opine_common::db::models::{AutoVote, Category, Question, RunStatus};
use regex::Regex;
use sqlx::SqlitePool;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::time::timeout;

const FALLBACK_VOTE_REASON: &str = "No clear stance could be parsed from the model response.";

fn vote_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Tolerates markdown emphasis and stray punctuation around the keyword
    RE.get_or_init(|| Regex::new(r"(?im)VOTE[\s*_:\-]+[*_~`]*(YES|NO|UNSURE)").unwrap())
}

fn reason_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?im)REASON[\s*_:\-]+(.+)").unwrap())
}

/// Runs the three enrichment branches for one published question
#[derive(Clone)]
pub struct EnrichmentFanout {
    db: SqlitePool,
    text: Arc<dyn TextGenerator>,
    image: Arc<dyn ImageGenerator>,
    store: Arc<dyn ObjectStore>,
}

impl EnrichmentFanout {
    pub fn new(
        db: SqlitePool,
        text: Arc<dyn TextGenerator>,
        image: Arc<dyn ImageGenerator>,
        store: Arc<dyn ObjectStore>,
    ) -> Self {
        Self {
            db,
            text,
            image,
            store,
        }
    }

    /// Enrich a published question; side-effecting only, never errors
    pub async fn enrich(&self, question: &Question) {
        let timeout_secs = settings::get_enrichment_timeout_secs(&self.db)
            .await
            .unwrap_or(90);
        let budget = Duration::from_secs(timeout_secs);

        tracing::info!(question_id = %question.id, "Enrichment fanout started");

        let (classify, vote, illustrate) = tokio::join!(
            timeout(budget, self.classify_branch(question)),
            timeout(budget, self.vote_branch(question)),
            timeout(budget, self.illustrate_branch(question)),
        );

        // A timed-out branch is treated identically to a failed branch
        for (branch, result) in [
            ("enrich_classify", classify),
            ("enrich_vote", vote),
            ("enrich_illustrate", illustrate),
        ] {
            if result.is_err() {
                tracing::warn!(question_id = %question.id, branch, "Enrichment branch timed out");
                self.log(branch, RunStatus::Error, "Branch timed out", question).await;
            }
        }
    }

    /// Branch 1: topic classification against the fixed category vocabulary
    ///
    /// An unknown or "Other" result leaves the field absent so consumers
    /// can distinguish "not yet classified" from "classified as generic".
    async fn classify_branch(&self, question: &Question) {
        match self.try_classify(question).await {
            Ok(Some(category)) => {
                self.log(
                    "enrich_classify",
                    RunStatus::Success,
                    &format!("Classified as {}", category),
                    question,
                )
                .await;
            }
            Ok(None) => {
                self.log(
                    "enrich_classify",
                    RunStatus::Success,
                    "No category matched; left unclassified",
                    question,
                )
                .await;
            }
            Err(e) => {
                tracing::warn!(question_id = %question.id, error = %e, "Classification failed");
                self.log("enrich_classify", RunStatus::Error, &e.to_string(), question)
                    .await;
            }
        }
    }

    async fn try_classify(&self, question: &Question) -> Result<Option<Category>> {
        let vocabulary: Vec<&str> = Category::ALL.iter().map(|c| c.as_str()).collect();
        let prompt = format!(
            "Classify this poll question into exactly one of these categories:\n{}\n\n\
             Respond with the category name only. If none fits, respond with: Other\n\n\
             Question: {}",
            vocabulary.join(", "),
            question.text
        );

        let generated = self
            .text
            .generate(&prompt, 16, 0.0)
            .await
            .context("Classification call failed")?;

        let raw = generated
            .text
            .lines()
            .find(|l| !l.trim().is_empty())
            .unwrap_or("")
            .trim()
            .trim_matches(|c: char| !c.is_alphanumeric());

        match Category::from_str(raw) {
            Ok(category) => {
                questions::set_classified_category(&self.db, question.id, category).await?;
                Ok(Some(category))
            }
            Err(_) => Ok(None),
        }
    }

    /// Branch 2: automated stance vote with written justification
    ///
    /// Idempotent: safe to invoke multiple times without producing
    /// duplicate votes; the provider is not called when a vote exists.
    async fn vote_branch(&self, question: &Question) {
        match self.try_vote(question).await {
            Ok(Some(vote)) => {
                self.log(
                    "enrich_vote",
                    RunStatus::Success,
                    &format!("Voted {}", vote),
                    question,
                )
                .await;
            }
            Ok(None) => {
                self.log(
                    "enrich_vote",
                    RunStatus::Success,
                    "Vote already exists; skipped",
                    question,
                )
                .await;
            }
            Err(e) => {
                tracing::warn!(question_id = %question.id, error = %e, "Automated vote failed");
                self.log("enrich_vote", RunStatus::Error, &e.to_string(), question)
                    .await;
            }
        }
    }

    async fn try_vote(&self, question: &Question) -> Result<Option<AutoVote>> {
        if questions::has_auto_vote(&self.db, question.id).await? {
            return Ok(None);
        }

        let prompt = format!(
            "You are casting a considered vote on a yes/no poll question.\n\
             Respond in exactly two lines:\n\
             VOTE: YES, NO, or UNSURE\n\
             REASON: one short sentence justifying the vote\n\n\
             Question: {}",
            question.text
        );

        let generated = self
            .text
            .generate(&prompt, 128, 0.3)
            .await
            .context("Vote call failed")?;

        let (vote, reason) = parse_vote(&generated.text);
        questions::set_auto_vote(&self.db, question.id, vote, &reason).await?;

        Ok(Some(vote))
    }

    /// Branch 3: illustrative image over the ordered model candidate list
    ///
    /// Every model failing is a valid terminal state: the question stays
    /// live without an illustration and nothing is retried.
    async fn illustrate_branch(&self, question: &Question) {
        let models = match settings::get_image_models(&self.db).await {
            Ok(models) => models,
            Err(e) => {
                self.log("enrich_illustrate", RunStatus::Error, &e.to_string(), question)
                    .await;
                return;
            }
        };

        let prompt = format!(
            "A simple, striking editorial illustration for a poll question, \
             no text in the image. Question: {}",
            question.text
        );

        let image = match self.image.generate(&prompt, &models).await {
            Ok(image) => image,
            Err(ProviderError::Exhausted(detail)) => {
                tracing::warn!(question_id = %question.id, detail = %detail, "All image models failed");
                self.log(
                    "enrich_illustrate",
                    RunStatus::Error,
                    "All image models failed; question left without illustration",
                    question,
                )
                .await;
                return;
            }
            Err(e) => {
                tracing::warn!(question_id = %question.id, error = %e, "Image generation failed");
                self.log("enrich_illustrate", RunStatus::Error, &e.to_string(), question)
                    .await;
                return;
            }
        };

        let path = format!(
            "illustrations/{}.{}",
            question.id,
            extension_for(&image.mime_type)
        );

        match self.store.put(&path, &image.bytes, &image.mime_type).await {
            Ok(url) => {
                if let Err(e) =
                    questions::set_illustration(&self.db, question.id, &url, &image.model_used)
                        .await
                {
                    self.log("enrich_illustrate", RunStatus::Error, &e.to_string(), question)
                        .await;
                    return;
                }
                self.log(
                    "enrich_illustrate",
                    RunStatus::Success,
                    &format!("Illustrated by {}", image.model_used),
                    question,
                )
                .await;
            }
            Err(e) => {
                tracing::warn!(question_id = %question.id, error = %e, "Object store put failed");
                self.log("enrich_illustrate", RunStatus::Error, &e.to_string(), question)
                    .await;
            }
        }
    }

    async fn log(&self, job: &str, status: RunStatus, message: &str, question: &Question) {
        let metadata = serde_json::json!({ "question_id": question.id });
        if let Err(e) = run_log::append(&self.db, job, status, message, metadata).await {
            tracing::error!(error = %e, "Failed to append run log entry");
        }
    }
}

/// Parse the two-line vote contract with tolerant pattern matching
///
/// Survives minor formatting variance such as markdown emphasis; an
/// unparsable response degrades to UNSURE with a generic justification
/// rather than erroring the branch.
pub fn parse_vote(response: &str) -> (AutoVote, String) {
    let vote = vote_regex()
        .captures(response)
        .and_then(|c| c.get(1))
        .map(|m| match m.as_str().to_uppercase().as_str() {
            "YES" => AutoVote::For,
            "NO" => AutoVote::Against,
            _ => AutoVote::Uncertain,
        })
        .unwrap_or(AutoVote::Uncertain);

    let reason = reason_regex()
        .captures(response)
        .and_then(|c| c.get(1))
        .map(|m| {
            m.as_str()
                .trim()
                .trim_matches(|c| c == '*' || c == '_' || c == '`')
                .trim()
                .to_string()
        })
        .filter(|r| !r.is_empty())
        .unwrap_or_else(|| FALLBACK_VOTE_REASON.to_string());

    (vote, reason)
}

/// File extension for a MIME type
fn extension_for(mime_type: &str) -> &'static str {
    match mime_type {
        "image/png" => "png",
        "image/jpeg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        _ => "bin",
    }
}
