//! Row models and domain types for the generation pipeline tables

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Poll question category
///
/// Fixed vocabulary used both for sharding the batch-generation prompt
/// (one candidate per category) and as the classification vocabulary during
/// enrichment. Stored as lowercase text in the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Politics,
    Technology,
    Ethics,
    Environment,
    Health,
    Economy,
    Culture,
    Education,
    Science,
    Lifestyle,
}

impl Category {
    /// All categories, in prompt-sharding order
    pub const ALL: [Category; 10] = [
        Category::Politics,
        Category::Technology,
        Category::Ethics,
        Category::Environment,
        Category::Health,
        Category::Economy,
        Category::Culture,
        Category::Education,
        Category::Science,
        Category::Lifestyle,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Politics => "politics",
            Category::Technology => "technology",
            Category::Ethics => "ethics",
            Category::Environment => "environment",
            Category::Health => "health",
            Category::Economy => "economy",
            Category::Culture => "culture",
            Category::Education => "education",
            Category::Science => "science",
            Category::Lifestyle => "lifestyle",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    /// Case-insensitive; anything outside the vocabulary (including "Other")
    /// is an error so callers can distinguish "unclassified" from a default.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "politics" => Ok(Category::Politics),
            "technology" => Ok(Category::Technology),
            "ethics" => Ok(Category::Ethics),
            "environment" => Ok(Category::Environment),
            "health" => Ok(Category::Health),
            "economy" => Ok(Category::Economy),
            "culture" => Ok(Category::Culture),
            "education" => Ok(Category::Education),
            "science" => Ok(Category::Science),
            "lifestyle" => Ok(Category::Lifestyle),
            other => Err(format!("Unknown category: {}", other)),
        }
    }
}

/// Automated stance vote on a published question
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AutoVote {
    For,
    Against,
    Uncertain,
}

impl AutoVote {
    pub fn as_str(&self) -> &'static str {
        match self {
            AutoVote::For => "FOR",
            AutoVote::Against => "AGAINST",
            AutoVote::Uncertain => "UNCERTAIN",
        }
    }
}

impl fmt::Display for AutoVote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AutoVote {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "FOR" => Ok(AutoVote::For),
            "AGAINST" => Ok(AutoVote::Against),
            "UNCERTAIN" => Ok(AutoVote::Uncertain),
            other => Err(format!("Unknown vote: {}", other)),
        }
    }
}

/// Run log entry status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Started,
    Success,
    Error,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Started => "started",
            RunStatus::Success => "success",
            RunStatus::Error => "error",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accepted candidate awaiting publication (generation_queue row)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: Uuid,
    pub text: String,
    pub category: Category,
    /// Embedding computed at generation time, reused at publish time
    pub embedding: Vec<f32>,
    pub created_at: DateTime<Utc>,
    /// NULL means still pending; set exactly once by the publisher
    pub published_at: Option<DateTime<Utc>>,
}

/// Generated candidate audit record (generated_candidates row)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub id: Uuid,
    pub text: String,
    pub category: Category,
    pub accepted: bool,
    /// Highest similarity against existing content, if the check ran
    pub similarity: Option<f32>,
    /// Text of the nearest existing question, for rejected rows
    pub matched_text: Option<String>,
    /// Rejection reason ("duplicate", "embedding_unavailable", ...)
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Published question (questions row)
///
/// Enrichment fields arrive asynchronously and independently; absence is a
/// valid, displayable state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: Uuid,
    pub text: String,
    pub category: Category,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub embedding: Vec<f32>,
    /// NULL = system-authored
    pub author: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub classified_category: Option<Category>,
    pub auto_vote: Option<AutoVote>,
    pub auto_vote_reason: Option<String>,
    pub illustration_url: Option<String>,
    pub illustration_model: Option<String>,
}

/// Pipeline audit trail entry (run_log row)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunLogEntry {
    pub id: i64,
    pub job_name: String,
    pub status: RunStatus,
    pub message: String,
    /// Structured metadata (token usage, counts) as JSON
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_round_trips_through_str() {
        for category in Category::ALL {
            let parsed: Category = category.as_str().parse().unwrap();
            assert_eq!(parsed, category);
        }
    }

    #[test]
    fn category_parse_is_case_insensitive() {
        assert_eq!("Politics".parse::<Category>().unwrap(), Category::Politics);
        assert_eq!(" SCIENCE ".parse::<Category>().unwrap(), Category::Science);
    }

    #[test]
    fn unknown_category_is_rejected() {
        assert!("other".parse::<Category>().is_err());
        assert!("".parse::<Category>().is_err());
    }

    #[test]
    fn vote_round_trips_through_str() {
        for vote in [AutoVote::For, AutoVote::Against, AutoVote::Uncertain] {
            let parsed: AutoVote = vote.as_str().parse().unwrap();
            assert_eq!(parsed, vote);
        }
    }
}
