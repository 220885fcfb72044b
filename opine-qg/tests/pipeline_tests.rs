//! End-to-end pipeline tests over an in-memory database with scripted
//! providers.

mod support;

use chrono::{Duration as ChronoDuration, Utc};
use opine_common::db::models::{AutoVote, Category, Question, QueueItem, RunStatus};
use opine_qg::db::{queue, questions, run_log, settings};
use opine_qg::pipeline::{
    BatchGenerator, DeduplicationGate, EnrichmentFanout, PublishOutcome, Publisher,
    SimilarityIndex,
};
use std::sync::Arc;
use std::time::Duration;
use support::*;
use uuid::Uuid;

fn published_question(text: &str, embedding: Vec<f32>) -> Question {
    Question {
        id: Uuid::new_v4(),
        text: text.to_string(),
        category: Category::Politics,
        embedding,
        author: None,
        created_at: Utc::now(),
        classified_category: None,
        auto_vote: None,
        auto_vote_reason: None,
        illustration_url: None,
        illustration_model: None,
    }
}

fn pending_item(text: &str, age_secs: i64, embedding: Vec<f32>) -> QueueItem {
    QueueItem {
        id: Uuid::new_v4(),
        text: text.to_string(),
        category: Category::Technology,
        embedding,
        created_at: Utc::now() - ChronoDuration::seconds(age_secs),
        published_at: None,
    }
}

/// Wait for a background task to leave an observable trace
async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

// ---------------------------------------------------------------- dedup

#[tokio::test]
async fn duplicate_decision_follows_the_threshold() {
    let pool = setup_test_db().await;
    questions::insert_question(
        &pool,
        &published_question("Should voting be mandatory?", axis_vector(0)),
    )
    .await
    .unwrap();

    let candidate = similar_vector(0, 0.9);
    let embedder = Arc::new(StubEmbedder::new());

    let strict = DeduplicationGate::new(
        embedder.clone(),
        SimilarityIndex::new(pool.clone()),
        0.85,
    );
    let decision = strict.evaluate(&candidate).await;
    assert!(decision.is_duplicate);
    assert!((decision.highest_similarity.unwrap() - 0.9).abs() < 1e-4);
    assert_eq!(
        decision.matched_text.as_deref(),
        Some("Should voting be mandatory?")
    );

    let loose = DeduplicationGate::new(embedder, SimilarityIndex::new(pool), 0.95);
    let decision = loose.evaluate(&candidate).await;
    assert!(!decision.is_duplicate);
}

#[tokio::test]
async fn gate_accepts_when_index_is_unavailable() {
    // No tables created: every similarity query errors
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect(":memory:")
        .await
        .unwrap();

    let gate = DeduplicationGate::new(
        Arc::new(StubEmbedder::new()),
        SimilarityIndex::new(pool),
        0.85,
    );

    let decision = gate.check("Should bridges be painted blue?").await.unwrap();
    assert!(!decision.result.is_duplicate);
    assert!(decision.result.highest_similarity.is_none());
    assert_eq!(decision.embedding.len(), STUB_DIMENSION);
}

// ---------------------------------------------------------------- batch

#[tokio::test]
async fn batch_run_queues_novel_candidates_and_records_rejects() {
    let pool = setup_test_db().await;
    questions::insert_question(
        &pool,
        &published_question("Should single-use plastics be banned?", axis_vector(0)),
    )
    .await
    .unwrap();

    let dup_a = "Should all single-use plastics be outlawed?";
    let dup_b = "Is banning single-use plastics the right move?";
    let oversized = format!("7. {}", "x".repeat(400));
    let response = format!(
        "1. Should voting be mandatory for adults?\n\
         2. {}\n\
         3. Is lying ever morally acceptable?\n\
         4. Should cities plant more urban forests?\n\
         5. {}\n\
         6. Should central banks target zero inflation?\n\
         {}\n\
         8. Should homework be abolished in primary school?\n\
         9. Is nuclear power essential for decarbonization?\n\
         10. Should remote work be a legal right?",
        dup_a, dup_b, oversized
    );

    let text = Arc::new(ScriptedTextGenerator::new(vec![&response]));
    let embedder = Arc::new(
        StubEmbedder::new()
            .preset(dup_a, similar_vector(0, 0.9))
            .preset(dup_b, similar_vector(0, 0.88)),
    );

    let generator = BatchGenerator::new(pool.clone(), text, embedder);
    let outcome = generator.generate_batch(&Category::ALL).await.unwrap();

    // 10 lines minus the oversized one, minus two near-duplicates
    assert_eq!(outcome.accepted.len(), 7);
    assert_eq!(outcome.rejected.len(), 2);
    assert_eq!(queue::pending_count(&pool).await.unwrap(), 7);

    for rejected in &outcome.rejected {
        assert!(!rejected.accepted);
        assert_eq!(rejected.reason.as_deref(), Some("duplicate"));
        assert!(rejected.similarity.unwrap() >= 0.85);
        assert_eq!(
            rejected.matched_text.as_deref(),
            Some("Should single-use plastics be banned?")
        );
    }

    let entries = run_log::recent(&pool, 10).await.unwrap();
    let success = entries
        .iter()
        .find(|e| e.job_name == "generate_batch" && e.status == RunStatus::Success)
        .unwrap();
    assert!(success.message.contains("7 accepted"));
}

#[tokio::test]
async fn embedding_failure_aborts_the_whole_batch() {
    let pool = setup_test_db().await;
    let text = Arc::new(ScriptedTextGenerator::new(vec![
        "1. Should voting be mandatory for adults?\n2. Is privacy dead online?",
    ]));

    let generator = BatchGenerator::new(pool.clone(), text, Arc::new(FailingEmbedder));
    let result = generator.generate_batch(&Category::ALL).await;

    assert!(result.is_err());
    assert_eq!(queue::pending_count(&pool).await.unwrap(), 0);
}

#[tokio::test]
async fn single_generation_respects_its_own_threshold() {
    let pool = setup_test_db().await;
    questions::insert_question(
        &pool,
        &published_question("Should museums be free?", axis_vector(0)),
    )
    .await
    .unwrap();

    // 0.8 sits between the default single (0.75) and batch (0.85) thresholds
    let near_miss = "Should all museums waive entry fees?";
    let text = Arc::new(ScriptedTextGenerator::new(vec![near_miss]));
    let embedder = Arc::new(StubEmbedder::new().preset(near_miss, similar_vector(0, 0.8)));

    let generator = BatchGenerator::new(pool.clone(), text, embedder);
    let item = generator.generate_single(Category::Culture).await.unwrap();

    assert!(item.is_none());
    assert_eq!(queue::pending_count(&pool).await.unwrap(), 0);
}

// -------------------------------------------------------------- publish

#[tokio::test]
async fn publish_promotes_oldest_first() {
    let pool = setup_test_db().await;
    settings::set_setting(&pool, "queue_low_water_mark", 0).await.unwrap();

    for (text, age) in [("first", 300), ("second", 200), ("third", 100)] {
        queue::insert_queue_item(&pool, &pending_item(text, age, axis_vector(1)))
            .await
            .unwrap();
    }

    let publisher = Publisher::new(
        pool.clone(),
        Arc::new(ScriptedTextGenerator::new(vec![])),
        Arc::new(StubEmbedder::new()),
        Arc::new(StubImageGenerator),
        Arc::new(RecordingObjectStore::new()),
    );

    let mut published = Vec::new();
    for _ in 0..3 {
        match publisher.publish().await.unwrap() {
            PublishOutcome::Published { question_id, .. } => {
                let question = questions::get_question(&pool, question_id)
                    .await
                    .unwrap()
                    .unwrap();
                published.push(question.text);
            }
            other => panic!("expected a publish, got {:?}", other),
        }
    }

    assert_eq!(published, vec!["first", "second", "third"]);
    assert_eq!(queue::pending_count(&pool).await.unwrap(), 0);
}

#[tokio::test]
async fn empty_queue_triggers_generation_instead_of_publishing() {
    let pool = setup_test_db().await;

    let text = Arc::new(ScriptedTextGenerator::new(vec![
        "1. Should city centers ban private cars?",
    ]));
    let publisher = Publisher::new(
        pool.clone(),
        text.clone(),
        Arc::new(StubEmbedder::new()),
        Arc::new(StubImageGenerator),
        Arc::new(RecordingObjectStore::new()),
    );

    let outcome = publisher.publish().await.unwrap();
    assert!(matches!(
        outcome,
        PublishOutcome::QueueEmptyTriggeredGeneration
    ));

    // Generation runs in the background; wait for the provider call
    assert!(wait_until(|| text.prompts_containing("one question per category") >= 1).await);
}

#[tokio::test]
async fn publish_below_low_water_mark_triggers_replenishment() {
    let pool = setup_test_db().await;

    // Two pending items against the default low-water mark of three
    queue::insert_queue_item(&pool, &pending_item("one", 100, axis_vector(1)))
        .await
        .unwrap();
    queue::insert_queue_item(&pool, &pending_item("two", 50, axis_vector(2)))
        .await
        .unwrap();

    let text = Arc::new(ScriptedTextGenerator::new(vec![]));
    let publisher = Publisher::new(
        pool.clone(),
        text.clone(),
        Arc::new(StubEmbedder::new()),
        Arc::new(StubImageGenerator),
        Arc::new(RecordingObjectStore::new()),
    );

    let outcome = publisher.publish().await.unwrap();
    match outcome {
        PublishOutcome::Published {
            queue_remaining, ..
        } => assert_eq!(queue_remaining, 1),
        other => panic!("expected a publish, got {:?}", other),
    }

    assert!(wait_until(|| text.prompts_containing("one question per category") >= 1).await);
}

// ----------------------------------------------------------- enrichment

#[tokio::test]
async fn vote_runs_once_across_repeated_enrichment() {
    let pool = setup_test_db().await;
    let question = published_question("Should parks stay open all night?", axis_vector(3));
    questions::insert_question(&pool, &question).await.unwrap();

    let vote_response = "VOTE: YES\nREASON: Public space access matters.";
    let text = Arc::new(ScriptedTextGenerator::new(vec![
        vote_response,
        vote_response,
        vote_response,
        vote_response,
    ]));
    let fanout = EnrichmentFanout::new(
        pool.clone(),
        text.clone(),
        Arc::new(ExhaustedImageGenerator),
        Arc::new(RecordingObjectStore::new()),
    );

    fanout.enrich(&question).await;
    fanout.enrich(&question).await;

    assert_eq!(text.prompts_containing("casting a considered vote"), 1);

    let stored = questions::get_question(&pool, question.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.auto_vote, Some(AutoVote::For));
    assert_eq!(
        stored.auto_vote_reason.as_deref(),
        Some("Public space access matters.")
    );
}

#[tokio::test]
async fn exhausted_image_models_leave_question_without_illustration() {
    let pool = setup_test_db().await;
    let question = published_question("Should billboards be banned downtown?", axis_vector(4));
    questions::insert_question(&pool, &question).await.unwrap();

    let store = Arc::new(RecordingObjectStore::new());
    let fanout = EnrichmentFanout::new(
        pool.clone(),
        Arc::new(ScriptedTextGenerator::new(vec![])),
        Arc::new(ExhaustedImageGenerator),
        store.clone(),
    );

    fanout.enrich(&question).await;

    let stored = questions::get_question(&pool, question.id)
        .await
        .unwrap()
        .unwrap();
    assert!(stored.illustration_url.is_none());
    assert!(store.stored_paths().is_empty());

    let entries = run_log::recent(&pool, 20).await.unwrap();
    assert!(entries
        .iter()
        .any(|e| e.job_name == "enrich_illustrate" && e.status == RunStatus::Error));
}

#[tokio::test]
async fn successful_illustration_is_stored_and_linked() {
    let pool = setup_test_db().await;
    let question = published_question("Should rivers have legal personhood?", axis_vector(5));
    questions::insert_question(&pool, &question).await.unwrap();

    let store = Arc::new(RecordingObjectStore::new());
    let fanout = EnrichmentFanout::new(
        pool.clone(),
        Arc::new(ScriptedTextGenerator::new(vec![])),
        Arc::new(StubImageGenerator),
        store.clone(),
    );

    fanout.enrich(&question).await;

    let stored = questions::get_question(&pool, question.id)
        .await
        .unwrap()
        .unwrap();
    let expected_path = format!("illustrations/{}.png", question.id);
    assert_eq!(
        stored.illustration_url.as_deref(),
        Some(format!("http://test.local/media/{}", expected_path).as_str())
    );
    assert!(stored.illustration_model.is_some());
    assert_eq!(store.stored_paths(), vec![expected_path]);
}

#[tokio::test]
async fn classification_writes_back_a_known_category() {
    let pool = setup_test_db().await;
    let question = published_question("Is gene editing ready for clinics?", axis_vector(6));
    questions::insert_question(&pool, &question).await.unwrap();

    // The question already carries a vote, so the single scripted
    // response is consumed by the classification branch.
    questions::set_auto_vote(&pool, question.id, AutoVote::For, "preset")
        .await
        .unwrap();

    let fanout = EnrichmentFanout::new(
        pool.clone(),
        Arc::new(ScriptedTextGenerator::new(vec!["science"])),
        Arc::new(ExhaustedImageGenerator),
        Arc::new(RecordingObjectStore::new()),
    );

    fanout.enrich(&question).await;

    let stored = questions::get_question(&pool, question.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.classified_category, Some(Category::Science));
}
