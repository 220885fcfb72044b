//! Shared fixtures for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use opine_qg::providers::{
    Embedder, EmbeddingBatch, GeneratedImage, GeneratedText, ImageGenerator, ProviderError,
    TextGenerator,
};
use opine_qg::storage::ObjectStore;
use sqlx::SqlitePool;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Single-connection in-memory database with all tables created
pub async fn setup_test_db() -> SqlitePool {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect(":memory:")
        .await
        .unwrap();
    opine_common::db::init_tables(&pool).await.unwrap();
    pool
}

/// Text generator that replays a fixed list of responses
///
/// Records every prompt it sees; when the script runs out it answers with
/// a harmless vote response so background branches never panic.
pub struct ScriptedTextGenerator {
    responses: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl ScriptedTextGenerator {
    pub fn new(responses: Vec<&str>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(String::from).collect()),
            prompts: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// How many recorded prompts contain the given fragment
    pub fn prompts_containing(&self, fragment: &str) -> usize {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.contains(fragment))
            .count()
    }
}

#[async_trait]
impl TextGenerator for ScriptedTextGenerator {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn generate(
        &self,
        prompt: &str,
        _max_tokens: u32,
        _temperature: f32,
    ) -> Result<GeneratedText, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());

        let text = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| "VOTE: UNSURE\nREASON: Out of scripted responses.".to_string());

        Ok(GeneratedText {
            text,
            input_tokens: 10,
            output_tokens: 20,
        })
    }
}

/// Text generator that always fails
pub struct FailingTextGenerator;

#[async_trait]
impl TextGenerator for FailingTextGenerator {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn generate(
        &self,
        _prompt: &str,
        _max_tokens: u32,
        _temperature: f32,
    ) -> Result<GeneratedText, ProviderError> {
        Err(ProviderError::Network("scripted failure".to_string()))
    }
}

pub const STUB_DIMENSION: usize = 32;

/// Embedder with preset vectors per text
///
/// Unknown texts are assigned successive one-hot axes, so two distinct
/// unknown texts always come out orthogonal (similarity zero) while
/// preset texts can be placed at any chosen similarity.
pub struct StubEmbedder {
    vectors: Mutex<HashMap<String, Vec<f32>>>,
    next_axis: Mutex<usize>,
}

impl StubEmbedder {
    pub fn new() -> Self {
        Self {
            vectors: Mutex::new(HashMap::new()),
            // Axes 0-7 are reserved for hand-built preset vectors
            next_axis: Mutex::new(8),
        }
    }

    pub fn preset(self, text: &str, vector: Vec<f32>) -> Self {
        assert_eq!(vector.len(), STUB_DIMENSION);
        self.vectors.lock().unwrap().insert(text.to_string(), vector);
        self
    }
}

/// Unit vector along one axis
pub fn axis_vector(axis: usize) -> Vec<f32> {
    let mut v = vec![0.0; STUB_DIMENSION];
    v[axis] = 1.0;
    v
}

/// Unit vector at the given cosine similarity to `axis_vector(axis)`
pub fn similar_vector(axis: usize, cosine: f32) -> Vec<f32> {
    let mut v = vec![0.0; STUB_DIMENSION];
    v[axis] = cosine;
    v[STUB_DIMENSION - 1] = (1.0 - cosine * cosine).sqrt();
    v
}

#[async_trait]
impl Embedder for StubEmbedder {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn dimension(&self) -> usize {
        STUB_DIMENSION
    }

    async fn embed(&self, texts: &[String]) -> Result<EmbeddingBatch, ProviderError> {
        let mut vectors = self.vectors.lock().unwrap();
        let mut next_axis = self.next_axis.lock().unwrap();

        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            let vector = vectors
                .entry(text.clone())
                .or_insert_with(|| {
                    let axis = *next_axis % STUB_DIMENSION;
                    *next_axis += 1;
                    axis_vector(axis)
                })
                .clone();
            out.push(vector);
        }

        Ok(EmbeddingBatch {
            vectors: out,
            total_tokens: texts.len() as u32 * 5,
        })
    }
}

/// Embedder that always fails
pub struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    fn name(&self) -> &'static str {
        "failing"
    }

    fn dimension(&self) -> usize {
        STUB_DIMENSION
    }

    async fn embed(&self, _texts: &[String]) -> Result<EmbeddingBatch, ProviderError> {
        Err(ProviderError::Network("scripted failure".to_string()))
    }
}

/// Image generator that answers from the first candidate model
pub struct StubImageGenerator;

#[async_trait]
impl ImageGenerator for StubImageGenerator {
    fn name(&self) -> &'static str {
        "stub"
    }

    async fn generate(
        &self,
        _prompt: &str,
        models: &[String],
    ) -> Result<GeneratedImage, ProviderError> {
        let model = models
            .first()
            .ok_or_else(|| ProviderError::Config("no models".to_string()))?;
        Ok(GeneratedImage {
            bytes: vec![0x89, 0x50, 0x4e, 0x47],
            mime_type: "image/png".to_string(),
            model_used: model.clone(),
        })
    }
}

/// Image generator for which every candidate model fails
pub struct ExhaustedImageGenerator;

#[async_trait]
impl ImageGenerator for ExhaustedImageGenerator {
    fn name(&self) -> &'static str {
        "exhausted"
    }

    async fn generate(
        &self,
        _prompt: &str,
        _models: &[String],
    ) -> Result<GeneratedImage, ProviderError> {
        Err(ProviderError::Exhausted(
            "model-a: quota; model-b: quota".to_string(),
        ))
    }
}

/// Object store that records puts in memory
#[derive(Default)]
pub struct RecordingObjectStore {
    puts: Mutex<Vec<(String, String)>>,
}

impl RecordingObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stored_paths(&self) -> Vec<String> {
        self.puts
            .lock()
            .unwrap()
            .iter()
            .map(|(path, _)| path.clone())
            .collect()
    }
}

#[async_trait]
impl ObjectStore for RecordingObjectStore {
    async fn put(
        &self,
        path: &str,
        _bytes: &[u8],
        content_type: &str,
    ) -> opine_common::Result<String> {
        self.puts
            .lock()
            .unwrap()
            .push((path.to_string(), content_type.to_string()));
        Ok(format!("http://test.local/media/{}", path))
    }
}
