//! AI provider capability traits
//!
//! The pipeline talks to external AI vendors only through these three
//! seams. Concrete providers are constructed once at startup from
//! configuration and injected into the components that need them; no
//! per-call provider switching and no lazily-built global clients.
//!
//! Every provider call carries its own HTTP timeout; a timed-out call
//! surfaces as a `ProviderError`, never a panic.

pub mod gemini;
pub mod openai;

pub use gemini::GeminiClient;
pub use openai::OpenAiClient;

use thiserror::Error;

/// Provider call errors
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Network communication error (includes timeouts)
    #[error("Network error: {0}")]
    Network(String),

    /// Provider returned an error status
    #[error("API error {0}: {1}")]
    Api(u16, String),

    /// Provider-side rate limit or quota rejection
    #[error("Rate limit exceeded")]
    RateLimited,

    /// Failed to parse the provider response
    #[error("Parse error: {0}")]
    Parse(String),

    /// Missing or invalid provider configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Every model in an ordered fallback list failed
    #[error("All candidate models failed: {0}")]
    Exhausted(String),
}

/// Text generation result with token-usage accounting
#[derive(Debug, Clone)]
pub struct GeneratedText {
    pub text: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Batch embedding result
#[derive(Debug, Clone)]
pub struct EmbeddingBatch {
    /// One vector per input text, in input order
    pub vectors: Vec<Vec<f32>>,
    pub total_tokens: u32,
}

/// Image generation result
#[derive(Debug, Clone)]
pub struct GeneratedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    /// Which model in the candidate list satisfied the request
    pub model_used: String,
}

/// Prompt-in, text-out capability
#[async_trait::async_trait]
pub trait TextGenerator: Send + Sync {
    /// Provider name for logging and run-log metadata
    fn name(&self) -> &'static str;

    async fn generate(
        &self,
        prompt: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<GeneratedText, ProviderError>;
}

/// Text-to-dense-vector capability; must support batch input
#[async_trait::async_trait]
pub trait Embedder: Send + Sync {
    fn name(&self) -> &'static str;

    /// Fixed output vector length
    fn dimension(&self) -> usize;

    async fn embed(&self, texts: &[String]) -> Result<EmbeddingBatch, ProviderError>;
}

/// Prompt-to-image capability over an ordered model candidate list
///
/// Implementations try each model in order, advancing to the next on any
/// failure (quota rejection included), and stop at the first model that
/// returns image bytes.
#[async_trait::async_trait]
pub trait ImageGenerator: Send + Sync {
    fn name(&self) -> &'static str;

    async fn generate(
        &self,
        prompt: &str,
        models: &[String],
    ) -> Result<GeneratedImage, ProviderError>;
}
