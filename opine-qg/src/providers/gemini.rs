//! Gemini API client (text generation + image generation)
//!
//! Image generation walks an ordered model candidate list: the
//! higher-quality, lower-quota model is tried first, falling back to the
//! higher-quota model on any failure including quota rejection.

use super::{GeneratedImage, GeneratedText, ImageGenerator, ProviderError, TextGenerator};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_TEXT_MODEL: &str = "gemini-2.0-flash";
const REQUEST_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig", skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<RequestPart>,
}

#[derive(Debug, Serialize)]
struct RequestPart {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    #[serde(rename = "maxOutputTokens", skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(rename = "responseModalities", skip_serializing_if = "Option::is_none")]
    response_modalities: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
    #[serde(rename = "usageMetadata")]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    parts: Option<Vec<ResponsePart>>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
    #[serde(rename = "inlineData")]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
struct InlineData {
    #[serde(rename = "mimeType")]
    mime_type: String,
    data: String,
}

#[derive(Debug, Default, Deserialize)]
struct UsageMetadata {
    #[serde(rename = "promptTokenCount", default)]
    prompt_token_count: u32,
    #[serde(rename = "candidatesTokenCount", default)]
    candidates_token_count: u32,
}

/// Gemini API client
pub struct GeminiClient {
    http_client: reqwest::Client,
    base_url: String,
    api_key: String,
    text_model: String,
}

impl GeminiClient {
    pub fn new(api_key: String) -> Result<Self, ProviderError> {
        Self::with_base_url(api_key, GEMINI_BASE_URL.to_string())
    }

    /// Override the base URL (tests point this at a local stub)
    pub fn with_base_url(api_key: String, base_url: String) -> Result<Self, ProviderError> {
        if api_key.trim().is_empty() {
            return Err(ProviderError::Config("Gemini API key is empty".to_string()));
        }

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url,
            api_key,
            text_model: DEFAULT_TEXT_MODEL.to_string(),
        })
    }

    async fn generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse, ProviderError> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, model, self.api_key
        );

        let response = self
            .http_client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status();

        if status.as_u16() == 429 {
            return Err(ProviderError::RateLimited);
        }

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api(status.as_u16(), error_text));
        }

        response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))
    }
}

#[async_trait::async_trait]
impl TextGenerator for GeminiClient {
    fn name(&self) -> &'static str {
        "gemini"
    }

    async fn generate(
        &self,
        prompt: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Result<GeneratedText, ProviderError> {
        let request = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![RequestPart {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: Some(GenerationConfig {
                max_output_tokens: Some(max_tokens),
                temperature: Some(temperature),
                response_modalities: None,
            }),
        };

        tracing::debug!(model = %self.text_model, prompt_chars = prompt.len(), "Gemini text request");

        let body = self.generate_content(&self.text_model, &request).await?;

        let text = body
            .candidates
            .and_then(|c| c.into_iter().next())
            .and_then(|c| c.content)
            .and_then(|c| c.parts)
            .and_then(|parts| parts.into_iter().find_map(|p| p.text))
            .ok_or_else(|| ProviderError::Parse("Response contained no text".to_string()))?;

        let usage = body.usage_metadata.unwrap_or_default();

        Ok(GeneratedText {
            text,
            input_tokens: usage.prompt_token_count,
            output_tokens: usage.candidates_token_count,
        })
    }
}

#[async_trait::async_trait]
impl ImageGenerator for GeminiClient {
    fn name(&self) -> &'static str {
        "gemini"
    }

    async fn generate(
        &self,
        prompt: &str,
        models: &[String],
    ) -> Result<GeneratedImage, ProviderError> {
        if models.is_empty() {
            return Err(ProviderError::Config(
                "No image model candidates configured".to_string(),
            ));
        }

        let request = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![RequestPart {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: Some(GenerationConfig {
                max_output_tokens: None,
                temperature: None,
                response_modalities: Some(vec!["TEXT".to_string(), "IMAGE".to_string()]),
            }),
        };

        let mut failures = Vec::new();

        for model in models {
            match self.generate_content(model, &request).await {
                Ok(body) => {
                    let inline = body
                        .candidates
                        .and_then(|c| c.into_iter().next())
                        .and_then(|c| c.content)
                        .and_then(|c| c.parts)
                        .and_then(|parts| parts.into_iter().find_map(|p| p.inline_data));

                    match inline {
                        // Undecodable payload counts as a failed model,
                        // not a chain-fatal error
                        Some(data) => match base64::engine::general_purpose::STANDARD
                            .decode(&data.data)
                        {
                            Ok(bytes) => {
                                tracing::info!(model = %model, bytes = bytes.len(), "Image generated");

                                return Ok(GeneratedImage {
                                    bytes,
                                    mime_type: data.mime_type,
                                    model_used: model.clone(),
                                });
                            }
                            Err(e) => {
                                tracing::warn!(model = %model, error = %e, "Model returned undecodable image data, trying next");
                                failures.push(format!("{}: invalid image payload: {}", model, e));
                            }
                        },
                        None => {
                            tracing::warn!(model = %model, "Model returned no image data, trying next");
                            failures.push(format!("{}: no image data", model));
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(model = %model, error = %e, "Image model failed, trying next");
                    failures.push(format!("{}: {}", model, e));
                }
            }
        }

        Err(ProviderError::Exhausted(failures.join("; ")))
    }
}
