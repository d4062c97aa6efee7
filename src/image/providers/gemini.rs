//! Gemini (Google) image service.

use crate::error::{parse_retry_after, sanitize_error_message, ImagegenError, Result};
use crate::image::provider::ImageService;
use crate::image::types::{
    GenerationConfig, GenerationRequest, GenerationResponse, ImageData, ImageFormat, Turn,
};
use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Public Gemini API endpoint.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Environment variables checked for the API key, in order.
pub const API_KEY_ENV_VARS: [&str; 2] = ["GEMINI_API_KEY", "GOOGLE_API_KEY"];

/// Environment variable overriding [`DEFAULT_BASE_URL`].
pub const BASE_URL_ENV_VAR: &str = "GEMINI_BASE_URL";

/// Builder for GeminiProvider.
#[derive(Debug, Clone, Default)]
pub struct GeminiProviderBuilder {
    api_key: Option<String>,
    base_url: Option<String>,
}

impl GeminiProviderBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the API key. Falls back to `GEMINI_API_KEY`, then `GOOGLE_API_KEY`.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the API base URL. Falls back to `GEMINI_BASE_URL`, then the public endpoint.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Builds the provider, resolving the API key.
    pub fn build(self) -> Result<GeminiProvider> {
        let api_key = self
            .api_key
            .or_else(|| {
                API_KEY_ENV_VARS
                    .iter()
                    .find_map(|var| std::env::var(var).ok())
            })
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                ImagegenError::Config("GEMINI_API_KEY not set and no API key provided".into())
            })?;

        let base_url = self
            .base_url
            .or_else(|| std::env::var(BASE_URL_ENV_VAR).ok())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(GeminiProvider {
            client: reqwest::Client::new(),
            api_key,
            base_url,
        })
    }
}

/// Gemini image service backed by the `generateContent` endpoint.
pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl GeminiProvider {
    /// Creates a new `GeminiProviderBuilder`.
    pub fn builder() -> GeminiProviderBuilder {
        GeminiProviderBuilder::new()
    }

    async fn generate_impl(&self, request: &GenerationRequest) -> Result<GenerationResponse> {
        let start = Instant::now();
        let model = request.config.model;

        let url = format!("{}/models/{}:generateContent", self.base_url, model.as_str());
        let body = GeminiRequest::from_generation_request(request);

        tracing::debug!(
            model = model.as_str(),
            images = request.images.len(),
            history = request.history.len(),
            "sending Gemini generateContent request"
        );

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let text = response.text().await.unwrap_or_default();
            return Err(parse_error(status.as_u16(), &text, &headers));
        }

        let gemini_response: GeminiResponse = response.json().await?;
        let result = gemini_response.into_generation_response()?;

        tracing::debug!(
            duration_ms = start.elapsed().as_millis() as u64,
            image = result.image.is_some(),
            text = result.text.is_some(),
            "Gemini response received"
        );

        Ok(result)
    }
}

fn parse_error(status: u16, text: &str, headers: &reqwest::header::HeaderMap) -> ImagegenError {
    let text = sanitize_error_message(text);
    if status == 404 {
        return ImagegenError::Api {
            status,
            message: "Model not found. Verify the model name is correct.".into(),
        };
    }
    if status == 429 {
        let retry_after = parse_retry_after(headers).map(std::time::Duration::from_secs);
        return ImagegenError::RateLimited { retry_after };
    }
    if status == 401 || status == 403 {
        return ImagegenError::Auth(text);
    }
    let lower = text.to_lowercase();
    if lower.contains("safety") || lower.contains("blocked") || lower.contains("prohibited") {
        return ImagegenError::ContentBlocked(text);
    }
    ImagegenError::Api {
        status,
        message: text,
    }
}

#[async_trait]
impl ImageService for GeminiProvider {
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResponse> {
        self.generate_impl(request).await
    }

    fn name(&self) -> &str {
        "Gemini (Google)"
    }
}

// Request/Response types
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    generation_config: GeminiConfig,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    role: &'static str,
    parts: Vec<GeminiRequestPart>,
}

/// A part in a Gemini request - can be text or inline image data.
#[derive(Debug, Serialize)]
#[serde(untagged)]
enum GeminiRequestPart {
    Text {
        text: String,
    },
    #[serde(rename_all = "camelCase")]
    InlineData {
        inline_data: GeminiInlineData,
    },
}

impl GeminiRequestPart {
    fn image(image: &ImageData) -> Self {
        Self::InlineData {
            inline_data: GeminiInlineData {
                mime_type: image.format().mime_type().to_string(),
                data: image.to_base64(),
            },
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiInlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiConfig {
    response_modalities: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_config: Option<GeminiImageConfig>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiImageConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    aspect_ratio: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_size: Option<&'static str>,
}

impl GeminiImageConfig {
    fn from_config(config: &GenerationConfig) -> Option<Self> {
        if config.aspect_ratio.is_none() && config.resolution.is_none() {
            return None;
        }
        Some(Self {
            aspect_ratio: config.aspect_ratio.map(|r| r.as_str()),
            image_size: config.resolution.map(|r| r.as_str()),
        })
    }
}

impl GeminiContent {
    fn from_turn(turn: &Turn) -> Self {
        let mut parts = Vec::new();
        if let Some(ref image) = turn.image {
            parts.push(GeminiRequestPart::image(image));
        }
        if let Some(ref text) = turn.text {
            parts.push(GeminiRequestPart::Text { text: text.clone() });
        }
        Self {
            role: turn.role.as_str(),
            parts,
        }
    }
}

impl GeminiRequest {
    fn from_generation_request(req: &GenerationRequest) -> Self {
        let mut contents: Vec<GeminiContent> = req
            .history
            .iter()
            .map(GeminiContent::from_turn)
            .filter(|c| !c.parts.is_empty())
            .collect();

        // Reference images go ahead of the instruction
        let mut parts: Vec<GeminiRequestPart> =
            req.images.iter().map(GeminiRequestPart::image).collect();
        parts.push(GeminiRequestPart::Text {
            text: req.instruction.clone(),
        });
        contents.push(GeminiContent {
            role: "user",
            parts,
        });

        Self {
            contents,
            generation_config: GeminiConfig {
                response_modalities: vec!["TEXT".to_string(), "IMAGE".to_string()],
                image_config: GeminiImageConfig::from_config(&req.config),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiContentResponse>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
    #[serde(default)]
    block_reason_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiContentResponse {
    #[serde(default)]
    parts: Vec<GeminiPartResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPartResponse {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    inline_data: Option<InlineData>,
    #[serde(default)]
    thought: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

impl GeminiResponse {
    fn into_generation_response(self) -> Result<GenerationResponse> {
        // Blocked prompts come back as HTTP 200 with prompt_feedback set
        if let Some(ref feedback) = self.prompt_feedback {
            if let Some(ref reason) = feedback.block_reason {
                let msg = feedback
                    .block_reason_message
                    .clone()
                    .unwrap_or_else(|| format!("Prompt blocked: {}", reason));
                return Err(ImagegenError::ContentBlocked(msg));
            }
        }

        let candidate = self.candidates.into_iter().next().ok_or_else(|| {
            ImagegenError::UnexpectedResponse("No candidates in Gemini response".into())
        })?;

        if let Some(ref finish_reason) = candidate.finish_reason {
            match finish_reason.as_str() {
                "SAFETY"
                | "IMAGE_SAFETY"
                | "IMAGE_PROHIBITED_CONTENT"
                | "IMAGE_RECITATION"
                | "RECITATION"
                | "PROHIBITED_CONTENT"
                | "BLOCKLIST" => {
                    return Err(ImagegenError::ContentBlocked(format!(
                        "Content blocked by Gemini safety filter: {}",
                        finish_reason
                    )));
                }
                _ => {} // STOP, MAX_TOKENS, NO_IMAGE etc.
            }
        }

        let mut texts = Vec::new();
        let mut image = None;
        for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
            if part.thought {
                continue;
            }
            if let Some(text) = part.text {
                if !text.trim().is_empty() {
                    texts.push(text);
                }
            }
            // Only the first image counts
            if image.is_none() {
                if let Some(inline) = part.inline_data {
                    image = Some(decode_inline_image(&inline)?);
                }
            }
        }

        Ok(GenerationResponse {
            image,
            text: (!texts.is_empty()).then(|| texts.join("\n")),
        })
    }
}

fn decode_inline_image(inline: &InlineData) -> Result<ImageData> {
    let data = base64::engine::general_purpose::STANDARD
        .decode(&inline.data)
        .map_err(|e| ImagegenError::Decode(e.to_string()))?;
    let image = ImageData::from_bytes(data)?;
    if let Some(claimed) = ImageFormat::from_mime_type(&inline.mime_type) {
        if claimed != image.format() {
            tracing::debug!(
                claimed = inline.mime_type.as_str(),
                detected = image.format().mime_type(),
                "Gemini mime type does not match image bytes"
            );
        }
    }
    Ok(image)
}
