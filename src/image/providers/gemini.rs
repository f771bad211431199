//! Gemini (Google) image editing backend.

use crate::config::{self, Config, DEFAULT_BASE_URL};
use crate::error::{GenEditError, Result};
use crate::image::provider::ImageEditor;
use crate::image::types::DataUrl;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Instant;

/// Longest API error body carried into an error message.
const MAX_ERROR_MESSAGE_LEN: usize = 500;

/// Gemini image model variants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GeminiModel {
    /// Nano Banana - Gemini 2.5 Flash Image (fast, economical).
    #[default]
    NanoBanana,
    /// Nano Banana Pro - Gemini 3 Pro Image (highest quality).
    NanoBananaPro,
}

impl GeminiModel {
    /// Returns the API model identifier.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NanoBanana => "gemini-2.5-flash-image",
            Self::NanoBananaPro => "nano-banana-pro-preview",
        }
    }
}

impl FromStr for GeminiModel {
    type Err = GenEditError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "gemini-2.5-flash-image" | "nano-banana" => Ok(Self::NanoBanana),
            "nano-banana-pro-preview" | "nano-banana-pro" => Ok(Self::NanoBananaPro),
            other => Err(GenEditError::Config(format!("unknown Gemini model {other:?}"))),
        }
    }
}

/// Builder for [`GeminiEditor`].
#[derive(Debug, Clone, Default)]
pub struct GeminiEditorBuilder {
    api_key: Option<String>,
    model: GeminiModel,
    base_url: Option<String>,
    client: Option<reqwest::Client>,
}

impl GeminiEditorBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the API key. Falls back to `GEMINI_API_KEY`, then `GOOGLE_API_KEY`.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the Gemini model variant.
    pub fn model(mut self, model: GeminiModel) -> Self {
        self.model = model;
        self
    }

    /// Overrides the API endpoint.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Reuses an existing HTTP client instead of creating one.
    pub fn client(mut self, client: reqwest::Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Builds the editor, resolving the API key.
    ///
    /// Fails with [`GenEditError::Config`] when no non-empty key is available,
    /// so a missing key is reported before any request is attempted.
    pub fn build(self) -> Result<GeminiEditor> {
        let api_key = match self.api_key {
            Some(key) if !key.trim().is_empty() => key,
            Some(_) => return Err(GenEditError::Config("API key is empty".into())),
            None => config::resolve_api_key(&|key| std::env::var(key).ok())?,
        };

        Ok(GeminiEditor {
            client: self.client.unwrap_or_default(),
            api_key,
            model: self.model,
            base_url: self
                .base_url
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        })
    }
}

/// Gemini image editing client.
///
/// Holds one `reqwest::Client` for its whole lifetime; construct it once at
/// startup and share it.
pub struct GeminiEditor {
    client: reqwest::Client,
    api_key: String,
    model: GeminiModel,
    base_url: String,
}

impl GeminiEditor {
    /// Creates a new [`GeminiEditorBuilder`].
    pub fn builder() -> GeminiEditorBuilder {
        GeminiEditorBuilder::new()
    }

    /// Creates an editor from resolved configuration and a shared HTTP client.
    pub fn from_config(config: &Config, client: reqwest::Client) -> Result<Self> {
        Self::builder()
            .api_key(config.api_key.clone())
            .model(config.model)
            .base_url(config.base_url.clone())
            .client(client)
            .build()
    }

    /// Returns the model this editor targets.
    pub fn model(&self) -> GeminiModel {
        self.model
    }

    /// Edits a base64-encoded image and returns the result as a data URL string.
    pub async fn edit_image(
        &self,
        base64_payload: &str,
        mime_type: &str,
        prompt: &str,
    ) -> Result<String> {
        let image = self.edit_impl(base64_payload, mime_type, prompt).await?;
        Ok(image.to_string())
    }

    async fn edit_impl(
        &self,
        base64_payload: &str,
        mime_type: &str,
        prompt: &str,
    ) -> Result<DataUrl> {
        let start = Instant::now();
        let body = GeminiRequest::edit(base64_payload, mime_type, prompt);

        tracing::debug!(
            model = self.model.as_str(),
            mime_type,
            payload_len = base64_payload.len(),
            "submitting Gemini edit request"
        );

        let response = self.generate_content(&body).await.inspect_err(|e| {
            tracing::error!(model = self.model.as_str(), "Gemini edit request failed: {e}");
        })?;

        let image = response.into_image().inspect_err(|e| {
            tracing::error!(model = self.model.as_str(), "Gemini edit response unusable: {e}");
        })?;

        tracing::debug!(
            mime_type = %image.mime_type,
            size = image.size(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Gemini edit complete"
        );

        Ok(image)
    }

    async fn generate_content(&self, body: &GeminiRequest<'_>) -> Result<GeminiResponse> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url,
            self.model.as_str(),
        );

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(parse_error(status.as_u16(), &text));
        }

        let text = response.text().await?;
        let parsed = serde_json::from_str(&text)?;
        Ok(parsed)
    }
}

/// Turns a non-2xx response body into an API error.
fn parse_error(status: u16, text: &str) -> GenEditError {
    #[derive(Deserialize)]
    struct Envelope {
        error: ErrorBody,
    }

    #[derive(Deserialize)]
    struct ErrorBody {
        message: String,
    }

    let message = match serde_json::from_str::<Envelope>(text) {
        Ok(envelope) => envelope.error.message,
        Err(_) if text.trim().is_empty() => "empty response body".to_string(),
        Err(_) => text.trim().to_string(),
    };

    GenEditError::Api {
        status,
        message: truncate(message, MAX_ERROR_MESSAGE_LEN),
    }
}

fn truncate(mut message: String, max: usize) -> String {
    if message.len() > max {
        let mut cut = max;
        while !message.is_char_boundary(cut) {
            cut -= 1;
        }
        message.truncate(cut);
        message.push('…');
    }
    message
}

#[async_trait]
impl ImageEditor for GeminiEditor {
    async fn edit(&self, image: &DataUrl, prompt: &str) -> Result<DataUrl> {
        self.edit_impl(&image.to_base64(), &image.mime_type, prompt)
            .await
    }

    fn name(&self) -> &str {
        "Gemini (Google)"
    }

    async fn health_check(&self) -> Result<()> {
        let url = format!("{}/v1beta/models/{}", self.base_url, self.model.as_str());

        let response = self
            .client
            .get(&url)
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let text = response.text().await.unwrap_or_default();
        Err(parse_error(status.as_u16(), &text))
    }
}

/// Returns the first inline image across all candidates and their parts.
///
/// Candidates are searched in order and, within each, parts in order; the
/// first part carrying inline data wins.
fn find_first_inline_image(candidates: &[GeminiCandidate]) -> Option<&InlineData> {
    candidates
        .iter()
        .filter_map(|candidate| candidate.content.as_ref())
        .flat_map(|content| content.parts.iter())
        .find_map(|part| part.inline_data.as_ref())
}

// Request/Response types
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest<'a> {
    contents: Vec<GeminiContent<'a>>,
    generation_config: GeminiConfig,
}

#[derive(Debug, Serialize)]
struct GeminiContent<'a> {
    parts: Vec<GeminiRequestPart<'a>>,
}

/// A part in a Gemini request - can be text or inline image data.
#[derive(Debug, Serialize)]
#[serde(untagged)]
enum GeminiRequestPart<'a> {
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: GeminiInlineData<'a>,
    },
    Text {
        text: &'a str,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiInlineData<'a> {
    mime_type: &'a str,
    data: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiConfig {
    response_modalities: Vec<&'static str>,
}

impl<'a> GeminiRequest<'a> {
    /// Image first, then the instruction.
    fn edit(base64_payload: &'a str, mime_type: &'a str, prompt: &'a str) -> Self {
        Self {
            contents: vec![GeminiContent {
                parts: vec![
                    GeminiRequestPart::InlineData {
                        inline_data: GeminiInlineData {
                            mime_type,
                            data: base64_payload,
                        },
                    },
                    GeminiRequestPart::Text { text: prompt },
                ],
            }],
            generation_config: GeminiConfig {
                response_modalities: vec!["TEXT", "IMAGE"],
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
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

impl GeminiResponse {
    fn into_image(self) -> Result<DataUrl> {
        match find_first_inline_image(&self.candidates) {
            Some(inline) => DataUrl::from_base64(&inline.mime_type, &inline.data)
                .map_err(|e| GenEditError::UnexpectedResponse(e.to_string())),
            None => Err(GenEditError::NoImage {
                detail: self.no_image_detail(),
            }),
        }
    }

    /// Best explanation for an image-less reply: block message, model text,
    /// then finish reason.
    fn no_image_detail(&self) -> Option<String> {
        if let Some(feedback) = &self.prompt_feedback {
            if let Some(reason) = &feedback.block_reason {
                return Some(
                    feedback
                        .block_reason_message
                        .clone()
                        .unwrap_or_else(|| format!("prompt blocked: {reason}")),
                );
            }
        }

        let text = self
            .candidates
            .iter()
            .filter_map(|c| c.content.as_ref())
            .flat_map(|c| c.parts.iter())
            .filter_map(|p| p.text.as_deref())
            .map(str::trim)
            .find(|t| !t.is_empty());
        if let Some(text) = text {
            return Some(text.to_string());
        }

        self.candidates
            .iter()
            .filter_map(|c| c.finish_reason.as_deref())
            .find(|reason| *reason != "STOP")
            .map(|reason| format!("finish reason {reason}"))
    }
}
