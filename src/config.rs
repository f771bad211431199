//! Process configuration, resolved once at startup.

use crate::error::{GenEditError, Result};
use crate::image::providers::GeminiModel;
use std::fmt;

/// Primary environment variable holding the API key.
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";
/// Checked when [`API_KEY_ENV`] is unset.
pub const FALLBACK_API_KEY_ENV: &str = "GOOGLE_API_KEY";
/// Optional model override.
pub const MODEL_ENV: &str = "GEMINI_MODEL";
/// Optional endpoint override (proxies, local gateways).
pub const BASE_URL_ENV: &str = "GEMINI_BASE_URL";
/// Public Gemini API endpoint.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Settings for the remote edit client.
#[derive(Clone)]
pub struct Config {
    /// API key sent with every request.
    pub api_key: String,
    /// Model used for edits.
    pub model: GeminiModel,
    /// Scheme and host of the API, without a trailing slash.
    pub base_url: String,
}

impl Config {
    /// Reads configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads configuration through an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let api_key = resolve_api_key(&lookup)?;

        let model = match non_empty(lookup(MODEL_ENV)) {
            Some(name) => name.parse()?,
            None => GeminiModel::default(),
        };

        let base_url = non_empty(lookup(BASE_URL_ENV))
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        Ok(Self {
            api_key,
            model,
            base_url,
        })
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// Resolves the API key, preferring [`API_KEY_ENV`] over [`FALLBACK_API_KEY_ENV`].
pub(crate) fn resolve_api_key(lookup: &impl Fn(&str) -> Option<String>) -> Result<String> {
    non_empty(lookup(API_KEY_ENV))
        .or_else(|| non_empty(lookup(FALLBACK_API_KEY_ENV)))
        .ok_or_else(|| {
            GenEditError::Config(format!(
                "{API_KEY_ENV} not set and no API key provided"
            ))
        })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
