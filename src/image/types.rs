//! Core types for image editing.

use crate::error::{GenEditError, Result};
use base64::Engine;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Image formats accepted for upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    /// PNG format (lossless).
    Png,
    /// JPEG format (lossy).
    Jpeg,
    /// WebP format (modern, efficient).
    WebP,
}

impl ImageFormat {
    /// Returns the MIME type for this format.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::WebP => "image/webp",
        }
    }

    /// Attempts to detect format from file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "webp" => Some(Self::WebP),
            _ => None,
        }
    }

    /// Maps a MIME type onto a known format.
    pub fn from_mime_type(mime: &str) -> Option<Self> {
        match mime.to_lowercase().as_str() {
            "image/png" => Some(Self::Png),
            "image/jpeg" | "image/jpg" => Some(Self::Jpeg),
            "image/webp" => Some(Self::WebP),
            _ => None,
        }
    }
}

/// An in-memory image: a MIME type tagged onto its raw bytes.
///
/// The string form `data:<mime>;base64,<payload>` only exists at the edges
/// (uploads, the remote API and display). Parsing is strict: the prefix, the
/// `;base64,` separator, a non-empty MIME type and a canonical base64 payload
/// are all required.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUrl {
    /// MIME type as declared (not sniffed).
    pub mime_type: String,
    /// Decoded image bytes.
    pub data: Vec<u8>,
}

impl DataUrl {
    /// Creates an image from a MIME type and raw bytes.
    pub fn new(mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data,
        }
    }

    /// Creates an image from a MIME type and a base64 payload.
    pub fn from_base64(mime_type: &str, payload: &str) -> Result<Self> {
        if mime_type.is_empty() || mime_type.contains(char::is_whitespace) {
            return Err(GenEditError::Format(format!(
                "invalid MIME type {mime_type:?}"
            )));
        }
        if payload.is_empty() {
            return Err(GenEditError::Format("empty base64 payload".into()));
        }
        let data = base64::engine::general_purpose::STANDARD
            .decode(payload)
            .map_err(|e| GenEditError::Format(format!("invalid base64 payload: {e}")))?;
        Ok(Self::new(mime_type, data))
    }

    /// Parses a `data:<mime>;base64,<payload>` string.
    pub fn parse(input: &str) -> Result<Self> {
        let rest = input
            .strip_prefix("data:")
            .ok_or_else(|| GenEditError::Format("missing `data:` prefix".into()))?;
        let (mime_type, payload) = rest
            .rsplit_once(";base64,")
            .ok_or_else(|| GenEditError::Format("missing `;base64,` separator".into()))?;
        Self::from_base64(mime_type, payload)
    }

    /// Returns the known format for this image's MIME type, if any.
    pub fn format(&self) -> Option<ImageFormat> {
        ImageFormat::from_mime_type(&self.mime_type)
    }

    /// Returns the size of the image data in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Encodes the image data as base64.
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.data)
    }

    /// Saves the raw image bytes to the specified path.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        tokio::fs::write(path, &self.data).await?;
        Ok(())
    }
}

impl fmt::Display for DataUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "data:{};base64,{}", self.mime_type, self.to_base64())
    }
}

impl FromStr for DataUrl {
    type Err = GenEditError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
