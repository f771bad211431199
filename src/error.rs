//! Error types for image editing sessions.

/// Errors that can occur while loading, editing or saving an image.
#[derive(Debug, thiserror::Error)]
pub enum GenEditError {
    /// API key missing or otherwise unusable configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Held image is not a well-formed `data:<mime>;base64,<payload>` URL.
    #[error("invalid image format: {0}")]
    Format(String),

    /// Uploaded file could not be read into an image.
    #[error("failed to decode upload: {0}")]
    Decode(String),

    /// File type rejected by the upload filter.
    #[error("unsupported upload: {0}")]
    Unsupported(String),

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error message extracted from the response body.
        message: String,
    },

    /// Network or HTTP error.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Response was well-formed JSON but unusable (e.g. bad base64 image data).
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    /// The remote call succeeded but no candidate carried an inline image.
    #[error("no image produced in response{}", detail_suffix(.detail))]
    NoImage {
        /// Model text, block reason or finish reason, when the response had one.
        detail: Option<String>,
    },

    /// An edit was submitted with no original image in the session.
    #[error("no image loaded")]
    NoImageLoaded,

    /// Download requested before an edited image exists.
    #[error("no edited image to save")]
    NoResult,

    /// An edit is already in flight for this session.
    #[error("an edit is already in progress")]
    Busy,

    /// The session was reset or reloaded while the edit was in flight.
    #[error("edit result discarded: session changed while request was in flight")]
    Superseded,

    /// I/O error (e.g., saving file).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn detail_suffix(detail: &Option<String>) -> String {
    detail.as_deref().map(|d| format!(": {d}")).unwrap_or_default()
}

/// Coarse classification of [`GenEditError`] for user-facing handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing API key or bad settings; needs operator action.
    Configuration,
    /// Held image is malformed; recoverable by re-uploading.
    Format,
    /// Local file rejected by the filter, unreadable or unwritable.
    Decode,
    /// Transport or API failure; recoverable by retrying.
    Remote,
    /// Remote call succeeded without an image; adjust the prompt and retry.
    NoImage,
    /// Misuse of the session state machine.
    Session,
}

impl GenEditError {
    /// Returns the coarse kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) => ErrorKind::Configuration,
            Self::Format(_) => ErrorKind::Format,
            Self::Decode(_) | Self::Unsupported(_) | Self::Io(_) => ErrorKind::Decode,
            Self::Api { .. } | Self::Network(_) | Self::Json(_) | Self::UnexpectedResponse(_) => {
                ErrorKind::Remote
            }
            Self::NoImage { .. } => ErrorKind::NoImage,
            Self::NoImageLoaded | Self::NoResult | Self::Busy | Self::Superseded => {
                ErrorKind::Session
            }
        }
    }

    /// Returns true if resubmitting the same edit may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Remote | ErrorKind::NoImage)
    }
}

/// Result type alias for image editing operations.
pub type Result<T> = std::result::Result<T, GenEditError>;
