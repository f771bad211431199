#![warn(missing_docs)]
//! GenEdit - instruction-driven image editing through a generative image API.
//!
//! Load an image, describe the change ("Remove the watermark from this
//! image" by default) and get the edited image back from Gemini.
//!
//! # Quick Start
//!
//! ```no_run
//! use genedit::{Config, GeminiEditor, Session};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> genedit::Result<()> {
//!     let config = Config::from_env()?;
//!     let editor = GeminiEditor::from_config(&config, reqwest::Client::new())?;
//!     let session = Session::new(Arc::new(editor));
//!
//!     session.upload_image("photo.png".as_ref()).await?;
//!     session.submit_edit().await?;
//!     session.download("edited-image.png").await?;
//!     Ok(())
//! }
//! ```
//!
//! # Layout
//!
//! - [`image`]: the [`DataUrl`] image type and the [`ImageEditor`] backends
//! - [`session`]: the upload/submit/reset state machine
//! - [`upload`]: single-file, extension-based upload filter
//! - [`config`]: environment-driven settings

pub mod config;
mod error;
pub mod image;
pub mod session;
pub mod upload;

// Re-export error types at crate root
pub use error::{ErrorKind, GenEditError, Result};

pub use config::Config;
pub use image::providers::{GeminiEditor, GeminiEditorBuilder, GeminiModel};
pub use image::{DataUrl, ImageEditor, ImageFormat};
pub use session::{
    ResultView, Session, SessionSnapshot, SessionState, DEFAULT_DOWNLOAD_NAME, DEFAULT_PROMPT,
};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{GenEditError, Result};
    pub use crate::image::providers::GeminiEditor;
    pub use crate::image::{DataUrl, ImageEditor};
    pub use crate::session::{Session, SessionState};
}
