//! Upload filtering and decoding.
//!
//! Mirrors what a single-file image picker enforces: one file, and only
//! png/jpg/jpeg/webp by extension. File contents are not inspected; a corrupt
//! image is passed through and any failure surfaces from the remote call.

use crate::error::{GenEditError, Result};
use crate::image::{DataUrl, ImageFormat};
use std::path::{Path, PathBuf};

/// Extensions accepted by the upload filter.
pub const ACCEPTED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp"];

/// A file read into memory, ready to load into a session.
#[derive(Debug, Clone)]
pub struct Upload {
    /// File name as picked, without directories.
    pub file_name: String,
    /// File contents tagged with the MIME type implied by the extension.
    pub image: DataUrl,
}

/// Picks the single acceptable file out of a selection.
///
/// Rejects empty and multi-file selections as well as unsupported types.
pub fn select_single(paths: &[PathBuf]) -> Result<&Path> {
    match paths {
        [] => Err(GenEditError::Unsupported("no file selected".into())),
        [path] => {
            accepted_format(path)?;
            Ok(path.as_path())
        }
        _ => Err(GenEditError::Unsupported(format!(
            "expected a single file, got {}",
            paths.len()
        ))),
    }
}

/// Returns the image format implied by the path's extension.
pub fn accepted_format(path: &Path) -> Result<ImageFormat> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .and_then(ImageFormat::from_extension)
        .ok_or_else(|| {
            GenEditError::Unsupported(format!(
                "{} is not one of: {}",
                path.display(),
                ACCEPTED_EXTENSIONS.join(", ")
            ))
        })
}

/// Reads an accepted image file into memory.
pub async fn read_upload(path: &Path) -> Result<Upload> {
    let format = accepted_format(path)?;

    let data = tokio::fs::read(path)
        .await
        .map_err(|e| GenEditError::Decode(format!("{}: {e}", path.display())))?;

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    tracing::debug!(file = %file_name, size = data.len(), mime_type = format.mime_type(), "read upload");

    Ok(Upload {
        file_name,
        image: DataUrl::new(format.mime_type(), data),
    })
}
