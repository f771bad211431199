//! Image editor trait.

use crate::error::Result;
use crate::image::types::DataUrl;
use async_trait::async_trait;

/// Trait for remote image editing backends.
///
/// Implementations make a single attempt per call and hold no per-call
/// state, so one instance can be shared by every session.
#[async_trait]
pub trait ImageEditor: Send + Sync {
    /// Applies `prompt` to `image` and returns the edited image.
    async fn edit(&self, image: &DataUrl, prompt: &str) -> Result<DataUrl>;

    /// Returns the name of this editor for display.
    fn name(&self) -> &str;

    /// Checks if the backend is reachable and authenticated.
    async fn health_check(&self) -> Result<()>;
}
