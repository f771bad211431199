//! Watermark removal example - runs one edit session against an image file.
//!
//! Run with: `cargo run --example edit_image -- <input_image.png> [instruction]`
//!
//! Requires `GEMINI_API_KEY` environment variable.

use genedit::{Config, GeminiEditor, Session, DEFAULT_DOWNLOAD_NAME};
use std::sync::Arc;

#[tokio::main]
async fn main() -> genedit::Result<()> {
    let mut args = std::env::args().skip(1);
    let input_path = args
        .next()
        .expect("Usage: edit_image <input_image.png> [instruction]");

    let config = Config::from_env()?;
    let editor = GeminiEditor::from_config(&config, reqwest::Client::new())?;
    let session = Session::new(Arc::new(editor));

    session.upload_image(input_path.as_ref()).await?;
    if let Some(prompt) = args.next() {
        session.set_prompt(prompt);
    }

    match session.submit_edit().await {
        Ok(_) => {
            session.download(DEFAULT_DOWNLOAD_NAME).await?;
            println!("Edited image saved to {DEFAULT_DOWNLOAD_NAME}");
        }
        Err(e) => {
            eprintln!("Edit failed ({:?}): {e}", e.kind());
        }
    }

    Ok(())
}
