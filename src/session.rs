//! Editing session state machine.
//!
//! A [`Session`] holds one original image, at most one edited image, the
//! instruction text, a loading flag and the last error. Views are derived from
//! those fields through [`Session::state`]:
//!
//! ```text
//! Empty --upload--> Loaded --submit--> Processing --ok--> Result
//!                     ^                    |
//!                     |                    +--fail--> Error --submit--> Processing
//!                     +------ upload (from any state)
//! reset (from any state) --> Empty
//! ```
//!
//! Only one edit may be in flight. Every reset or upload starts a new epoch,
//! and a completion from an older epoch is dropped instead of applied.

use crate::error::{GenEditError, Result};
use crate::image::{DataUrl, ImageEditor};
use crate::upload;
use serde::Serialize;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Instruction used until the user changes it, and again after a reset.
pub const DEFAULT_PROMPT: &str = "Remove the watermark from this image";

/// File name offered for downloads, whatever the returned MIME type.
pub const DEFAULT_DOWNLOAD_NAME: &str = "edited-image.png";

/// Which view a session is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// No image loaded.
    Empty,
    /// Original image loaded, ready to submit.
    Loaded,
    /// An edit request is in flight.
    Processing,
    /// Edited image available next to the original.
    Result,
    /// Last submission failed; the original is still loaded.
    Error,
}

/// Point-in-time copy of a session, for display or JSON output.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    /// Derived view.
    pub state: SessionState,
    /// Original image as a data URL.
    pub original: Option<String>,
    /// Edited image as a data URL.
    pub edited: Option<String>,
    /// Last error message.
    pub error: Option<String>,
    /// Current instruction.
    pub prompt: String,
    /// Whether an edit is in flight.
    pub loading: bool,
}

/// Original and edited images, side by side.
#[derive(Debug, Clone)]
pub struct ResultView {
    /// Original image as a data URL.
    pub original: String,
    /// Edited image returned by the editor.
    pub edited: DataUrl,
}

#[derive(Debug)]
struct Inner {
    original: Option<String>,
    edited: Option<DataUrl>,
    loading: bool,
    error: Option<String>,
    prompt: String,
    epoch: u64,
}

impl Inner {
    fn new() -> Self {
        Self {
            original: None,
            edited: None,
            loading: false,
            error: None,
            prompt: DEFAULT_PROMPT.to_string(),
            epoch: 0,
        }
    }

    fn state(&self) -> SessionState {
        if self.original.is_none() {
            SessionState::Empty
        } else if self.loading {
            SessionState::Processing
        } else if self.edited.is_some() {
            SessionState::Result
        } else if self.error.is_some() {
            SessionState::Error
        } else {
            SessionState::Loaded
        }
    }

    /// Orphans any in-flight edit.
    fn next_epoch(&mut self) {
        self.epoch = self.epoch.wrapping_add(1);
        self.loading = false;
    }
}

/// One user's editing session.
///
/// All methods take `&self`; share it across tasks with `Arc<Session>`.
pub struct Session {
    editor: Arc<dyn ImageEditor>,
    inner: Mutex<Inner>,
}

impl Session {
    /// Creates an empty session that edits through `editor`.
    pub fn new(editor: Arc<dyn ImageEditor>) -> Self {
        Self {
            editor,
            inner: Mutex::new(Inner::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Name of the editor backing this session.
    pub fn editor_name(&self) -> &str {
        self.editor.name()
    }

    /// Reads an image file and makes it the original image.
    ///
    /// On failure the session is left as it was.
    pub async fn upload_image(&self, path: &Path) -> Result<()> {
        let upload = upload::read_upload(path).await.inspect_err(|e| {
            tracing::warn!(path = %path.display(), "upload rejected: {e}");
        })?;
        self.load_image(&upload.image);
        Ok(())
    }

    /// Makes `image` the original image.
    pub fn load_image(&self, image: &DataUrl) {
        self.load_data_url(image.to_string());
    }

    /// Makes a data URL string the original image.
    ///
    /// The string is stored as given and only parsed when an edit is submitted.
    pub fn load_data_url(&self, data_url: impl Into<String>) {
        let mut inner = self.lock();
        inner.next_epoch();
        inner.original = Some(data_url.into());
        inner.edited = None;
        inner.error = None;
    }

    /// Replaces the instruction text.
    pub fn set_prompt(&self, prompt: impl Into<String>) {
        self.lock().prompt = prompt.into();
    }

    /// Current instruction text.
    pub fn prompt(&self) -> String {
        self.lock().prompt.clone()
    }

    /// Sets the instruction and submits an edit.
    pub async fn submit_edit_with(&self, prompt: impl Into<String>) -> Result<DataUrl> {
        self.set_prompt(prompt);
        self.submit_edit().await
    }

    /// Sends the original image and current instruction to the editor.
    ///
    /// Fails without touching the session when no image is loaded or an edit
    /// is already in flight. A malformed original fails with
    /// [`GenEditError::Format`] before the editor is called. Otherwise the
    /// outcome is recorded: the edited image on success, the error message on
    /// failure. If the session was reset or reloaded in the meantime the
    /// outcome is dropped and [`GenEditError::Superseded`] returned.
    pub async fn submit_edit(&self) -> Result<DataUrl> {
        let (image, prompt, epoch) = {
            let mut inner = self.lock();
            let Some(original) = inner.original.as_deref() else {
                return Err(GenEditError::NoImageLoaded);
            };
            if inner.loading {
                return Err(GenEditError::Busy);
            }
            let image = match DataUrl::parse(original) {
                Ok(image) => image,
                Err(e) => {
                    inner.error = Some(e.to_string());
                    inner.edited = None;
                    return Err(e);
                }
            };
            inner.loading = true;
            inner.error = None;
            inner.edited = None;
            (image, inner.prompt.clone(), inner.epoch)
        };

        tracing::info!(
            editor = self.editor.name(),
            mime_type = %image.mime_type,
            size = image.size(),
            "submitting edit"
        );

        let guard = LoadingGuard {
            session: self,
            epoch,
        };
        let outcome = self.editor.edit(&image, &prompt).await;
        let applied = self.complete(epoch, outcome);
        drop(guard);
        applied
    }

    fn complete(&self, epoch: u64, outcome: Result<DataUrl>) -> Result<DataUrl> {
        let mut inner = self.lock();
        if inner.epoch != epoch || !inner.loading {
            tracing::warn!(
                epoch,
                current_epoch = inner.epoch,
                "discarding edit result: session changed while request was in flight"
            );
            return Err(GenEditError::Superseded);
        }

        inner.loading = false;
        match outcome {
            Ok(image) => {
                tracing::info!(mime_type = %image.mime_type, size = image.size(), "edit complete");
                inner.edited = Some(image.clone());
                Ok(image)
            }
            Err(e) => {
                tracing::warn!(kind = ?e.kind(), "edit failed: {e}");
                inner.error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Drops both images and the error, and restores the default prompt.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.next_epoch();
        inner.original = None;
        inner.edited = None;
        inner.error = None;
        inner.prompt = DEFAULT_PROMPT.to_string();
    }

    /// Current view.
    pub fn state(&self) -> SessionState {
        self.lock().state()
    }

    /// Whether an edit is in flight.
    pub fn is_loading(&self) -> bool {
        self.lock().loading
    }

    /// Original image as a data URL.
    pub fn original(&self) -> Option<String> {
        self.lock().original.clone()
    }

    /// Edited image, if the last edit succeeded.
    pub fn edited(&self) -> Option<DataUrl> {
        self.lock().edited.clone()
    }

    /// Last error message.
    pub fn error(&self) -> Option<String> {
        self.lock().error.clone()
    }

    /// Copies every field at once.
    pub fn snapshot(&self) -> SessionSnapshot {
        let inner = self.lock();
        SessionSnapshot {
            state: inner.state(),
            original: inner.original.clone(),
            edited: inner.edited.as_ref().map(DataUrl::to_string),
            error: inner.error.clone(),
            prompt: inner.prompt.clone(),
            loading: inner.loading,
        }
    }

    /// Both images, only in the [`SessionState::Result`] view.
    pub fn result_view(&self) -> Option<ResultView> {
        let inner = self.lock();
        if inner.state() != SessionState::Result {
            return None;
        }
        Some(ResultView {
            original: inner.original.clone()?,
            edited: inner.edited.clone()?,
        })
    }

    /// Writes the edited image's bytes to `path`.
    ///
    /// No conversion happens; the bytes are saved in whatever format the
    /// editor returned.
    pub async fn download(&self, path: impl AsRef<Path>) -> Result<()> {
        let edited = self.edited().ok_or(GenEditError::NoResult)?;
        edited.save(path.as_ref()).await?;
        tracing::info!(path = %path.as_ref().display(), size = edited.size(), "saved edited image");
        Ok(())
    }
}

/// Clears the loading flag if a submission is abandoned mid-flight.
struct LoadingGuard<'a> {
    session: &'a Session,
    epoch: u64,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        let mut inner = self.session.lock();
        if inner.epoch == self.epoch {
            inner.loading = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    const RED_PNG: &str = "data:image/png;base64,AAAA";
    const EDITED_PNG: &str = "data:image/png;base64,BBBB";

    enum Reply {
        Image(&'static str),
        NoImage,
        Transport,
    }

    struct StubEditor {
        reply: Mutex<Reply>,
        calls: AtomicUsize,
        seen_prompt: Mutex<Option<String>>,
    }

    impl StubEditor {
        fn new(reply: Reply) -> Arc<Self> {
            Arc::new(Self {
                reply: Mutex::new(reply),
                calls: AtomicUsize::new(0),
                seen_prompt: Mutex::new(None),
            })
        }

        fn set_reply(&self, reply: Reply) {
            *self.reply.lock().unwrap() = reply;
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ImageEditor for StubEditor {
        async fn edit(&self, _image: &DataUrl, prompt: &str) -> Result<DataUrl> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.seen_prompt.lock().unwrap() = Some(prompt.to_string());
            match *self.reply.lock().unwrap() {
                Reply::Image(url) => DataUrl::parse(url),
                Reply::NoImage => Err(GenEditError::NoImage { detail: None }),
                Reply::Transport => Err(GenEditError::Api {
                    status: 502,
                    message: "upstream connect error".into(),
                }),
            }
        }

        fn name(&self) -> &str {
            "stub"
        }

        async fn health_check(&self) -> Result<()> {
            Ok(())
        }
    }

    /// Blocks each edit until released, so tests can act mid-flight.
    struct GatedEditor {
        started: Notify,
        release: Notify,
    }

    impl GatedEditor {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                started: Notify::new(),
                release: Notify::new(),
            })
        }
    }

    #[async_trait]
    impl ImageEditor for GatedEditor {
        async fn edit(&self, _image: &DataUrl, _prompt: &str) -> Result<DataUrl> {
            self.started.notify_one();
            self.release.notified().await;
            DataUrl::parse(EDITED_PNG)
        }

        fn name(&self) -> &str {
            "gated"
        }

        async fn health_check(&self) -> Result<()> {
            Ok(())
        }
    }

    fn loaded_session(editor: Arc<dyn ImageEditor>) -> Session {
        let session = Session::new(editor);
        session.load_data_url(RED_PNG);
        session
    }

    #[test]
    fn test_new_session_is_empty() {
        let session = Session::new(StubEditor::new(Reply::NoImage));
        assert_eq!(session.state(), SessionState::Empty);
        assert_eq!(session.prompt(), DEFAULT_PROMPT);
        assert!(!session.is_loading());
        assert!(session.result_view().is_none());
    }

    #[test]
    fn test_upload_then_reset() {
        let session = loaded_session(StubEditor::new(Reply::NoImage));
        session.set_prompt("remove the logo");
        assert_eq!(session.state(), SessionState::Loaded);

        session.reset();

        let snapshot = session.snapshot();
        assert_eq!(snapshot.state, SessionState::Empty);
        assert!(snapshot.original.is_none());
        assert!(snapshot.edited.is_none());
        assert!(snapshot.error.is_none());
        assert_eq!(snapshot.prompt, DEFAULT_PROMPT);
    }

    #[tokio::test]
    async fn test_upload_image_file_then_reset() {
        let path = std::env::temp_dir().join(format!("genedit-session-{}.png", std::process::id()));
        tokio::fs::write(&path, b"\x89PNG\r\n\x1a\n").await.unwrap();

        let session = Session::new(StubEditor::new(Reply::NoImage));
        session.upload_image(&path).await.unwrap();
        tokio::fs::remove_file(&path).await.unwrap();

        assert_eq!(session.state(), SessionState::Loaded);
        assert_eq!(
            session.original().as_deref(),
            Some("data:image/png;base64,iVBORw0KGgo=")
        );

        session.reset();
        assert_eq!(session.state(), SessionState::Empty);
        assert_eq!(session.prompt(), DEFAULT_PROMPT);
    }

    #[tokio::test]
    async fn test_failed_upload_leaves_session_unchanged() {
        let session = loaded_session(StubEditor::new(Reply::NoImage));

        let err = session
            .upload_image(Path::new("/definitely/not/here.png"))
            .await
            .unwrap_err();
        assert!(matches!(err, GenEditError::Decode(_)));
        assert_eq!(session.original().as_deref(), Some(RED_PNG));

        let err = session
            .upload_image(Path::new("clip.gif"))
            .await
            .unwrap_err();
        assert!(matches!(err, GenEditError::Unsupported(_)));
        assert_eq!(session.state(), SessionState::Loaded);
    }

    #[tokio::test]
    async fn test_submit_without_image_is_rejected() {
        let editor = StubEditor::new(Reply::Image(EDITED_PNG));
        let session = Session::new(editor.clone());

        let err = session.submit_edit().await.unwrap_err();
        assert!(matches!(err, GenEditError::NoImageLoaded));
        assert_eq!(editor.calls(), 0);
        assert_eq!(session.state(), SessionState::Empty);
        assert!(session.error().is_none());
        assert!(!session.is_loading());
    }

    #[tokio::test]
    async fn test_malformed_original_fails_before_editor() {
        let editor = StubEditor::new(Reply::Image(EDITED_PNG));
        let session = Session::new(editor.clone());
        session.load_data_url("not-a-data-url");

        let err = session.submit_edit().await.unwrap_err();
        assert!(matches!(err, GenEditError::Format(_)));
        assert_eq!(editor.calls(), 0);
        assert_eq!(session.state(), SessionState::Error);
        assert!(session.error().unwrap().starts_with("invalid image format"));
        assert!(!session.is_loading());
    }

    #[tokio::test]
    async fn test_end_to_end_edit() {
        let editor = StubEditor::new(Reply::Image(EDITED_PNG));
        let session = loaded_session(editor.clone());

        let edited = session.submit_edit_with("remove watermark").await.unwrap();

        assert_eq!(edited.to_string(), EDITED_PNG);
        assert_eq!(session.state(), SessionState::Result);
        assert_eq!(
            session.edited().map(|e| e.to_string()).as_deref(),
            Some(EDITED_PNG)
        );
        assert!(!session.is_loading());
        assert_eq!(
            editor.seen_prompt.lock().unwrap().as_deref(),
            Some("remove watermark")
        );

        let view = session.result_view().unwrap();
        assert_eq!(view.original, RED_PNG);
        assert_eq!(view.edited.to_string(), EDITED_PNG);
    }

    #[tokio::test]
    async fn test_no_image_reply_ends_in_error() {
        let session = loaded_session(StubEditor::new(Reply::NoImage));

        let err = session.submit_edit().await.unwrap_err();

        assert!(matches!(err, GenEditError::NoImage { .. }));
        assert_eq!(session.state(), SessionState::Error);
        assert!(session.error().unwrap().contains("no image produced"));
        assert!(!session.is_loading());
        assert!(session.edited().is_none());
    }

    #[tokio::test]
    async fn test_transport_error_ends_in_error() {
        let session = loaded_session(StubEditor::new(Reply::Transport));

        let err = session.submit_edit().await.unwrap_err();
        let message = err.to_string();

        assert_eq!(session.state(), SessionState::Error);
        assert_eq!(session.error(), Some(message));
        assert!(!session.is_loading());
        assert!(session.edited().is_none());
    }

    #[tokio::test]
    async fn test_failure_after_result_clears_edited() {
        let editor = StubEditor::new(Reply::Image(EDITED_PNG));
        let session = loaded_session(editor.clone());
        session.submit_edit().await.unwrap();
        assert_eq!(session.state(), SessionState::Result);

        editor.set_reply(Reply::Transport);
        let err = session.submit_edit().await.unwrap_err();

        assert_eq!(session.state(), SessionState::Error);
        assert_eq!(session.error(), Some(err.to_string()));
        assert!(session.edited().is_none());
        assert!(!session.is_loading());
        assert_eq!(session.original().unwrap().to_string(), RED_PNG);
    }

    #[tokio::test]
    async fn test_retry_after_error_clears_it() {
        let editor = StubEditor::new(Reply::Transport);
        let session = loaded_session(editor.clone());
        session.submit_edit().await.unwrap_err();
        assert_eq!(session.state(), SessionState::Error);

        editor.set_reply(Reply::Image(EDITED_PNG));
        session.submit_edit().await.unwrap();

        assert_eq!(editor.calls(), 2);
        assert!(session.error().is_none());
        assert_eq!(session.state(), SessionState::Result);
    }

    #[tokio::test]
    async fn test_second_submit_while_loading_is_busy() {
        let editor = GatedEditor::new();
        let session = Arc::new(loaded_session(editor.clone()));

        let task = tokio::spawn({
            let session = session.clone();
            async move { session.submit_edit().await }
        });
        editor.started.notified().await;
        assert_eq!(session.state(), SessionState::Processing);

        let err = session.submit_edit().await.unwrap_err();
        assert!(matches!(err, GenEditError::Busy));

        editor.release.notify_one();
        task.await.unwrap().unwrap();
        assert_eq!(session.state(), SessionState::Result);
    }

    #[tokio::test]
    async fn test_reset_during_flight_discards_result() {
        let editor = GatedEditor::new();
        let session = Arc::new(loaded_session(editor.clone()));

        let task = tokio::spawn({
            let session = session.clone();
            async move { session.submit_edit().await }
        });
        editor.started.notified().await;

        session.reset();
        editor.release.notify_one();

        let outcome = task.await.unwrap();
        assert!(matches!(outcome, Err(GenEditError::Superseded)));
        assert_eq!(session.state(), SessionState::Empty);
        assert!(session.original().is_none());
        assert!(session.edited().is_none());
        assert!(!session.is_loading());
    }

    #[tokio::test]
    async fn test_new_upload_during_flight_discards_result() {
        let editor = GatedEditor::new();
        let session = Arc::new(loaded_session(editor.clone()));

        let task = tokio::spawn({
            let session = session.clone();
            async move { session.submit_edit().await }
        });
        editor.started.notified().await;

        session.load_data_url("data:image/jpeg;base64,/9j/4AAQ");
        editor.release.notify_one();

        assert!(matches!(
            task.await.unwrap(),
            Err(GenEditError::Superseded)
        ));
        assert_eq!(session.state(), SessionState::Loaded);
        assert_eq!(
            session.original().as_deref(),
            Some("data:image/jpeg;base64,/9j/4AAQ")
        );
        assert!(session.edited().is_none());
    }

    #[tokio::test]
    async fn test_abandoned_submit_clears_loading() {
        let editor = GatedEditor::new();
        let session = Arc::new(loaded_session(editor.clone()));

        let task = tokio::spawn({
            let session = session.clone();
            async move { session.submit_edit().await }
        });
        editor.started.notified().await;
        assert!(session.is_loading());

        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());

        assert!(!session.is_loading());
        assert_eq!(session.state(), SessionState::Loaded);
    }

    #[tokio::test]
    async fn test_download_writes_edited_bytes() {
        let session = loaded_session(StubEditor::new(Reply::Image(EDITED_PNG)));
        let path = std::env::temp_dir().join(format!(
            "genedit-{}-{DEFAULT_DOWNLOAD_NAME}",
            std::process::id()
        ));

        let err = session.download(&path).await.unwrap_err();
        assert!(matches!(err, GenEditError::NoResult));

        session.submit_edit().await.unwrap();
        session.download(&path).await.unwrap();

        let written = tokio::fs::read(&path).await.unwrap();
        tokio::fs::remove_file(&path).await.unwrap();
        assert_eq!(written, vec![0x04, 0x10, 0x41]);
    }
}
