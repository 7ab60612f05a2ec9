//! Session orchestration for the image-question page.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio_util::sync::CancellationToken;

use crate::config::UiConfig;
use crate::dialog::{Dialog, FileResponse, OpenDialogOptions};
use crate::events::EventBus;
use crate::surface::{Element, Surface};
use crate::{Backend, GenerationEvent, Result, StreamBridge};

/// How a call to [`UiController::submit`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Prompt or image missing; nothing was invoked.
    Skipped,
    /// The terminal event arrived.
    Finished,
    /// The stream ended without a terminal event.
    Completed,
    /// Stopped by the user or an abort handle.
    Aborted,
    /// An error was shown in the error element.
    Failed,
}

/// Abort signal of one session.
///
/// Remembers whether the backend stop command was already sent so a stop
/// reaches the backend exactly once.
#[derive(Clone, Default)]
pub struct StopSignal {
    token: CancellationToken,
    stop_sent: Arc<AtomicBool>,
}

impl StopSignal {
    /// Raise the signal; the read loop will send the stop command.
    pub fn raise(&self) {
        self.token.cancel();
    }

    /// Raise the signal after the stop command has been sent.
    pub fn raise_after_stop(&self) {
        self.stop_sent.store(true, Ordering::SeqCst);
        self.token.cancel();
    }

    pub fn is_raised(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Returns `true` for the one caller responsible for sending stop.
    fn claim_stop(&self) -> bool {
        !self.stop_sent.swap(true, Ordering::SeqCst)
    }
}

/// Cloneable handle aborting whichever session is active.
#[derive(Clone)]
pub struct AbortHandle {
    current: Arc<Mutex<StopSignal>>,
}

impl AbortHandle {
    pub fn abort(&self) {
        tracing::info!("abort requested");
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .raise();
    }
}

/// Drives the page: submissions, image picking and stopping.
///
/// One controller is built at startup with every collaborator it needs.
/// Errors never escape an operation; they are written to
/// [`Element::ErrorMessage`]. Overlapping submissions are not guarded
/// against.
pub struct UiController {
    backend: Arc<dyn Backend>,
    dialog: Arc<dyn Dialog>,
    bus: EventBus,
    surface: Arc<dyn Surface>,
    config: UiConfig,
    current: Arc<Mutex<StopSignal>>,
}

impl UiController {
    pub fn new(
        backend: Arc<dyn Backend>,
        dialog: Arc<dyn Dialog>,
        bus: EventBus,
        surface: Arc<dyn Surface>,
    ) -> Self {
        Self {
            backend,
            dialog,
            bus,
            surface,
            config: UiConfig::default(),
            current: Arc::new(Mutex::new(StopSignal::default())),
        }
    }

    pub fn config(mut self, config: UiConfig) -> Self {
        self.config = config;
        self
    }

    pub fn surface(&self) -> &Arc<dyn Surface> {
        &self.surface
    }

    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle {
            current: self.current.clone(),
        }
    }

    fn current_signal(&self) -> StopSignal {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn fresh_signal(&self) -> StopSignal {
        let signal = StopSignal::default();
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = signal.clone();
        signal
    }

    fn show_error(&self, err: &crate::Error) {
        tracing::error!(error = %err, "operation failed");
        self.surface
            .set_text(Element::ErrorMessage, &format!("Error: {err}"));
    }

    /// Handle a form submission.
    ///
    /// Runs a whole generation session when both the prompt and the image
    /// path are filled in.
    pub async fn submit(&self) -> SessionEnd {
        let prompt = self.surface.value(Element::PromptInput);
        let image = self.surface.value(Element::ImageInput);
        if prompt.is_empty() || image.is_empty() {
            tracing::debug!("prompt or image missing, ignoring submit");
            return SessionEnd::Skipped;
        }
        let signal = self.fresh_signal();
        self.surface.set_text(Element::ErrorMessage, "");
        match self.run_session(&prompt, &image, &signal).await {
            Ok(end) => {
                tracing::info!(?end, "session ended");
                end
            }
            Err(e) => {
                self.show_error(&e);
                SessionEnd::Failed
            }
        }
    }

    async fn run_session(&self, prompt: &str, image: &str, signal: &StopSignal) -> Result<SessionEnd> {
        let mut bridge = StreamBridge::listen(&self.bus, &self.config.channel)?;
        self.surface
            .set_text(Element::Response, &self.config.loading_text);
        let mut loading = true;

        tracing::info!("invoking generate");
        if let Err(e) = self.backend.generate(prompt, image).await {
            self.surface.set_text(Element::Response, "");
            return Err(e);
        }
        tracing::info!("invoked generate");

        let end = loop {
            if signal.is_raised() {
                if signal.claim_stop() {
                    self.backend.stop().await?;
                }
                break SessionEnd::Aborted;
            }
            let read = tokio::select! {
                biased;
                _ = signal.token.cancelled() => continue,
                read = bridge.read() => read,
            };
            if loading {
                self.surface.set_text(Element::Response, "");
                loading = false;
            }
            match read? {
                None => {
                    tracing::info!("stream completed, no more data");
                    break SessionEnd::Completed;
                }
                Some(GenerationEvent::Finished { generated_text, .. }) => {
                    self.surface.set_text(Element::Response, &generated_text);
                    break SessionEnd::Finished;
                }
                Some(GenerationEvent::Token(token)) if !token.special => {
                    self.surface.append_text(Element::Response, &token.text);
                }
                Some(GenerationEvent::Token(token)) => {
                    tracing::trace!(id = token.id, "skipping special token");
                }
            }
        };
        bridge.cancel();
        Ok(end)
    }

    /// Let the user pick an image, copy it into app storage and preview it.
    ///
    /// Returns the copied path. A cancelled pick changes nothing; a failed
    /// copy leaves the image input untouched and shows the error.
    pub async fn open_image(&self) -> Option<String> {
        tracing::info!("opening image");
        let options = OpenDialogOptions::images(&self.config.image_extensions);
        let picked = match self.dialog.open(options).await {
            Ok(picked) => picked,
            Err(e) => {
                self.show_error(&e);
                return None;
            }
        };
        let Some(FileResponse { path }) = picked else {
            tracing::debug!("no image selected");
            return None;
        };
        match self.backend.copy_image(&path).await {
            Ok(copied) => {
                let file_name = Path::new(&copied)
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| copied.clone());
                let src = format!("{}{}", self.config.asset_url_prefix, file_name);
                self.surface.set_src(Element::ImagePreview, &src);
                self.surface.set_value(Element::ImageInput, &copied);
                tracing::info!(%copied, "image ready");
                Some(copied)
            }
            Err(e) => {
                self.show_error(&e);
                None
            }
        }
    }

    /// Clear the response, stop the backend and end the active read loop.
    pub async fn stop(&self) {
        self.surface.set_text(Element::Response, "");
        let signal = self.current_signal();
        match self.backend.stop().await {
            Ok(()) => signal.raise_after_stop(),
            Err(e) => self.show_error(&e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{Call, ScriptedBackend, StaticDialog, token};
    use crate::MemorySurface;
    use serde_json::json;
    use std::time::Duration;
    use tracing_test::traced_test;

    const CHANNEL: &str = "text-generation";

    fn setup(backend: ScriptedBackend, dialog: StaticDialog) -> (Arc<UiController>, MemorySurface) {
        let page = MemorySurface::new();
        page.set_value(Element::PromptInput, "What is this?");
        page.set_value(Element::ImageInput, "/assets/cat.png");
        let bus = backend.bus().clone();
        let controller = UiController::new(
            Arc::new(backend),
            Arc::new(dialog),
            bus,
            Arc::new(page.clone()),
        );
        (Arc::new(controller), page)
    }

    async fn wait_for_text(page: &MemorySurface, element: Element, expected: &str) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while page.text(element) != expected {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("{:?} never became {expected:?}", element));
    }

    #[tokio::test]
    async fn terminal_text_wins() {
        let backend = ScriptedBackend::new(CHANNEL).on_generate(vec![
            Some(token(1, "Hel", false)),
            Some(token(2, "lo", false)),
            Some(json!({"generated_text": "Hello"})),
        ]);
        let calls = backend.calls();
        let (ui, page) = setup(backend, StaticDialog::cancelled());
        assert_eq!(ui.submit().await, SessionEnd::Finished);
        assert_eq!(page.text(Element::Response), "Hello");
        assert_eq!(calls.all(), [Call::Generate("What is this?".into(), "/assets/cat.png".into())]);
    }

    #[tokio::test]
    async fn special_tokens_are_not_rendered() {
        let backend = ScriptedBackend::new(CHANNEL).on_generate(vec![
            Some(token(1, "<s>", true)),
            Some(token(2, "world", false)),
            None,
        ]);
        let (ui, page) = setup(backend, StaticDialog::cancelled());
        assert_eq!(ui.submit().await, SessionEnd::Completed);
        assert_eq!(page.text(Element::Response), "world");
        assert_eq!(page.text(Element::ErrorMessage), "");
    }

    #[tokio::test]
    async fn missing_inputs_skip_generation() {
        let backend = ScriptedBackend::new(CHANNEL);
        let calls = backend.calls();
        let (ui, page) = setup(backend, StaticDialog::cancelled());
        page.set_value(Element::PromptInput, "");
        assert_eq!(ui.submit().await, SessionEnd::Skipped);
        page.set_value(Element::PromptInput, "hi");
        page.set_value(Element::ImageInput, "");
        assert_eq!(ui.submit().await, SessionEnd::Skipped);
        assert!(calls.all().is_empty());
    }

    #[tokio::test]
    async fn loading_placeholder_shown_until_first_read() {
        let backend = ScriptedBackend::new(CHANNEL);
        let bus = backend.bus().clone();
        let (ui, page) = setup(backend, StaticDialog::cancelled());
        let session = tokio::spawn({
            let ui = ui.clone();
            async move { ui.submit().await }
        });
        wait_for_text(&page, Element::Response, "Loading image and model...").await;
        bus.emit_value(CHANNEL, None).unwrap();
        assert_eq!(session.await.unwrap(), SessionEnd::Completed);
        assert_eq!(page.text(Element::Response), "");
    }

    #[tokio::test]
    async fn stop_sends_one_stop_and_skips_late_tokens() {
        let backend = ScriptedBackend::new(CHANNEL)
            .on_generate(vec![Some(token(1, "a", false)), Some(token(2, "b", false))])
            .on_stop(vec![Some(token(3, "late", false)), None]);
        let calls = backend.calls();
        let (ui, page) = setup(backend, StaticDialog::cancelled());
        let session = tokio::spawn({
            let ui = ui.clone();
            async move { ui.submit().await }
        });
        wait_for_text(&page, Element::Response, "ab").await;

        ui.stop().await;
        assert_eq!(session.await.unwrap(), SessionEnd::Aborted);
        assert_eq!(page.text(Element::Response), "");
        let stops = calls.all().into_iter().filter(|c| *c == Call::Stop).count();
        assert_eq!(stops, 1);
    }

    #[tokio::test]
    async fn abort_handle_makes_loop_send_stop() {
        let backend = ScriptedBackend::new(CHANNEL).on_generate(vec![Some(token(1, "a", false))]);
        let calls = backend.calls();
        let (ui, page) = setup(backend, StaticDialog::cancelled());
        let session = tokio::spawn({
            let ui = ui.clone();
            async move { ui.submit().await }
        });
        wait_for_text(&page, Element::Response, "a").await;
        ui.abort_handle().abort();
        assert_eq!(session.await.unwrap(), SessionEnd::Aborted);
        assert_eq!(page.text(Element::Response), "a");
        assert_eq!(calls.all().last(), Some(&Call::Stop));
        assert_eq!(calls.all().len(), 2);
    }

    #[tokio::test]
    async fn stop_before_submit_does_not_abort_next_session() {
        let backend = ScriptedBackend::new(CHANNEL)
            .on_generate(vec![Some(json!({"generated_text": "fine"}))]);
        let (ui, page) = setup(backend, StaticDialog::cancelled());
        ui.stop().await;
        assert_eq!(ui.submit().await, SessionEnd::Finished);
        assert_eq!(page.text(Element::Response), "fine");
    }

    #[tokio::test]
    async fn failed_stop_is_shown_and_does_not_abort() {
        let backend = ScriptedBackend::new(CHANNEL).fail(Call::Stop);
        let (ui, page) = setup(backend, StaticDialog::cancelled());
        ui.stop().await;
        assert_eq!(
            page.text(Element::ErrorMessage),
            "Error: command stop failed: scripted failure"
        );
        assert!(!ui.current_signal().is_raised());
    }

    #[tokio::test]
    async fn generate_failure_is_shown() {
        let backend = ScriptedBackend::new(CHANNEL)
            .fail(Call::Generate(String::new(), String::new()));
        let bus = backend.bus().clone();
        let (ui, page) = setup(backend, StaticDialog::cancelled());
        assert_eq!(ui.submit().await, SessionEnd::Failed);
        assert_eq!(
            page.text(Element::ErrorMessage),
            "Error: command generate failed: scripted failure"
        );
        assert_eq!(page.text(Element::Response), "");
        assert_eq!(bus.listener_count(CHANNEL), 0);
    }

    #[tokio::test]
    async fn malformed_payload_fails_session() {
        let backend = ScriptedBackend::new(CHANNEL).on_generate(vec![
            Some(token(1, "ok", false)),
            Some(json!({"details": true})),
            Some(token(2, "never", false)),
        ]);
        let (ui, page) = setup(backend, StaticDialog::cancelled());
        assert_eq!(ui.submit().await, SessionEnd::Failed);
        assert_eq!(page.text(Element::Response), "ok");
        assert!(page.text(Element::ErrorMessage).starts_with("Error: malformed payload"));
    }

    #[tokio::test]
    async fn listener_failure_skips_backend() {
        let backend = ScriptedBackend::new(CHANNEL);
        let calls = backend.calls();
        backend.bus().close();
        let (ui, page) = setup(backend, StaticDialog::cancelled());
        assert_eq!(ui.submit().await, SessionEnd::Failed);
        assert!(calls.all().is_empty());
        assert!(page.text(Element::ErrorMessage).contains("could not listen"));
    }

    #[tokio::test]
    async fn new_submission_clears_previous_error() {
        let backend = ScriptedBackend::new(CHANNEL).on_generate(vec![None]);
        let (ui, page) = setup(backend, StaticDialog::cancelled());
        page.set_text(Element::ErrorMessage, "Error: old");
        assert_eq!(ui.submit().await, SessionEnd::Completed);
        assert_eq!(page.text(Element::ErrorMessage), "");
    }

    #[tokio::test]
    async fn open_image_sets_path_and_preview() {
        let backend = ScriptedBackend::new(CHANNEL).copies_to("/app/assets");
        let calls = backend.calls();
        let (ui, page) = setup(backend, StaticDialog::picks("/home/me/dog.jpg"));
        assert_eq!(ui.open_image().await.as_deref(), Some("/app/assets/dog.jpg"));
        assert_eq!(page.value(Element::ImageInput), "/app/assets/dog.jpg");
        assert_eq!(page.src(Element::ImagePreview), "./assets/dog.jpg");
        assert_eq!(calls.all(), [Call::CopyImage("/home/me/dog.jpg".into())]);
    }

    #[tokio::test]
    async fn cancelled_dialog_changes_nothing() {
        let backend = ScriptedBackend::new(CHANNEL);
        let calls = backend.calls();
        let (ui, page) = setup(backend, StaticDialog::cancelled());
        assert!(ui.open_image().await.is_none());
        assert_eq!(page.value(Element::ImageInput), "/assets/cat.png");
        assert_eq!(page.src(Element::ImagePreview), "");
        assert_eq!(page.text(Element::ErrorMessage), "");
        assert!(calls.all().is_empty());
    }

    #[tokio::test]
    async fn failed_copy_keeps_previous_image() {
        let backend = ScriptedBackend::new(CHANNEL).fail(Call::CopyImage(String::new()));
        let (ui, page) = setup(backend, StaticDialog::picks("/home/me/dog.jpg"));
        assert!(ui.open_image().await.is_none());
        assert_eq!(page.value(Element::ImageInput), "/assets/cat.png");
        assert_eq!(page.src(Element::ImagePreview), "");
        assert_eq!(
            page.text(Element::ErrorMessage),
            "Error: command copy_image failed: scripted failure"
        );
    }

    #[tokio::test]
    async fn dialog_failure_is_shown() {
        let backend = ScriptedBackend::new(CHANNEL);
        let (ui, page) = setup(backend, StaticDialog::failing());
        assert!(ui.open_image().await.is_none());
        assert_eq!(
            page.text(Element::ErrorMessage),
            "Error: dialog failed: scripted failure"
        );
    }

    #[tokio::test]
    #[traced_test]
    async fn logs_session_lifecycle() {
        let backend = ScriptedBackend::new(CHANNEL).on_generate(vec![None]);
        let (ui, _page) = setup(backend, StaticDialog::cancelled());
        ui.submit().await;
        assert!(logs_contain("invoked generate"));
        assert!(logs_contain("stream completed"));
    }
}
