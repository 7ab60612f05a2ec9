use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, oneshot};

use crate::events::EventBus;
use crate::generator::Generator;
use crate::{Backend, Error, Result};

/// In-process backend host.
///
/// Generation runs on a blocking worker that publishes every [`Generation`]
/// on the event channel. Each generation owns a one-shot stop signal;
/// starting a new one or calling [`stop`](Backend::stop) fires it.
///
/// [`Generation`]: crate::Generation
pub struct LocalBackend {
    bus: EventBus,
    channel: String,
    generator: Arc<dyn Generator>,
    assets_dir: PathBuf,
    stop_tx: Mutex<Option<oneshot::Sender<()>>>,
}

impl LocalBackend {
    pub fn new(bus: EventBus, generator: Arc<dyn Generator>) -> Self {
        Self {
            bus,
            channel: crate::config::DEFAULT_CHANNEL.into(),
            generator,
            assets_dir: PathBuf::from(crate::config::DEFAULT_ASSETS_DIR),
            stop_tx: Mutex::new(None),
        }
    }

    /// Channel generations are published on.
    pub fn channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = channel.into();
        self
    }

    /// Directory `copy_image` copies into.
    pub fn assets_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.assets_dir = dir.into();
        self
    }

    async fn signal_stop(&self, reason: &str) {
        if let Some(tx) = self.stop_tx.lock().await.take() {
            if tx.send(()).is_err() {
                tracing::debug!(reason, "generation already finished");
            } else {
                tracing::info!(reason, "stop signal sent");
            }
        }
    }
}

fn pump(
    generator: Arc<dyn Generator>,
    bus: EventBus,
    channel: String,
    prompt: String,
    image: String,
    mut stop_rx: oneshot::Receiver<()>,
) {
    let end_of_stream = |why: &str| {
        tracing::debug!(why, "emitting end of stream");
        if let Err(e) = bus.emit_value(&channel, None) {
            tracing::warn!(error = %e, "could not emit end of stream");
        }
    };

    let generations = match generator.generate(&prompt, &image) {
        Ok(g) => g,
        Err(e) => {
            tracing::error!(error = %e, "could not build pipeline");
            end_of_stream("pipeline failed");
            return;
        }
    };
    tracing::info!("pipeline created");

    for generation in generations {
        if !matches!(stop_rx.try_recv(), Err(oneshot::error::TryRecvError::Empty)) {
            tracing::info!("generation stopped");
            return;
        }
        let generation = match generation {
            Ok(g) => g,
            Err(e) => {
                tracing::error!(error = %e, "generation failed");
                end_of_stream("generation failed");
                return;
            }
        };
        tracing::trace!(?generation, "emitting generation");
        let terminal = generation.generated_text.is_some();
        if let Err(e) = bus.emit(&channel, Some(&generation)) {
            tracing::warn!(error = %e, "could not emit generation");
            return;
        }
        if terminal {
            return;
        }
    }
    end_of_stream("generator exhausted");
}

#[async_trait]
impl Backend for LocalBackend {
    async fn generate(&self, prompt: &str, image: &str) -> Result<()> {
        if prompt.trim().is_empty() {
            return Err(Error::Input("prompt is empty".into()));
        }
        tracing::debug!(prompt, image, "generating");
        self.signal_stop("superseded").await;

        let (tx, rx) = oneshot::channel();
        *self.stop_tx.lock().await = Some(tx);

        let generator = self.generator.clone();
        let bus = self.bus.clone();
        let channel = self.channel.clone();
        let (prompt, image) = (prompt.to_string(), image.to_string());
        tokio::task::spawn_blocking(move || pump(generator, bus, channel, prompt, image, rx));
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        tracing::info!("stop requested");
        self.signal_stop("stop").await;
        Ok(())
    }

    async fn copy_image(&self, src: &str) -> Result<String> {
        let src = Path::new(src);
        tracing::debug!(?src, "copying image");
        let Some(file_name) = src.file_name() else {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::NotFound,
                "could not find file name",
            )));
        };
        tokio::fs::create_dir_all(&self.assets_dir).await?;
        let dst = self.assets_dir.join(file_name);
        if !tokio::fs::try_exists(&dst).await? {
            tokio::fs::copy(src, &dst).await?;
        }
        tracing::debug!(?dst, "image copied");
        Ok(dst.to_string_lossy().into_owned())
    }
}
