use futures::stream::BoxStream;

use crate::events::{EventBus, Listener};
use crate::{GenerationEvent, Result};

/// Pull-based reader over a push-based event channel.
///
/// Listening starts at construction; every payload is queued in arrival
/// order until [`read`](Self::read) takes it. The end-of-stream sentinel,
/// [`cancel`](Self::cancel) or dropping the bridge finish the sequence.
///
/// # Examples
///
/// ```
/// use moondream_ui::{EventBus, GenerationEvent, StreamBridge};
/// use serde_json::json;
///
/// # tokio_test::block_on(async {
/// let bus = EventBus::new();
/// let mut bridge = StreamBridge::listen(&bus, "text-generation").unwrap();
/// bus.emit_value("text-generation", Some(json!({"generated_text": "done"}))).unwrap();
/// bus.emit_value("text-generation", None).unwrap();
///
/// let first = bridge.read().await.unwrap();
/// assert!(matches!(first, Some(GenerationEvent::Finished { .. })));
/// assert!(bridge.read().await.unwrap().is_none());
/// # });
/// ```
pub struct StreamBridge {
    bus: EventBus,
    channel: String,
    listener: Option<Listener>,
}

impl StreamBridge {
    /// Register on `channel`. Fails when the bus refuses the listener.
    pub fn listen(bus: &EventBus, channel: &str) -> Result<Self> {
        let listener = bus.listen(channel)?;
        Ok(Self {
            bus: bus.clone(),
            channel: channel.to_string(),
            listener: Some(listener),
        })
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Next event, or `Ok(None)` once the stream is finished.
    ///
    /// Malformed payloads are returned as errors; the bridge stays usable.
    /// Cancel safe.
    pub async fn read(&mut self) -> Result<Option<GenerationEvent>> {
        let Some(listener) = self.listener.as_mut() else {
            return Ok(None);
        };
        match listener.recv().await {
            Some(Some(payload)) => {
                tracing::debug!(channel = %self.channel, %payload, "received output");
                GenerationEvent::decode(payload).map(Some)
            }
            Some(None) => {
                tracing::info!(channel = %self.channel, "received empty output, end of data");
                self.cancel();
                Ok(None)
            }
            None => {
                self.cancel();
                Ok(None)
            }
        }
    }

    /// Unregister the listener. Subsequent reads report completion.
    pub fn cancel(&mut self) {
        if let Some(mut listener) = self.listener.take() {
            listener.close();
            self.bus.unlisten(listener.id());
            tracing::debug!(channel = %self.channel, "stream released");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.listener.is_none()
    }

    /// Consume the bridge as a stream of events.
    pub fn into_stream(self) -> BoxStream<'static, Result<GenerationEvent>> {
        let mut bridge = self;
        Box::pin(async_stream::stream! {
            loop {
                match bridge.read().await {
                    Ok(Some(event)) => yield Ok(event),
                    Ok(None) => break,
                    Err(e) => yield Err(e),
                }
            }
        })
    }
}

impl Drop for StreamBridge {
    fn drop(&mut self) {
        self.cancel();
    }
}
