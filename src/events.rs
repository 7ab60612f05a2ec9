//! In-process publish/subscribe keyed by channel name.
//!
//! The backend publishes JSON payloads on a named channel and every live
//! listener of that channel receives them in emission order. A `None`
//! payload is the end-of-stream sentinel.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

use crate::{Error, Result};

/// Identifier returned when registering a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Payload as delivered to listeners; `None` marks end of stream.
pub type Event = Option<Value>;

struct Registration {
    id: ListenerId,
    channel: String,
    tx: UnboundedSender<Event>,
}

#[derive(Default)]
struct Inner {
    next_id: u64,
    closed: bool,
    listeners: Vec<Registration>,
}

/// Cloneable handle to a shared event bus.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<Mutex<Inner>>,
}

/// Receiving half of a registered listener.
pub struct Listener {
    id: ListenerId,
    rx: UnboundedReceiver<Event>,
}

impl Listener {
    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Wait for the next event. `None` once the listener has been removed
    /// from the bus and its queue is drained.
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    /// Stop accepting events; already queued events can still be received.
    pub fn close(&mut self) {
        self.rx.close();
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a listener on `channel`.
    ///
    /// ```
    /// use moondream_ui::EventBus;
    /// # tokio_test::block_on(async {
    /// let bus = EventBus::new();
    /// let mut listener = bus.listen("text-generation").unwrap();
    /// bus.emit("text-generation", Some(&"hi")).unwrap();
    /// assert_eq!(listener.recv().await, Some(Some(serde_json::json!("hi"))));
    /// # });
    /// ```
    pub fn listen(&self, channel: &str) -> Result<Listener> {
        if channel.trim().is_empty() {
            return Err(Error::Listen {
                channel: channel.to_string(),
                reason: "channel name is empty".into(),
            });
        }
        let mut inner = self.lock();
        if inner.closed {
            return Err(Error::Listen {
                channel: channel.to_string(),
                reason: Error::BusClosed.to_string(),
            });
        }
        let id = ListenerId(inner.next_id);
        inner.next_id += 1;
        let (tx, rx) = unbounded_channel();
        inner.listeners.push(Registration {
            id,
            channel: channel.to_string(),
            tx,
        });
        tracing::debug!(channel, id = id.0, "listener registered");
        Ok(Listener { id, rx })
    }

    /// Remove a listener. Its receiver drains what was queued and then ends.
    pub fn unlisten(&self, id: ListenerId) {
        let mut inner = self.lock();
        let before = inner.listeners.len();
        inner.listeners.retain(|r| r.id != id);
        if inner.listeners.len() != before {
            tracing::debug!(id = id.0, "listener removed");
        }
    }

    /// Publish `payload` on `channel`, returning how many listeners got it.
    pub fn emit<T: Serialize>(&self, channel: &str, payload: Option<&T>) -> Result<usize> {
        let value = payload.map(serde_json::to_value).transpose()?;
        self.emit_value(channel, value)
    }

    /// Publish an already encoded payload.
    pub fn emit_value(&self, channel: &str, payload: Event) -> Result<usize> {
        let mut inner = self.lock();
        if inner.closed {
            return Err(Error::BusClosed);
        }
        let mut delivered = 0;
        inner.listeners.retain(|r| {
            if r.channel != channel {
                return true;
            }
            match r.tx.send(payload.clone()) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                // receiver dropped or closed
                Err(_) => false,
            }
        });
        tracing::trace!(channel, delivered, "event emitted");
        Ok(delivered)
    }

    /// Number of live listeners on `channel`.
    pub fn listener_count(&self, channel: &str) -> usize {
        self.lock()
            .listeners
            .iter()
            .filter(|r| r.channel == channel && !r.tx.is_closed())
            .count()
    }

    /// Shut the bus down. Existing listeners drain and end; new listens fail.
    pub fn close(&self) {
        let mut inner = self.lock();
        inner.closed = true;
        inner.listeners.clear();
    }
}
