#![cfg(test)]

use std::mem::{Discriminant, discriminant};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::backend::{COPY_IMAGE, GENERATE, STOP};
use crate::dialog::{Dialog, FileResponse, OpenDialogOptions};
use crate::events::{Event, EventBus};
use crate::{Backend, Error, Result};

/// Token payload as the backend publishes it.
pub fn token(id: usize, text: &str, special: bool) -> Value {
    json!({"token": {"id": id, "text": text, "special": special}})
}

/// Backend command received by [`ScriptedBackend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Generate(String, String),
    Stop,
    CopyImage(String),
}

/// Shared log of backend calls.
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<Call>>>);

impl CallLog {
    pub fn all(&self) -> Vec<Call> {
        self.0.lock().unwrap().clone()
    }

    fn push(&self, call: Call) {
        self.0.lock().unwrap().push(call);
    }
}

/// [`Backend`] publishing canned events and recording every call.
pub struct ScriptedBackend {
    bus: EventBus,
    channel: String,
    on_generate: Vec<Event>,
    on_stop: Vec<Event>,
    failing: Vec<Discriminant<Call>>,
    copy_dir: String,
    calls: CallLog,
}

impl ScriptedBackend {
    pub fn new(channel: &str) -> Self {
        Self {
            bus: EventBus::new(),
            channel: channel.to_string(),
            on_generate: Vec::new(),
            on_stop: Vec::new(),
            failing: Vec::new(),
            copy_dir: "/assets".into(),
            calls: CallLog::default(),
        }
    }

    /// Events published when `generate` is called.
    pub fn on_generate(mut self, events: Vec<Event>) -> Self {
        self.on_generate = events;
        self
    }

    /// Events published when `stop` is called, before it returns.
    pub fn on_stop(mut self, events: Vec<Event>) -> Self {
        self.on_stop = events;
        self
    }

    /// Make every call of this kind fail.
    pub fn fail(mut self, call: Call) -> Self {
        self.failing.push(discriminant(&call));
        self
    }

    pub fn copies_to(mut self, dir: &str) -> Self {
        self.copy_dir = dir.to_string();
        self
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn calls(&self) -> CallLog {
        self.calls.clone()
    }

    fn record(&self, call: Call, command: &'static str) -> Result<()> {
        let failing = self.failing.contains(&discriminant(&call));
        self.calls.push(call);
        if failing {
            Err(Error::command(command, "scripted failure"))
        } else {
            Ok(())
        }
    }

    fn publish(&self, events: &[Event]) {
        for event in events {
            self.bus.emit_value(&self.channel, event.clone()).unwrap();
        }
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    async fn generate(&self, prompt: &str, image: &str) -> Result<()> {
        self.record(Call::Generate(prompt.into(), image.into()), GENERATE)?;
        self.publish(&self.on_generate);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.record(Call::Stop, STOP)?;
        self.publish(&self.on_stop);
        Ok(())
    }

    async fn copy_image(&self, src: &str) -> Result<String> {
        self.record(Call::CopyImage(src.into()), COPY_IMAGE)?;
        let name = std::path::Path::new(src)
            .file_name()
            .unwrap()
            .to_string_lossy()
            .into_owned();
        Ok(format!("{}/{}", self.copy_dir, name))
    }
}

/// [`Dialog`] with a fixed answer.
pub struct StaticDialog {
    path: Option<String>,
    fail: bool,
}

impl StaticDialog {
    pub fn picks(path: &str) -> Self {
        Self {
            path: Some(path.into()),
            fail: false,
        }
    }

    pub fn cancelled() -> Self {
        Self {
            path: None,
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            path: None,
            fail: true,
        }
    }
}

#[async_trait]
impl Dialog for StaticDialog {
    async fn open(&self, _options: OpenDialogOptions) -> Result<Option<FileResponse>> {
        if self.fail {
            return Err(Error::Dialog("scripted failure".into()));
        }
        Ok(self.path.clone().map(|path| FileResponse { path }))
    }
}
