//! Session layer of an image-question desktop app.
//!
//! A [`StreamBridge`] turns the backend's push-based generation events into
//! awaited reads, and a [`UiController`] uses it to stream tokens into the
//! page's response element, pick images and stop generations.

pub mod backend;
mod bridge;
pub mod config;
mod controller;
pub mod dialog;
mod error;
pub mod events;
mod generation;
pub mod generator;
mod local_backend;
pub mod logger;
mod shutdown;
mod surface;
#[cfg(test)]
mod test_helpers;

pub use backend::Backend;
pub use bridge::StreamBridge;
pub use config::{AppConfig, BackendConfig, UiConfig};
pub use controller::{AbortHandle, SessionEnd, StopSignal, UiController};
pub use dialog::{Dialog, DialogFilter, FileResponse, OpenDialogOptions, PresetDialog};
pub use error::{Error, Result};
pub use events::{EventBus, Listener, ListenerId};
pub use generation::{Generation, GenerationEvent, Token};
pub use generator::{Generator, ScriptedGenerator};
pub use local_backend::LocalBackend;
pub use shutdown::shutdown_signal;
pub use surface::{Element, MemorySurface, Surface, TerminalSurface};
