use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::Result;

pub const DEFAULT_CHANNEL: &str = "text-generation";
pub const DEFAULT_LOADING_TEXT: &str = "Loading image and model...";
pub const DEFAULT_ASSET_URL_PREFIX: &str = "./assets/";
pub const DEFAULT_ASSETS_DIR: &str = "assets";
pub const DEFAULT_REPLY: &str = "The image {image} shows what you asked about: {prompt}";

/// Front-end settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    /// Event channel generations arrive on.
    pub channel: String,
    /// Placeholder shown until the first generation arrives.
    pub loading_text: String,
    /// Prefix turning a copied file name into a preview URL.
    pub asset_url_prefix: String,
    /// Extensions offered by the image picker.
    pub image_extensions: Vec<String>,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            channel: DEFAULT_CHANNEL.into(),
            loading_text: DEFAULT_LOADING_TEXT.into(),
            asset_url_prefix: DEFAULT_ASSET_URL_PREFIX.into(),
            image_extensions: vec!["jpg".into(), "png".into(), "jpeg".into()],
        }
    }
}

/// Settings of the in-process backend.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub assets_dir: PathBuf,
    /// Reply replayed by the scripted generator.
    pub reply: String,
    pub token_delay_ms: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            assets_dir: PathBuf::from(DEFAULT_ASSETS_DIR),
            reply: DEFAULT_REPLY.into(),
            token_delay_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub ui: UiConfig,
    pub backend: BackendConfig,
}

impl AppConfig {
    /// Parse configuration from TOML text.
    ///
    /// ```
    /// use moondream_ui::AppConfig;
    ///
    /// let cfg = AppConfig::from_toml("[ui]\nchannel = \"gen\"").unwrap();
    /// assert_eq!(cfg.ui.channel, "gen");
    /// assert_eq!(cfg.ui.loading_text, "Loading image and model...");
    /// ```
    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Load configuration from `path`; a missing file yields the defaults.
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        match tokio::fs::read_to_string(path).await {
            Ok(text) => Self::from_toml(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(?path, "no config file, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }
}
