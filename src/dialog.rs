use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;

/// Named group of file extensions offered by the picker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogFilter {
    pub name: String,
    pub extensions: Vec<String>,
}

/// Request sent to the file dialog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenDialogOptions {
    pub directory: bool,
    pub multiple: bool,
    #[serde(rename = "filter")]
    pub filters: Vec<DialogFilter>,
}

impl OpenDialogOptions {
    /// Single-file picker restricted to the given image extensions.
    pub fn images<S: AsRef<str>>(extensions: &[S]) -> Self {
        Self {
            directory: false,
            multiple: false,
            filters: vec![DialogFilter {
                name: "Images".into(),
                extensions: extensions.iter().map(|e| e.as_ref().to_string()).collect(),
            }],
        }
    }

    /// Whether `path` passes the extension filters (case-insensitive).
    pub fn accepts(&self, path: &str) -> bool {
        if self.filters.is_empty() {
            return true;
        }
        let Some(ext) = std::path::Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
        else {
            return false;
        };
        self.filters
            .iter()
            .flat_map(|f| &f.extensions)
            .any(|allowed| allowed.eq_ignore_ascii_case(ext))
    }
}

/// File picked by the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileResponse {
    pub path: String,
}

/// Native file picker.
#[async_trait]
pub trait Dialog: Send + Sync {
    /// Show the picker. `Ok(None)` when the user cancels.
    async fn open(&self, options: OpenDialogOptions) -> Result<Option<FileResponse>>;
}

/// Dialog answering with a path chosen ahead of time, e.g. from the command
/// line. Paths rejected by the filters are treated as a cancelled pick.
#[derive(Debug, Clone, Default)]
pub struct PresetDialog {
    path: Option<String>,
}

impl PresetDialog {
    pub fn new(path: Option<String>) -> Self {
        Self { path }
    }
}

#[async_trait]
impl Dialog for PresetDialog {
    async fn open(&self, options: OpenDialogOptions) -> Result<Option<FileResponse>> {
        match &self.path {
            Some(path) if options.accepts(path) => Ok(Some(FileResponse { path: path.clone() })),
            Some(path) => {
                tracing::warn!(%path, "preset file does not match dialog filters");
                Ok(None)
            }
            None => Ok(None),
        }
    }
}
