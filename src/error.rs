use serde::Serialize;

/// Errors raised by the session layer and the local backend.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("malformed payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error(transparent)]
    Config(#[from] toml::de::Error),

    #[error("could not listen on channel {channel:?}: {reason}")]
    Listen { channel: String, reason: String },

    #[error("command {command} failed: {message}")]
    Command {
        command: &'static str,
        message: String,
    },

    #[error("dialog failed: {0}")]
    Dialog(String),

    #[error("input error: {0}")]
    Input(String),

    #[error("event bus is closed")]
    BusClosed,
}

impl Error {
    /// Wrap any displayable failure as a backend command error.
    pub fn command(command: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Command {
            command,
            message: err.to_string(),
        }
    }
}

// Commands hand errors back to the front end as plain strings.
impl Serialize for Error {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        serializer.serialize_str(self.to_string().as_ref())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
