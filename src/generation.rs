//! Wire types for the text-generation event channel.

use serde::{Deserialize, Serialize};

use crate::Result;

/// Text token emitted by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub id: usize,
    /// Decoded token text.
    pub text: String,
    /// Control or meta token that must never be rendered.
    pub special: bool,
}

/// Payload published on the generation channel.
///
/// In-progress events carry only a `token`. The terminal event carries the
/// full `generated_text` (and usually the special end-of-text token).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Generation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<Token>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<bool>,
}

impl Generation {
    pub fn token(token: Token) -> Self {
        Self {
            token: Some(token),
            ..Self::default()
        }
    }

    pub fn finished(token: Option<Token>, generated_text: impl Into<String>) -> Self {
        Self {
            token,
            generated_text: Some(generated_text.into()),
            details: None,
        }
    }
}

/// A classified generation payload as seen by consumers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationEvent {
    /// One in-progress token.
    Token(Token),
    /// End of the generation with the complete text.
    Finished {
        generated_text: String,
        token: Option<Token>,
    },
}

impl GenerationEvent {
    /// Decode a raw channel payload.
    ///
    /// A payload carrying neither a token nor a final text is malformed.
    ///
    /// ```
    /// use moondream_ui::GenerationEvent;
    /// use serde_json::json;
    ///
    /// let ev = GenerationEvent::decode(json!({"generated_text": "Hello"})).unwrap();
    /// assert!(ev.is_terminal());
    /// assert!(GenerationEvent::decode(json!({"details": true})).is_err());
    /// ```
    pub fn decode(payload: serde_json::Value) -> Result<Self> {
        let generation: Generation = serde_json::from_value(payload)?;
        Self::try_from(generation)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished { .. })
    }
}

impl TryFrom<Generation> for GenerationEvent {
    type Error = crate::Error;

    fn try_from(generation: Generation) -> Result<Self> {
        match (generation.generated_text, generation.token) {
            (Some(generated_text), token) => Ok(Self::Finished {
                generated_text,
                token,
            }),
            (None, Some(token)) => Ok(Self::Token(token)),
            (None, None) => Err(crate::Error::Payload(serde::de::Error::custom(
                "expected `token` or `generated_text`",
            ))),
        }
    }
}
