use std::time::Duration;

use crate::{Generation, Result, Token};

/// Iterator of generations produced for one request.
pub type Generations = Box<dyn Iterator<Item = Result<Generation>> + Send>;

/// Id of the end-of-text token.
pub const END_OF_TEXT_ID: usize = 50256;
/// Text of the end-of-text token.
pub const END_OF_TEXT: &str = "<|endoftext|>";

/// Source of generated tokens for an image question.
///
/// Iteration is blocking and runs on a worker thread. The last item of a
/// complete generation carries `generated_text`.
pub trait Generator: Send + Sync {
    fn generate(&self, prompt: &str, image: &str) -> Result<Generations>;
}

/// Generator replaying a fixed reply word by word.
///
/// `{prompt}` and `{image}` in the reply are replaced with the request
/// values.
///
/// ```
/// use moondream_ui::{Generator, ScriptedGenerator};
///
/// let generator = ScriptedGenerator::new("A {image} photo");
/// let out: Vec<_> = generator
///     .generate("what?", "cat.png")
///     .unwrap()
///     .map(Result::unwrap)
///     .collect();
/// assert_eq!(out.len(), 4);
/// assert_eq!(out[3].generated_text.as_deref(), Some("A cat.png photo"));
/// ```
#[derive(Debug, Clone)]
pub struct ScriptedGenerator {
    reply: String,
    token_delay: Duration,
}

impl ScriptedGenerator {
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            token_delay: Duration::ZERO,
        }
    }

    /// Pause between tokens, to mimic model latency.
    pub fn token_delay(mut self, delay: Duration) -> Self {
        self.token_delay = delay;
        self
    }

    fn render(&self, prompt: &str, image: &str) -> String {
        self.reply
            .replace("{prompt}", prompt)
            .replace("{image}", image)
    }
}

impl Generator for ScriptedGenerator {
    fn generate(&self, prompt: &str, image: &str) -> Result<Generations> {
        let text = self.render(prompt, image);
        let words: Vec<String> = text.split_inclusive(' ').map(str::to_string).collect();
        let delay = self.token_delay;
        let tokens = words.into_iter().enumerate().map(|(i, word)| Token {
            id: i + 1,
            text: word,
            special: false,
        });
        let end = std::iter::once(Generation::finished(
            Some(Token {
                id: END_OF_TEXT_ID,
                text: String::new(),
                special: true,
            }),
            text,
        ));
        let iter = tokens.map(Generation::token).chain(end).map(move |g| {
            if !delay.is_zero() {
                std::thread::sleep(delay);
            }
            Ok::<_, crate::Error>(g)
        });
        Ok(Box::new(iter))
    }
}
