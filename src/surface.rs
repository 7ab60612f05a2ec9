//! The page the controller drives.
//!
//! [`Surface`] is the DOM boundary: form values, text content and the image
//! preview source, addressed by [`Element`]. [`MemorySurface`] keeps the
//! page in memory and [`TerminalSurface`] additionally mirrors the response
//! and error paragraphs to a terminal.

use std::collections::HashMap;
use std::io::Write;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Elements of the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Element {
    /// Text input holding the question.
    PromptInput,
    /// Hidden input holding the copied image path.
    ImageInput,
    /// `<img>` preview of the picked image.
    ImagePreview,
    /// Paragraph receiving generated text.
    Response,
    /// Paragraph receiving error messages.
    ErrorMessage,
}

impl Element {
    pub fn selector(self) -> &'static str {
        match self {
            Element::PromptInput => "#prompt-input",
            Element::ImageInput => "#image-input",
            Element::ImagePreview => "#image-preview",
            Element::Response => "#response",
            Element::ErrorMessage => "#error-message",
        }
    }
}

/// Mutable view of the page.
///
/// "Value" is the value of an input, "text" the text content of a paragraph
/// and "src" the source of an image element.
pub trait Surface: Send + Sync {
    fn value(&self, element: Element) -> String;
    fn set_value(&self, element: Element, value: &str);
    fn text(&self, element: Element) -> String;
    fn set_text(&self, element: Element, text: &str);
    fn append_text(&self, element: Element, text: &str);
    fn src(&self, element: Element) -> String;
    fn set_src(&self, element: Element, src: &str);
}

#[derive(Default)]
struct Page {
    values: HashMap<Element, String>,
    texts: HashMap<Element, String>,
    srcs: HashMap<Element, String>,
}

/// In-memory page. Clones share the same state.
///
/// ```
/// use moondream_ui::{Element, MemorySurface, Surface};
///
/// let page = MemorySurface::new();
/// page.set_text(Element::Response, "Hel");
/// page.append_text(Element::Response, "lo");
/// assert_eq!(page.text(Element::Response), "Hello");
/// ```
#[derive(Clone, Default)]
pub struct MemorySurface {
    page: Arc<Mutex<Page>>,
}

impl MemorySurface {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Page> {
        self.page.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Surface for MemorySurface {
    fn value(&self, element: Element) -> String {
        self.lock().values.get(&element).cloned().unwrap_or_default()
    }

    fn set_value(&self, element: Element, value: &str) {
        self.lock().values.insert(element, value.to_string());
    }

    fn text(&self, element: Element) -> String {
        self.lock().texts.get(&element).cloned().unwrap_or_default()
    }

    fn set_text(&self, element: Element, text: &str) {
        self.lock().texts.insert(element, text.to_string());
    }

    fn append_text(&self, element: Element, text: &str) {
        self.lock().texts.entry(element).or_default().push_str(text);
    }

    fn src(&self, element: Element) -> String {
        self.lock().srcs.get(&element).cloned().unwrap_or_default()
    }

    fn set_src(&self, element: Element, src: &str) {
        self.lock().srcs.insert(element, src.to_string());
    }
}

/// [`MemorySurface`] that also renders the response to stdout as it grows
/// and error messages to stderr.
///
/// Replacing the response text starts a new line; appends are written
/// in place so tokens appear as they stream in.
#[derive(Clone, Default)]
pub struct TerminalSurface {
    inner: MemorySurface,
}

impl TerminalSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(&self) -> &MemorySurface {
        &self.inner
    }

    fn render(&self, element: Element, text: &str, replace: bool) {
        match element {
            Element::Response => {
                let mut out = std::io::stdout().lock();
                let res = if replace {
                    writeln!(out).and_then(|_| write!(out, "{text}"))
                } else {
                    write!(out, "{text}")
                };
                if let Err(e) = res.and_then(|_| out.flush()) {
                    tracing::warn!(error = %e, "could not render response");
                }
            }
            Element::ErrorMessage if !text.is_empty() => eprintln!("{text}"),
            _ => {}
        }
    }
}

impl Surface for TerminalSurface {
    fn value(&self, element: Element) -> String {
        self.inner.value(element)
    }

    fn set_value(&self, element: Element, value: &str) {
        self.inner.set_value(element, value)
    }

    fn text(&self, element: Element) -> String {
        self.inner.text(element)
    }

    fn set_text(&self, element: Element, text: &str) {
        self.inner.set_text(element, text);
        self.render(element, text, true);
    }

    fn append_text(&self, element: Element, text: &str) {
        self.inner.append_text(element, text);
        self.render(element, text, false);
    }

    fn src(&self, element: Element) -> String {
        self.inner.src(element)
    }

    fn set_src(&self, element: Element, src: &str) {
        self.inner.set_src(element, src)
    }
}
