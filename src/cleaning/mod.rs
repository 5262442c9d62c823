//! Text cleaning applied to extracted document text before chunking.

use once_cell::sync::Lazy;
use regex::Regex;

static NEWLINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n").unwrap());
static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static SPECIAL_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-zA-Z0-9\s]").unwrap());

/// Normalizes raw extracted text.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextPreprocessor;

impl TextPreprocessor {
    pub fn new() -> Self {
        Self
    }

    /// Replace newlines with spaces, collapse whitespace runs and trim.
    pub fn clean_text(&self, text: &str) -> String {
        let text = NEWLINE.replace_all(text, " ");
        WHITESPACE_RUN.replace_all(&text, " ").trim().to_string()
    }

    /// Drop everything except ASCII letters, digits and whitespace.
    pub fn remove_special_characters(&self, text: &str) -> String {
        SPECIAL_CHARS.replace_all(text, "").into_owned()
    }

    pub fn to_lower(&self, text: &str) -> String {
        text.to_lowercase()
    }

    /// Full cleaning pass: [`clean_text`](Self::clean_text), then
    /// [`remove_special_characters`](Self::remove_special_characters), then
    /// [`to_lower`](Self::to_lower).
    ///
    /// Special characters are removed after whitespace is collapsed, so a
    /// separator such as `" - "` leaves two adjacent spaces behind.
    pub fn preprocess_text(&self, text: &str) -> String {
        let text = self.clean_text(text);
        let text = self.remove_special_characters(&text);
        self.to_lower(&text)
    }
}
