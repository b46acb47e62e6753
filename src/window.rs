//! Windows and documents: slices of text with position metadata.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// An immutable unit of text plus string metadata.
///
/// Documents are what a [`Window`] looks like once it leaves the splitter and
/// its position is no longer a typed field:
///
/// ```rust
/// use condense::Window;
///
/// let window = Window::new("world", 7, 12, 0);
/// let doc = window.to_document();
///
/// assert_eq!(doc.content(), "world");
/// assert_eq!(doc.metadata().get("start").map(String::as_str), Some("7"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Document {
    content: String,
    metadata: BTreeMap<String, String>,
}

impl Document {
    /// Create a document with no metadata.
    #[must_use]
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            metadata: BTreeMap::new(),
        }
    }

    /// Attach one metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// The document text.
    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    /// The document metadata.
    #[must_use]
    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }
}

/// A window of text with its position in the original document.
///
/// ## Byte Offsets
///
/// `start` and `end` are byte offsets into the original text, not character
/// indices. This matches Rust's string slicing semantics:
///
/// ```rust
/// use condense::Window;
///
/// let text = "Hello, world!";
/// let window = Window::new("world", 7, 12, 0);
///
/// assert_eq!(&text[window.span()], "world");
/// ```
///
/// ## Overlap
///
/// Adjacent windows may share text. The shared region is the part of a
/// window that starts before the previous window's `end`:
///
/// ```text
/// Original: "The quick brown fox"
/// Window 0: "The quick "      [0..10]
/// Window 1: "quick brown fox" [4..19]  <- overlaps window 0
///                             overlap region [4..10]
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Window {
    /// The window text.
    pub text: String,
    /// Byte offset where this window starts in the original document.
    pub start: usize,
    /// Byte offset where this window ends (exclusive) in the original document.
    pub end: usize,
    /// Zero-based index of this window in the sequence.
    pub index: usize,
}

impl Window {
    /// Create a new window.
    #[must_use]
    pub fn new(text: impl Into<String>, start: usize, end: usize, index: usize) -> Self {
        Self {
            text: text.into(),
            start,
            end,
            index,
        }
    }

    /// The length of this window in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.text.len()
    }

    /// Whether this window is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// The byte span of this window in the original document.
    #[must_use]
    pub fn span(&self) -> std::ops::Range<usize> {
        self.start..self.end
    }

    /// Bytes shared with the window that precedes this one.
    #[must_use]
    pub fn overlap_with(&self, previous: &Window) -> usize {
        previous.end.saturating_sub(self.start).min(self.len())
    }

    /// The part of this window not already covered by `previous`.
    ///
    /// Concatenating `fresh_text` over a split reconstructs the input.
    #[must_use]
    pub fn fresh_text(&self, previous: Option<&Window>) -> &str {
        let skip = previous.map_or(0, |p| self.overlap_with(p));
        &self.text[skip..]
    }

    /// Convert into a [`Document`] carrying `start`, `end` and `index` metadata.
    #[must_use]
    pub fn to_document(&self) -> Document {
        Document::new(self.text.clone())
            .with_metadata("start", self.start.to_string())
            .with_metadata("end", self.end.to_string())
            .with_metadata("index", self.index.to_string())
    }
}

impl std::fmt::Display for Window {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Window {{ index: {}, span: {}..{}, len: {} }}",
            self.index,
            self.start,
            self.end,
            self.len()
        )
    }
}
