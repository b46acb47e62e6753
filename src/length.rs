//! How window sizes are measured.
//!
//! Model limits are usually quoted in tokens, but tokenization is the model's
//! business, not ours. Sizes here are measured in one of three text units:
//!
//! | Unit | Counts | Notes |
//! |------|--------|-------|
//! | `Chars` | Unicode scalar values | Default, matches most splitter tooling |
//! | `Bytes` | UTF-8 bytes | Cheapest, penalizes non-ASCII text |
//! | `Graphemes` | Extended grapheme clusters (UAX #29) | What a reader calls a "character" |
//!
//! A rough rule: one token is about four English characters, so
//! `max_size = 1000` chars is roughly 250 tokens.

use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;

/// Unit used to measure text length against `max_size` and `overlap`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LengthUnit {
    /// UTF-8 bytes.
    Bytes,
    /// Unicode scalar values.
    #[default]
    Chars,
    /// Extended grapheme clusters.
    Graphemes,
}

impl LengthUnit {
    /// Measure `text` in this unit.
    #[must_use]
    pub fn measure(self, text: &str) -> usize {
        match self {
            Self::Bytes => text.len(),
            Self::Chars => text.chars().count(),
            Self::Graphemes => text.graphemes(true).count(),
        }
    }
}
