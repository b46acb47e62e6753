//! Recursive separator splitting with overlap.
//!
//! Tries progressively finer separators until every piece fits, then packs
//! pieces back into windows that share a bounded overlap.
//!
//! ## The Algorithm
//!
//! Given separators `["\n\n", "\n", ". ", " ", ""]` and `max_size = 100`:
//!
//! ```text
//! 1. Text <= 100? It is one window.
//! 2. Split on "\n\n" (paragraphs); each separator opens the next piece
//! 3. Pieces <= 100 are packed into windows:
//!    - pack left to right while the window stays <= 100
//!    - on overflow, emit the window and keep its trailing pieces
//!      (total <= overlap) as the start of the next one
//! 4. Pieces > 100 are split again on the next separator they contain
//! 5. "" splits into grapheme clusters, the finest unit available
//! ```
//!
//! A window never mixes pieces from either side of a piece that had to be
//! split further, but overlap is still carried across that boundary. When
//! the last piece of a window is longer than `overlap` (a paragraph longer
//! than 200 chars with `overlap = 200`), it is broken with the finer
//! separators and only its tail is carried, so paragraph-structured text
//! still gets overlapping windows.
//!
//! Separators are never dropped and nothing is trimmed, so every window is an
//! exact slice of the input and the windows cover it without gaps.
//!
//! ## Oversized Windows
//!
//! A piece that no remaining separator can split (a 5,000-character URL with
//! separators `["\n\n", " "]`) becomes its own window, larger than
//! `max_size`. Splitting never fails on odd input; it logs a warning instead.
//!
//! ## Default Separators
//!
//! For prose:
//!
//! ```text
//! ["\n\n", "\n", ". ", " ", ""]
//! ```
//!
//! For Markdown:
//!
//! ```text
//! ["\n## ", "\n### ", "\n\n", "\n", ". ", " ", ""]
//! ```

use std::collections::VecDeque;
use std::ops::Range;

use unicode_segmentation::UnicodeSegmentation;

use crate::config::{validate_window, ConfigError, PipelineConfig};
use crate::{LengthUnit, Splitter, Window};

/// Separator priority used by [`RecursiveSplitter::new`], coarsest first.
pub const DEFAULT_SEPARATORS: &[&str] = &["\n\n", "\n", ". ", " ", ""];

const MARKDOWN_SEPARATORS: &[&str] = &["\n## ", "\n### ", "\n\n", "\n", ". ", " ", ""];

/// A contiguous slice of the input that the packer treats as indivisible.
#[derive(Debug)]
struct Piece {
    span: Range<usize>,
    len: usize,
    /// First separator to try if this piece has to be broken up.
    level: usize,
}

/// Recursive separator splitter with overlapping windows.
///
/// ## Example
///
/// ```rust
/// use condense::{RecursiveSplitter, Splitter};
///
/// let splitter = RecursiveSplitter::new(50, 10).unwrap();
/// let text = "Paragraph one.\n\nParagraph two is longer and might need splitting.";
/// let windows = splitter.split(text);
///
/// assert!(windows.len() >= 2);
/// assert_eq!(&text[windows[0].span()], windows[0].text);
/// ```
#[derive(Debug, Clone)]
pub struct RecursiveSplitter {
    max_size: usize,
    overlap: usize,
    separators: Vec<String>,
    unit: LengthUnit,
}

impl RecursiveSplitter {
    /// Create a splitter with the default prose separators.
    ///
    /// # Errors
    ///
    /// Returns an error if `max_size == 0` or `overlap >= max_size`.
    pub fn new(max_size: usize, overlap: usize) -> Result<Self, ConfigError> {
        Self::with_separators(max_size, overlap, DEFAULT_SEPARATORS)
    }

    /// Create a splitter with a custom separator hierarchy, coarsest first.
    ///
    /// Include `""` last to allow splitting down to single graphemes. Without
    /// it, text that none of the separators can break stays in one oversized
    /// window.
    ///
    /// # Errors
    ///
    /// Returns an error if `max_size == 0`, `overlap >= max_size`, or
    /// `separators` is empty.
    pub fn with_separators(
        max_size: usize,
        overlap: usize,
        separators: &[&str],
    ) -> Result<Self, ConfigError> {
        validate_window(max_size, overlap)?;
        if separators.is_empty() {
            return Err(ConfigError::NoSeparators);
        }

        Ok(Self {
            max_size,
            overlap,
            separators: separators.iter().map(|&s| s.to_string()).collect(),
            unit: LengthUnit::default(),
        })
    }

    /// Create a splitter that prefers Markdown section boundaries.
    ///
    /// # Errors
    ///
    /// Returns an error if `max_size == 0` or `overlap >= max_size`.
    pub fn markdown(max_size: usize, overlap: usize) -> Result<Self, ConfigError> {
        Self::with_separators(max_size, overlap, MARKDOWN_SEPARATORS)
    }

    /// Build the splitter described by a pipeline configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the window parameters or separators are invalid.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, ConfigError> {
        let separators: Vec<&str> = config.separators.iter().map(String::as_str).collect();
        Ok(Self::with_separators(config.max_size, config.overlap, &separators)?
            .with_length_unit(config.length_unit))
    }

    /// Measure sizes in `unit` instead of chars.
    #[must_use]
    pub fn with_length_unit(mut self, unit: LengthUnit) -> Self {
        self.unit = unit;
        self
    }

    /// Target overlap between adjacent windows.
    #[must_use]
    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// The unit sizes are measured in.
    #[must_use]
    pub fn length_unit(&self) -> LengthUnit {
        self.unit
    }

    /// The separator hierarchy, coarsest first.
    #[must_use]
    pub fn separators(&self) -> &[String] {
        &self.separators
    }

    /// Feed `text` (located at `offset` in the input) to the packer.
    ///
    /// Pieces that fit go straight to the packer; a piece that does not fit
    /// is handed to the next separator it contains, closing the current
    /// window on either side of it.
    fn split_spans(&self, text: &str, offset: usize, sep_index: usize, packer: &mut Packer<'_>) {
        let len = self.unit.measure(text);
        if len <= self.max_size {
            packer.push(Piece {
                span: offset..offset + text.len(),
                len,
                level: sep_index,
            });
            return;
        }

        let Some((index, pieces)) = self.atomize(text, offset, sep_index) else {
            // Nothing left to split on
            packer.push(Piece {
                span: offset..offset + text.len(),
                len,
                level: self.separators.len(),
            });
            return;
        };

        for piece in pieces {
            if piece.len <= self.max_size {
                packer.push(piece);
            } else {
                let part = &text[piece.span.start - offset..piece.span.end - offset];
                packer.close();
                self.split_spans(part, piece.span.start, index + 1, packer);
                packer.close();
            }
        }
    }

    /// Break `text` on the first separator at or after `from` that applies.
    ///
    /// Each separator opens the piece that follows it. Whitespace-only runs
    /// stay attached to the next piece instead of becoming pieces of their
    /// own. Returns `None` once the separators are exhausted.
    fn atomize(&self, text: &str, offset: usize, from: usize) -> Option<(usize, Vec<Piece>)> {
        let (index, sep) = self
            .separators
            .iter()
            .enumerate()
            .skip(from)
            .find(|(_, sep)| sep.is_empty() || text.contains(sep.as_str()))?;

        let piece = |range: Range<usize>| Piece {
            len: self.unit.measure(&text[range.clone()]),
            span: offset + range.start..offset + range.end,
            level: index + 1,
        };

        if sep.is_empty() {
            let graphemes = text
                .grapheme_indices(true)
                .map(|(start, grapheme)| piece(start..start + grapheme.len()))
                .collect();
            return Some((index, graphemes));
        }

        let mut bounds = Vec::new();
        let mut last = 0;
        for (pos, _) in text.match_indices(sep.as_str()) {
            if text[last..pos].trim().is_empty() {
                continue;
            }
            bounds.push(pos);
            last = pos;
        }
        bounds.push(text.len());

        let mut pieces = Vec::with_capacity(bounds.len());
        let mut start = 0;
        for end in bounds {
            pieces.push(piece(start..end));
            start = end;
        }
        Some((index, pieces))
    }

    /// Collect the longest run of trailing sub-pieces of `piece` that fits in
    /// `budget`, last piece first. If even the final sub-piece is too long,
    /// descend into it with the next separator.
    fn carry_tail(&self, text: &str, piece: &Piece, budget: usize, out: &mut Vec<Piece>) {
        let Some((_, pieces)) = self.atomize(&text[piece.span.clone()], piece.span.start, piece.level) else {
            return;
        };

        let mut left = budget;
        for sub in pieces.into_iter().rev() {
            if sub.len <= left {
                left -= sub.len;
                out.push(sub);
                continue;
            }
            if out.is_empty() {
                self.carry_tail(text, &sub, left, out);
            }
            break;
        }
    }
}

/// Packs pieces into window spans, carrying up to `overlap` of each window's
/// tail into the next.
struct Packer<'a> {
    splitter: &'a RecursiveSplitter,
    text: &'a str,
    current: VecDeque<Piece>,
    total: usize,
    closed: bool,
    spans: Vec<Range<usize>>,
}

impl<'a> Packer<'a> {
    fn new(splitter: &'a RecursiveSplitter, text: &'a str) -> Self {
        Self {
            splitter,
            text,
            current: VecDeque::new(),
            total: 0,
            closed: false,
            spans: Vec::with_capacity(splitter.estimate_windows(text.len())),
        }
    }

    fn push(&mut self, piece: Piece) {
        let overflow = self.total + piece.len > self.splitter.max_size;
        if !self.current.is_empty() && (self.closed || overflow) {
            self.emit();
            self.carry_back(piece.len);
        }
        self.closed = false;
        self.total += piece.len;
        self.current.push_back(piece);
    }

    /// The next piece starts a new window.
    fn close(&mut self) {
        self.closed = true;
    }

    fn emit(&mut self) {
        if let (Some(first), Some(last)) = (self.current.front(), self.current.back()) {
            self.spans.push(first.span.start..last.span.end);
        }
    }

    /// Drop leading pieces of the emitted window until what is left fits the
    /// overlap and leaves room for a next piece of `next_len`. The carried
    /// text is always a strict suffix of the emitted window.
    fn carry_back(&mut self, next_len: usize) {
        let budget = self
            .splitter
            .overlap
            .min(self.splitter.max_size.saturating_sub(next_len));

        let mut boundary = None;
        while let Some(front) = self.current.pop_front() {
            self.total -= front.len;
            if self.total <= budget {
                boundary = Some(front);
                break;
            }
        }

        let Some(boundary) = boundary else {
            return;
        };
        if !self.current.is_empty() || budget == 0 {
            return;
        }

        // No whole piece fits: carry the tail of the one that straddles the budget
        let mut tail = Vec::new();
        self.splitter.carry_tail(self.text, &boundary, budget, &mut tail);
        if tail.last().is_some_and(|p| p.span.start == boundary.span.start) {
            tail.pop();
        }
        for piece in tail {
            self.total += piece.len;
            self.current.push_front(piece);
        }
    }

    fn finish(mut self) -> Vec<Range<usize>> {
        self.emit();
        self.spans
    }
}

impl Splitter for RecursiveSplitter {
    fn split(&self, text: &str) -> Vec<Window> {
        if text.is_empty() {
            return vec![];
        }

        let mut packer = Packer::new(self, text);
        self.split_spans(text, 0, 0, &mut packer);

        packer
            .finish()
            .into_iter()
            .enumerate()
            .map(|(index, span)| {
                let slice = &text[span.clone()];
                let size = self.unit.measure(slice);
                if size > self.max_size {
                    tracing::warn!(
                        index,
                        size,
                        max_size = self.max_size,
                        "window exceeds max_size; no separator could split it further"
                    );
                }
                Window::new(slice, span.start, span.end, index)
            })
            .collect()
    }

    fn measure(&self, text: &str) -> usize {
        self.unit.measure(text)
    }

    fn max_size(&self) -> usize {
        self.max_size
    }

    fn estimate_windows(&self, text_len: usize) -> usize {
        let step = self.max_size - self.overlap;
        text_len.div_ceil(step).max(1)
    }
}
