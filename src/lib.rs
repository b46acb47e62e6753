//! # condense
//!
//! Long-context reduction: get a language model to work over text that does
//! not fit in its context window.
//!
//! ## The Problem
//!
//! A model sees a bounded window of text. Reports, transcripts and books
//! don't fit. The usual way out:
//!
//! 1. Split the text into overlapping windows that each fit
//! 2. Summarize every window on its own (map)
//! 3. Summarize the summaries until one result remains (reduce)
//! 4. Optionally run a fixed chain of follow-up instructions over the result
//!    ("extract the claims", then "rank them", then "write a memo")
//!
//! Each step is simple. The details are where it goes wrong:
//!
//! - A window split mid-sentence loses meaning; split on paragraphs first
//! - Without overlap, a fact that straddles a boundary is in no window
//! - A model that ignores "be concise" makes reduce loop forever
//! - One failed call halfway through a 200-window map should not be a mystery
//!
//! ## Components
//!
//! | Component | Type | Concurrency |
//! |-----------|------|-------------|
//! | Text splitter | [`RecursiveSplitter`] | none |
//! | Model boundary | [`ModelInvoker`] | n/a |
//! | Map-reduce summarizer | [`MapReduceSummarizer`] | bounded, map phase only |
//! | Sequential refiner | [`SequentialRefiner`] | none, each step needs the last |
//! | All of the above | [`Pipeline`] | as above |
//!
//! ## Quick Start
//!
//! ```rust
//! use condense::{InvokeError, RecursiveSplitter, SequentialRefiner, Splitter};
//!
//! let text = "The quick brown fox jumps over the lazy dog. ".repeat(50);
//!
//! // 1000-char windows, 200 chars shared between neighbours
//! let splitter = RecursiveSplitter::new(1000, 200).unwrap();
//! let windows = splitter.split(&text);
//! assert_eq!(windows.len(), 3);
//!
//! // Any async closure from prompt to text is a model
//! let model = |prompt: String| async move { Ok::<_, InvokeError>(prompt.to_uppercase()) };
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let refiner = SequentialRefiner::new(["Fix the grammar."]);
//! let out = refiner.refine("a draft", &model).await.unwrap();
//! assert!(out.ends_with("A DRAFT"));
//! # });
//! ```
//!
//! ## Logging
//!
//! The crate logs through `tracing` and never installs a subscriber.
//! Summarize, refine and pipeline runs open `info` spans; every model call is
//! a `debug` event; dropped windows, oversized windows and reduce rounds that
//! fail to shrink are `warn` events.

mod config;
mod error;
mod invoker;
mod length;
mod pipeline;
pub mod prompts;
mod recursive;
mod refine;
mod summarize;
mod window;

pub use config::{ConfigError, PipelineConfig};
pub use error::{Error, Result, Stage};
pub use invoker::{InvokeError, ModelInvoker};
pub use length::LengthUnit;
pub use pipeline::Pipeline;
pub use recursive::{RecursiveSplitter, DEFAULT_SEPARATORS};
pub use refine::{PipelineStep, SequentialRefiner};
pub use summarize::{MapReduceSummarizer, PARTIAL_SEPARATOR};
pub use window::{Document, Window};

/// A text splitting strategy.
///
/// The summarizer only needs to split and to measure, so any strategy can
/// stand in for [`RecursiveSplitter`]:
///
/// ```rust
/// use condense::{RecursiveSplitter, Splitter, Window};
///
/// fn split_document(splitter: &dyn Splitter, text: &str) -> Vec<Window> {
///     splitter.split(text)
/// }
///
/// let prose = RecursiveSplitter::new(100, 20).unwrap();
/// let markdown = RecursiveSplitter::markdown(100, 0).unwrap();
///
/// let text = "# Notes\n\nHello world. This is a test.";
/// let a = split_document(&prose, text);
/// let b = split_document(&markdown, text);
/// ```
pub trait Splitter: Send + Sync {
    /// Split text into windows.
    ///
    /// Each window is a [`Window`] containing the text and its byte offsets
    /// in the original document.
    fn split(&self, text: &str) -> Vec<Window>;

    /// Measure `text` in the unit `max_size` is expressed in.
    fn measure(&self, text: &str) -> usize;

    /// The largest window this splitter aims to produce.
    fn max_size(&self) -> usize;

    /// Estimate the number of windows for a given text length.
    ///
    /// Useful for pre-allocation. May be approximate.
    fn estimate_windows(&self, text_len: usize) -> usize {
        // Conservative default
        (text_len / 500).max(1)
    }
}
