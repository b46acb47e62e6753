//! Map-reduce summarization over windows.
//!
//! ## The Problem
//!
//! A document ten times larger than the context window cannot be summarized
//! in one call. Summarize each window independently (map), then summarize the
//! summaries (reduce).
//!
//! ```text
//! windows:   [W0] [W1] [W2] [W3] [W4] [W5]
//!              |    |    |    |    |    |      map: one call each, concurrent
//! partials:  [P0] [P1] [P2] [P3] [P4] [P5]
//!              \____\____\__ join __/____/
//!                       |
//!               fits max_size? --yes--> combine call --> result
//!                       |
//!                       no: re-split, map with the combine instruction,
//!                           join again (one reduce round)
//! ```
//!
//! ## Termination
//!
//! Each round should shrink the text, because a summary is shorter than its
//! input. A model that ignores the instruction and echoes its input would
//! loop forever, so the number of reduce rounds (re-split and map again) is
//! capped. If the partials still do not fit after the last allowed round,
//! the call fails with [`Error::ReduceDidNotConverge`].
//!
//! ## Failure Modes
//!
//! | Mode | One window fails | All windows fail |
//! |------|------------------|------------------|
//! | strict (default) | whole call fails | whole call fails |
//! | best-effort | window dropped, logged | first failure returned |

use futures::{StreamExt, TryStreamExt};
use tracing::Instrument;

use crate::config::{require_instruction, ConfigError, PipelineConfig};
use crate::error::{Error, Result, Stage};
use crate::invoker::{Dispatcher, ModelInvoker};
use crate::prompts::{build_prompt, Verbosity, DEFAULT_COMBINE_INSTRUCTION, DEFAULT_SUMMARIZE_INSTRUCTION};
use crate::{RecursiveSplitter, Splitter, Window};

/// Joins partial summaries before they are combined.
pub const PARTIAL_SEPARATOR: &str = "\n\n";

/// Map-reduce summarizer.
///
/// ## Example
///
/// ```rust
/// use condense::{InvokeError, MapReduceSummarizer, RecursiveSplitter, Splitter};
///
/// # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
/// let splitter = RecursiveSplitter::new(100, 20).unwrap();
/// let windows = splitter.split(&"Lorem ipsum dolor sit amet. ".repeat(20));
///
/// // A stand-in model that keeps the first word of its input.
/// let model = |prompt: String| async move {
///     let payload = prompt.split_once("\n\n").map_or("", |(_, p)| p);
///     Ok::<_, InvokeError>(payload.split_whitespace().next().unwrap_or("").to_string())
/// };
///
/// let summarizer = MapReduceSummarizer::new(splitter);
/// let summary = summarizer.summarize(&windows, &model).await.unwrap();
/// assert!(!summary.is_empty());
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct MapReduceSummarizer<S = RecursiveSplitter> {
    splitter: S,
    summarize_instruction: String,
    combine_instruction: String,
    concurrency_limit: usize,
    max_reduce_rounds: usize,
    best_effort: bool,
    invoke_timeout: Option<std::time::Duration>,
    max_invocations: Option<usize>,
}

impl<S: Splitter> MapReduceSummarizer<S> {
    /// Create a summarizer that re-splits oversized reductions with `splitter`.
    ///
    /// Uses the default instructions, a concurrency limit of 4 and 5 reduce
    /// rounds.
    #[must_use]
    pub fn new(splitter: S) -> Self {
        Self {
            splitter,
            summarize_instruction: DEFAULT_SUMMARIZE_INSTRUCTION.to_string(),
            combine_instruction: DEFAULT_COMBINE_INSTRUCTION.to_string(),
            concurrency_limit: 4,
            max_reduce_rounds: 5,
            best_effort: false,
            invoke_timeout: None,
            max_invocations: None,
        }
    }

    /// Set the instruction used to combine partial summaries.
    ///
    /// # Errors
    ///
    /// Returns an error if `instruction` is blank.
    pub fn with_combine_instruction(mut self, instruction: impl Into<String>) -> Result<Self> {
        let instruction = instruction.into();
        require_instruction("combine_instruction", &instruction)?;
        self.combine_instruction = instruction;
        Ok(self)
    }

    /// Set the instruction used for the initial per-window map.
    ///
    /// # Errors
    ///
    /// Returns an error if `instruction` is blank.
    pub fn with_summarize_instruction(mut self, instruction: impl Into<String>) -> Result<Self> {
        let instruction = instruction.into();
        require_instruction("summarize_instruction", &instruction)?;
        self.summarize_instruction = instruction;
        Ok(self)
    }

    /// Use the summarize instruction preset for `verbosity`.
    #[must_use]
    pub fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.summarize_instruction = verbosity.summarize_instruction().to_string();
        self
    }

    /// Bound the number of map calls in flight.
    ///
    /// # Errors
    ///
    /// Returns an error if `limit == 0`.
    pub fn with_concurrency_limit(mut self, limit: usize) -> Result<Self> {
        if limit == 0 {
            return Err(ConfigError::ZeroConcurrency.into());
        }
        self.concurrency_limit = limit;
        Ok(self)
    }

    /// Cap the number of reduce rounds, each one a re-split of the partial
    /// summaries followed by another map.
    ///
    /// # Errors
    ///
    /// Returns an error if `rounds == 0`.
    pub fn with_max_reduce_rounds(mut self, rounds: usize) -> Result<Self> {
        if rounds == 0 {
            return Err(ConfigError::ZeroReduceRounds.into());
        }
        self.max_reduce_rounds = rounds;
        Ok(self)
    }

    /// Drop failed windows instead of failing the whole call.
    #[must_use]
    pub fn best_effort(mut self, enabled: bool) -> Self {
        self.best_effort = enabled;
        self
    }

    /// Give every model call a deadline.
    #[must_use]
    pub fn with_invoke_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.invoke_timeout = Some(timeout);
        self
    }

    /// Cap the number of model calls one `summarize` may make.
    #[must_use]
    pub fn with_max_invocations(mut self, limit: usize) -> Self {
        self.max_invocations = Some(limit);
        self
    }

    pub(crate) fn invoke_timeout(&self) -> Option<std::time::Duration> {
        self.invoke_timeout
    }

    pub(crate) fn max_invocations(&self) -> Option<usize> {
        self.max_invocations
    }

    /// The splitter used to re-split oversized reductions.
    #[must_use]
    pub fn splitter(&self) -> &S {
        &self.splitter
    }

    /// Summarize `windows` into a single string.
    ///
    /// No windows means nothing to summarize: the result is empty and the
    /// model is never called.
    ///
    /// # Errors
    ///
    /// Returns the first model failure (strict mode), the first failure when
    /// every window failed (best-effort mode), [`Error::BudgetExhausted`], or
    /// [`Error::ReduceDidNotConverge`].
    pub async fn summarize<I: ModelInvoker>(&self, windows: &[Window], invoker: &I) -> Result<String> {
        let dispatcher = Dispatcher::new(self.invoke_timeout, self.max_invocations);
        self.summarize_with(windows, invoker, &dispatcher).await
    }

    pub(crate) async fn summarize_with<I: ModelInvoker>(
        &self,
        windows: &[Window],
        invoker: &I,
        dispatcher: &Dispatcher,
    ) -> Result<String> {
        if windows.is_empty() {
            tracing::debug!("no windows to summarize");
            return Ok(String::new());
        }

        let span = tracing::info_span!("summarize", windows = windows.len());
        self.reduce(windows, invoker, dispatcher).instrument(span).await
    }

    async fn reduce<I: ModelInvoker>(
        &self,
        windows: &[Window],
        invoker: &I,
        dispatcher: &Dispatcher,
    ) -> Result<String> {
        let mut partials = self
            .map_pass(windows, &self.summarize_instruction, 0, invoker, dispatcher)
            .await?;
        let mut previous = usize::MAX;
        let mut round = 0;

        loop {
            let combined = partials.join(PARTIAL_SEPARATOR);
            let length = self.splitter.measure(&combined);

            if length <= self.splitter.max_size() {
                tracing::debug!(round, partials = partials.len(), length, "combining");
                let prompt = build_prompt(&self.combine_instruction, &combined);
                let summary = dispatcher
                    .dispatch(invoker, prompt, Stage::Combine { round })
                    .await?;
                tracing::info!(rounds = round, invocations = dispatcher.used(), "summary complete");
                return Ok(summary);
            }

            if round >= self.max_reduce_rounds {
                return Err(Error::ReduceDidNotConverge {
                    rounds: round,
                    length,
                });
            }
            if length >= previous {
                tracing::warn!(round, length, previous, "reduce round did not shrink the text");
            }
            previous = length;
            round += 1;

            let sub_windows = self.splitter.split(&combined);
            tracing::debug!(round, length, windows = sub_windows.len(), "re-splitting partial summaries");
            partials = self
                .map_pass(&sub_windows, &self.combine_instruction, round, invoker, dispatcher)
                .await?;
        }
    }

    /// Run `instruction` over every window, at most `concurrency_limit` at a
    /// time. Output order follows window order.
    async fn map_pass<I: ModelInvoker>(
        &self,
        windows: &[Window],
        instruction: &str,
        round: usize,
        invoker: &I,
        dispatcher: &Dispatcher,
    ) -> Result<Vec<String>> {
        let calls = futures::stream::iter(windows.iter().map(move |window| {
            let prompt = build_prompt(instruction, &window.text);
            let stage = Stage::Map {
                round,
                window: window.index,
            };
            dispatcher.dispatch(invoker, prompt, stage)
        }))
        .buffered(self.concurrency_limit);

        if !self.best_effort {
            return calls.try_collect().await;
        }

        let results: Vec<Result<String>> = calls.collect().await;
        let mut partials = Vec::with_capacity(results.len());
        let mut first_failure = None;

        for result in results {
            match result {
                Ok(partial) => partials.push(partial),
                Err(err) if err.is_model() => {
                    tracing::warn!(round, error = %err, "dropping failed window");
                    first_failure.get_or_insert(err);
                }
                Err(err) => return Err(err),
            }
        }

        match first_failure {
            Some(err) if partials.is_empty() => Err(err),
            _ => Ok(partials),
        }
    }
}

impl MapReduceSummarizer<RecursiveSplitter> {
    /// Build the summarizer described by a pipeline configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        config.validate()?;
        let mut summarizer = Self::new(RecursiveSplitter::from_config(config)?)
            .with_summarize_instruction(config.summarize_instruction.clone())?
            .with_combine_instruction(config.combine_instruction.clone())?
            .with_concurrency_limit(config.concurrency_limit)?
            .with_max_reduce_rounds(config.max_reduce_rounds)?
            .best_effort(config.best_effort);
        summarizer.invoke_timeout = config.invoke_timeout();
        summarizer.max_invocations = config.max_invocations;
        Ok(summarizer)
    }
}
