//! Sequential refinement: a fixed chain of instructions over a growing result.
//!
//! ```text
//! S0 (initial text) --step 0--> S1 --step 1--> S2 ... --step n-1--> Sn (result)
//! ```
//!
//! Every transition is one model call whose prompt is the step's instruction
//! followed by the previous state. Nothing runs in parallel: step `k` needs
//! the output of step `k - 1`.
//!
//! If a step fails, the text produced so far is not thrown away. The error
//! ([`Error::RefineHalted`]) carries the last good state and how many steps
//! completed, so a caller can keep a half-finished analysis or retry from
//! where it stopped.

use tracing::Instrument;

use crate::config::{validate_steps, PipelineConfig};
use crate::error::{Error, Result, Stage};
use crate::invoker::{Dispatcher, ModelInvoker};
use crate::prompts::build_prompt;

/// One instruction in a refinement chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineStep {
    instruction: String,
}

impl PipelineStep {
    /// Create a step from its instruction.
    #[must_use]
    pub fn new(instruction: impl Into<String>) -> Self {
        Self {
            instruction: instruction.into(),
        }
    }

    /// The instruction text.
    #[must_use]
    pub fn instruction(&self) -> &str {
        &self.instruction
    }
}

impl From<&str> for PipelineStep {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for PipelineStep {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Applies an ordered list of steps to an accumulating text.
///
/// ```rust
/// use condense::{InvokeError, SequentialRefiner};
///
/// # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
/// let model = |prompt: String| async move {
///     let (instruction, text) = prompt.split_once("\n\n").unwrap_or((prompt.as_str(), ""));
///     Ok::<_, InvokeError>(format!("{text}+{}", instruction.len()))
/// };
///
/// let refiner = SequentialRefiner::new(["ab", "cde"]);
/// assert_eq!(refiner.refine("x", &model).await.unwrap(), "x+2+3");
/// # });
/// ```
#[derive(Debug, Clone, Default)]
pub struct SequentialRefiner {
    steps: Vec<PipelineStep>,
    invoke_timeout: Option<std::time::Duration>,
    max_invocations: Option<usize>,
}

impl SequentialRefiner {
    /// Create a refiner from its steps, in application order.
    pub fn new<I, S>(steps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<PipelineStep>,
    {
        Self {
            steps: steps.into_iter().map(Into::into).collect(),
            invoke_timeout: None,
            max_invocations: None,
        }
    }

    /// Build the refiner described by a pipeline configuration.
    #[must_use]
    pub fn from_config(config: &PipelineConfig) -> Self {
        let mut refiner = Self::new(config.refine_steps.iter().cloned());
        refiner.invoke_timeout = config.invoke_timeout();
        refiner.max_invocations = config.max_invocations;
        refiner
    }

    /// Give every step's model call a deadline.
    #[must_use]
    pub fn with_invoke_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.invoke_timeout = Some(timeout);
        self
    }

    /// Cap the number of model calls one `refine` may make.
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

    /// The steps, in application order.
    #[must_use]
    pub fn steps(&self) -> &[PipelineStep] {
        &self.steps
    }

    /// Run every step over `initial_text`.
    ///
    /// With no steps the input comes back unchanged and the model is never
    /// called.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] before any call if a step is
    /// blank, or [`Error::RefineHalted`] with the last good text if a step
    /// fails.
    pub async fn refine<I: ModelInvoker>(&self, initial_text: &str, invoker: &I) -> Result<String> {
        let dispatcher = Dispatcher::new(self.invoke_timeout, self.max_invocations);
        self.refine_with(initial_text.to_owned(), invoker, &dispatcher).await
    }

    pub(crate) async fn refine_with<I: ModelInvoker>(
        &self,
        initial_text: String,
        invoker: &I,
        dispatcher: &Dispatcher,
    ) -> Result<String> {
        validate_steps(self.steps.iter().map(PipelineStep::instruction))?;
        if self.steps.is_empty() {
            return Ok(initial_text);
        }

        let span = tracing::info_span!("refine", steps = self.steps.len());
        self.run_chain(initial_text, invoker, dispatcher)
            .instrument(span)
            .await
    }

    async fn run_chain<I: ModelInvoker>(
        &self,
        initial_text: String,
        invoker: &I,
        dispatcher: &Dispatcher,
    ) -> Result<String> {
        let mut state = initial_text;

        for (step, pipeline_step) in self.steps.iter().enumerate() {
            let prompt = build_prompt(pipeline_step.instruction(), &state);
            match dispatcher.dispatch(invoker, prompt, Stage::Refine { step }).await {
                Ok(next) => {
                    tracing::debug!(step, len = next.len(), "refine step complete");
                    state = next;
                }
                Err(err) => {
                    tracing::warn!(step, error = %err, "refinement halted");
                    return Err(Error::RefineHalted {
                        completed: step,
                        partial: state,
                        source: Box::new(err),
                    });
                }
            }
        }

        Ok(state)
    }
}
