//! Split, summarize, refine: the whole long-context reduction in one call.

use std::time::Duration;

use tracing::Instrument;

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::invoker::{Dispatcher, ModelInvoker};
use crate::{MapReduceSummarizer, RecursiveSplitter, SequentialRefiner, Splitter, Window};

/// A configured long-context reduction pipeline.
///
/// One [`run`](Pipeline::run) splits the input, map-reduces the windows into a
/// summary and pushes the summary through the refinement steps. Every run is
/// independent; the invocation budget starts from zero each time and is
/// shared by all three stages.
///
/// ```rust
/// use condense::{InvokeError, Pipeline, PipelineConfig};
///
/// # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
/// let config = PipelineConfig::default()
///     .with_max_size(200)
///     .with_overlap(20)
///     .with_refine_steps(["Translate to pig latin."]);
/// let pipeline = Pipeline::from_config(&config).unwrap();
///
/// let model = |prompt: String| async move { Ok::<_, InvokeError>(format!("{} chars", prompt.len())) };
/// let out = pipeline.run(&"A long report. ".repeat(100), &model).await.unwrap();
/// assert!(out.ends_with("chars"));
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct Pipeline {
    summarizer: MapReduceSummarizer<RecursiveSplitter>,
    refiner: SequentialRefiner,
    invoke_timeout: Option<Duration>,
    max_invocations: Option<usize>,
}

impl Pipeline {
    /// Assemble a pipeline from its parts.
    ///
    /// The summarizer's splitter also splits the raw input. A timeout or
    /// budget set on the summarizer governs the whole run; where the
    /// summarizer has none, the refiner's applies instead.
    #[must_use]
    pub fn new(summarizer: MapReduceSummarizer<RecursiveSplitter>, refiner: SequentialRefiner) -> Self {
        let invoke_timeout = summarizer.invoke_timeout().or(refiner.invoke_timeout());
        let max_invocations = summarizer.max_invocations().or(refiner.max_invocations());
        Self {
            summarizer,
            refiner,
            invoke_timeout,
            max_invocations,
        }
    }

    /// Build a pipeline from a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`](crate::Error::InvalidConfiguration)
    /// if any parameter is rejected.
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        Ok(Self::new(
            MapReduceSummarizer::from_config(config)?,
            SequentialRefiner::from_config(config),
        ))
    }

    /// The splitter applied to raw input.
    #[must_use]
    pub fn splitter(&self) -> &RecursiveSplitter {
        self.summarizer.splitter()
    }

    /// Reduce `text` to a single refined result.
    ///
    /// Empty input produces an empty summary, which is still passed through
    /// the refinement steps.
    ///
    /// # Errors
    ///
    /// Any error from the summarizer, or [`Error::RefineHalted`](crate::Error::RefineHalted)
    /// carrying the partial result when a refinement step fails.
    pub async fn run<I: ModelInvoker>(&self, text: &str, invoker: &I) -> Result<String> {
        let dispatcher = Dispatcher::new(self.invoke_timeout, self.max_invocations);
        let windows = self.splitter().split(text);
        let span = tracing::info_span!("pipeline", text_len = text.len(), windows = windows.len());

        self.run_stages(&windows, invoker, &dispatcher)
            .instrument(span)
            .await
    }

    async fn run_stages<I: ModelInvoker>(
        &self,
        windows: &[Window],
        invoker: &I,
        dispatcher: &Dispatcher,
    ) -> Result<String> {
        let summary = self
            .summarizer
            .summarize_with(windows, invoker, dispatcher)
            .await?;
        let result = self.refiner.refine_with(summary, invoker, dispatcher).await?;
        tracing::info!(invocations = dispatcher.used(), "pipeline complete");
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::error::{Error, Stage};
    use crate::invoker::InvokeError;

    #[tokio::test]
    async fn test_stages_run_in_order() {
        let prompts = Arc::new(Mutex::new(Vec::new()));
        let log = prompts.clone();
        let model = move |p: String| {
            log.lock().unwrap().push(p);
            async { Ok::<_, InvokeError>("ok".to_string()) }
        };
        let config = PipelineConfig::default().with_refine_steps(["polish"]);

        let out = Pipeline::from_config(&config)
            .unwrap()
            .run("short input", &model)
            .await
            .unwrap();

        assert_eq!(out, "ok");
        let prompts = prompts.lock().unwrap();
        assert_eq!(prompts.len(), 3);
        assert!(prompts[0].ends_with("short input"));
        assert!(prompts[2].starts_with("polish"));
    }

    #[tokio::test]
    async fn test_budget_shared_across_stages() {
        let model = |_p: String| async { Ok::<_, InvokeError>("s".to_string()) };
        let config = PipelineConfig::default()
            .with_refine_steps(["one", "two"])
            .with_max_invocations(3);

        let err = Pipeline::from_config(&config)
            .unwrap()
            .run("tiny", &model)
            .await
            .unwrap_err();

        // map + combine + first step fit; the second step does not
        assert_eq!(err.partial(), Some("s"));
        let Error::RefineHalted { source, .. } = err else {
            panic!("expected RefineHalted");
        };
        assert!(matches!(*source, Error::BudgetExhausted { limit: 3 }));
    }

    #[tokio::test]
    async fn test_summary_failure_is_not_halted() {
        let model = |_p: String| async { Err::<String, _>(InvokeError::Unavailable("down".into())) };
        let config = PipelineConfig::default().with_refine_steps(["never"]);

        let err = Pipeline::from_config(&config)
            .unwrap()
            .run("input", &model)
            .await
            .unwrap_err();
        assert_eq!(err.stage(), Some(Stage::Map { round: 0, window: 0 }));
        assert!(err.partial().is_none());
    }

    #[tokio::test]
    async fn test_refiner_budget_applies_to_whole_run() {
        let model = |_p: String| async { Ok::<_, InvokeError>("s".to_string()) };
        let summarizer = MapReduceSummarizer::new(RecursiveSplitter::new(100, 0).unwrap());
        let refiner = SequentialRefiner::new(["step"]).with_max_invocations(1);

        // The map call fits the budget; the combine call does not
        let err = Pipeline::new(summarizer, refiner)
            .run("tiny", &model)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BudgetExhausted { limit: 1 }));
    }

    #[tokio::test]
    async fn test_summarizer_timeout_wins() {
        let model = |_p: String| async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok::<_, InvokeError>("slow".to_string())
        };
        let summarizer = MapReduceSummarizer::new(RecursiveSplitter::new(100, 0).unwrap())
            .with_invoke_timeout(Duration::from_millis(5));
        let refiner = SequentialRefiner::default().with_invoke_timeout(Duration::from_secs(10));

        let err = Pipeline::new(summarizer, refiner)
            .run("tiny", &model)
            .await
            .unwrap_err();
        assert_eq!(
            err.invoke_error(),
            Some(&InvokeError::Timeout(Duration::from_millis(5)))
        );
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = PipelineConfig::default().with_overlap(5000);
        assert!(matches!(
            Pipeline::from_config(&config),
            Err(Error::InvalidConfiguration(_))
        ));
    }
}
