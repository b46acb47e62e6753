//! The model boundary.
//!
//! The pipeline never talks to a model directly. It is handed something that
//! implements [`ModelInvoker`]: an HTTP client for a hosted model, a local
//! inference engine, or a closure returning canned text in a test.
//!
//! Any `Fn(String) -> impl Future<Output = Result<String, InvokeError>>` is an
//! invoker:
//!
//! ```rust
//! use condense::{InvokeError, ModelInvoker};
//!
//! let shout = |prompt: String| async move { Ok::<_, InvokeError>(prompt.to_uppercase()) };
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! assert_eq!(shout.invoke("hi").await.unwrap(), "HI");
//! # });
//! ```

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::error::{Error, Result, Stage};

/// Failures reported by a model invoker.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvokeError {
    /// Network, authentication or provider failure.
    #[error("model unavailable: {0}")]
    Unavailable(String),

    /// The call did not finish before its deadline.
    #[error("model call timed out after {0:?}")]
    Timeout(Duration),

    /// The model declined to answer.
    #[error("model refused: {0}")]
    Refusal(String),
}

/// Sends a prompt to a language model and returns its text response.
pub trait ModelInvoker: Send + Sync {
    /// Invoke the model once.
    ///
    /// # Errors
    ///
    /// Returns an [`InvokeError`] if the model cannot be reached, times out,
    /// or refuses.
    fn invoke(&self, prompt: &str) -> impl Future<Output = std::result::Result<String, InvokeError>> + Send;
}

impl<F, Fut> ModelInvoker for F
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = std::result::Result<String, InvokeError>> + Send,
{
    fn invoke(&self, prompt: &str) -> impl Future<Output = std::result::Result<String, InvokeError>> + Send {
        self(prompt.to_owned())
    }
}

/// Applies per-run call policy (deadline and invocation budget) to every
/// model call made during one pipeline run.
#[derive(Debug)]
pub(crate) struct Dispatcher {
    timeout: Option<Duration>,
    limit: Option<usize>,
    used: AtomicUsize,
}

impl Dispatcher {
    pub(crate) fn new(timeout: Option<Duration>, limit: Option<usize>) -> Self {
        Self {
            timeout,
            limit,
            used: AtomicUsize::new(0),
        }
    }

    /// Calls made so far.
    pub(crate) fn used(&self) -> usize {
        self.used.load(Ordering::Relaxed)
    }

    fn charge(&self) -> Result<()> {
        let Some(limit) = self.limit else {
            self.used.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        };
        self.used
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| (n < limit).then_some(n + 1))
            .map(|_| ())
            .map_err(|_| Error::BudgetExhausted { limit })
    }

    /// Make one call, tagging any failure with `stage`.
    ///
    /// A call that outlives the deadline is dropped; whatever the remote side
    /// still does with it is discarded.
    pub(crate) async fn dispatch<I: ModelInvoker>(
        &self,
        invoker: &I,
        prompt: String,
        stage: Stage,
    ) -> Result<String> {
        self.charge()?;
        tracing::debug!(%stage, prompt_len = prompt.len(), "invoking model");

        let outcome = match self.timeout {
            Some(deadline) => tokio::time::timeout(deadline, invoker.invoke(&prompt))
                .await
                .unwrap_or(Err(InvokeError::Timeout(deadline))),
            None => invoker.invoke(&prompt).await,
        };

        outcome.map_err(|source| {
            tracing::debug!(%stage, error = %source, "model call failed");
            Error::Model { stage, source }
        })
    }
}
