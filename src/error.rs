//! Error types for condense.

use std::fmt;

use crate::config::ConfigError;
use crate::invoker::InvokeError;

/// Where in a run a model invocation happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Per-window summarization. Round 0 is the initial map over the input
    /// windows; later rounds map over re-split partial summaries.
    Map {
        /// Reduce round that issued the call.
        round: usize,
        /// Index of the window within that round.
        window: usize,
    },
    /// The final call that combines all partial summaries.
    Combine {
        /// Reduce rounds run before the partials fit; 0 when the initial
        /// map already fits.
        round: usize,
    },
    /// One step of a sequential refinement chain.
    Refine {
        /// Zero-based step index.
        step: usize,
    },
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Map { round, window } => write!(f, "map round {round}, window {window}"),
            Self::Combine { round } => write!(f, "combine round {round}"),
            Self::Refine { step } => write!(f, "refine step {step}"),
        }
    }
}

/// Errors that can occur while running a pipeline.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Splitter or pipeline parameters were rejected before any model call.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(#[from] ConfigError),

    /// The model invoker failed.
    #[error("model invocation failed at {stage}: {source}")]
    Model {
        /// Where the failing call was made.
        stage: Stage,
        /// The invoker's error.
        #[source]
        source: InvokeError,
    },

    /// Recursive reduction kept producing text too large for one call.
    #[error("reduce did not converge after {rounds} round(s); combined length still {length}")]
    ReduceDidNotConverge {
        /// Reduce rounds run.
        rounds: usize,
        /// Measured length of the last combined text.
        length: usize,
    },

    /// The per-run invocation budget ran out.
    #[error("invocation budget of {limit} call(s) exhausted")]
    BudgetExhausted {
        /// The configured budget.
        limit: usize,
    },

    /// A refinement chain stopped early. `partial` holds the text produced by
    /// the last successful step.
    #[error("refinement halted after {completed} step(s): {source}")]
    RefineHalted {
        /// Steps that completed before the failure.
        completed: usize,
        /// Accumulated text up to the last successful step.
        partial: String,
        /// Why the failing step stopped.
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// The originating model error, if this failure came from the invoker.
    #[must_use]
    pub fn invoke_error(&self) -> Option<&InvokeError> {
        match self {
            Self::Model { source, .. } => Some(source),
            Self::RefineHalted { source, .. } => source.invoke_error(),
            _ => None,
        }
    }

    /// The stage of the failing call, if any.
    #[must_use]
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Model { stage, .. } => Some(*stage),
            Self::RefineHalted { source, .. } => source.stage(),
            _ => None,
        }
    }

    /// Partially refined text, present only when a refinement chain halted.
    #[must_use]
    pub fn partial(&self) -> Option<&str> {
        match self {
            Self::RefineHalted { partial, .. } => Some(partial),
            _ => None,
        }
    }

    pub(crate) fn is_model(&self) -> bool {
        matches!(self, Self::Model { .. })
    }
}

/// Result type for condense operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_display() {
        assert_eq!(
            Stage::Map { round: 0, window: 3 }.to_string(),
            "map round 0, window 3"
        );
        assert_eq!(Stage::Refine { step: 2 }.to_string(), "refine step 2");
    }

    #[test]
    fn test_halted_exposes_partial_and_cause() {
        let err = Error::RefineHalted {
            completed: 1,
            partial: "draft".into(),
            source: Box::new(Error::Model {
                stage: Stage::Refine { step: 1 },
                source: InvokeError::Refusal("no".into()),
            }),
        };

        assert_eq!(err.partial(), Some("draft"));
        assert_eq!(err.stage(), Some(Stage::Refine { step: 1 }));
        assert!(matches!(err.invoke_error(), Some(InvokeError::Refusal(_))));
        assert!(err.to_string().contains("after 1 step(s)"));
    }

    #[test]
    fn test_config_error_converts() {
        let err: Error = ConfigError::InvalidChunkSize(0).into();
        assert!(matches!(err, Error::InvalidConfiguration(_)));
        assert!(err.invoke_error().is_none());
    }
}
