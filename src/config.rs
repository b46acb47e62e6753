//! Pipeline configuration.
//!
//! Every knob of a run lives in [`PipelineConfig`]. It can be built in code
//! with the `with_*` methods or loaded from TOML:
//!
//! ```rust
//! use condense::PipelineConfig;
//!
//! let config = PipelineConfig::from_toml_str(r#"
//!     max_size = 2000
//!     overlap = 100
//!     concurrency_limit = 8
//!     refine_steps = ["List the key claims.", "Rewrite as three bullet points."]
//! "#).unwrap();
//!
//! assert_eq!(config.max_size, 2000);
//! assert_eq!(config.combine_instruction, condense::prompts::DEFAULT_COMBINE_INSTRUCTION);
//! ```
//!
//! Fields left out of the TOML take their defaults. Loading validates the
//! result, so a config that deserializes is also usable.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::length::LengthUnit;
use crate::prompts::{self, Verbosity};
use crate::recursive::DEFAULT_SEPARATORS;

/// Errors raised when parameters are rejected before any model call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Invalid window size (must be > 0).
    #[error("invalid chunk size: {0} (must be > 0)")]
    InvalidChunkSize(usize),

    /// Overlap must be strictly smaller than the window size.
    #[error("overlap {overlap} must be smaller than chunk size {size}")]
    OverlapExceedsSize {
        /// The window size.
        size: usize,
        /// The overlap that was too large.
        overlap: usize,
    },

    /// The separator list was empty.
    #[error("separator list must not be empty")]
    NoSeparators,

    /// A required instruction was blank.
    #[error("{field} must not be empty")]
    EmptyInstruction {
        /// Name of the offending field.
        field: &'static str,
    },

    /// A refinement step had a blank instruction.
    #[error("refine step {index} has an empty instruction")]
    EmptyStep {
        /// Index of the offending step.
        index: usize,
    },

    /// Map-phase concurrency must be at least 1.
    #[error("concurrency limit must be > 0")]
    ZeroConcurrency,

    /// At least one reduce round is required.
    #[error("max reduce rounds must be > 0")]
    ZeroReduceRounds,

    /// The TOML source could not be parsed.
    #[error("failed to parse configuration: {0}")]
    Toml(String),
}

/// Configuration for a full split, summarize, refine run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum window length, in `length_unit`.
    pub max_size: usize,
    /// Target overlap between adjacent windows, in `length_unit`.
    pub overlap: usize,
    /// Separator hierarchy, coarsest first. `""` splits into graphemes.
    pub separators: Vec<String>,
    /// Unit for `max_size` and `overlap`.
    pub length_unit: LengthUnit,
    /// Maximum map-phase invocations in flight.
    pub concurrency_limit: usize,
    /// Instruction for the initial per-window map.
    pub summarize_instruction: String,
    /// Instruction for reduce-phase maps and the final combine.
    pub combine_instruction: String,
    /// Ordered refinement instructions applied to the summary.
    pub refine_steps: Vec<String>,
    /// Reduce rounds (re-split, then map again) allowed before giving up
    /// with `ReduceDidNotConverge`.
    pub max_reduce_rounds: usize,
    /// Drop failed windows instead of failing the whole map.
    pub best_effort: bool,
    /// Per-invocation deadline in milliseconds.
    pub invoke_timeout_ms: Option<u64>,
    /// Cap on model invocations per run.
    pub max_invocations: Option<usize>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_size: 1000,
            overlap: 200,
            separators: DEFAULT_SEPARATORS.iter().map(|&s| s.to_string()).collect(),
            length_unit: LengthUnit::default(),
            concurrency_limit: 4,
            summarize_instruction: prompts::DEFAULT_SUMMARIZE_INSTRUCTION.to_string(),
            combine_instruction: prompts::DEFAULT_COMBINE_INSTRUCTION.to_string(),
            refine_steps: Vec::new(),
            max_reduce_rounds: 5,
            best_effort: false,
            invoke_timeout_ms: None,
            max_invocations: None,
        }
    }
}

impl PipelineConfig {
    /// Parse and validate a TOML configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Toml`] on malformed input, or the first
    /// validation failure.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source).map_err(|e| ConfigError::Toml(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check every field.
    ///
    /// # Errors
    ///
    /// Returns the first invalid parameter found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_window(self.max_size, self.overlap)?;
        if self.separators.is_empty() {
            return Err(ConfigError::NoSeparators);
        }
        if self.concurrency_limit == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        if self.max_reduce_rounds == 0 {
            return Err(ConfigError::ZeroReduceRounds);
        }
        require_instruction("summarize_instruction", &self.summarize_instruction)?;
        require_instruction("combine_instruction", &self.combine_instruction)?;
        validate_steps(self.refine_steps.iter().map(String::as_str))
    }

    /// The per-invocation deadline, if any.
    #[must_use]
    pub fn invoke_timeout(&self) -> Option<Duration> {
        self.invoke_timeout_ms.map(Duration::from_millis)
    }

    /// Set the maximum window length.
    #[must_use]
    pub fn with_max_size(mut self, n: usize) -> Self {
        self.max_size = n;
        self
    }

    /// Set the overlap between adjacent windows.
    #[must_use]
    pub fn with_overlap(mut self, n: usize) -> Self {
        self.overlap = n;
        self
    }

    /// Set the unit lengths are measured in.
    #[must_use]
    pub fn with_length_unit(mut self, unit: LengthUnit) -> Self {
        self.length_unit = unit;
        self
    }

    /// Set the number of map calls in flight.
    #[must_use]
    pub fn with_concurrency_limit(mut self, n: usize) -> Self {
        self.concurrency_limit = n;
        self
    }

    /// Set the combine instruction.
    #[must_use]
    pub fn with_combine_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.combine_instruction = instruction.into();
        self
    }

    /// Set the per-window summarize instruction.
    #[must_use]
    pub fn with_summarize_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.summarize_instruction = instruction.into();
        self
    }

    /// Replace the refinement steps.
    #[must_use]
    pub fn with_refine_steps<I, S>(mut self, steps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.refine_steps = steps.into_iter().map(Into::into).collect();
        self
    }

    /// Use the summarize instruction preset for `verbosity`.
    #[must_use]
    pub fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.summarize_instruction = verbosity.summarize_instruction().to_string();
        self
    }

    /// Drop failed windows instead of failing the run.
    #[must_use]
    pub fn with_best_effort(mut self, v: bool) -> Self {
        self.best_effort = v;
        self
    }

    /// Give every model call a deadline.
    #[must_use]
    pub fn with_invoke_timeout(mut self, timeout: Duration) -> Self {
        self.invoke_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Cap the model calls per run.
    #[must_use]
    pub fn with_max_invocations(mut self, n: usize) -> Self {
        self.max_invocations = Some(n);
        self
    }
}

pub(crate) fn validate_window(max_size: usize, overlap: usize) -> Result<(), ConfigError> {
    if max_size == 0 {
        return Err(ConfigError::InvalidChunkSize(max_size));
    }
    if overlap >= max_size {
        return Err(ConfigError::OverlapExceedsSize {
            size: max_size,
            overlap,
        });
    }
    Ok(())
}

pub(crate) fn require_instruction(field: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        Err(ConfigError::EmptyInstruction { field })
    } else {
        Ok(())
    }
}

pub(crate) fn validate_steps<'a>(steps: impl IntoIterator<Item = &'a str>) -> Result<(), ConfigError> {
    match steps.into_iter().position(|s| s.trim().is_empty()) {
        Some(index) => Err(ConfigError::EmptyStep { index }),
        None => Ok(()),
    }
}
