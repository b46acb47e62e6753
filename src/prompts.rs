//! Instructions sent to the model and the rule for assembling prompts.
//!
//! A prompt is always the instruction, a blank line, then the text it
//! applies to. Keeping one assembly rule means a stub invoker in tests can
//! find the payload with `prompt.split_once("\n\n")`.

/// Default instruction for the initial map over input windows.
pub const DEFAULT_SUMMARIZE_INSTRUCTION: &str = "Write a concise summary of the following passage.";

/// Default instruction for combining partial summaries.
pub const DEFAULT_COMBINE_INSTRUCTION: &str =
    "Combine the following partial summaries into a single concise summary. Keep every distinct point once.";

const DETAILED_SUMMARIZE_INSTRUCTION: &str = "Write a detailed summary of the following passage. \
     Preserve names, figures, and the order in which arguments are made.";

/// How much detail a summarize instruction asks for.
///
/// Short instructions leave the model room to pad; longer ones trade prompt
/// size for tighter output. Pick `Detailed` when the summary feeds further
/// refinement steps that need the specifics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Verbosity {
    /// A short, focused summary.
    #[default]
    Concise,
    /// A summary that keeps names, figures and ordering.
    Detailed,
}

impl Verbosity {
    /// The summarize instruction for this verbosity.
    #[must_use]
    pub fn summarize_instruction(self) -> &'static str {
        match self {
            Self::Concise => DEFAULT_SUMMARIZE_INSTRUCTION,
            Self::Detailed => DETAILED_SUMMARIZE_INSTRUCTION,
        }
    }
}

/// Assemble the prompt for one invocation.
#[must_use]
pub fn build_prompt(instruction: &str, text: &str) -> String {
    format!("{instruction}\n\n{text}")
}
