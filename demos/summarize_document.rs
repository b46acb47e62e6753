//! Summarize a Document
//!
//! Runs the whole pipeline (split, map-reduce, refine) against a stand-in
//! model that answers with the first sentence of whatever it is given.
//!
//! ```bash
//! RUST_LOG=condense=debug cargo run --example summarize_document
//! ```

use condense::{Error, InvokeError, Pipeline, PipelineConfig, Splitter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Pretend model: keep the first sentence of the text after the instruction.
async fn first_sentence(prompt: String) -> Result<String, InvokeError> {
    let text = prompt.split_once("\n\n").map_or("", |(_, text)| text).trim();
    if text.is_empty() {
        return Err(InvokeError::Refusal("nothing to summarize".into()));
    }
    let end = text.find(". ").map_or(text.len(), |i| i + 1);
    Ok(text[..end].to_string())
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "condense=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let document = r"Machine learning models learn patterns from data. They generalize these patterns to make predictions on new, unseen examples. This is fundamentally different from traditional programming, where humans write explicit rules.

The training process involves three key steps. A forward pass produces predictions. The loss compares predictions against ground truth. Backpropagation sends gradients backward and updates the weights.

Deep learning extends this with multiple hidden layers. Each layer learns increasingly abstract representations. Early layers detect edges; later layers recognize objects.

Dr. Geoffrey Hinton pioneered backpropagation in the 1980s. His work at the University of Toronto, along with collaborators like Yann LeCun and Yoshua Bengio, laid the foundation for modern AI.";

    let config = PipelineConfig::default()
        .with_max_size(250)
        .with_overlap(40)
        .with_refine_steps(["List the key claims.", "Rewrite the claims as a headline."]);
    let pipeline = Pipeline::from_config(&config)?;

    let windows = pipeline.splitter().split(document);
    println!("Document: {} chars", document.chars().count());
    println!("Windows: {}\n", windows.len());
    for window in &windows {
        let preview: String = window.text.trim_start().chars().take(50).collect();
        println!("  {window}: \"{preview}...\"");
    }

    let result = pipeline.run(document, &first_sentence).await?;
    println!("\nResult: {result}");
    Ok(())
}
