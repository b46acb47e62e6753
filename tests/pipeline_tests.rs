//! End-to-end tests over stub models.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use condense::{
    Error, InvokeError, MapReduceSummarizer, Pipeline, PipelineConfig, RecursiveSplitter,
    SequentialRefiner, Splitter, Stage,
};

/// The text after the instruction.
fn payload(prompt: &str) -> &str {
    prompt.split_once("\n\n").map_or(prompt, |(_, text)| text)
}

/// Records every prompt and answers with `answer(prompt)`.
#[derive(Clone, Default)]
struct Recorder {
    prompts: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    fn model(
        &self,
        answer: fn(&str) -> Result<String, InvokeError>,
    ) -> impl Fn(String) -> std::future::Ready<Result<String, InvokeError>> + Send + Sync {
        let prompts = self.prompts.clone();
        move |prompt: String| {
            let out = answer(&prompt);
            prompts.lock().unwrap().push(prompt);
            std::future::ready(out)
        }
    }

    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

fn long_text() -> String {
    "abcd ".repeat(480)
}

// =============================================================================
// Summarization
// =============================================================================

#[test]
fn long_text_splits_into_three_windows() {
    let splitter = RecursiveSplitter::new(1000, 200).unwrap();
    let windows = splitter.split(&long_text());
    assert_eq!(windows.len(), 3);
    assert!(windows.iter().all(|w| w.text.chars().count() <= 1000));
}

#[tokio::test]
async fn combine_sees_every_partial() {
    let recorder = Recorder::default();
    let model = recorder.model(|prompt| {
        let head: String = payload(prompt).chars().take(10).collect();
        Ok(format!("S({head})"))
    });

    let splitter = RecursiveSplitter::new(1000, 200).unwrap();
    let windows = splitter.split(&long_text());
    let summary = MapReduceSummarizer::new(splitter)
        .summarize(&windows, &model)
        .await
        .unwrap();

    let prompts = recorder.prompts();
    assert_eq!(prompts.len(), 4);
    let combine = prompts.last().unwrap();
    assert_eq!(payload(combine).matches("S(").count(), 3);
    assert!(summary.starts_with("S(S("));
}

#[tokio::test]
async fn shrinking_model_converges() {
    let recorder = Recorder::default();
    let model = recorder.model(|prompt| {
        let text = payload(prompt);
        let keep = text.chars().count() / 3;
        Ok(text.chars().take(keep).collect())
    });

    let text = "Some words that go on and on. ".repeat(80);
    let splitter = RecursiveSplitter::new(300, 0).unwrap();
    let windows = splitter.split(&text);
    let summary = MapReduceSummarizer::new(splitter)
        .summarize(&windows, &model)
        .await
        .unwrap();

    assert!(summary.chars().count() <= 100);
    // More calls than windows: at least one reduce round happened
    assert!(recorder.prompts().len() > windows.len() + 1);
}

#[tokio::test]
async fn echo_model_hits_round_cap() {
    let model = |prompt: String| async move { Ok::<_, InvokeError>(payload(&prompt).to_string()) };

    let splitter = RecursiveSplitter::new(100, 0).unwrap();
    let windows = splitter.split(&"filler text ".repeat(50));
    let err = MapReduceSummarizer::new(splitter)
        .with_max_reduce_rounds(2)
        .unwrap()
        .summarize(&windows, &model)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::ReduceDidNotConverge { rounds: 2, .. }));
}

#[tokio::test]
async fn best_effort_survives_one_bad_window() {
    let model = |prompt: String| async move {
        if payload(&prompt).contains("poison") {
            Err(InvokeError::Refusal("no".into()))
        } else {
            Ok("fine".to_string())
        }
    };

    let splitter = RecursiveSplitter::new(20, 0).unwrap();
    let windows = splitter.split("alpha beta gamma\n\npoison pill here\n\ndelta epsilon");
    assert_eq!(windows.len(), 3);

    let strict = MapReduceSummarizer::new(splitter.clone())
        .summarize(&windows, &model)
        .await
        .unwrap_err();
    assert_eq!(strict.stage(), Some(Stage::Map { round: 0, window: 1 }));

    let lenient = MapReduceSummarizer::new(splitter)
        .best_effort(true)
        .summarize(&windows, &model)
        .await
        .unwrap();
    assert_eq!(lenient, "fine");
}

// =============================================================================
// Refinement
// =============================================================================

#[tokio::test]
async fn steps_run_in_order() {
    let recorder = Recorder::default();
    let model = recorder.model(|prompt| Ok(format!("{}|", payload(prompt))));

    let out = SequentialRefiner::new(["s1", "s2"])
        .refine("start", &model)
        .await
        .unwrap();

    let prompts = recorder.prompts();
    assert_eq!(prompts, vec!["s1\n\nstart", "s2\n\nstart|"]);
    assert_eq!(out, "start||");
}

#[tokio::test]
async fn unavailable_model_halts_at_first_step() {
    let model = |_prompt: String| async { Err::<String, _>(InvokeError::Unavailable("offline".into())) };

    let err = SequentialRefiner::new(["extract", "rank"])
        .refine("initial report", &model)
        .await
        .unwrap_err();

    let Error::RefineHalted { completed, partial, .. } = &err else {
        panic!("expected RefineHalted, got {err}");
    };
    assert_eq!(*completed, 0);
    assert_eq!(partial, "initial report");
    assert_eq!(err.stage(), Some(Stage::Refine { step: 0 }));
}

#[tokio::test]
async fn no_steps_returns_input() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let model = move |prompt: String| {
        counter.fetch_add(1, Ordering::SeqCst);
        async move { Ok::<_, InvokeError>(prompt) }
    };

    let out = SequentialRefiner::new(Vec::<String>::new())
        .refine("as is", &model)
        .await
        .unwrap();
    assert_eq!(out, "as is");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn slow_step_times_out() {
    let model = |_prompt: String| async {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok::<_, InvokeError>("too late".to_string())
    };

    let err = SequentialRefiner::new(["think hard"])
        .with_invoke_timeout(Duration::from_millis(20))
        .refine("question", &model)
        .await
        .unwrap_err();

    assert_eq!(err.partial(), Some("question"));
    assert!(matches!(err.invoke_error(), Some(InvokeError::Timeout(_))));
}

// =============================================================================
// Pipeline
// =============================================================================

#[tokio::test]
async fn pipeline_runs_every_stage() {
    let recorder = Recorder::default();
    let model = recorder.model(|prompt| Ok(format!("[{}]", payload(prompt).len())));

    let config = PipelineConfig::default()
        .with_max_size(1000)
        .with_overlap(200)
        .with_refine_steps(["Extract the claims.", "Rank them."]);
    let out = Pipeline::from_config(&config)
        .unwrap()
        .run(&long_text(), &model)
        .await
        .unwrap();

    // 3 map calls, 1 combine, 2 steps
    let prompts = recorder.prompts();
    assert_eq!(prompts.len(), 6);
    assert!(prompts[4].starts_with("Extract the claims."));
    assert!(prompts[5].starts_with("Rank them."));
    assert!(out.starts_with('['));
}

#[tokio::test]
async fn pipeline_budget_counts_all_stages() {
    let model = |_prompt: String| async { Ok::<_, InvokeError>("ok".to_string()) };

    let config = PipelineConfig::default()
        .with_max_size(1000)
        .with_overlap(200)
        .with_max_invocations(2);
    let err = Pipeline::from_config(&config)
        .unwrap()
        .run(&long_text(), &model)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::BudgetExhausted { limit: 2 }));
}

#[tokio::test]
async fn pipeline_empty_input_skips_summary() {
    let recorder = Recorder::default();
    let model = recorder.model(|prompt| Ok(format!("refined:{}", payload(prompt))));

    let config = PipelineConfig::default().with_refine_steps(["Polish."]);
    let out = Pipeline::from_config(&config)
        .unwrap()
        .run("", &model)
        .await
        .unwrap();

    assert_eq!(recorder.prompts(), vec!["Polish.\n\n"]);
    assert_eq!(out, "refined:");
}

#[test]
fn pipeline_from_toml() {
    let config = PipelineConfig::from_toml_str(
        r#"
        max_size = 500
        overlap = 50
        refine_steps = ["Summarize the risks."]
        "#,
    )
    .unwrap();

    let pipeline = Pipeline::from_config(&config).unwrap();
    assert_eq!(pipeline.splitter().max_size(), 500);
    assert_eq!(pipeline.splitter().overlap(), 50);
}
