//! End-to-end behaviour of the wired steering system.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use helm_core::events::{ResultKind, StreamingResult};
use helm_core::pipe::MsgPipe;
use helm_core::queue::Command;
use helm_core::session::Turn;
use helm_core::SteeringConfig;
use helm_llm::{ModelClient, ModelError};
use helm_runtime::SteeringSystem;
use helm_tools::{BuiltinToolEngine, ToolEngine};

struct StaticModel {
    reply: String,
}

impl StaticModel {
    fn new(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
        })
    }
}

#[async_trait]
impl ModelClient for StaticModel {
    async fn invoke(&self, _history: &[Turn], _prompt: &str) -> Result<String, ModelError> {
        Ok(self.reply.clone())
    }
}

struct EchoModel;

#[async_trait]
impl ModelClient for EchoModel {
    async fn invoke(&self, _history: &[Turn], prompt: &str) -> Result<String, ModelError> {
        Ok(format!("echo: {prompt}"))
    }
}

struct ScriptedModel {
    replies: Mutex<VecDeque<Result<String, ModelError>>>,
    calls: AtomicU32,
    label: &'static str,
}

impl ScriptedModel {
    fn new(label: &'static str, replies: Vec<Result<String, ModelError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            calls: AtomicU32::new(0),
            label,
        })
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    async fn invoke(&self, _history: &[Turn], _prompt: &str) -> Result<String, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ModelError::Api("script exhausted".to_string())))
    }

    fn name(&self) -> &str {
        self.label
    }
}

struct SlowFailingModel;

#[async_trait]
impl ModelClient for SlowFailingModel {
    async fn invoke(&self, _history: &[Turn], _prompt: &str) -> Result<String, ModelError> {
        tokio::time::sleep(Duration::from_secs(2)).await;
        Err(ModelError::Api("connection reset".to_string()))
    }
}

fn tools() -> Arc<dyn ToolEngine> {
    Arc::new(BuiltinToolEngine::with_builtins())
}

fn system(model: Arc<dyn ModelClient>) -> SteeringSystem {
    SteeringSystem::new(model, tools(), SteeringConfig::default())
}

/// Reads results until (and including) the first terminal one.
async fn read_directive(output: &MsgPipe<StreamingResult>) -> Vec<StreamingResult> {
    let mut results = Vec::new();
    loop {
        match output.read().await {
            Ok(message) if message.done => break,
            Ok(message) => {
                if let Some(result) = message.value {
                    let terminal = result.kind.is_terminal();
                    results.push(result);
                    if terminal {
                        break;
                    }
                }
            }
            Err(error) => panic!("unexpected pipe error: {error}"),
        }
    }
    results
}

fn kinds(results: &[StreamingResult]) -> Vec<ResultKind> {
    results.iter().map(|result| result.kind).collect()
}

#[tokio::test]
async fn plain_text_echo() {
    let steering = system(StaticModel::new("hi"));
    steering.start().expect("start");
    steering.send_input("hello\n").expect("send");

    let output = steering.output();
    let results = read_directive(&output).await;

    assert_eq!(
        kinds(&results),
        vec![ResultKind::StreamStart, ResultKind::Assistant]
    );
    assert!(results[1].content.contains("hi"));
    assert_eq!(steering.memory().len(), 1);

    steering.close().await;
}

#[tokio::test]
async fn strict_json_envelope() {
    let steering = system(Arc::new(EchoModel));
    steering.start().expect("start");
    steering
        .send_input("{\"type\":\"user\",\"message\":{\"role\":\"user\",\"content\":{\"text\":\"ping\"}}}\n")
        .expect("send");

    let output = steering.output();
    let results = read_directive(&output).await;

    assert_eq!(results.last().map(|r| r.kind), Some(ResultKind::Assistant));
    assert!(results.last().map(|r| r.content.contains("ping")).unwrap_or(false));

    steering.close().await;
}

#[tokio::test]
async fn tool_trigger_routes_to_engine() {
    let steering = system(StaticModel::new("unused"));
    steering.start().expect("start");
    steering.send_input("Calculate 2+2\n").expect("send");

    let output = steering.output();
    let results = read_directive(&output).await;

    let terminal = results.last().expect("terminal");
    assert_eq!(terminal.kind, ResultKind::ToolResult);
    assert_eq!(terminal.content, "4");
    assert_eq!(steering.memory().len(), 1);

    steering.close().await;
}

#[tokio::test(start_paused = true)]
async fn rate_limit_retry_and_fallback() {
    let primary = ScriptedModel::new("primary", vec![Ok("Error: 429 rate limit".to_string())]);
    let fallback = ScriptedModel::new(
        "fallback",
        vec![
            Ok("Error: 429 rate limit".to_string()),
            Ok("ok".to_string()),
        ],
    );
    let steering = SteeringSystem::with_parts(
        primary.clone(),
        Some(fallback.clone() as Arc<dyn ModelClient>),
        tools(),
        None,
        SteeringConfig::default(),
    );
    steering.start().expect("start");

    let started = tokio::time::Instant::now();
    steering.send_input("please respond\n").expect("send");

    let output = steering.output();
    let results = read_directive(&output).await;
    let elapsed = started.elapsed();

    assert_eq!(
        kinds(&results),
        vec![
            ResultKind::StreamStart,
            ResultKind::ModelFallback,
            ResultKind::Assistant,
        ]
    );
    assert_eq!(results.last().map(|r| r.content.as_str()), Some("ok"));
    assert_eq!(primary.calls() + fallback.calls(), 3);
    // Both back-offs are rate-limit floored at 5s; the second doubles.
    assert!(elapsed >= Duration::from_millis(12_500), "elapsed {elapsed:?}");
    assert_eq!(steering.memory().len(), 1);

    steering.close().await;
}

#[tokio::test(start_paused = true)]
async fn abort_mid_retry_leaves_memory_untouched() {
    let steering = Arc::new(system(Arc::new(SlowFailingModel)));
    steering.start().expect("start");
    steering.send_input("long running work\n").expect("send");

    let aborter = {
        let steering = Arc::clone(&steering);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            steering.abort("user").await;
        })
    };

    let output = steering.output();
    let results = read_directive(&output).await;
    aborter.await.expect("aborter");

    let terminal = results.last().expect("terminal");
    assert_eq!(terminal.kind, ResultKind::Error);
    assert_eq!(terminal.content, "aborted");
    assert!(steering.memory().is_empty());
    assert!(steering.status().closed);

    // No assistant/tool result ever surfaced for the aborted directive.
    assert!(results.iter().all(|r| !matches!(
        r.kind,
        ResultKind::Assistant | ResultKind::ToolResult
    )));

    // A fresh system picks up where the old one cannot.
    let replacement = system(StaticModel::new("back online"));
    replacement.start().expect("start");
    replacement.send_input("hello again\n").expect("send");
    let results = read_directive(&replacement.output()).await;
    assert_eq!(results.last().map(|r| r.kind), Some(ResultKind::Assistant));
    replacement.close().await;
}

#[tokio::test]
async fn compaction_emits_results_and_shrinks_history() {
    let steering = system(Arc::new(EchoModel));
    let mut turns = Vec::new();
    for i in 0..10 {
        turns.push(Turn::user(format!("question {i}")));
        turns.push(Turn::assistant(format!("answer {i}")));
    }
    steering.preload_turns(turns).await;
    steering.start().expect("start");
    steering.send_input("summarise our progress\n").expect("send");

    let output = steering.output();
    let results = read_directive(&output).await;

    assert_eq!(
        kinds(&results),
        vec![
            ResultKind::StreamStart,
            ResultKind::Compaction,
            ResultKind::CompactionSummary,
            ResultKind::Assistant,
        ]
    );

    // summary + 3 recent turns + the newly appended assistant turn
    let history = steering.history().await;
    assert_eq!(history.len(), 5);
    assert!(history[0].is_summary());
    assert_eq!(steering.memory().len(), 1);

    steering.close().await;
}

#[tokio::test]
async fn history_built_through_directives_compacts_with_user_segments() {
    let steering = system(Arc::new(EchoModel));
    steering.start().expect("start");
    let output = steering.output();

    let prompts = [
        "implement a streaming parser",
        "we need a task list for the rollout",
        "there is an error in the pipeline code",
        "tell me about the deployment",
        "what changed since yesterday",
        "summarise the open questions",
        "how are the retries behaving",
        "anything left before release",
    ];
    for prompt in prompts {
        steering.send_input(format!("{prompt}\n")).expect("send");
        read_directive(&output).await;
    }
    // Each directive records its prompt and its terminal.
    assert_eq!(steering.history().await.len(), 16);

    steering.send_input("how is it going\n").expect("send");
    let results = read_directive(&output).await;
    assert_eq!(
        kinds(&results),
        vec![
            ResultKind::StreamStart,
            ResultKind::Compaction,
            ResultKind::CompactionSummary,
            ResultKind::Assistant,
        ]
    );

    let history = steering.history().await;
    assert_eq!(history.len(), 5);
    let summary = history[0].summary.as_ref().expect("summary");
    assert!(summary
        .primary_request
        .contains("implement a streaming parser"));
    assert!(summary.pending_tasks.contains("task list"));
    assert!(summary.errors_and_fixes.contains("error in the pipeline"));
    assert!(summary
        .all_user_messages
        .contains("what changed since yesterday"));

    steering.close().await;
}

#[tokio::test]
async fn json_commands_extract_prompts_leniently() {
    let steering = system(Arc::new(EchoModel));
    steering.start().expect("start");
    let output = steering.output();

    steering
        .send_json_command(&serde_json::json!({ "content": "from the content key" }))
        .expect("send");
    let results = read_directive(&output).await;
    assert_eq!(
        results.last().map(|r| r.content.as_str()),
        Some("echo: from the content key")
    );

    steering
        .send_json_command(&serde_json::json!([{ "text": "alpha" }, { "note": "raw" }]))
        .expect("send");
    let results = read_directive(&output).await;
    let terminal = results.last().expect("terminal");
    assert_eq!(terminal.kind, ResultKind::Assistant);
    assert!(terminal.content.contains("alpha"));
    assert!(terminal.content.contains("note"));

    steering.close().await;
}

#[tokio::test]
async fn directives_complete_in_dispatch_order() {
    let steering = system(Arc::new(EchoModel));
    steering.start().expect("start");
    steering.send_input("first\nsec").expect("send");
    steering.send_input("ond\n").expect("send");

    let output = steering.output();
    let first = read_directive(&output).await;
    let second = read_directive(&output).await;

    assert_eq!(
        first.last().map(|r| r.content.as_str()),
        Some("echo: first")
    );
    assert_eq!(
        second.last().map(|r| r.content.as_str()),
        Some("echo: second")
    );

    steering.close().await;
}

#[tokio::test]
async fn empty_input_produces_nothing_until_close() {
    let steering = system(StaticModel::new("unused"));
    steering.start().expect("start");
    steering.send_input("\n   \n").expect("send");

    // Give the pipeline a moment; nothing must come out.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let output = steering.output();
    assert!(output.is_empty());
    assert!(!steering.status().processing);

    steering.close().await;
    let message = output.read().await.expect("read");
    assert!(message.done);
    assert_eq!(steering.memory().len(), 0);
}

#[tokio::test]
async fn system_commands_answer_probes() {
    let steering = system(StaticModel::new("hi"));
    steering.start().expect("start");

    steering.send_input("hello\n").expect("send");
    let output = steering.output();
    read_directive(&output).await;

    steering
        .send_command(Command::system("memory-stats"))
        .expect("send");
    // system_result is not terminal; read it directly.
    let probe = output
        .read()
        .await
        .expect("read")
        .value
        .expect("probe response");
    assert_eq!(probe.kind, ResultKind::SystemResult);
    assert!(probe.content.contains("1 items"));

    steering.close().await;
}

#[tokio::test]
async fn direct_tool_command_bypasses_the_model() {
    let steering = system(StaticModel::new("unused"));
    steering.start().expect("start");
    steering
        .send_command(Command::tool("calculate 6*7"))
        .expect("send");

    let output = steering.output();
    let results = read_directive(&output).await;
    let terminal = results.last().expect("terminal");
    assert_eq!(terminal.kind, ResultKind::ToolResult);
    assert_eq!(terminal.content, "42");

    steering.close().await;
}

#[tokio::test]
async fn unknown_raw_mode_surfaces_an_error_result() {
    let steering = system(StaticModel::new("unused"));
    steering.start().expect("start");
    steering.send_raw_command("batch", "whatever").expect("send");

    let output = steering.output();
    let results = read_directive(&output).await;
    let terminal = results.last().expect("terminal");
    assert_eq!(terminal.kind, ResultKind::Error);
    assert_eq!(terminal.content, "unsupported command mode: batch");

    steering.close().await;
}

#[tokio::test]
async fn lifecycle_is_single_start_and_idempotent_close() {
    let steering = system(StaticModel::new("hi"));
    steering.start().expect("start");
    assert!(steering.start().is_err());

    steering.close().await;
    steering.close().await; // idempotent
    assert!(steering.status().closed);
    assert!(steering.send_input("late\n").is_err());
    assert!(steering.send_command(Command::prompt("late")).is_err());
}

#[tokio::test]
async fn steering_accepts_input_mid_flight() {
    // A second directive can be enqueued while the first is processing.
    let steering = system(Arc::new(EchoModel));
    steering.start().expect("start");
    steering.send_input("one\n").expect("send");
    steering.send_input("two\n").expect("send");
    steering
        .send_command(Command::system("agent-status"))
        .expect("send");

    let output = steering.output();
    let first = read_directive(&output).await;
    let second = read_directive(&output).await;
    let probe = output
        .read()
        .await
        .expect("read")
        .value
        .expect("probe response");

    assert_eq!(first.last().map(|r| r.content.as_str()), Some("echo: one"));
    assert_eq!(second.last().map(|r| r.content.as_str()), Some("echo: two"));
    assert_eq!(probe.kind, ResultKind::SystemResult);

    steering.close().await;
}
