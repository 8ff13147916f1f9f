//! The cancellable, retryable, context-compacting directive driver.

use std::sync::Arc;

use futures::Stream;
use tokio_util::sync::CancellationToken;

use helm_core::compactor::ContextCompactor;
use helm_core::events::{ResultKind, StreamingResult};
use helm_core::memory::MemoryStore;
use helm_core::pipe::MsgPipe;
use helm_core::security::SecurityGate;
use helm_core::session::{Session, Turn};
use helm_llm::{ErrorClass, ModelClient};
use helm_tools::ToolEngine;

use crate::config::LoopConfig;
use crate::retry::{RetryPhase, RetryPolicy};
use crate::specialization::{GeneralSpecialization, Specialization};

/// Executes one directive end-to-end: compaction, security gate, model call
/// with retry/fallback (or a tool call when the prompt carries a trigger
/// token), memory update.
///
/// Emits non-terminal results on the sink pipe and returns exactly one
/// terminal result per run. `abort` is idempotent and observed at every
/// suspension point, including back-off sleeps.
pub struct AgentLoop {
    model: Arc<dyn ModelClient>,
    fallback: Option<Arc<dyn ModelClient>>,
    tools: Arc<dyn ToolEngine>,
    memory: Arc<MemoryStore>,
    compactor: ContextCompactor,
    security: SecurityGate,
    specialization: Arc<dyn Specialization>,
    policy: RetryPolicy,
    config: LoopConfig,
    cancel: CancellationToken,
}

impl AgentLoop {
    pub fn new(
        model: Arc<dyn ModelClient>,
        tools: Arc<dyn ToolEngine>,
        memory: Arc<MemoryStore>,
        config: LoopConfig,
    ) -> Self {
        Self {
            model,
            fallback: None,
            tools,
            memory,
            compactor: ContextCompactor::default(),
            security: SecurityGate::with_defaults(32_768),
            specialization: Arc::new(GeneralSpecialization),
            policy: RetryPolicy::from_config(&config),
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Secondary model used after the first retryable failure.
    pub fn with_fallback(mut self, fallback: Arc<dyn ModelClient>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn with_compactor(mut self, compactor: ContextCompactor) -> Self {
        self.compactor = compactor;
        self
    }

    pub fn with_security(mut self, security: SecurityGate) -> Self {
        self.security = security;
        self
    }

    pub fn with_specialization(mut self, specialization: Arc<dyn Specialization>) -> Self {
        self.specialization = specialization;
        self
    }

    /// Idempotent; in-flight work observes the cancellation at its next
    /// suspension point. A cancelled loop stays cancelled.
    pub fn abort(&self) {
        self.cancel.cancel();
    }

    pub fn is_aborted(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn specialization_variant(&self) -> &str {
        self.specialization.variant()
    }

    /// Runs one directive. Non-terminal results go to `sink`; the terminal
    /// `assistant` / `tool_result` / `error` is returned (not enqueued).
    pub async fn run(
        &self,
        session: &mut Session,
        prompt: &str,
        sink: &MsgPipe<StreamingResult>,
    ) -> StreamingResult {
        log::debug!("[{}] running directive: {prompt}", session.id);
        let terminal = self.run_inner(session, prompt, sink).await;

        // Memory is the last step of a successful directive and is skipped
        // on abort/error, so cancellation never leaves it half-updated.
        if matches!(terminal.kind, ResultKind::Assistant | ResultKind::ToolResult) {
            if let Err(error) = self.memory.append(prompt, &terminal.content) {
                log::warn!("[{}] memory update failed: {error}", session.id);
            }
        }
        terminal
    }

    /// Streaming view over [`AgentLoop::run`]: yields every result,
    /// terminal included.
    pub fn run_stream(
        self: Arc<Self>,
        mut session: Session,
        prompt: String,
    ) -> impl Stream<Item = StreamingResult> {
        async_stream::stream! {
            let sink = Arc::new(MsgPipe::new());
            let task = tokio::spawn({
                let agent = Arc::clone(&self);
                let sink = Arc::clone(&sink);
                async move {
                    let terminal = agent.run(&mut session, &prompt, &sink).await;
                    sink.enqueue(terminal);
                    sink.complete();
                }
            });

            loop {
                match sink.read().await {
                    Ok(message) if message.done => break,
                    Ok(message) => {
                        if let Some(result) = message.value {
                            yield result;
                        }
                    }
                    Err(error) => log::warn!("loop sink error: {error}"),
                }
            }
            let _ = task.await;
        }
    }

    async fn run_inner(
        &self,
        session: &mut Session,
        prompt: &str,
        sink: &MsgPipe<StreamingResult>,
    ) -> StreamingResult {
        sink.enqueue(StreamingResult::stream_start());

        // The prompt becomes part of the dialogue record before compaction
        // runs, so the user-derived summary segments see it.
        session.add_turn(Turn::user(prompt));

        let outcome = self.compactor.compact_if_needed(&session.turns);
        if outcome.compacted {
            log::info!(
                "[{}] compacted history {} -> {} turns",
                session.id,
                outcome.original_count,
                outcome.compacted_count
            );
            sink.enqueue(StreamingResult::compaction(
                outcome.original_count,
                outcome.compacted_count,
            ));
            if let Some(summary) = outcome.turns.iter().find(|turn| turn.is_summary()) {
                sink.enqueue(StreamingResult::compaction_summary(summary.content.clone()));
            }
            session.turns = outcome.turns;
        }

        if self.cancel.is_cancelled() {
            return StreamingResult::error("aborted");
        }

        if let Err(error) = self.security.check(prompt) {
            log::warn!("[{}] directive rejected: {error}", session.id);
            return StreamingResult::error(error.to_string());
        }

        let prompt = match self.specialization.describe(prompt) {
            Some(hint) => {
                log::debug!(
                    "[{}] specialization hint ({}): {hint}",
                    session.id,
                    self.specialization.variant()
                );
                format!("{hint}\n\n{prompt}")
            }
            None => prompt.to_string(),
        };

        if self.is_tool_triggered(&prompt) {
            return match self.tools.execute(&prompt).await {
                Ok(result) => StreamingResult::tool_result(result),
                Err(error) => {
                    log::warn!("[{}] tool failure: {error}", session.id);
                    StreamingResult::tool_result(format!("Error: {error}"))
                }
            };
        }

        // The trailing turn is this directive's own prompt; it rides the
        // model call separately, so history is everything before it.
        let history_end = session.turns.len().saturating_sub(1);
        self.call_model_with_retry(&session.turns[..history_end], &prompt, sink)
            .await
    }

    fn is_tool_triggered(&self, prompt: &str) -> bool {
        let lowered = prompt.to_lowercase();
        self.config
            .tool_trigger_tokens
            .iter()
            .any(|token| lowered.contains(&token.to_lowercase()))
    }

    // Adapters that report failures in-band return `Error: ...` text.
    fn is_inband_error(text: &str) -> bool {
        text.trim_start().to_lowercase().starts_with("error:")
    }

    async fn call_model_with_retry(
        &self,
        history: &[Turn],
        prompt: &str,
        sink: &MsgPipe<StreamingResult>,
    ) -> StreamingResult {
        let mut phase = RetryPhase::Primary;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            if self.cancel.is_cancelled() {
                return StreamingResult::error("aborted");
            }

            let client = match (phase, self.fallback.as_ref()) {
                (RetryPhase::Fallback, Some(fallback)) => Arc::clone(fallback),
                _ => Arc::clone(&self.model),
            };

            let response = tokio::select! {
                _ = self.cancel.cancelled() => return StreamingResult::error("aborted"),
                response = client.invoke(history, prompt) => response,
            };

            let (class, message) = match response {
                Ok(text) if !Self::is_inband_error(&text) => {
                    log::debug!("[{}] attempt {attempt} succeeded", client.name());
                    return StreamingResult::assistant(text);
                }
                Ok(text) => (self.config.classifier.classify_text(&text), text),
                Err(error) => (self.config.classifier.classify(&error), error.to_string()),
            };

            log::warn!(
                "[{}] attempt {attempt} failed ({class:?}): {message}",
                client.name()
            );

            if class == ErrorClass::Critical {
                return StreamingResult::error(format!("model failure: {message}"));
            }
            if attempt >= self.policy.max_retries {
                return StreamingResult::error(format!(
                    "retries exhausted after {attempt} attempts: {message}"
                ));
            }

            if phase == RetryPhase::Primary && attempt == 1 {
                phase = RetryPhase::Fallback;
                let next = self
                    .fallback
                    .as_deref()
                    .map(|fallback| fallback.name())
                    .unwrap_or_else(|| self.model.name());
                sink.enqueue(StreamingResult::model_fallback(format!(
                    "switching to fallback model: {next}"
                )));
            }

            let delay = self.policy.delay(class, attempt);
            log::debug!("retrying in {}ms", delay.as_millis());
            tokio::select! {
                _ = self.cancel.cancelled() => return StreamingResult::error("aborted"),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
