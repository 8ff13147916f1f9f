//! The steering system: wiring, lifecycle, abort.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;

use helm_core::compactor::{CompactorConfig, ContextCompactor};
use helm_core::config::SteeringConfig;
use helm_core::error::SteeringError;
use helm_core::events::StreamingResult;
use helm_core::lines::LineStream;
use helm_core::memory::MemoryStore;
use helm_core::parser::{extract_text, MessageParser, UserMessage};
use helm_core::pipe::MsgPipe;
use helm_core::queue::{CmdQueue, Command, CommandMode};
use helm_core::security::SecurityGate;
use helm_core::session::Turn;
use helm_llm::ModelClient;
use helm_loop::{AgentLoop, LoopConfig};
use helm_tools::ToolEngine;

use crate::handlers::{DefaultSystemHandler, SystemHandler};
use crate::processor::StreamingProcessor;

const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

fn make_pipe<T>(sticky: bool) -> MsgPipe<T> {
    if sticky {
        MsgPipe::with_sticky_errors()
    } else {
        MsgPipe::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SteeringStatus {
    pub closed: bool,
    pub processing: bool,
    pub driver_active: bool,
}

/// Owns the whole pipeline: raw chunks in, parsed messages, command queue,
/// processor, agent loop, results out.
///
/// Steering means new input is accepted at any time while earlier directives
/// are mid-flight; `abort` cascades termination through the stages in a
/// fixed order and is one-shot — after it, build a new system.
pub struct SteeringSystem {
    config: SteeringConfig,
    input: Arc<MsgPipe<String>>,
    parsed: Arc<MsgPipe<UserMessage>>,
    queue: Arc<CmdQueue>,
    output: Arc<MsgPipe<StreamingResult>>,
    processor: Arc<StreamingProcessor>,
    memory: Arc<MemoryStore>,
    started: AtomicBool,
    closed: AtomicBool,
    driver_active: Arc<AtomicBool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SteeringSystem {
    pub fn new(
        model: Arc<dyn ModelClient>,
        tools: Arc<dyn ToolEngine>,
        config: SteeringConfig,
    ) -> Self {
        Self::with_parts(model, None, tools, None, config)
    }

    pub fn with_parts(
        model: Arc<dyn ModelClient>,
        fallback: Option<Arc<dyn ModelClient>>,
        tools: Arc<dyn ToolEngine>,
        system_handler: Option<Arc<dyn SystemHandler>>,
        config: SteeringConfig,
    ) -> Self {
        let memory = Arc::new(MemoryStore::with_capacity(config.memory_capacity));
        let compactor = ContextCompactor::new(CompactorConfig {
            token_ratio: config.compaction_token_ratio,
            msg_count_cap: config.compaction_msg_count,
            max_tokens: config.max_token_limit,
            ..CompactorConfig::default()
        });

        let mut agent = AgentLoop::new(
            Arc::clone(&model),
            Arc::clone(&tools),
            Arc::clone(&memory),
            LoopConfig::from_steering(&config),
        )
        .with_compactor(compactor)
        .with_security(SecurityGate::with_defaults(config.max_prompt_len));
        if let Some(fallback) = fallback {
            agent = agent.with_fallback(fallback);
        }
        let agent = Arc::new(agent);

        let handler: Arc<dyn SystemHandler> = match system_handler {
            Some(handler) => handler,
            None => Arc::new(DefaultSystemHandler::new(
                Arc::clone(&memory),
                agent.specialization_variant().to_string(),
            )),
        };

        let queue = Arc::new(CmdQueue::new());
        let output = Arc::new(make_pipe(config.sticky_pipe_errors));
        let processor = Arc::new(StreamingProcessor::new(
            Arc::clone(&queue),
            Arc::clone(&output),
            agent,
            tools,
            handler,
        ));

        Self {
            input: Arc::new(make_pipe(config.sticky_pipe_errors)),
            parsed: Arc::new(make_pipe(config.sticky_pipe_errors)),
            queue,
            output,
            processor,
            memory,
            config,
            started: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            driver_active: Arc::new(AtomicBool::new(false)),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Spawns the parser, consumer and driver workers. Allowed once.
    pub fn start(&self) -> Result<(), SteeringError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SteeringError::Closed);
        }
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(SteeringError::AlreadyStarted);
        }
        log::info!("steering system starting");

        let parser = tokio::spawn(MessageParser::run(
            LineStream::new(Arc::clone(&self.input)),
            Arc::clone(&self.parsed),
        ));

        let consumer = tokio::spawn(Self::consume(
            Arc::clone(&self.parsed),
            Arc::clone(&self.queue),
        ));

        let driver = tokio::spawn(Self::drive(
            Arc::clone(&self.processor),
            Arc::clone(&self.queue),
            Arc::clone(&self.output),
            Arc::clone(&self.driver_active),
            Duration::from_millis(self.config.driver_command_timeout_ms),
        ));

        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        tasks.push(parser);
        tasks.push(consumer);
        tasks.push(driver);
        Ok(())
    }

    // Parsed messages -> PROMPT commands. The parser already extracted the
    // prompt text, so the mapping is direct.
    async fn consume(parsed: Arc<MsgPipe<UserMessage>>, queue: Arc<CmdQueue>) {
        loop {
            match parsed.read().await {
                Ok(message) if message.done => break,
                Ok(message) => {
                    if let Some(user_message) = message.value {
                        if !queue.enqueue(Command::prompt(user_message.content)) {
                            break;
                        }
                    }
                }
                Err(error) => log::warn!("parsed pipe error: {error}"),
            }
        }
        log::debug!("consumer exited");
    }

    // Snapshot, execute each under the per-command timeout, remove the
    // processed batch. A timed-out dispatch is dropped at its next await
    // and replaced by an error terminal so the per-directive contract
    // (exactly one terminal) holds.
    async fn drive(
        processor: Arc<StreamingProcessor>,
        queue: Arc<CmdQueue>,
        output: Arc<MsgPipe<StreamingResult>>,
        active: Arc<AtomicBool>,
        command_timeout: Duration,
    ) {
        active.store(true, Ordering::SeqCst);
        while queue.wait().await {
            let batch = queue.snapshot();
            if batch.is_empty() {
                continue;
            }
            for command in &batch {
                let dispatch = processor.process(command.clone());
                if tokio::time::timeout(command_timeout, dispatch).await.is_err() {
                    log::warn!(
                        "command timed out after {}ms: {}",
                        command_timeout.as_millis(),
                        command.value
                    );
                    output.enqueue(StreamingResult::error(format!(
                        "directive timed out: {}",
                        command.value
                    )));
                }
            }
            queue.remove_all(&batch);
        }
        active.store(false, Ordering::SeqCst);
        log::debug!("driver exited");
    }

    /// Feeds a raw chunk into the parser. Chunks may hold partial or
    /// multiple lines.
    pub fn send_input(&self, chunk: impl Into<String>) -> Result<(), SteeringError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SteeringError::Closed);
        }
        self.input.enqueue(chunk.into());
        Ok(())
    }

    /// Bypasses the parser and enqueues directly.
    pub fn send_command(&self, command: Command) -> Result<(), SteeringError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SteeringError::Closed);
        }
        self.queue.enqueue(command);
        Ok(())
    }

    /// String-typed variant for external callers; an unknown mode becomes an
    /// `unsupported command mode` error on the output pipe.
    pub fn send_raw_command(&self, mode: &str, value: &str) -> Result<(), SteeringError> {
        match mode.parse::<CommandMode>() {
            Ok(mode) => self.send_command(Command::new(mode, value)),
            Err(unsupported) => {
                log::warn!("{unsupported}");
                self.output.enqueue(StreamingResult::error(unsupported.to_string()));
                Ok(())
            }
        }
    }

    /// Accepts a structured content value (the shape a strict envelope
    /// carries), extracts the prompt text leniently — `text` key, then
    /// `content` key, then stringified; arrays item by item — and enqueues
    /// it as a PROMPT command.
    pub fn send_json_command(&self, content: &serde_json::Value) -> Result<(), SteeringError> {
        self.send_command(Command::prompt(extract_text(content)))
    }

    /// Borrow the result pipe for reading.
    pub fn output(&self) -> Arc<MsgPipe<StreamingResult>> {
        Arc::clone(&self.output)
    }

    pub fn memory(&self) -> Arc<MemoryStore> {
        Arc::clone(&self.memory)
    }

    /// Seeds dialogue history (e.g. a restored session) before directives
    /// arrive.
    pub async fn preload_turns(&self, turns: Vec<Turn>) {
        self.processor.preload_turns(turns).await;
    }

    pub async fn history(&self) -> Vec<Turn> {
        self.processor.history().await
    }

    pub fn status(&self) -> SteeringStatus {
        SteeringStatus {
            closed: self.closed.load(Ordering::SeqCst),
            processing: self.processor.is_processing(),
            driver_active: self.driver_active.load(Ordering::SeqCst),
        }
    }

    /// One-shot cascade: agent loop cancelled, command intake closed, parser
    /// output completed, input pipe completed; then a bounded drain of the
    /// workers and completion of the output pipe.
    pub async fn abort(&self, reason: &str) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        log::info!("aborting steering system: {reason}");

        self.processor.abort();
        self.queue.close();
        self.parsed.complete();
        self.input.complete();

        let handles: Vec<JoinHandle<()>> = {
            let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
            tasks.drain(..).collect()
        };
        for mut handle in handles {
            if tokio::time::timeout(DRAIN_TIMEOUT, &mut handle).await.is_err() {
                log::warn!("worker did not exit within drain window; aborting it");
                handle.abort();
            }
        }
        self.output.complete();
    }

    /// Alias for `abort("close")`; idempotent.
    pub async fn close(&self) {
        self.abort("close").await;
    }
}
