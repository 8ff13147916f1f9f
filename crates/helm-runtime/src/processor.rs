//! Command dispatch: one command in flight at a time, results on the
//! output pipe.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;

use helm_core::events::{ResultKind, StreamingResult};
use helm_core::pipe::MsgPipe;
use helm_core::queue::{CmdQueue, Command, CommandMode};
use helm_core::session::{Session, Turn};
use helm_loop::AgentLoop;
use helm_tools::ToolEngine;

use crate::handlers::SystemHandler;

/// Pulls commands and routes each by mode onto the agent loop, the tool
/// engine or the system handler.
///
/// At most one command is in flight per processor; that single-in-flight
/// invariant is what lets the agent loop touch session history and memory
/// without further locking.
pub struct StreamingProcessor {
    queue: Arc<CmdQueue>,
    output: Arc<MsgPipe<StreamingResult>>,
    agent: Arc<AgentLoop>,
    tools: Arc<dyn ToolEngine>,
    system: Arc<dyn SystemHandler>,
    session: Mutex<Session>,
    processing: AtomicBool,
}

impl StreamingProcessor {
    pub fn new(
        queue: Arc<CmdQueue>,
        output: Arc<MsgPipe<StreamingResult>>,
        agent: Arc<AgentLoop>,
        tools: Arc<dyn ToolEngine>,
        system: Arc<dyn SystemHandler>,
    ) -> Self {
        Self {
            queue,
            output,
            agent,
            tools,
            system,
            session: Mutex::new(Session::new()),
            processing: AtomicBool::new(false),
        }
    }

    pub fn output(&self) -> Arc<MsgPipe<StreamingResult>> {
        Arc::clone(&self.output)
    }

    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::SeqCst)
    }

    /// Cancels the in-flight agent loop (and every one after it).
    pub fn abort(&self) {
        self.agent.abort();
    }

    /// Stops intake; the worker drains what is queued, then completes the
    /// output pipe.
    pub fn complete(&self) {
        self.queue.close();
    }

    pub async fn preload_turns(&self, turns: Vec<Turn>) {
        self.session.lock().await.turns.extend(turns);
    }

    pub async fn history(&self) -> Vec<Turn> {
        self.session.lock().await.turns.clone()
    }

    /// Dispatches one command and publishes its results.
    pub async fn process(&self, command: Command) {
        self.processing.store(true, Ordering::SeqCst);
        log::debug!("dispatching {} command: {}", command.mode, command.value);

        match command.mode {
            CommandMode::Prompt => {
                let mut session = self.session.lock().await;
                let terminal = self
                    .agent
                    .run(&mut session, &command.value, self.output.as_ref())
                    .await;
                if matches!(
                    terminal.kind,
                    ResultKind::Assistant | ResultKind::ToolResult
                ) {
                    session.add_turn(Turn::assistant(terminal.content.clone()));
                }
                drop(session);
                self.output.enqueue(terminal);
            }
            CommandMode::Tool => {
                let result = match self.tools.execute(&command.value).await {
                    Ok(result) => StreamingResult::tool_result(result),
                    Err(error) => {
                        log::warn!("tool command failed: {error}");
                        StreamingResult::tool_result(format!("Error: {error}"))
                    }
                };
                self.output.enqueue(result);
            }
            CommandMode::System => {
                let response = self.system.handle(&command.value);
                self.output.enqueue(StreamingResult::system_result(response));
            }
        }

        self.processing.store(false, Ordering::SeqCst);
    }

    /// Standalone worker: `for command in queue`. Exits when the queue is
    /// closed and drained (completing the output pipe), or on a dispatch
    /// panic (erroring the output pipe instead).
    pub async fn run(self: Arc<Self>) {
        log::debug!("processor worker started");
        loop {
            if !self.queue.wait().await {
                break;
            }
            let Some(command) = self.queue.pop() else {
                continue;
            };

            let processor = Arc::clone(&self);
            let dispatch = tokio::spawn(async move { processor.process(command).await });
            match dispatch.await {
                Ok(()) => {}
                Err(join_error) if join_error.is_panic() => {
                    log::error!("dispatch panicked: {join_error}");
                    self.processing.store(false, Ordering::SeqCst);
                    self.output.error(format!("processor panic: {join_error}"));
                    return;
                }
                Err(join_error) => {
                    log::warn!("dispatch task failed: {join_error}");
                    return;
                }
            }
        }
        log::debug!("processor worker drained");
        self.output.complete();
    }
}
