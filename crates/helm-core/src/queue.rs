//! FIFO command queue with snapshot/remove semantics for the driver.

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Notify;

use crate::clock::next_timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandMode {
    Prompt,
    Tool,
    System,
}

impl fmt::Display for CommandMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CommandMode::Prompt => "prompt",
            CommandMode::Tool => "tool",
            CommandMode::System => "system",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unsupported command mode: {0}")]
pub struct UnsupportedMode(pub String);

impl FromStr for CommandMode {
    type Err = UnsupportedMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "prompt" => Ok(CommandMode::Prompt),
            "tool" => Ok(CommandMode::Tool),
            "system" => Ok(CommandMode::System),
            other => Err(UnsupportedMode(other.to_string())),
        }
    }
}

/// One unit of work for the processor. `seq` is assigned by the queue at
/// enqueue time and is the identity used for removal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Command {
    pub mode: CommandMode,
    pub value: String,
    pub ts: i64,
    #[serde(default)]
    seq: u64,
}

impl Command {
    pub fn new(mode: CommandMode, value: impl Into<String>) -> Self {
        Self {
            mode,
            value: value.into(),
            ts: next_timestamp(),
            seq: 0,
        }
    }

    pub fn prompt(value: impl Into<String>) -> Self {
        Self::new(CommandMode::Prompt, value)
    }

    pub fn tool(value: impl Into<String>) -> Self {
        Self::new(CommandMode::Tool, value)
    }

    pub fn system(value: impl Into<String>) -> Self {
        Self::new(CommandMode::System, value)
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }
}

struct Inner {
    items: VecDeque<Command>,
    next_seq: u64,
    closed: bool,
}

#[derive(Default)]
pub struct CmdQueue {
    inner: Mutex<Inner>,
    notify: Notify,
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            items: VecDeque::new(),
            next_seq: 0,
            closed: false,
        }
    }
}

impl CmdQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends a command, assigning its removal identity. Returns `false`
    /// (and drops the command) once the queue has been closed.
    pub fn enqueue(&self, mut command: Command) -> bool {
        {
            let mut inner = self.lock();
            if inner.closed {
                return false;
            }
            inner.next_seq += 1;
            command.seq = inner.next_seq;
            inner.items.push_back(command);
        }
        self.notify.notify_waiters();
        true
    }

    /// Stable copy of the pending commands, in FIFO order.
    pub fn snapshot(&self) -> Vec<Command> {
        self.lock().items.iter().cloned().collect()
    }

    /// Removes every command in `batch` by sequence identity. Removing a
    /// command that was already delivered is a no-op.
    pub fn remove_all(&self, batch: &[Command]) {
        let seqs: Vec<u64> = batch.iter().map(Command::seq).collect();
        let mut inner = self.lock();
        inner.items.retain(|command| !seqs.contains(&command.seq));
    }

    /// Pops the oldest pending command, if any.
    pub fn pop(&self) -> Option<Command> {
        self.lock().items.pop_front()
    }

    /// Waits until the queue is non-empty. Returns `false` once the queue
    /// has been closed and drained.
    pub async fn wait(&self) -> bool {
        loop {
            let notified = self.notify.notified();
            {
                let inner = self.lock();
                if !inner.items.is_empty() {
                    return true;
                }
                if inner.closed {
                    return false;
                }
            }
            notified.await;
        }
    }

    /// No further enqueues are accepted; pending commands stay drainable.
    pub fn close(&self) {
        self.lock().closed = true;
        self.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }
}
