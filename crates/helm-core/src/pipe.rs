//! Single-producer message pipe with completion and error terminal states.
//!
//! `MsgPipe` is the primitive every pipeline stage speaks: an unbounded FIFO
//! that a reader can await while empty, that the producer completes exactly
//! once, and that carries an error latch for in-band failure reporting.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::Stream;
use tokio::sync::Notify;

use crate::error::PipeError;

/// Observable pipe state. Transitions are one-way apart from the error
/// latch, which (by default) clears once a read has delivered it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipeState {
    Running,
    Completed,
    Errored,
}

/// The sole shape returned by pipe reads: either a value or the terminal
/// `done` marker. `done == true` implies `value == None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage<T> {
    pub done: bool,
    pub value: Option<T>,
}

impl<T> QueueMessage<T> {
    pub fn value(value: T) -> Self {
        Self {
            done: false,
            value: Some(value),
        }
    }

    pub fn done() -> Self {
        Self {
            done: true,
            value: None,
        }
    }
}

struct Inner<T> {
    queue: VecDeque<T>,
    completed: bool,
    error: Option<PipeError>,
}

pub struct MsgPipe<T> {
    inner: Mutex<Inner<T>>,
    notify: Notify,
    sticky_errors: bool,
}

impl<T> Default for MsgPipe<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> MsgPipe<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                queue: VecDeque::new(),
                completed: false,
                error: None,
            }),
            notify: Notify::new(),
            sticky_errors: false,
        }
    }

    /// A pipe whose error latch is permanent: once `error` is set, every
    /// subsequent `read` fails with it. The strict alternative to the
    /// default one-shot contract.
    pub fn with_sticky_errors() -> Self {
        Self {
            sticky_errors: true,
            ..Self::new()
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends a value. Silently dropped once the pipe has completed.
    pub fn enqueue(&self, value: T) {
        {
            let mut inner = self.lock();
            if inner.completed {
                return;
            }
            inner.queue.push_back(value);
        }
        self.notify.notify_waiters();
    }

    /// Reads the next value, waiting while the pipe is empty.
    ///
    /// Delivery order: a latched error first (cleared on delivery unless the
    /// pipe was built with [`MsgPipe::with_sticky_errors`]), then queued
    /// values in FIFO order, then `{done: true}` once completed and drained.
    /// An error here is a transient signal — the pipe remains usable and the
    /// caller is expected to read again.
    pub async fn read(&self) -> Result<QueueMessage<T>, PipeError> {
        loop {
            let notified = self.notify.notified();
            {
                let mut inner = self.lock();
                if let Some(error) = inner.error.clone() {
                    if !self.sticky_errors {
                        inner.error = None;
                    }
                    return Err(error);
                }
                if let Some(value) = inner.queue.pop_front() {
                    return Ok(QueueMessage::value(value));
                }
                if inner.completed {
                    return Ok(QueueMessage::done());
                }
            }
            notified.await;
        }
    }

    /// One-way transition to `Completed`. Pending reads drain the queue,
    /// then observe `{done: true}`. Idempotent.
    pub fn complete(&self) {
        {
            let mut inner = self.lock();
            if inner.completed {
                return;
            }
            inner.completed = true;
        }
        self.notify.notify_waiters();
    }

    /// Latches an error for the next read. By default the latch is one-shot:
    /// delivering the error clears it, and the read after that observes
    /// ordinary value/completion semantics. Dropped silently once completed.
    pub fn error(&self, message: impl Into<String>) {
        {
            let mut inner = self.lock();
            if inner.completed {
                return;
            }
            inner.error = Some(PipeError::new(message));
        }
        self.notify.notify_waiters();
    }

    pub fn state(&self) -> PipeState {
        let inner = self.lock();
        if inner.error.is_some() {
            PipeState::Errored
        } else if inner.completed {
            PipeState::Completed
        } else {
            PipeState::Running
        }
    }

    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().queue.is_empty()
    }
}

impl<T: Send + 'static> MsgPipe<T> {
    /// Iterator view: yields values until `{done: true}` is observed.
    /// Latched errors are yielded as `Err` and the stream continues.
    pub fn stream(self: Arc<Self>) -> impl Stream<Item = Result<T, PipeError>> {
        async_stream::stream! {
            loop {
                match self.read().await {
                    Ok(message) if message.done => break,
                    Ok(message) => {
                        if let Some(value) = message.value {
                            yield Ok(value);
                        }
                    }
                    Err(error) => yield Err(error),
                }
            }
        }
    }
}
