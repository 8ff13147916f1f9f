use thiserror::Error;

/// Error latched on a pipe by its producer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("pipe error: {message}")]
pub struct PipeError {
    pub message: String,
}

impl PipeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Security rejection: {0}")]
    Security(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Tool error: {0}")]
    Tool(String),

    #[error("Memory error: {0}")]
    Memory(String),

    #[error("Pipe error: {0}")]
    Pipe(#[from] PipeError),

    #[error("aborted")]
    Cancelled,
}

#[derive(Error, Debug)]
pub enum SteeringError {
    #[error("Steering system already started")]
    AlreadyStarted,

    #[error("Steering system closed")]
    Closed,
}
