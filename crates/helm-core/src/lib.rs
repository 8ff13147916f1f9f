pub mod clock;
pub mod compactor;
pub mod config;
pub mod error;
pub mod events;
pub mod lines;
pub mod memory;
pub mod parser;
pub mod pipe;
pub mod queue;
pub mod security;
pub mod session;

pub use compactor::{estimate_tokens, CompactionOutcome, CompactorConfig, CompressedMemory, ContextCompactor};
pub use config::SteeringConfig;
pub use error::{AgentError, PipeError, SteeringError};
pub use events::{ResultKind, StreamingResult};
pub use lines::LineStream;
pub use memory::{MemoryError, MemoryItem, MemoryStats, MemoryStore};
pub use parser::{extract_text, parse_line, MessageOrigin, MessageParser, UserMessage};
pub use pipe::{MsgPipe, PipeState, QueueMessage};
pub use queue::{CmdQueue, Command, CommandMode, UnsupportedMode};
pub use security::SecurityGate;
pub use session::{Role, Session, Turn};
