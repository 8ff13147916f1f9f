use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clock::next_timestamp;
use crate::compactor::CompressedMemory;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One dialogue turn. Compaction summaries are ordinary system turns
/// carrying their `CompressedMemory` so a later pass can recognise them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    pub ts: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<CompressedMemory>,
}

impl Turn {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            ts: next_timestamp(),
            summary: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            ts: next_timestamp(),
            summary: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            ts: next_timestamp(),
            summary: None,
        }
    }

    pub fn compacted(summary: CompressedMemory) -> Self {
        Self {
            role: Role::System,
            content: summary.render(),
            ts: next_timestamp(),
            summary: Some(summary),
        }
    }

    pub fn is_summary(&self) -> bool {
        self.summary.is_some()
    }
}

/// Per-session dialogue history, owned by the processor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub turns: Vec<Turn>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            turns: Vec::new(),
        }
    }

    pub fn with_system_prompt(prompt: impl Into<String>) -> Self {
        let mut session = Self::new();
        session.turns.push(Turn::system(prompt));
        session
    }

    pub fn add_turn(&mut self, turn: Turn) {
        self.turns.push(turn);
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
