use serde::{Deserialize, Serialize};

use crate::clock::next_timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultKind {
    StreamStart,
    Compaction,
    CompactionSummary,
    Assistant,
    ToolResult,
    SystemResult,
    Info,
    Error,
    ModelFallback,
}

impl ResultKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultKind::StreamStart => "stream_start",
            ResultKind::Compaction => "compaction",
            ResultKind::CompactionSummary => "compaction_summary",
            ResultKind::Assistant => "assistant",
            ResultKind::ToolResult => "tool_result",
            ResultKind::SystemResult => "system_result",
            ResultKind::Info => "info",
            ResultKind::Error => "error",
            ResultKind::ModelFallback => "model_fallback",
        }
    }

    /// Exactly one of these ends every directive.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ResultKind::Assistant | ResultKind::ToolResult | ResultKind::Error
        )
    }
}

/// The consumer's sole output type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamingResult {
    pub kind: ResultKind,
    pub content: String,
    pub ts: i64,
}

impl StreamingResult {
    pub fn new(kind: ResultKind, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
            ts: next_timestamp(),
        }
    }

    pub fn stream_start() -> Self {
        Self::new(ResultKind::StreamStart, "")
    }

    pub fn compaction(original: usize, compacted: usize) -> Self {
        Self::new(
            ResultKind::Compaction,
            format!("context compacted: {original} -> {compacted} turns"),
        )
    }

    pub fn compaction_summary(summary: impl Into<String>) -> Self {
        Self::new(ResultKind::CompactionSummary, summary)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(ResultKind::Assistant, content)
    }

    pub fn tool_result(content: impl Into<String>) -> Self {
        Self::new(ResultKind::ToolResult, content)
    }

    pub fn system_result(content: impl Into<String>) -> Self {
        Self::new(ResultKind::SystemResult, content)
    }

    pub fn info(content: impl Into<String>) -> Self {
        Self::new(ResultKind::Info, content)
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self::new(ResultKind::Error, content)
    }

    pub fn model_fallback(content: impl Into<String>) -> Self {
        Self::new(ResultKind::ModelFallback, content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_serialize_snake_case() {
        let result = StreamingResult::new(ResultKind::StreamStart, "");
        let json = serde_json::to_string(&result).expect("serialize");
        assert!(json.contains(r#""kind":"stream_start""#));
    }

    #[test]
    fn terminal_kinds_are_exactly_three() {
        let all = [
            ResultKind::StreamStart,
            ResultKind::Compaction,
            ResultKind::CompactionSummary,
            ResultKind::Assistant,
            ResultKind::ToolResult,
            ResultKind::SystemResult,
            ResultKind::Info,
            ResultKind::Error,
            ResultKind::ModelFallback,
        ];
        let terminal: Vec<_> = all.iter().filter(|kind| kind.is_terminal()).collect();
        assert_eq!(terminal.len(), 3);
    }

    #[test]
    fn timestamps_increase_between_results() {
        let first = StreamingResult::stream_start();
        let second = StreamingResult::assistant("hi");
        assert!(second.ts > first.ts);
    }
}
