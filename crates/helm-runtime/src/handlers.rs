//! System probes: small out-of-band queries answered without the model.

use std::sync::Arc;

use helm_core::memory::MemoryStore;

pub trait SystemHandler: Send + Sync {
    fn handle(&self, value: &str) -> String;
}

/// Answers `memory-stats`, `clear-memory` and `agent-status` over the shared
/// memory store. Anything else gets an informational error string.
pub struct DefaultSystemHandler {
    memory: Arc<MemoryStore>,
    variant: String,
}

impl DefaultSystemHandler {
    pub fn new(memory: Arc<MemoryStore>, variant: impl Into<String>) -> Self {
        Self {
            memory,
            variant: variant.into(),
        }
    }
}

impl SystemHandler for DefaultSystemHandler {
    fn handle(&self, value: &str) -> String {
        match value.trim() {
            "memory-stats" => {
                let stats = self.memory.stats();
                format!(
                    "memory: {} items, {} tokens",
                    stats.items, stats.total_tokens
                )
            }
            "clear-memory" => {
                self.memory.clear();
                "memory cleared".to_string()
            }
            "agent-status" => format!(
                "agent ready ({}); {} directives completed",
                self.variant,
                self.memory.len()
            ),
            other => format!("Unknown system command: {other}"),
        }
    }
}
