//! Prompt preprocessing and validation ahead of any model work.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::AgentError;

const DEFAULT_DENIED_PATTERNS: &[&str] = &[
    r"(?i)rm\s+-rf\s+/",
    r"(?i)drop\s+table",
    r"(?i)ignore\s+(all\s+|previous\s+)+instructions",
    r"(?i)reveal\s+(the\s+)?system\s+prompt",
];

static DEFAULT_DENIED: Lazy<Vec<Regex>> = Lazy::new(|| {
    DEFAULT_DENIED_PATTERNS
        .iter()
        .filter_map(|pattern| Regex::new(pattern).ok())
        .collect()
});

/// Rejects empty, oversized, or denied prompts. A rejection is fatal to the
/// directive and never retried.
pub struct SecurityGate {
    max_prompt_len: usize,
    denied: Vec<Regex>,
}

impl SecurityGate {
    pub fn new(max_prompt_len: usize, patterns: &[String]) -> Result<Self, regex::Error> {
        let denied = patterns
            .iter()
            .map(|pattern| Regex::new(pattern))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            max_prompt_len,
            denied,
        })
    }

    pub fn with_defaults(max_prompt_len: usize) -> Self {
        Self {
            max_prompt_len,
            denied: DEFAULT_DENIED.clone(),
        }
    }

    pub fn check(&self, prompt: &str) -> Result<(), AgentError> {
        let trimmed = prompt.trim();
        if trimmed.is_empty() {
            return Err(AgentError::Security("empty prompt".to_string()));
        }
        if trimmed.chars().count() > self.max_prompt_len {
            return Err(AgentError::Security(format!(
                "prompt exceeds {} characters",
                self.max_prompt_len
            )));
        }
        for pattern in &self.denied {
            if pattern.is_match(trimmed) {
                return Err(AgentError::Security(format!(
                    "denied pattern matched: {}",
                    pattern.as_str()
                )));
            }
        }
        Ok(())
    }
}
