//! Eight-segment structured compression of dialogue history.
//!
//! When a conversation outgrows the model's context budget, the drained
//! prefix is distilled into a single summary turn and only a short recent
//! window is kept verbatim. The summary preserves eight fixed facets of the
//! conversation so later turns keep their grounding.

use serde::{Deserialize, Serialize};

use crate::clock::next_timestamp;
use crate::session::{Role, Turn};

/// Heuristic token estimate for a piece of text.
///
/// Text dominated by CJK ideographs estimates `chars * 0.6`; everything else
/// estimates `words + 0.25 * chars`.
pub fn estimate_tokens(text: &str) -> u32 {
    if text.is_empty() {
        return 0;
    }

    let len = text.chars().count();
    let mut non_ws = 0usize;
    let mut cjk = 0usize;
    for c in text.chars().filter(|c| !c.is_whitespace()) {
        non_ws += 1;
        if ('\u{4E00}'..='\u{9FFF}').contains(&c) {
            cjk += 1;
        }
    }

    if non_ws > 0 && cjk * 2 > non_ws {
        (len as f64 * 0.6).ceil() as u32
    } else {
        let words = text.split_whitespace().count();
        (words as f64 + 0.25 * len as f64).ceil() as u32
    }
}

/// The eight summary segments. Immutable after creation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompressedMemory {
    pub primary_request: String,
    pub key_technical_concepts: String,
    pub files_and_code_sections: String,
    pub errors_and_fixes: String,
    pub problem_solving: String,
    pub all_user_messages: String,
    pub pending_tasks: String,
    pub current_work: String,
    pub ts: i64,
}

impl CompressedMemory {
    /// Renders the segments as the summary turn's content.
    pub fn render(&self) -> String {
        let sections: [(&str, &str); 8] = [
            ("Primary request", &self.primary_request),
            ("Key technical concepts", &self.key_technical_concepts),
            ("Files and code sections", &self.files_and_code_sections),
            ("Errors and fixes", &self.errors_and_fixes),
            ("Problem solving", &self.problem_solving),
            ("All user messages", &self.all_user_messages),
            ("Pending tasks", &self.pending_tasks),
            ("Current work", &self.current_work),
        ];

        let mut parts = vec!["## Conversation summary".to_string()];
        for (title, body) in sections {
            if !body.is_empty() {
                parts.push(format!("### {title}\n{body}"));
            }
        }
        parts.join("\n\n")
    }
}

#[derive(Debug, Clone)]
pub struct CompactorConfig {
    /// Compact once `estimated_tokens / max_tokens` exceeds this.
    pub token_ratio: f64,
    /// ... or once the turn count exceeds this.
    pub msg_count_cap: usize,
    pub max_tokens: u32,
    /// Turns kept verbatim after the summary.
    pub recent_window: usize,
    /// Histories shorter than this pass through unchanged.
    pub min_turns: usize,
    pub tech_lexicon: Vec<String>,
}

impl Default for CompactorConfig {
    fn default() -> Self {
        Self {
            token_ratio: 0.92,
            msg_count_cap: 15,
            max_tokens: 16_384,
            recent_window: 3,
            min_turns: 6,
            tech_lexicon: DEFAULT_TECH_LEXICON.iter().map(|s| s.to_string()).collect(),
        }
    }
}

const DEFAULT_TECH_LEXICON: &[&str] = &[
    "rust", "python", "java", "javascript", "typescript", "api", "http", "grpc", "sql",
    "database", "docker", "kubernetes", "async", "thread", "cache", "queue", "server",
    "client", "json", "yaml", "tokio", "compiler", "regex", "algorithm",
];

const PRIMARY_VERBS: &[&str] = &["implement", "create", "build", "add"];
const FILE_TERMS: &[&str] = &["file", "code", "function", "class", "method"];
const ERROR_TERMS: &[&str] = &["error", "exception", "fix", "resolve"];
const SOLVED_TERMS: &[&str] = &["resolved", "completed", "success"];
const TASK_TERMS: &[&str] = &["todo", "task", "need"];

#[derive(Debug, Clone)]
pub struct CompactionOutcome {
    pub turns: Vec<Turn>,
    pub compacted: bool,
    pub original_count: usize,
    pub compacted_count: usize,
}

impl CompactionOutcome {
    fn unchanged(turns: &[Turn]) -> Self {
        Self {
            turns: turns.to_vec(),
            compacted: false,
            original_count: turns.len(),
            compacted_count: turns.len(),
        }
    }
}

pub struct ContextCompactor {
    config: CompactorConfig,
}

impl Default for ContextCompactor {
    fn default() -> Self {
        Self::new(CompactorConfig::default())
    }
}

impl ContextCompactor {
    pub fn new(config: CompactorConfig) -> Self {
        Self { config }
    }

    pub fn estimate(&self, turns: &[Turn]) -> u32 {
        turns
            .iter()
            .map(|turn| estimate_tokens(&turn.content))
            .fold(0u32, u32::saturating_add)
    }

    pub fn should_compact(&self, turns: &[Turn]) -> bool {
        if turns.len() < self.config.min_turns {
            return false;
        }
        let ratio = f64::from(self.estimate(turns)) / f64::from(self.config.max_tokens.max(1));
        ratio > self.config.token_ratio || turns.len() > self.config.msg_count_cap
    }

    /// Compacts when the threshold is crossed; pass-through otherwise.
    /// Idempotent: a freshly compacted history sits under `min_turns` until
    /// new turns are appended.
    pub fn compact_if_needed(&self, turns: &[Turn]) -> CompactionOutcome {
        if !self.should_compact(turns) {
            return CompactionOutcome::unchanged(turns);
        }
        self.compact(turns)
    }

    pub fn compact(&self, turns: &[Turn]) -> CompactionOutcome {
        if turns.len() < self.config.min_turns {
            return CompactionOutcome::unchanged(turns);
        }

        let system = turns
            .iter()
            .find(|turn| turn.role == Role::System && !turn.is_summary())
            .cloned();
        let body: Vec<&Turn> = turns
            .iter()
            .filter(|turn| turn.role != Role::System || turn.is_summary())
            .collect();

        let window = self.config.recent_window.min(body.len());
        let split = body.len() - window;
        let (prefix, recent) = body.split_at(split);
        let summary = self.extract(prefix);

        let mut result = Vec::with_capacity(window + 2);
        if let Some(system_turn) = system {
            result.push(system_turn);
        }
        result.push(Turn::compacted(summary));
        result.extend(recent.iter().map(|turn| (*turn).clone()));

        CompactionOutcome {
            compacted: true,
            original_count: turns.len(),
            compacted_count: result.len(),
            turns: result,
        }
    }

    fn extract(&self, prefix: &[&Turn]) -> CompressedMemory {
        let lexicon: Vec<String> = self
            .config
            .tech_lexicon
            .iter()
            .map(|term| term.to_lowercase())
            .collect();
        let lexicon_refs: Vec<&str> = lexicon.iter().map(String::as_str).collect();

        let last_assistant: Vec<&str> = prefix
            .iter()
            .filter(|turn| turn.role == Role::Assistant)
            .rev()
            .take(2)
            .map(|turn| turn.content.as_str())
            .collect();
        let current_work = last_assistant
            .into_iter()
            .rev()
            .collect::<Vec<_>>()
            .join("; ");

        CompressedMemory {
            primary_request: join_matching(prefix, Role::User, PRIMARY_VERBS),
            key_technical_concepts: join_matching(prefix, Role::User, &lexicon_refs),
            files_and_code_sections: join_matching(prefix, Role::User, FILE_TERMS),
            errors_and_fixes: join_matching(prefix, Role::User, ERROR_TERMS),
            problem_solving: join_matching(prefix, Role::Assistant, SOLVED_TERMS),
            all_user_messages: prefix
                .iter()
                .filter(|turn| turn.role == Role::User)
                .map(|turn| turn.content.as_str())
                .collect::<Vec<_>>()
                .join("; "),
            pending_tasks: join_matching(prefix, Role::User, TASK_TERMS),
            current_work,
            ts: next_timestamp(),
        }
    }
}

fn join_matching(prefix: &[&Turn], role: Role, terms: &[&str]) -> String {
    prefix
        .iter()
        .filter(|turn| turn.role == role)
        .filter(|turn| {
            let lowered = turn.content.to_lowercase();
            terms.iter().any(|term| lowered.contains(term))
        })
        .map(|turn| turn.content.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}
