use serde::{Deserialize, Serialize};

/// Every tunable of the steering core, with the documented defaults.
/// Serde-derived so front-ends can load it from JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SteeringConfig {
    pub max_retries: u32,
    /// Base back-off for TRANSIENT failures, in milliseconds.
    pub base_retry_delay_ms: u64,
    /// Base back-off for UNKNOWN failures.
    pub unknown_retry_delay_ms: u64,
    /// Base (and floor) back-off for RATE_LIMIT failures.
    pub rate_limit_delay_ms: u64,
    pub max_retry_delay_ms: u64,
    pub jitter_range: (f64, f64),
    pub model_connect_timeout_ms: u64,
    pub model_read_timeout_ms: u64,
    pub driver_command_timeout_ms: u64,
    pub driver_poll_interval_ms: u64,
    pub compaction_token_ratio: f64,
    pub compaction_msg_count: usize,
    pub max_token_limit: u32,
    /// Case-insensitive tokens that route a prompt to the tool engine.
    pub tool_trigger_tokens: Vec<String>,
    pub max_prompt_len: usize,
    pub memory_capacity: usize,
    /// Permanent pipe error latch instead of the default one-shot contract.
    pub sticky_pipe_errors: bool,
}

impl Default for SteeringConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_retry_delay_ms: 1000,
            unknown_retry_delay_ms: 2000,
            rate_limit_delay_ms: 5000,
            max_retry_delay_ms: 60_000,
            jitter_range: (0.75, 1.25),
            model_connect_timeout_ms: 30_000,
            model_read_timeout_ms: 60_000,
            driver_command_timeout_ms: 30_000,
            driver_poll_interval_ms: 100,
            compaction_token_ratio: 0.92,
            compaction_msg_count: 15,
            max_token_limit: 16_384,
            tool_trigger_tokens: vec![
                "calculate".to_string(),
                "read".to_string(),
                "search".to_string(),
                "tool".to_string(),
            ],
            max_prompt_len: 32_768,
            memory_capacity: 4096,
            sticky_pipe_errors: false,
        }
    }
}
