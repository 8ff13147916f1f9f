use helm_core::SteeringConfig;
use helm_llm::ClassifierRules;

/// Loop-scoped knobs, usually derived from the system-wide
/// [`SteeringConfig`].
#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub max_retries: u32,
    pub transient_delay_ms: u64,
    pub unknown_delay_ms: u64,
    pub rate_limit_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_range: (f64, f64),
    pub tool_trigger_tokens: Vec<String>,
    pub classifier: ClassifierRules,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self::from_steering(&SteeringConfig::default())
    }
}

impl LoopConfig {
    pub fn from_steering(config: &SteeringConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            transient_delay_ms: config.base_retry_delay_ms,
            unknown_delay_ms: config.unknown_retry_delay_ms,
            rate_limit_delay_ms: config.rate_limit_delay_ms,
            max_delay_ms: config.max_retry_delay_ms,
            jitter_range: config.jitter_range,
            tool_trigger_tokens: config.tool_trigger_tokens.clone(),
            classifier: ClassifierRules::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_steering_config() {
        let config = LoopConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.transient_delay_ms, 1000);
        assert_eq!(config.unknown_delay_ms, 2000);
        assert_eq!(config.rate_limit_delay_ms, 5000);
        assert_eq!(config.max_delay_ms, 60_000);
    }
}
