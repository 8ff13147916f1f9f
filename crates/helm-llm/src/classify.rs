//! Substring classification of model failures into retry classes.

use serde::{Deserialize, Serialize};

use crate::client::ModelError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Auth/permission failures. Never retried.
    Critical,
    /// Throttling. Retried with a long floor delay.
    RateLimit,
    /// Network-shaped failures. Retried with exponential back-off.
    Transient,
    Unknown,
}

/// The substring rules, lowest-priority last. Edge classifications belong
/// here rather than in new match arms.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierRules {
    pub critical: Vec<String>,
    pub rate_limit: Vec<String>,
    pub transient: Vec<String>,
}

impl Default for ClassifierRules {
    fn default() -> Self {
        Self {
            critical: to_strings(&["api key", "unauthorized", "forbidden"]),
            rate_limit: to_strings(&["rate limit", "too many requests", "429"]),
            transient: to_strings(&["timeout", "connection", "network", "5xx"]),
        }
    }
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl ClassifierRules {
    pub fn classify_text(&self, text: &str) -> ErrorClass {
        let lowered = text.to_lowercase();
        if self.critical.iter().any(|rule| lowered.contains(rule)) {
            ErrorClass::Critical
        } else if self.rate_limit.iter().any(|rule| lowered.contains(rule)) {
            ErrorClass::RateLimit
        } else if self.transient.iter().any(|rule| lowered.contains(rule)) {
            ErrorClass::Transient
        } else {
            ErrorClass::Unknown
        }
    }

    pub fn classify(&self, error: &ModelError) -> ErrorClass {
        match error {
            ModelError::Auth(_) => ErrorClass::Critical,
            other => self.classify_text(&other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_critical_substrings() {
        let rules = ClassifierRules::default();
        assert_eq!(rules.classify_text("invalid API key"), ErrorClass::Critical);
        assert_eq!(rules.classify_text("403 Forbidden"), ErrorClass::Critical);
    }

    #[test]
    fn classifies_rate_limit_substrings() {
        let rules = ClassifierRules::default();
        assert_eq!(
            rules.classify_text("Error: 429 rate limit"),
            ErrorClass::RateLimit
        );
        assert_eq!(
            rules.classify_text("too many requests, slow down"),
            ErrorClass::RateLimit
        );
    }

    #[test]
    fn classifies_transient_substrings() {
        let rules = ClassifierRules::default();
        assert_eq!(rules.classify_text("connection reset"), ErrorClass::Transient);
        assert_eq!(rules.classify_text("request timeout"), ErrorClass::Transient);
        assert_eq!(rules.classify_text("upstream 5xx"), ErrorClass::Transient);
    }

    #[test]
    fn everything_else_is_unknown() {
        let rules = ClassifierRules::default();
        assert_eq!(rules.classify_text("weird failure"), ErrorClass::Unknown);
    }

    #[test]
    fn auth_errors_are_critical_regardless_of_text() {
        let rules = ClassifierRules::default();
        let error = ModelError::Auth("bad token".to_string());
        assert_eq!(rules.classify(&error), ErrorClass::Critical);
    }

    #[test]
    fn custom_rules_extend_classification() {
        let mut rules = ClassifierRules::default();
        rules.transient.push("overloaded".to_string());
        assert_eq!(
            rules.classify_text("model overloaded"),
            ErrorClass::Transient
        );
    }
}
