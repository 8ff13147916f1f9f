use async_trait::async_trait;
use thiserror::Error;

use helm_core::session::Turn;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("API error: {0}")]
    Api(String),

    #[error("Authentication error: {0}")]
    Auth(String),
}

pub type Result<T> = std::result::Result<T, ModelError>;

/// A language-model backend. The steering core only ever sees this trait;
/// concrete protocol details stay behind it.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Produce assistant text for `prompt` given the dialogue so far.
    async fn invoke(&self, history: &[Turn], prompt: &str) -> Result<String>;

    /// Short identifier for logs.
    fn name(&self) -> &str {
        "model"
    }
}
