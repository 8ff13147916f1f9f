//! Tool dispatch: free-text commands and named invocations.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Execution failed: {0}")]
    Execution(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),
}

pub type Result<T> = std::result::Result<T, ToolError>;

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    async fn execute(&self, params: serde_json::Value) -> Result<String>;
}

/// The seam the agent loop calls through. Tool selection is the engine's
/// business; the loop only decides *whether* a prompt reaches it.
#[async_trait]
pub trait ToolEngine: Send + Sync {
    /// Routes a free-text command (e.g. `Calculate 2+2`) to a tool.
    async fn execute(&self, command: &str) -> Result<String>;

    /// Invokes a tool by name with structured parameters.
    async fn execute_with_params(&self, name: &str, params: serde_json::Value) -> Result<String>;
}

pub type SharedTool = Arc<dyn Tool>;

/// Keyword-routed registry over the builtin tools.
pub struct BuiltinToolEngine {
    tools: DashMap<String, SharedTool>,
}

impl BuiltinToolEngine {
    pub fn new() -> Self {
        Self {
            tools: DashMap::new(),
        }
    }

    /// A registry pre-loaded with the builtin tools.
    pub fn with_builtins() -> Self {
        let engine = Self::new();
        engine.register(crate::tools::CalculateTool);
        engine.register(crate::tools::ReadFileTool);
        engine.register(crate::tools::WriteFileTool);
        engine.register(crate::tools::SearchTool);
        engine
    }

    pub fn register<T: Tool + 'static>(&self, tool: T) {
        self.tools.insert(tool.name().to_string(), Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<SharedTool> {
        self.tools.get(name).map(|entry| Arc::clone(&entry))
    }

    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    // `Calculate 2+2` -> (calculate, "2+2"); routing keys on the first word.
    fn route(command: &str) -> Result<(&'static str, String)> {
        let trimmed = command.trim();
        let mut split = trimmed.splitn(2, char::is_whitespace);
        let keyword = split.next().unwrap_or_default().to_lowercase();
        let rest = split.next().unwrap_or_default().trim().to_string();

        let tool = match keyword.as_str() {
            "calculate" | "calc" => "calculate",
            "read" => "read_file",
            "write" => "write_file",
            "search" | "find" => "search",
            _ => return Err(ToolError::NotFound(format!("no tool for: {trimmed}"))),
        };
        Ok((tool, rest))
    }
}

impl Default for BuiltinToolEngine {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[async_trait]
impl ToolEngine for BuiltinToolEngine {
    async fn execute(&self, command: &str) -> Result<String> {
        let (name, argument) = Self::route(command)?;
        log::debug!("routing command to tool {name}: {argument}");
        self.execute_with_params(name, serde_json::json!({ "input": argument }))
            .await
    }

    async fn execute_with_params(&self, name: &str, params: serde_json::Value) -> Result<String> {
        let tool = self
            .get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        tool.execute(params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn routes_calculate_commands() {
        let engine = BuiltinToolEngine::with_builtins();
        let result = engine.execute("Calculate 2+2").await.expect("execute");
        assert_eq!(result, "4");
    }

    #[tokio::test]
    async fn unroutable_commands_are_not_found() {
        let engine = BuiltinToolEngine::with_builtins();
        let error = engine.execute("translate this").await.expect_err("fails");
        assert!(matches!(error, ToolError::NotFound(_)));
    }

    #[tokio::test]
    async fn named_invocation_bypasses_routing() {
        let engine = BuiltinToolEngine::with_builtins();
        let result = engine
            .execute_with_params("calculate", serde_json::json!({ "input": "3*7" }))
            .await
            .expect("execute");
        assert_eq!(result, "21");
    }

    #[tokio::test]
    async fn unknown_tool_name_is_not_found() {
        let engine = BuiltinToolEngine::with_builtins();
        let error = engine
            .execute_with_params("nope", serde_json::json!({}))
            .await
            .expect_err("fails");
        assert!(matches!(error, ToolError::NotFound(_)));
    }

    #[test]
    fn registry_lists_builtin_tools() {
        let engine = BuiltinToolEngine::with_builtins();
        assert_eq!(
            engine.tool_names(),
            vec!["calculate", "read_file", "search", "write_file"]
        );
    }
}
