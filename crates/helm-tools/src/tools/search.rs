use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::engine::{Result, Tool, ToolError};

const MAX_MATCHES: usize = 50;
const MAX_DEPTH: usize = 8;

/// Substring search across text files. `<pattern> in <dir>` or just
/// `<pattern>` (searched from the current directory).
pub struct SearchTool;

#[async_trait]
impl Tool for SearchTool {
    fn name(&self) -> &str {
        "search"
    }

    fn description(&self) -> &str {
        "Search files for a substring"
    }

    async fn execute(&self, params: serde_json::Value) -> Result<String> {
        let (pattern, root) = parse_params(&params)?;

        let matches = tokio::task::spawn_blocking(move || {
            let mut matches = Vec::new();
            search_dir(&root, &pattern, 0, &mut matches);
            matches
        })
        .await
        .map_err(|error| ToolError::Execution(format!("search task failed: {error}")))?;

        if matches.is_empty() {
            Ok("no matches".to_string())
        } else {
            Ok(matches.join("\n"))
        }
    }
}

fn parse_params(params: &serde_json::Value) -> Result<(String, PathBuf)> {
    if let Some(pattern) = params.get("pattern").and_then(|v| v.as_str()) {
        let root = params
            .get("dir")
            .and_then(|v| v.as_str())
            .unwrap_or(".")
            .to_string();
        return Ok((pattern.to_string(), PathBuf::from(root)));
    }

    let input = params
        .get("input")
        .and_then(|value| value.as_str())
        .map(str::trim)
        .filter(|input| !input.is_empty())
        .ok_or_else(|| ToolError::InvalidArguments("missing search pattern".to_string()))?;

    match input.rsplit_once(" in ") {
        Some((pattern, dir)) => Ok((pattern.trim().to_string(), PathBuf::from(dir.trim()))),
        None => Ok((input.to_string(), PathBuf::from("."))),
    }
}

fn search_dir(dir: &Path, pattern: &str, depth: usize, matches: &mut Vec<String>) {
    if depth > MAX_DEPTH || matches.len() >= MAX_MATCHES {
        return;
    }
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };

    for entry in entries.flatten() {
        if matches.len() >= MAX_MATCHES {
            return;
        }
        let path = entry.path();
        if path.is_dir() {
            search_dir(&path, pattern, depth + 1, matches);
        } else if let Ok(content) = std::fs::read_to_string(&path) {
            for (number, line) in content.lines().enumerate() {
                if line.contains(pattern) {
                    matches.push(format!("{}:{}: {}", path.display(), number + 1, line.trim()));
                    if matches.len() >= MAX_MATCHES {
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn finds_matches_under_a_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("a.txt"), "needle here\nnothing").expect("write");
        std::fs::create_dir(dir.path().join("sub")).expect("mkdir");
        std::fs::write(dir.path().join("sub/b.txt"), "another needle").expect("write");

        let tool = SearchTool;
        let input = format!("needle in {}", dir.path().to_string_lossy());
        let result = tool
            .execute(serde_json::json!({ "input": input }))
            .await
            .expect("execute");

        assert_eq!(result.lines().count(), 2);
        assert!(result.contains("a.txt:1"));
    }

    #[tokio::test]
    async fn reports_no_matches() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("a.txt"), "plain").expect("write");

        let tool = SearchTool;
        let input = format!("absent in {}", dir.path().to_string_lossy());
        let result = tool
            .execute(serde_json::json!({ "input": input }))
            .await
            .expect("execute");
        assert_eq!(result, "no matches");
    }

    #[tokio::test]
    async fn missing_pattern_is_invalid() {
        let tool = SearchTool;
        assert!(tool.execute(serde_json::json!({})).await.is_err());
    }
}
