use async_trait::async_trait;

use crate::engine::{Result, Tool, ToolError};

pub struct WriteFileTool;

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write text content to a file"
    }

    async fn execute(&self, params: serde_json::Value) -> Result<String> {
        // Free-text form: `<path> <content...>`; structured form: path+content.
        let (path, content) = if let (Some(path), Some(content)) = (
            params.get("path").and_then(|v| v.as_str()),
            params.get("content").and_then(|v| v.as_str()),
        ) {
            (path.trim().to_string(), content.to_string())
        } else {
            let input = params
                .get("input")
                .and_then(|value| value.as_str())
                .map(str::trim)
                .filter(|input| !input.is_empty())
                .ok_or_else(|| {
                    ToolError::InvalidArguments("missing path and content".to_string())
                })?;
            let mut split = input.splitn(2, char::is_whitespace);
            let path = split
                .next()
                .map(str::to_string)
                .filter(|p| !p.is_empty())
                .ok_or_else(|| ToolError::InvalidArguments("missing path".to_string()))?;
            (path, split.next().unwrap_or_default().to_string())
        };

        tokio::fs::write(&path, &content)
            .await
            .map_err(|error| ToolError::Execution(format!("{path}: {error}")))?;
        Ok(format!("wrote {} bytes to {path}", content.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_structured_params() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("out.txt");

        let tool = WriteFileTool;
        tool.execute(serde_json::json!({
            "path": path.to_string_lossy(),
            "content": "hello",
        }))
        .await
        .expect("execute");

        assert_eq!(std::fs::read_to_string(&path).expect("read"), "hello");
    }

    #[tokio::test]
    async fn writes_free_text_form() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("note.txt");

        let tool = WriteFileTool;
        let input = format!("{} remember this", path.to_string_lossy());
        tool.execute(serde_json::json!({ "input": input }))
            .await
            .expect("execute");

        assert_eq!(
            std::fs::read_to_string(&path).expect("read"),
            "remember this"
        );
    }

    #[tokio::test]
    async fn missing_arguments_fail() {
        let tool = WriteFileTool;
        assert!(tool.execute(serde_json::json!({})).await.is_err());
    }
}
