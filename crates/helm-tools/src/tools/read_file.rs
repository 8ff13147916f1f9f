use async_trait::async_trait;

use crate::engine::{Result, Tool, ToolError};

const MAX_BYTES: u64 = 1024 * 1024;

pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a UTF-8 text file"
    }

    async fn execute(&self, params: serde_json::Value) -> Result<String> {
        let path = params
            .get("input")
            .or_else(|| params.get("path"))
            .and_then(|value| value.as_str())
            .map(str::trim)
            .filter(|path| !path.is_empty())
            .ok_or_else(|| ToolError::InvalidArguments("missing path".to_string()))?;

        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|error| ToolError::Execution(format!("{path}: {error}")))?;
        if metadata.len() > MAX_BYTES {
            return Err(ToolError::Execution(format!(
                "{path}: file larger than {MAX_BYTES} bytes"
            )));
        }

        tokio::fs::read_to_string(path)
            .await
            .map_err(|error| ToolError::Execution(format!("{path}: {error}")))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[tokio::test]
    async fn reads_file_contents() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        write!(file, "file body").expect("write");

        let tool = ReadFileTool;
        let result = tool
            .execute(serde_json::json!({ "path": file.path().to_string_lossy() }))
            .await
            .expect("execute");
        assert_eq!(result, "file body");
    }

    #[tokio::test]
    async fn missing_file_is_an_execution_error() {
        let tool = ReadFileTool;
        let error = tool
            .execute(serde_json::json!({ "path": "/no/such/file" }))
            .await
            .expect_err("fails");
        assert!(matches!(error, ToolError::Execution(_)));
    }

    #[tokio::test]
    async fn missing_path_is_invalid_arguments() {
        let tool = ReadFileTool;
        let error = tool
            .execute(serde_json::json!({}))
            .await
            .expect_err("fails");
        assert!(matches!(error, ToolError::InvalidArguments(_)));
    }
}
