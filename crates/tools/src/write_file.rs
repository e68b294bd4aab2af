//! Write file tool: replace a file's contents, creating it (and its
//! parent directories) when missing.

use async_trait::async_trait;
use halu_core::error::ToolError;
use halu_core::tool::Tool;
use halu_security::PathPolicy;
use serde_json::{Map, Value};
use tracing::info;

use crate::{checked_path, required_str};

pub struct WriteFileTool {
    policy: PathPolicy,
}

impl WriteFileTool {
    pub fn new(policy: PathPolicy) -> Self {
        Self { policy }
    }

    fn failed(&self, reason: String) -> ToolError {
        ToolError::ExecutionFailed {
            tool_name: self.name().into(),
            reason,
        }
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Replace a file's contents. Creates the file if it doesn't exist."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path to the file to write"
                },
                "content": {
                    "type": "string",
                    "description": "New content for the file"
                }
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, arguments: &Map<String, Value>) -> Result<String, ToolError> {
        let path = required_str(arguments, "path")?;
        let content = required_str(arguments, "content")?;
        let resolved = checked_path(&self.policy, self.name(), path)?;

        if resolved.is_dir() {
            return Err(self.failed(format!("{path} is a directory")));
        }

        if let Some(parent) = resolved.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.failed(format!("Failed to create {}: {e}", parent.display())))?;
        }

        tokio::fs::write(&resolved, content)
            .await
            .map_err(|e| self.failed(format!("Failed to write {path}: {e}")))?;

        info!(path = %resolved.display(), bytes = content.len(), "File written");
        Ok(format!("Wrote {} bytes to {path}", content.len()))
    }
}
