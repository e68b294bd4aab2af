//! Read file tool: return a file's contents with path validation.

use async_trait::async_trait;
use halu_core::error::ToolError;
use halu_core::tool::Tool;
use halu_security::PathPolicy;
use serde_json::{Map, Value};

use crate::{checked_path, required_str};

pub struct ReadFileTool {
    policy: PathPolicy,
}

impl ReadFileTool {
    pub fn new(policy: PathPolicy) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the contents of a file."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The path to the file to read"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, arguments: &Map<String, Value>) -> Result<String, ToolError> {
        let path = required_str(arguments, "path")?;
        let resolved = checked_path(&self.policy, self.name(), path)?;

        tokio::fs::read_to_string(&resolved)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: self.name().into(),
                reason: format!("Failed to read {path}: {e}"),
            })
    }
}
