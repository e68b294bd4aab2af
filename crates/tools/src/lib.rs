//! Built-in tool implementations for Halu.
//!
//! Tools give the agent the ability to work on a project tree:
//! read files, replace or edit file contents, list the tree and search it
//! while honouring `.gitignore`. Every path goes through a [`PathPolicy`]
//! first.

pub mod list_files;
pub mod read_file;
pub mod ripgrep;
pub mod search_replace;
pub mod write_file;

use halu_core::error::ToolError;
use halu_core::tool::ToolRegistry;
use halu_security::PathPolicy;
use serde_json::{Map, Value};
use std::path::PathBuf;

/// Create a registry with all built-in tools sharing one path policy.
pub fn default_registry(policy: PathPolicy) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(read_file::ReadFileTool::new(policy.clone())));
    registry.register(Box::new(write_file::WriteFileTool::new(policy.clone())));
    registry.register(Box::new(search_replace::SearchReplaceTool::new(policy.clone())));
    registry.register(Box::new(list_files::ListFilesTool::new(policy.clone())));
    registry.register(Box::new(ripgrep::RipgrepTool::new(policy)));
    registry
}

/// Fetch a required string argument.
pub(crate) fn required_str<'a>(
    arguments: &'a Map<String, Value>,
    key: &str,
) -> Result<&'a str, ToolError> {
    arguments
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::InvalidArguments(format!("Missing '{key}' argument")))
}

/// Run a path through the policy, mapping rejection to `PermissionDenied`.
pub(crate) fn checked_path(policy: &PathPolicy, tool: &str, path: &str) -> Result<PathBuf, ToolError> {
    policy.validate(path).map_err(|e| ToolError::PermissionDenied {
        tool_name: tool.into(),
        reason: e.to_string(),
    })
}
