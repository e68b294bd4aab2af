//! List files tool: recursive listing of a project tree.
//!
//! Dot-entries are skipped and `.gitignore` rules are honoured (with or
//! without a surrounding git repository). Output is a JSON array.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use halu_core::error::ToolError;
use halu_core::tool::Tool;
use halu_security::PathPolicy;
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::Path;
use tracing::{debug, warn};

use crate::checked_path;

/// Listings stop after this many entries.
const MAX_ENTRIES: usize = 2_000;

#[derive(Debug, Serialize)]
pub struct FileEntry {
    pub path: String,
    pub is_dir: bool,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mod_time: Option<String>,
}

pub struct ListFilesTool {
    policy: PathPolicy,
}

impl ListFilesTool {
    pub fn new(policy: PathPolicy) -> Self {
        Self { policy }
    }
}

/// Walk `root` and collect entries, paths rendered by `policy`.
fn walk(root: &Path, policy: &PathPolicy) -> Result<Vec<FileEntry>, ignore::Error> {
    let walker = ignore::WalkBuilder::new(root)
        .hidden(true)
        .git_ignore(true)
        .require_git(false)
        .sort_by_file_path(|a, b| a.cmp(b))
        .build();

    let mut entries = Vec::new();
    for result in walker {
        let entry = result?;
        if entry.depth() == 0 {
            continue;
        }
        if entries.len() >= MAX_ENTRIES {
            warn!(root = %root.display(), limit = MAX_ENTRIES, "Listing truncated");
            break;
        }

        let metadata = entry.metadata()?;
        let mod_time = metadata
            .modified()
            .ok()
            .map(|t| DateTime::<Utc>::from(t).to_rfc3339());

        entries.push(FileEntry {
            path: policy.display_relative(entry.path()),
            is_dir: metadata.is_dir(),
            size: if metadata.is_dir() { 0 } else { metadata.len() },
            mod_time,
        });
    }
    Ok(entries)
}

#[async_trait]
impl Tool for ListFilesTool {
    fn name(&self) -> &str {
        "list_files"
    }

    fn description(&self) -> &str {
        "List files and directories recursively, skipping hidden and git-ignored entries. \
         Defaults to the current directory."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The directory path to list files from"
                }
            }
        })
    }

    async fn execute(&self, arguments: &Map<String, Value>) -> Result<String, ToolError> {
        let path = arguments
            .get("path")
            .and_then(Value::as_str)
            .filter(|p| !p.trim().is_empty())
            .unwrap_or(".");
        let root = checked_path(&self.policy, self.name(), path)?;

        if !root.is_dir() {
            return Err(ToolError::ExecutionFailed {
                tool_name: self.name().into(),
                reason: format!("{path} is not a directory"),
            });
        }

        let policy = self.policy.clone();
        let walk_root = root.clone();
        let entries = tokio::task::spawn_blocking(move || walk(&walk_root, &policy))
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "list_files".into(),
                reason: format!("Listing task failed: {e}"),
            })?
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "list_files".into(),
                reason: e.to_string(),
            })?;

        debug!(root = %root.display(), count = entries.len(), "Listed files");

        serde_json::to_string(&entries).map_err(|e| ToolError::ExecutionFailed {
            tool_name: "list_files".into(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("src")).unwrap();
        std::fs::create_dir_all(root.join("target/debug")).unwrap();
        std::fs::create_dir_all(root.join(".git")).unwrap();
        std::fs::write(root.join("src/main.rs"), "fn main() {}\n").unwrap();
        std::fs::write(root.join("README.md"), "# demo\n").unwrap();
        std::fs::write(root.join(".env"), "SECRET=1\n").unwrap();
        std::fs::write(root.join("target/debug/app"), "bin").unwrap();
        std::fs::write(root.join(".gitignore"), "target/\n*.log\n").unwrap();
        std::fs::write(root.join("debug.log"), "noise").unwrap();
        dir
    }

    async fn list(dir: &tempfile::TempDir, args: Value) -> Vec<Value> {
        let tool = ListFilesTool::new(PathPolicy::workspace(dir.path(), &[], &[]));
        let out = tool.execute(args.as_object().unwrap()).await.unwrap();
        serde_json::from_str(&out).unwrap()
    }

    fn paths(entries: &[Value]) -> Vec<&str> {
        entries.iter().map(|e| e["path"].as_str().unwrap()).collect()
    }

    #[tokio::test]
    async fn lists_tree_without_hidden_or_ignored() {
        let dir = project();
        let entries = list(&dir, serde_json::json!({})).await;
        let listed = paths(&entries);

        assert_eq!(listed, vec!["README.md", "src", "src/main.rs"]);
    }

    #[tokio::test]
    async fn entries_carry_kind_and_size() {
        let dir = project();
        let entries = list(&dir, serde_json::json!({ "path": "src" })).await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["path"], "src/main.rs");
        assert_eq!(entries[0]["is_dir"], false);
        assert_eq!(entries[0]["size"], 13);
        assert!(entries[0]["mod_time"].is_string());
    }

    #[tokio::test]
    async fn file_path_is_rejected() {
        let dir = project();
        let tool = ListFilesTool::new(PathPolicy::workspace(dir.path(), &[], &[]));
        let args = serde_json::json!({ "path": "README.md" });
        let err = tool.execute(args.as_object().unwrap()).await.unwrap_err();
        assert!(matches!(err, ToolError::ExecutionFailed { .. }));
    }
}
