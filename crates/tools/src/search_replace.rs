//! Search/replace tool: edit a file by swapping one unique block of text.
//!
//! The search text must occur exactly once. When it doesn't occur verbatim,
//! a multi-line search is retried line by line with leading whitespace
//! ignored, and the replacement is re-indented to where the block actually
//! sits in the file.

use async_trait::async_trait;
use halu_core::error::ToolError;
use halu_core::tool::Tool;
use halu_security::PathPolicy;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::{checked_path, required_str};

pub struct SearchReplaceTool {
    policy: PathPolicy,
}

impl SearchReplaceTool {
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

/// Why an edit could not be applied.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
enum EditError {
    #[error("search text not found")]
    NoMatch,

    #[error("search text matches {0} locations, it must match exactly once")]
    NotUnique(usize),
}

/// Occurrences of `needle` in `haystack`, overlapping ones included.
fn count_matches(haystack: &str, needle: &str) -> usize {
    let mut count = 0;
    let mut from = 0;
    while let Some(i) = haystack[from..].find(needle) {
        count += 1;
        // Step one char, not one byte
        let step = haystack[from + i..].chars().next().map_or(1, char::len_utf8);
        from += i + step;
    }
    count
}

fn leading_whitespace(line: &str) -> &str {
    &line[..line.len() - line.trim_start().len()]
}

/// Match `search` against `content` line by line, ignoring indentation.
fn replace_reindented(content: &str, search: &str, replace: &str) -> Result<String, EditError> {
    let lines: Vec<&str> = content.split('\n').collect();
    let wanted: Vec<&str> = search.split('\n').map(str::trim).collect();
    if wanted.len() < 2 || lines.len() < wanted.len() {
        return Err(EditError::NoMatch);
    }

    let starts: Vec<usize> = (0..=lines.len() - wanted.len())
        .filter(|&i| {
            lines[i..i + wanted.len()]
                .iter()
                .zip(&wanted)
                .all(|(line, want)| line.trim() == *want)
        })
        .collect();
    let start = match starts.as_slice() {
        [] => return Err(EditError::NoMatch),
        [only] => *only,
        many => return Err(EditError::NotUnique(many.len())),
    };

    // Map the search block's base indent onto the file's
    let search_indent = search.split('\n').next().map(leading_whitespace).unwrap_or("");
    let file_indent = leading_whitespace(lines[start]);
    let reindented = replace.split('\n').map(|line| {
        if line.trim().is_empty() {
            String::new()
        } else if let Some(rest) = line.strip_prefix(search_indent) {
            format!("{file_indent}{rest}")
        } else {
            format!("{file_indent}{}", line.trim_start())
        }
    });

    let mut out: Vec<String> = lines[..start].iter().map(|l| (*l).to_string()).collect();
    out.extend(reindented);
    out.extend(lines[start + wanted.len()..].iter().map(|l| (*l).to_string()));
    Ok(out.join("\n"))
}

/// Apply one edit to `content`.
fn apply_edit(content: &str, search: &str, replace: &str) -> Result<String, EditError> {
    match count_matches(content, search) {
        1 => Ok(content.replacen(search, replace, 1)),
        0 => {
            debug!("No verbatim match, retrying with indentation ignored");
            replace_reindented(content, search, replace)
        }
        n => Err(EditError::NotUnique(n)),
    }
}

#[async_trait]
impl Tool for SearchReplaceTool {
    fn name(&self) -> &str {
        "search_replace"
    }

    fn description(&self) -> &str {
        "Search and replace text in a file. The search text must match exactly one location \
         in the file."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path to the file to edit"
                },
                "search": {
                    "type": "string",
                    "description": "Text to search for, must match exactly one location in the file"
                },
                "replace": {
                    "type": "string",
                    "description": "Text to replace with"
                }
            },
            "required": ["path", "search", "replace"]
        })
    }

    async fn execute(&self, arguments: &Map<String, Value>) -> Result<String, ToolError> {
        let path = required_str(arguments, "path")?;
        let search = required_str(arguments, "search")?;
        let replace = required_str(arguments, "replace")?;
        if search.is_empty() {
            return Err(ToolError::InvalidArguments("'search' must not be empty".into()));
        }
        let resolved = checked_path(&self.policy, self.name(), path)?;

        let content = tokio::fs::read_to_string(&resolved)
            .await
            .map_err(|e| self.failed(format!("Failed to read {path}: {e}")))?;

        let updated = apply_edit(&content, search, replace)
            .map_err(|e| self.failed(format!("{path}: {e}")))?;

        tokio::fs::write(&resolved, &updated)
            .await
            .map_err(|e| self.failed(format!("Failed to write {path}: {e}")))?;

        info!(path = %resolved.display(), "File edited");
        Ok(format!("Applied edit to {path}"))
    }
}
