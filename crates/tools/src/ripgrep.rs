//! Ripgrep tool: regex search over file contents.
//!
//! Runs in-process on the same gitignore-aware walker as `list_files`, so it
//! needs no external `rg` binary. Output follows rg's no-heading layout:
//! `path:line:text` for matches, `path-line-text` for context lines and `--`
//! between separate context groups.

use std::path::Path;

use async_trait::async_trait;
use halu_core::error::ToolError;
use halu_core::tool::Tool;
use halu_security::PathPolicy;
use regex::{Regex, RegexBuilder};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::{checked_path, required_str};

/// Output is cut after this many lines.
const MAX_OUTPUT_LINES: usize = 500;

/// Files with a NUL byte in their first block are treated as binary.
const BINARY_SNIFF_BYTES: usize = 8 * 1024;

const NO_MATCHES: &str = "No matches found.";

pub struct RipgrepTool {
    policy: PathPolicy,
}

impl RipgrepTool {
    pub fn new(policy: PathPolicy) -> Self {
        Self { policy }
    }
}

/// Search options decoded from the tool arguments.
#[derive(Debug, Clone)]
struct SearchOptions {
    context_lines: usize,
    files_with_matches: bool,
    max_depth: Option<usize>,
    line_number: bool,
}

impl SearchOptions {
    fn from_arguments(arguments: &Map<String, Value>) -> Self {
        Self {
            context_lines: arguments
                .get("context_lines")
                .and_then(Value::as_u64)
                .unwrap_or(0) as usize,
            files_with_matches: flag(arguments, "files_with_matches", false),
            max_depth: arguments
                .get("max_depth")
                .and_then(Value::as_u64)
                .map(|d| d as usize),
            line_number: flag(arguments, "line_number", true),
        }
    }
}

fn flag(arguments: &Map<String, Value>, key: &str, default: bool) -> bool {
    arguments.get(key).and_then(Value::as_bool).unwrap_or(default)
}

/// Build the matcher. Case-insensitive unless asked otherwise.
fn build_regex(pattern: &str, arguments: &Map<String, Value>) -> Result<Regex, ToolError> {
    let mut source = if flag(arguments, "literal", false) {
        regex::escape(pattern)
    } else {
        pattern.to_string()
    };
    if flag(arguments, "word_regexp", false) {
        source = format!(r"\b(?:{source})\b");
    }

    RegexBuilder::new(&source)
        .case_insensitive(!flag(arguments, "case_sensitive", false))
        .build()
        .map_err(|e| ToolError::InvalidArguments(format!("Invalid pattern: {e}")))
}

/// Collects output lines up to [`MAX_OUTPUT_LINES`].
#[derive(Debug, Default)]
struct Output {
    lines: Vec<String>,
    truncated: bool,
}

impl Output {
    fn push(&mut self, line: String) -> bool {
        if self.lines.len() >= MAX_OUTPUT_LINES {
            self.truncated = true;
            return false;
        }
        self.lines.push(line);
        true
    }

    fn render(self) -> String {
        if self.lines.is_empty() {
            return NO_MATCHES.into();
        }
        let mut text = self.lines.join("\n");
        if self.truncated {
            text.push_str(&format!("\n... (output truncated at {MAX_OUTPUT_LINES} lines)"));
        }
        text
    }
}

/// Text of a file, or `None` for binary or non-UTF-8 content.
fn read_text(path: &Path) -> Option<String> {
    let bytes = std::fs::read(path).ok()?;
    if bytes.iter().take(BINARY_SNIFF_BYTES).any(|&b| b == 0) {
        return None;
    }
    String::from_utf8(bytes).ok()
}

/// Append the matches of one file. `separate` asks for a `--` before its
/// first context group. Returns `false` once output is full.
fn search_file(
    display: &str,
    text: &str,
    regex: &Regex,
    options: &SearchOptions,
    separate: bool,
    out: &mut Output,
) -> bool {
    let lines: Vec<&str> = text.lines().collect();
    let hits: Vec<usize> = (0..lines.len()).filter(|&i| regex.is_match(lines[i])).collect();
    if hits.is_empty() {
        return true;
    }
    if options.files_with_matches {
        return out.push(display.to_string());
    }

    let format = |i: usize, sep: char| {
        if options.line_number {
            format!("{display}{sep}{}{sep}{}", i + 1, lines[i])
        } else {
            format!("{display}{sep}{}", lines[i])
        }
    };

    let context = options.context_lines;
    let mut printed_up_to: Option<usize> = None;
    for &hit in &hits {
        let mut from = hit.saturating_sub(context);
        let to = (hit + context).min(lines.len() - 1);
        let new_group = match printed_up_to {
            Some(last) if last + 1 >= from => {
                from = from.max(last + 1);
                false
            }
            Some(_) => true,
            None => separate,
        };
        if new_group && context > 0 && !out.push("--".into()) {
            return false;
        }
        for i in from..=to {
            let sep = if hits.binary_search(&i).is_ok() { ':' } else { '-' };
            if !out.push(format(i, sep)) {
                return false;
            }
        }
        printed_up_to = Some(to);
    }
    true
}

/// Walk `root` (a file or directory) and search every text file in it.
fn search(
    root: &Path,
    regex: &Regex,
    options: &SearchOptions,
    policy: &PathPolicy,
) -> Result<Output, ignore::Error> {
    let walker = ignore::WalkBuilder::new(root)
        .hidden(true)
        .git_ignore(true)
        .require_git(false)
        .max_depth(options.max_depth)
        .sort_by_file_path(|a, b| a.cmp(b))
        .build();

    let mut out = Output::default();
    let mut files_searched = 0usize;
    for result in walker {
        let entry = result?;
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        let Some(text) = read_text(entry.path()) else {
            continue;
        };
        files_searched += 1;

        let display = policy.display_relative(entry.path());
        let separate = !out.lines.is_empty();
        if !search_file(&display, &text, regex, options, separate, &mut out) {
            warn!(root = %root.display(), limit = MAX_OUTPUT_LINES, "Search output truncated");
            break;
        }
    }

    debug!(root = %root.display(), files = files_searched, lines = out.lines.len(), "Search finished");
    Ok(out)
}

#[async_trait]
impl Tool for RipgrepTool {
    fn name(&self) -> &str {
        "ripgrep"
    }

    fn description(&self) -> &str {
        "Search file contents with a regular expression, skipping hidden and git-ignored files. \
         Case-insensitive unless case_sensitive is set."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "The pattern to search for"
                },
                "path": {
                    "type": "string",
                    "description": "The path to search in (directory or file)"
                },
                "case_sensitive": {
                    "type": "boolean",
                    "description": "Whether to use case-sensitive matching (default: false)"
                },
                "literal": {
                    "type": "boolean",
                    "description": "Treat the pattern as a literal string, not a regex (default: false)"
                },
                "context_lines": {
                    "type": "integer",
                    "description": "Number of context lines to show before and after each match (default: 0)"
                },
                "word_regexp": {
                    "type": "boolean",
                    "description": "Only show matches surrounded by word boundaries (default: false)"
                },
                "files_with_matches": {
                    "type": "boolean",
                    "description": "Only show the names of files containing matches (default: false)"
                },
                "max_depth": {
                    "type": "integer",
                    "description": "Maximum search depth for directories (default: no limit)"
                },
                "line_number": {
                    "type": "boolean",
                    "description": "Show line numbers (default: true)"
                }
            },
            "required": ["pattern", "path"]
        })
    }

    async fn execute(&self, arguments: &Map<String, Value>) -> Result<String, ToolError> {
        let pattern = required_str(arguments, "pattern")?;
        let path = required_str(arguments, "path")?;
        let root = checked_path(&self.policy, self.name(), path)?;
        if !root.exists() {
            return Err(ToolError::ExecutionFailed {
                tool_name: self.name().into(),
                reason: format!("{path} does not exist"),
            });
        }

        let regex = build_regex(pattern, arguments)?;
        let options = SearchOptions::from_arguments(arguments);
        let policy = self.policy.clone();

        let output = tokio::task::spawn_blocking(move || search(&root, &regex, &options, &policy))
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "ripgrep".into(),
                reason: format!("Search task failed: {e}"),
            })?
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "ripgrep".into(),
                reason: e.to_string(),
            })?;

        Ok(output.render())
    }
}
