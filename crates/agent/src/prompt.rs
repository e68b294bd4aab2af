//! System prompt assembly.
//!
//! Tools are advertised in the prompt itself rather than through a native
//! tool-calling API, so the same convention works against any endpoint.

use halu_core::provider::ToolDefinition;

use crate::scanner::{CLOSE_TAG, OPEN_TAG};

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are Halu, a coding assistant working inside the user's \
project directory. Read the code before changing it, keep edits minimal, and explain what you did.";

/// Build the full system prompt: the base instructions, the tool
/// catalogue, then the calling convention.
pub fn build_system_prompt(base: Option<&str>, tools: &[ToolDefinition]) -> String {
    let base = base
        .map(str::trim)
        .filter(|b| !b.is_empty())
        .unwrap_or(DEFAULT_SYSTEM_PROMPT);

    let mut prompt = String::from(base);
    if tools.is_empty() {
        return prompt;
    }

    prompt.push_str("\n\n## Tools\n\nYou have access to the following tools:\n");
    for tool in tools {
        prompt.push_str(&format!(
            "\n### {}\n\n{}\n\nParameters (JSON Schema): {}\n",
            tool.name, tool.description, tool.parameters
        ));
    }

    prompt.push_str(&format!(
        "\n## Calling a tool\n\n\
         To call a tool, write a JSON object with the tool's `name` and its arguments \
         between {OPEN_TAG} and {CLOSE_TAG}, for example:\n\n\
         {OPEN_TAG}{{\"name\": \"read_file\", \"path\": \"src/main.rs\"}}{CLOSE_TAG}\n\n\
         Use one block per call. You may make several calls in one reply. \
         Stop after your calls and wait: each result comes back in a \
         <tool_result> block before you continue.\n"
    ));
    prompt
}
