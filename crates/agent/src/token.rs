//! Token estimation utilities.
//!
//! Uses a character-based heuristic: ~4 characters per token. It stands in
//! for the real count until the provider reports usage (or when it never
//! does).

use halu_core::message::Turn;
use halu_core::provider::{ProviderRequest, ToolDefinition};

/// Per-turn overhead for role name, delimiters and formatting markers.
const TURN_OVERHEAD: u64 = 4;

/// Estimate the token count for a string.
///
/// Heuristic: 1 token ≈ 4 characters. Rounds up.
pub fn estimate_tokens(text: &str) -> u64 {
    let chars = text.chars().count() as u64;
    chars.div_ceil(4)
}

/// Estimate tokens for a single turn including per-turn overhead.
pub fn estimate_turn_tokens(turn: &Turn) -> u64 {
    TURN_OVERHEAD + estimate_tokens(&turn.content)
}

/// Estimate tokens for a tool definition (serialized as JSON).
pub fn estimate_tool_tokens(tool: &ToolDefinition) -> u64 {
    let json = serde_json::to_string(tool).unwrap_or_default();
    estimate_tokens(&json)
}

/// Estimate the input side of a request: every turn plus tool definitions.
pub fn estimate_request_tokens(request: &ProviderRequest) -> u64 {
    let turns: u64 = request.turns.iter().map(estimate_turn_tokens).sum();
    let tools: u64 = request.tools.iter().map(estimate_tool_tokens).sum();
    turns + tools
}

#[cfg(test)]
mod tests {
    use super::*;
    use halu_core::message::Transcript;

    #[test]
    fn empty_string_is_zero() {
        assert_eq!(estimate_tokens(""), 0);
    }

    #[test]
    fn four_chars_is_one_token() {
        assert_eq!(estimate_tokens("test"), 1);
    }

    #[test]
    fn five_chars_rounds_up() {
        assert_eq!(estimate_tokens("hello"), 2);
    }

    #[test]
    fn counts_chars_not_bytes() {
        // 4 chars, 8 bytes
        assert_eq!(estimate_tokens("éééé"), 1);
    }

    #[test]
    fn request_includes_turn_overhead() {
        let mut t = Transcript::new();
        t.push_user("hello"); // 2 + 4
        t.push_assistant("world"); // 2 + 4
        let request = ProviderRequest {
            model: "m".into(),
            turns: t.turns().to_vec(),
            temperature: 0.7,
            max_tokens: None,
            tools: vec![],
        };
        assert_eq!(estimate_request_tokens(&request), 12);
    }

    #[test]
    fn tool_definition_tokens() {
        let tool = ToolDefinition {
            name: "test_tool".to_string(),
            description: "A test tool".to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string"}
                }
            }),
        };
        assert!(estimate_tool_tokens(&tool) > 0);
    }
}
