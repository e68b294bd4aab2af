//! Agent-level events and the display sink that receives them.
//!
//! The loop reports progress as `AgentEvent`s: confirmed plain text as it
//! streams, each tool call and its result, retry notices, and a final
//! summary. How they are rendered (colour, JSON lines, nothing at all) is up
//! to the sink.

use halu_core::provider::Usage;
use serde::{Deserialize, Serialize};

/// Events emitted by the agent during an interaction.
///
/// - `text`: plain text confirmed by the scanner
/// - `tool_call`: the agent is invoking a tool
/// - `tool_result`: tool execution completed
/// - `retry`: the stream was cut off and the turn is being replayed
/// - `done`: the interaction finished with a final answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// Plain text from the model, tool-call blocks already removed.
    Text { content: String },

    /// The agent is calling a tool.
    ToolCall {
        name: String,
        arguments: serde_json::Map<String, serde_json::Value>,
    },

    /// Tool execution completed.
    ToolResult {
        name: String,
        success: bool,
        output: String,
    },

    /// A transient stream failure; attempt `attempt` of `max_attempts` follows.
    Retry {
        attempt: u32,
        max_attempts: u32,
        reason: String,
    },

    /// The interaction is complete.
    Done {
        usage: Usage,
        rounds: u32,
        tool_calls_made: usize,
    },
}

impl AgentEvent {
    /// Event name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolResult { .. } => "tool_result",
            Self::Retry { .. } => "retry",
            Self::Done { .. } => "done",
        }
    }
}

/// Receives agent events as they happen.
pub trait DisplaySink: Send {
    fn emit(&mut self, event: AgentEvent);
}

impl<F> DisplaySink for F
where
    F: FnMut(AgentEvent) + Send,
{
    fn emit(&mut self, event: AgentEvent) {
        self(event)
    }
}

/// A sink that drops every event.
pub struct NullSink;

impl DisplaySink for NullSink {
    fn emit(&mut self, _event: AgentEvent) {}
}
