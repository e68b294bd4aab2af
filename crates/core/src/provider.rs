//! Provider trait: the abstraction over streamed model endpoints.
//!
//! A Provider knows how to send a transcript to a model and hand back the
//! response as a stream of text fragments. The agent loop never sees the
//! wire format.
//!
//! Implementations: Anthropic Messages API, OpenAI-compatible chat completions.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::ProviderError;
use crate::message::Turn;

/// Everything one streamed call needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// The model to use (e.g., "claude-sonnet-4-20250514", "Qwen/Qwen2.5-Coder-32B-Instruct")
    pub model: String,

    /// The full transcript, oldest turn first
    pub turns: Vec<Turn>,

    /// Temperature (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Tools the model may call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
}

fn default_temperature() -> f32 {
    0.7
}

/// A tool definition the model is told about.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// Token usage for one or more calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl Usage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }

    /// Replace each field the provider actually reported.
    pub fn apply(&mut self, report: &UsageReport) {
        if let Some(input) = report.input_tokens {
            self.input_tokens = input;
        }
        if let Some(output) = report.output_tokens {
            self.output_tokens = output;
        }
    }
}

impl std::ops::AddAssign for Usage {
    fn add_assign(&mut self, rhs: Self) {
        self.input_tokens += rhs.input_tokens;
        self.output_tokens += rhs.output_tokens;
    }
}

impl std::ops::Add for Usage {
    type Output = Usage;

    fn add(mut self, rhs: Self) -> Usage {
        self += rhs;
        self
    }
}

/// Usage as reported mid-stream. Providers often report the two halves in
/// separate events, so each field is optional.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageReport {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_tokens: Option<u64>,
}

/// One item of a streamed response.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A fragment of generated text. Fragment boundaries are arbitrary.
    TextDelta(String),
    /// Usage reported by the endpoint
    Usage(UsageReport),
    /// The response completed normally
    Done,
}

/// The core Provider trait.
///
/// The agent loop calls `stream()` without knowing which backend is behind
/// it. The returned channel is bounded; dropping the receiver stops the
/// producing task. A channel that closes before `Done` means the stream was
/// cut off.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "anthropic", "vllm").
    fn name(&self) -> &str;

    /// Open a streamed call.
    async fn stream(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<mpsc::Receiver<std::result::Result<StreamEvent, ProviderError>>, ProviderError>;

    /// Count the input tokens of a request before sending it.
    ///
    /// Returns `Ok(None)` when the endpoint has no counting facility.
    async fn count_tokens(
        &self,
        _request: &ProviderRequest,
    ) -> std::result::Result<Option<u64>, ProviderError> {
        Ok(None)
    }
}
