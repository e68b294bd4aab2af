//! OpenAI-compatible provider implementation.
//!
//! Works with: vLLM (Qwen and friends), OpenAI, OpenRouter, Ollama,
//! Together AI, and any endpoint exposing `/chat/completions` with SSE.
//!
//! Supports:
//! - Streaming chat completions with `stream_options.include_usage`
//! - Tool definitions sent as functions; native tool-call deltas are
//!   re-rendered as in-band `<tool_call>` blocks so the agent sees one protocol

use async_trait::async_trait;
use futures::StreamExt;
use halu_core::error::ProviderError;
use halu_core::message::{Role, Turn};
use halu_core::provider::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::http::{build_client, check_status, send_error};
use crate::sse::{SseLineBuffer, data_payload};

/// An OpenAI-compatible streaming provider.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a new OpenAI-compatible provider.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client: build_client(300)?,
        })
    }

    /// A local vLLM server (convenience constructor).
    pub fn vllm(base_url: Option<&str>) -> Result<Self, ProviderError> {
        Self::new("vllm", base_url.unwrap_or("http://localhost:8000/v1"), "")
    }

    /// Convert transcript turns to OpenAI API messages.
    ///
    /// Tool-result turns go out as `user` messages: they are plain text
    /// here, not answers to native `tool_call_id`s.
    fn to_api_messages(turns: &[Turn]) -> Vec<ApiMessage> {
        turns
            .iter()
            .map(|t| ApiMessage {
                role: match t.role {
                    Role::System => "system".into(),
                    Role::User | Role::Tool => "user".into(),
                    Role::Assistant => "assistant".into(),
                },
                content: t.content.clone(),
            })
            .collect()
    }

    /// Convert tool definitions to OpenAI API format.
    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<ApiToolDefinition> {
        tools
            .iter()
            .map(|t| ApiToolDefinition {
                r#type: "function".into(),
                function: ApiToolFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                },
            })
            .collect()
    }

    fn request_body(request: &ProviderRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(&request.turns),
            "temperature": request.temperature,
            "stream": true,
            "stream_options": { "include_usage": true },
        });

        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(&request.tools));
        }

        body
    }
}

/// Per-stream decoding state.
#[derive(Default)]
pub(crate) struct ChunkDecoder {
    /// Native tool-call deltas keyed by index
    tool_calls: BTreeMap<u32, ToolCallAccumulator>,
}

impl ChunkDecoder {
    /// Decode one `data:` payload into zero or more stream events.
    pub(crate) fn decode(&mut self, data: &str) -> Vec<Result<StreamEvent, ProviderError>> {
        if data == "[DONE]" {
            let mut events = self.flush_tool_calls();
            events.push(Ok(StreamEvent::Done));
            return events;
        }

        let chunk: StreamResponse = match serde_json::from_str(data) {
            Ok(c) => c,
            Err(e) => {
                trace!(data = %data, error = %e, "Ignoring unparseable SSE chunk");
                return Vec::new();
            }
        };

        if let Some(error) = chunk.error {
            return vec![Err(ProviderError::StreamInterrupted(error.message))];
        }

        let mut events = Vec::new();

        if let Some(choice) = chunk.choices.first() {
            if let Some(ref content) = choice.delta.content
                && !content.is_empty()
            {
                events.push(Ok(StreamEvent::TextDelta(content.clone())));
            }

            for tc in choice.delta.tool_calls.iter().flatten() {
                let acc = self.tool_calls.entry(tc.index).or_default();
                if let Some(ref func) = tc.function {
                    if let Some(ref name) = func.name {
                        acc.name.push_str(name);
                    }
                    if let Some(ref args) = func.arguments {
                        acc.arguments.push_str(args);
                    }
                }
            }

            if choice.finish_reason.is_some() {
                events.extend(self.flush_tool_calls());
            }
        }

        if let Some(usage) = chunk.usage {
            events.push(Ok(StreamEvent::Usage(UsageReport {
                input_tokens: usage.prompt_tokens,
                output_tokens: usage.completion_tokens,
            })));
        }

        events
    }

    /// Render accumulated native tool calls as in-band blocks.
    fn flush_tool_calls(&mut self) -> Vec<Result<StreamEvent, ProviderError>> {
        std::mem::take(&mut self.tool_calls)
            .into_values()
            .map(|acc| Ok(StreamEvent::TextDelta(acc.to_block())))
            .collect()
    }
}

#[async_trait]
impl halu_core::Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn stream(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<mpsc::Receiver<std::result::Result<StreamEvent, ProviderError>>, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = Self::request_body(&request);

        debug!(provider = %self.name, model = %request.model, turns = request.turns.len(), "Sending streaming request");

        let mut builder = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream");
        if !self.api_key.is_empty() {
            builder = builder.header("Authorization", format!("Bearer {}", self.api_key));
        }

        let response = builder.json(&body).send().await.map_err(send_error)?;
        let response = check_status(&self.name, response).await?;

        let (tx, rx) = mpsc::channel(64);

        // Spawn task to read the SSE byte stream and decode chunks
        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut lines = SseLineBuffer::new();
            let mut decoder = ChunkDecoder::default();

            while let Some(chunk_result) = byte_stream.next().await {
                let bytes = match chunk_result {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx
                            .send(Err(ProviderError::StreamInterrupted(e.to_string())))
                            .await;
                        return;
                    }
                };

                for line in lines.push(&bytes) {
                    let Some(data) = data_payload(&line) else {
                        continue;
                    };
                    for event in decoder.decode(data.trim()) {
                        let terminal = matches!(event, Ok(StreamEvent::Done) | Err(_));
                        if tx.send(event).await.is_err() || terminal {
                            return;
                        }
                    }
                }
            }
            // Ended without [DONE]: the closed channel reports the cut-off.
        });

        Ok(rx)
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolDefinition {
    r#type: String,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

/// A single SSE `data: {...}` chunk from a streaming response.
#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
    #[serde(default)]
    error: Option<StreamError>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<StreamToolCallDelta>>,
}

/// A tool call delta: arrives incrementally across chunks.
#[derive(Debug, Deserialize)]
struct StreamToolCallDelta {
    index: u32,
    #[serde(default)]
    function: Option<StreamFunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    #[serde(default)]
    prompt_tokens: Option<u64>,
    #[serde(default)]
    completion_tokens: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct StreamError {
    #[serde(default)]
    message: String,
}

/// Accumulates incremental tool call deltas into a complete tool call.
#[derive(Debug, Default)]
struct ToolCallAccumulator {
    name: String,
    arguments: String,
}

impl ToolCallAccumulator {
    fn to_block(&self) -> String {
        let arguments: serde_json::Value = serde_json::from_str(&self.arguments)
            .unwrap_or_else(|_| serde_json::Value::Object(Default::default()));
        let payload = serde_json::json!({ "name": self.name, "arguments": arguments });
        format!("<tool_call>{payload}</tool_call>")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use halu_core::message::Transcript;

    #[test]
    fn vllm_constructor() {
        let provider = OpenAiCompatProvider::vllm(None).unwrap();
        assert_eq!(provider.name, "vllm");
        assert!(provider.base_url.contains("localhost:8000"));
    }

    #[test]
    fn message_conversion() {
        let mut t = Transcript::with_system("sys");
        t.push_user("Hello");
        t.push_assistant("<tool_call>{\"name\":\"list_files\"}</tool_call>");
        t.push_tool_result("[]").unwrap();

        let msgs = OpenAiCompatProvider::to_api_messages(t.turns());
        let roles: Vec<&str> = msgs.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "user"]);
    }

    #[test]
    fn request_body_carries_tools_and_usage_option() {
        let request = ProviderRequest {
            model: "Qwen/Qwen2.5-Coder-32B-Instruct".into(),
            turns: vec![],
            temperature: 0.7,
            max_tokens: Some(512),
            tools: vec![ToolDefinition {
                name: "read_file".into(),
                description: "Read a file".into(),
                parameters: serde_json::json!({"type": "object"}),
            }],
        };
        let body = OpenAiCompatProvider::request_body(&request);
        assert_eq!(body["stream_options"]["include_usage"], true);
        assert_eq!(body["max_tokens"], 512);
        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(body["tools"][0]["function"]["name"], "read_file");
    }

    #[test]
    fn decode_content_delta() {
        let mut decoder = ChunkDecoder::default();
        let events = decoder.decode(r#"{"choices":[{"delta":{"content":"Hello"},"finish_reason":null}]}"#);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].as_ref().unwrap(), &StreamEvent::TextDelta("Hello".into()));
    }

    #[test]
    fn decode_usage_chunk() {
        let mut decoder = ChunkDecoder::default();
        let events = decoder.decode(
            r#"{"choices":[],"usage":{"prompt_tokens":10,"completion_tokens":5,"total_tokens":15}}"#,
        );
        assert_eq!(
            events[0].as_ref().unwrap(),
            &StreamEvent::Usage(UsageReport {
                input_tokens: Some(10),
                output_tokens: Some(5)
            })
        );
    }

    #[test]
    fn decode_done_marker() {
        let mut decoder = ChunkDecoder::default();
        let events = decoder.decode("[DONE]");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].as_ref().unwrap(), &StreamEvent::Done);
    }

    #[test]
    fn decode_in_stream_error() {
        let mut decoder = ChunkDecoder::default();
        let events = decoder.decode(r#"{"error":{"message":"engine crashed","code":500}}"#);
        assert!(events[0].as_ref().unwrap_err().is_transient());
    }

    #[test]
    fn native_tool_call_deltas_become_in_band_block() {
        let mut decoder = ChunkDecoder::default();
        assert!(decoder
            .decode(r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"c1","function":{"name":"read_file","arguments":""}}]}}]}"#)
            .is_empty());
        assert!(decoder
            .decode(r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"path\":"}}]}}]}"#)
            .is_empty());
        assert!(decoder
            .decode(r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"\"a.txt\"}"}}]}}]}"#)
            .is_empty());

        let events = decoder.decode(r#"{"choices":[{"delta":{},"finish_reason":"tool_calls"}]}"#);
        assert_eq!(events.len(), 1);
        let StreamEvent::TextDelta(block) = events[0].as_ref().unwrap() else {
            panic!("expected text delta");
        };
        assert!(block.starts_with("<tool_call>"));
        assert!(block.ends_with("</tool_call>"));
        assert!(block.contains(r#""name":"read_file""#));
        assert!(block.contains(r#""path":"a.txt""#));
    }

    #[test]
    fn unparseable_chunk_is_ignored() {
        let mut decoder = ChunkDecoder::default();
        assert!(decoder.decode("{not json").is_empty());
    }
}
