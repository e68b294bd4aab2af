//! Anthropic native provider implementation.
//!
//! Uses Anthropic's Messages API directly (not an OpenAI-compatible proxy).
//!
//! Features:
//! - `x-api-key` header authentication (not Bearer)
//! - `anthropic-version` header
//! - System turn as the top-level `system` field
//! - Tool-result turns sent as user messages, adjacent same-role turns merged
//! - Streaming via SSE (`content_block_delta`, `message_delta`, `message_stop`)
//! - Input token counting via `/v1/messages/count_tokens`
//!
//! Tools are described in-band in the system prompt, so no native `tools`
//! field is sent.

use async_trait::async_trait;
use futures::StreamExt;
use halu_core::error::ProviderError;
use halu_core::message::{Role, Turn};
use halu_core::provider::*;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::http::{build_client, check_status, send_error};
use crate::sse::{SseLineBuffer, data_payload};

const ANTHROPIC_VERSION: &str = "2023-06-01";
pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Anthropic native Messages API provider.
pub struct AnthropicProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl AnthropicProvider {
    /// Create a new Anthropic provider.
    pub fn new(api_key: impl Into<String>) -> Result<Self, ProviderError> {
        Ok(Self {
            name: "anthropic".into(),
            base_url: DEFAULT_BASE_URL.into(),
            api_key: api_key.into(),
            client: build_client(300)?,
        })
    }

    /// Use a custom base URL (e.g., for testing or proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Split the transcript into the top-level system prompt and the
    /// alternating user/assistant message list the API expects.
    fn to_api_messages(turns: &[Turn]) -> (Option<String>, Vec<AnthropicMessage>) {
        let mut system_parts: Vec<&str> = Vec::new();
        let mut messages: Vec<AnthropicMessage> = Vec::new();

        for turn in turns {
            let role = match turn.role {
                Role::System => {
                    system_parts.push(&turn.content);
                    continue;
                }
                Role::User | Role::Tool => "user",
                Role::Assistant => "assistant",
            };
            if turn.content.is_empty() {
                continue;
            }

            match messages.last_mut() {
                Some(prev) if prev.role == role => {
                    prev.content.push_str("\n\n");
                    prev.content.push_str(&turn.content);
                }
                _ => messages.push(AnthropicMessage {
                    role: role.into(),
                    content: turn.content.clone(),
                }),
            }
        }

        let system = if system_parts.is_empty() {
            None
        } else {
            Some(system_parts.join("\n\n"))
        };

        (system, messages)
    }

    fn request_body(request: &ProviderRequest) -> serde_json::Value {
        let (system, messages) = Self::to_api_messages(&request.turns);

        let mut body = serde_json::json!({
            "model": request.model,
            "messages": messages,
            "max_tokens": request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "temperature": request.temperature,
        });

        if let Some(sys) = system {
            body["system"] = serde_json::json!(sys);
        }

        body
    }

    /// Decode one SSE `data:` payload.
    ///
    /// Returns `None` for events that carry nothing the agent needs
    /// (`ping`, block start/stop, unparseable data).
    pub(crate) fn decode_event(data: &str) -> Option<Result<StreamEvent, ProviderError>> {
        let event: SseEvent = match serde_json::from_str(data) {
            Ok(v) => v,
            Err(e) => {
                trace!(error = %e, data = %data, "Ignoring unparseable Anthropic SSE");
                return None;
            }
        };

        match event {
            SseEvent::MessageStart { message } => message.usage.map(|u| {
                Ok(StreamEvent::Usage(UsageReport {
                    input_tokens: u.input_tokens,
                    output_tokens: None,
                }))
            }),
            SseEvent::ContentBlockDelta { delta } => match delta {
                Delta::TextDelta { text } if !text.is_empty() => Some(Ok(StreamEvent::TextDelta(text))),
                _ => None,
            },
            SseEvent::MessageDelta { usage } => usage.map(|u| {
                Ok(StreamEvent::Usage(UsageReport {
                    input_tokens: u.input_tokens,
                    output_tokens: u.output_tokens,
                }))
            }),
            SseEvent::MessageStop => Some(Ok(StreamEvent::Done)),
            SseEvent::Error { error } => Some(Err(ProviderError::StreamInterrupted(format!(
                "{}: {}",
                error.kind, error.message
            )))),
            SseEvent::Other => None,
        }
    }
}

#[async_trait]
impl halu_core::Provider for AnthropicProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn stream(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<mpsc::Receiver<std::result::Result<StreamEvent, ProviderError>>, ProviderError> {
        let url = format!("{}/v1/messages", self.base_url);
        let mut body = Self::request_body(&request);
        body["stream"] = serde_json::json!(true);

        debug!(provider = "anthropic", model = %request.model, turns = request.turns.len(), "Sending streaming request");

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream")
            .json(&body)
            .send()
            .await
            .map_err(send_error)?;

        let response = check_status("anthropic", response).await?;

        let (tx, rx) = mpsc::channel(64);

        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut lines = SseLineBuffer::new();

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
                    let Some(event) = Self::decode_event(data.trim()) else {
                        continue;
                    };

                    let terminal = matches!(event, Ok(StreamEvent::Done) | Err(_));
                    if tx.send(event).await.is_err() || terminal {
                        // Receiver dropped, or the stream is over
                        return;
                    }
                }
            }
            // Body ended without message_stop: dropping `tx` tells the
            // receiver the stream was cut off.
        });

        Ok(rx)
    }

    async fn count_tokens(
        &self,
        request: &ProviderRequest,
    ) -> std::result::Result<Option<u64>, ProviderError> {
        let url = format!("{}/v1/messages/count_tokens", self.base_url);
        let (system, messages) = Self::to_api_messages(&request.turns);

        let mut body = serde_json::json!({
            "model": request.model,
            "messages": messages,
        });
        if let Some(sys) = system {
            body["system"] = serde_json::json!(sys);
        }

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(send_error)?;

        let response = check_status("anthropic", response).await?;

        let counted: CountTokensResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("count_tokens: {e}")))?;

        Ok(Some(counted.input_tokens))
    }
}

// --- Anthropic API types ---

#[derive(Debug, Serialize, Deserialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum SseEvent {
    MessageStart {
        message: StartMessage,
    },
    ContentBlockDelta {
        delta: Delta,
    },
    MessageDelta {
        #[serde(default)]
        usage: Option<ApiUsage>,
    },
    MessageStop,
    Error {
        error: ApiErrorBody,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct StartMessage {
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Delta {
    TextDelta {
        text: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    #[serde(default)]
    input_tokens: Option<u64>,
    #[serde(default)]
    output_tokens: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct CountTokensResponse {
    input_tokens: u64,
}
