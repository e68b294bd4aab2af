//! Shared test helpers for agent loop tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use halu_core::error::{ProviderError, ToolError};
use halu_core::provider::{Provider, ProviderRequest, StreamEvent, UsageReport};
use halu_core::tool::{Tool, ToolRegistry};
use serde_json::{Map, Value};
use tokio::sync::mpsc;

/// One step of a scripted stream.
#[derive(Debug, Clone)]
pub enum Step {
    Text(String),
    Usage(UsageReport),
    Done,
    /// Close the channel without `Done`.
    Interrupt,
    /// Keep the stream open until the receiver goes away.
    Hang,
}

/// A mock provider that streams a sequence of scripted responses.
///
/// Each call to `stream` consumes the next script. Panics if more calls are
/// made than scripts provided.
pub struct ScriptedProvider {
    scripts: Mutex<VecDeque<Result<Vec<Step>, ProviderError>>>,
    requests: Mutex<Vec<ProviderRequest>>,
    precount: Option<u64>,
}

impl ScriptedProvider {
    pub fn new(scripts: Vec<Vec<Step>>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into_iter().map(Ok).collect()),
            requests: Mutex::new(Vec::new()),
            precount: None,
        }
    }

    /// A provider whose `stream` calls fail up front with these errors.
    pub fn failing(errors: Vec<ProviderError>) -> Self {
        Self {
            scripts: Mutex::new(errors.into_iter().map(Err).collect()),
            requests: Mutex::new(Vec::new()),
            precount: None,
        }
    }

    pub fn with_precount(mut self, tokens: u64) -> Self {
        self.precount = Some(tokens);
        self
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn stream(
        &self,
        request: ProviderRequest,
    ) -> Result<mpsc::Receiver<Result<StreamEvent, ProviderError>>, ProviderError> {
        let call = self.requests.lock().unwrap().len();
        self.requests.lock().unwrap().push(request);
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| panic!("ScriptedProvider: no script for call #{call}"))?;

        let (tx, rx) = mpsc::channel(4);
        tokio::spawn(async move {
            for step in script {
                let event = match step {
                    Step::Text(t) => StreamEvent::TextDelta(t),
                    Step::Usage(u) => StreamEvent::Usage(u),
                    Step::Done => StreamEvent::Done,
                    Step::Interrupt => return,
                    Step::Hang => {
                        tx.closed().await;
                        return;
                    }
                };
                if tx.send(Ok(event)).await.is_err() {
                    return;
                }
            }
        });
        Ok(rx)
    }

    async fn count_tokens(&self, _request: &ProviderRequest) -> Result<Option<u64>, ProviderError> {
        Ok(self.precount)
    }
}

/// A complete turn streamed in the given fragments.
pub fn turn(fragments: &[&str]) -> Vec<Step> {
    let mut steps: Vec<Step> = fragments.iter().map(|f| Step::Text((*f).into())).collect();
    steps.push(Step::Done);
    steps
}

/// A turn cut off after the given fragments.
pub fn interrupted(fragments: &[&str]) -> Vec<Step> {
    let mut steps: Vec<Step> = fragments.iter().map(|f| Step::Text((*f).into())).collect();
    steps.push(Step::Interrupt);
    steps
}

/// Tool that echoes its `text` argument.
pub struct EchoTool;

#[async_trait::async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echoes back the text argument"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": { "text": { "type": "string" } },
            "required": ["text"]
        })
    }

    async fn execute(&self, arguments: &Map<String, Value>) -> Result<String, ToolError> {
        let text = arguments
            .get("text")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'text'".into()))?;
        Ok(text.to_string())
    }
}

/// Tool that always fails.
pub struct BrokenTool;

#[async_trait::async_trait]
impl Tool for BrokenTool {
    fn name(&self) -> &str {
        "broken"
    }

    fn description(&self) -> &str {
        "Always fails"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({ "type": "object" })
    }

    async fn execute(&self, _arguments: &Map<String, Value>) -> Result<String, ToolError> {
        Err(ToolError::ExecutionFailed {
            tool_name: "broken".into(),
            reason: "disk on fire".into(),
        })
    }
}

pub fn registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(EchoTool));
    registry.register(Box::new(BrokenTool));
    registry
}
