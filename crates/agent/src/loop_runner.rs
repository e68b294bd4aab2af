//! The agent loop implementation.

use std::sync::Arc;

use halu_config::AppConfig;
use halu_core::error::{Error, ProviderError, Result, ToolError};
use halu_core::message::Transcript;
use halu_core::provider::{Provider, ProviderRequest, StreamEvent, Usage, UsageReport};
use halu_core::tool::{ToolRegistry, ToolResult};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::prompt::build_system_prompt;
use crate::retry::RetryPolicy;
use crate::scanner::{ScanOutcome, StreamScanner};
use crate::stream_event::{AgentEvent, DisplaySink};
use crate::token::{estimate_request_tokens, estimate_tokens};

/// Default ceiling on tool rounds per interaction.
pub const DEFAULT_MAX_ROUNDS: u32 = 25;

/// The result of one completed interaction.
#[derive(Debug, Clone, PartialEq)]
pub struct Interaction {
    /// Plain text of the final model turn
    pub answer: String,

    /// Usage summed over every call of this interaction
    pub usage: Usage,

    /// Model turns taken, the final one included
    pub rounds: u32,

    /// Tools executed
    pub tool_calls: usize,
}

/// One successfully streamed model turn.
struct StreamedTurn {
    raw: String,
    outcome: ScanOutcome,
    usage: Usage,
}

/// Drives a session: streams model turns, dispatches the tool calls they
/// contain, and feeds the results back until the model answers in plain
/// text.
///
/// The loop owns the transcript and the session's cumulative usage. Both
/// survive failed interactions, so a session can carry on after an error.
pub struct AgentLoop {
    /// The model endpoint
    provider: Arc<dyn Provider>,

    /// Tool registry
    tools: Arc<ToolRegistry>,

    /// The session transcript
    transcript: Transcript,

    /// The model to use
    model: String,

    /// Temperature setting
    temperature: f32,

    /// Max tokens per model response
    max_tokens: Option<u32>,

    /// Retries for interrupted streams
    retry: RetryPolicy,

    /// Maximum tool rounds per interaction
    max_rounds: u32,

    /// Ask the provider for an input count before each call
    precount_tokens: bool,

    /// Usage over every call of the session
    session_usage: Usage,
}

impl AgentLoop {
    /// Create an agent loop with an empty transcript.
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>, tools: Arc<ToolRegistry>) -> Self {
        Self {
            provider,
            tools,
            transcript: Transcript::new(),
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
            retry: RetryPolicy::default(),
            max_rounds: DEFAULT_MAX_ROUNDS,
            precount_tokens: false,
            session_usage: Usage::default(),
        }
    }

    /// Create an agent loop configured from `config`, with the system
    /// prompt (tool catalogue included) as the first turn.
    pub fn from_config(config: &AppConfig, provider: Arc<dyn Provider>, tools: Arc<ToolRegistry>) -> Self {
        let system_prompt = config.agent.system_prompt.clone();
        Self::new(provider, config.model.clone(), tools)
            .with_temperature(config.temperature)
            .with_max_tokens(config.max_tokens)
            .with_retry_policy(RetryPolicy::from_config(&config.agent))
            .with_max_rounds(config.agent.max_rounds)
            .with_precount_tokens(config.agent.precount_tokens)
            .with_system_prompt(system_prompt.as_deref())
    }

    /// Start the transcript with a system prompt built from `base` and the
    /// registry's tools. Replaces the transcript.
    pub fn with_system_prompt(mut self, base: Option<&str>) -> Self {
        let prompt = build_system_prompt(base, &self.tools.definitions());
        self.transcript = Transcript::with_system(prompt);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the max tokens per model response.
    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Set the maximum number of tool rounds per interaction.
    pub fn with_max_rounds(mut self, max: u32) -> Self {
        self.max_rounds = max.max(1);
        self
    }

    pub fn with_precount_tokens(mut self, enabled: bool) -> Self {
        self.precount_tokens = enabled;
        self
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn session_usage(&self) -> Usage {
        self.session_usage
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Run one interaction.
    ///
    /// A non-empty `prompt` is appended as a user turn (an empty one just
    /// continues from the current transcript). Plain text is forwarded to
    /// `sink` as it streams. Returns once a model turn contains no tool
    /// calls.
    ///
    /// Fatal errors (an unknown tool, the round limit, a non-retryable or
    /// exhausted provider failure, cancellation) end the interaction but
    /// leave every turn appended so far in place.
    pub async fn run(
        &mut self,
        prompt: &str,
        sink: &mut dyn DisplaySink,
        cancel: &CancellationToken,
    ) -> Result<Interaction> {
        if !prompt.trim().is_empty() {
            self.transcript.push_user(prompt);
        }
        info!(session = %self.transcript.id(), provider = self.provider.name(), model = %self.model, "Starting interaction");

        let definitions = self.tools.definitions();
        let mut usage = Usage::default();
        let mut tool_calls = 0;

        for round in 1..=self.max_rounds {
            debug!(round, turns = self.transcript.len(), "Requesting model turn");

            let request = ProviderRequest {
                model: self.model.clone(),
                turns: self.transcript.turns().to_vec(),
                temperature: self.temperature,
                max_tokens: self.max_tokens,
                tools: definitions.clone(),
            };

            let policy = self.retry;
            let this = &*self;
            let turn = policy
                .attempt(
                    &mut *sink,
                    cancel,
                    || request.clone(),
                    async |sink, request| this.stream_turn(request, sink, cancel).await,
                )
                .await?;

            usage += turn.usage;
            self.session_usage += turn.usage;
            self.transcript.push_assistant(turn.raw);

            let outcome = turn.outcome;
            if outcome.malformed > 0 {
                debug!(round, malformed = outcome.malformed, "Model turn had malformed tool calls");
            }

            if outcome.calls.is_empty() {
                info!(
                    rounds = round,
                    tool_calls,
                    input_tokens = usage.input_tokens,
                    output_tokens = usage.output_tokens,
                    "Interaction complete"
                );
                sink.emit(AgentEvent::Done {
                    usage,
                    rounds: round,
                    tool_calls_made: tool_calls,
                });
                return Ok(Interaction {
                    answer: outcome.plain_text,
                    usage,
                    rounds: round,
                    tool_calls,
                });
            }

            // Resolve every name before running anything
            if let Some(unknown) = outcome.calls.iter().find(|c| !self.tools.contains(&c.name)) {
                warn!(tool = %unknown.name, "Model requested an unknown tool");
                return Err(ToolError::NotFound(unknown.name.clone()).into());
            }

            for call in &outcome.calls {
                if cancel.is_cancelled() {
                    return Err(Error::Cancelled);
                }

                debug!(tool = %call.name, "Executing tool");
                sink.emit(AgentEvent::ToolCall {
                    name: call.name.clone(),
                    arguments: call.arguments.clone(),
                });

                let result = self.tools.invoke(call).await?;
                if !result.success {
                    warn!(tool = %call.name, error = %result.output, "Tool failed");
                }

                sink.emit(AgentEvent::ToolResult {
                    name: call.name.clone(),
                    success: result.success,
                    output: result.output.clone(),
                });
                self.transcript
                    .push_tool_result(format_tool_result(&call.name, &result))?;
                tool_calls += 1;
            }
        }

        warn!(max_rounds = self.max_rounds, "Tool round limit reached");
        Err(Error::RoundLimit {
            rounds: self.max_rounds,
        })
    }

    /// Stream one model turn through a fresh scanner.
    async fn stream_turn(
        &self,
        request: ProviderRequest,
        sink: &mut dyn DisplaySink,
        cancel: &CancellationToken,
    ) -> Result<StreamedTurn> {
        let input_estimate = self.estimate_input(&request).await;
        let mut rx = self.provider.stream(request).await?;

        let mut scanner = StreamScanner::new();
        let mut raw = String::new();
        let mut reported = UsageReport::default();

        loop {
            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                event = rx.recv() => event,
            };

            match event {
                Some(Ok(StreamEvent::TextDelta(fragment))) => {
                    raw.push_str(&fragment);
                    let text = scanner.feed(&fragment);
                    if !text.is_empty() {
                        sink.emit(AgentEvent::Text { content: text });
                    }
                }
                Some(Ok(StreamEvent::Usage(report))) => {
                    if report.input_tokens.is_some() {
                        reported.input_tokens = report.input_tokens;
                    }
                    if report.output_tokens.is_some() {
                        reported.output_tokens = report.output_tokens;
                    }
                }
                Some(Ok(StreamEvent::Done)) => break,
                Some(Err(e)) => return Err(e.into()),
                None => {
                    return Err(ProviderError::StreamInterrupted(
                        "stream closed before the response completed".into(),
                    )
                    .into());
                }
            }
        }
        drop(rx);

        let outcome = scanner.finish();
        if !outcome.trailing_text.is_empty() {
            sink.emit(AgentEvent::Text {
                content: outcome.trailing_text.clone(),
            });
        }

        let mut usage = Usage::new(input_estimate, estimate_tokens(&raw));
        usage.apply(&reported);
        debug!(
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            calls = outcome.calls.len(),
            "Model turn complete"
        );

        Ok(StreamedTurn { raw, outcome, usage })
    }

    /// Input token estimate for a request, asking the provider when
    /// precounting is on.
    async fn estimate_input(&self, request: &ProviderRequest) -> u64 {
        if self.precount_tokens {
            match self.provider.count_tokens(request).await {
                Ok(Some(count)) => return count,
                Ok(None) => {}
                Err(e) => warn!(error = %e, "Token precount failed, using estimate"),
            }
        }
        estimate_request_tokens(request)
    }
}

/// Render a tool result as the transcript turn the model will read.
pub fn format_tool_result(name: &str, result: &ToolResult) -> String {
    format!(
        "<tool_result name=\"{name}\" success=\"{}\">\n{}\n</tool_result>",
        result.success, result.output
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream_event::NullSink;
    use crate::test_helpers::{ScriptedProvider, Step, interrupted, registry, turn};
    use halu_core::message::Role;
    use std::time::Duration;

    fn agent(provider: &Arc<ScriptedProvider>) -> AgentLoop {
        AgentLoop::new(provider.clone(), "test-model", Arc::new(registry()))
            .with_retry_policy(RetryPolicy::immediate(10))
            .with_system_prompt(Some("You are a test agent."))
    }

    #[tokio::test]
    async fn plain_answer_streams_text() {
        let provider = Arc::new(ScriptedProvider::new(vec![turn(&["Hel", "lo ", "there"])]));
        let mut agent = agent(&provider);
        let mut events = Vec::new();
        let mut sink = |e: AgentEvent| events.push(e);

        let result = agent.run("hi", &mut sink, &CancellationToken::new()).await.unwrap();

        assert_eq!(result.answer, "Hello there");
        assert_eq!(result.rounds, 1);
        assert_eq!(result.tool_calls, 0);
        let text: String = events
            .iter()
            .filter_map(|e| match e {
                AgentEvent::Text { content } => Some(content.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(text, "Hello there");
        assert!(matches!(events.last(), Some(AgentEvent::Done { rounds: 1, .. })));

        let roles: Vec<Role> = agent.transcript().turns().iter().map(|t| t.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant]);
    }

    #[tokio::test]
    async fn tool_round_then_answer() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            turn(&[
                "Let me check. <tool_",
                "call>{\"name\":\"echo\",\"text\":\"pong\"}</tool_call>",
            ]),
            turn(&["It said pong."]),
        ]));
        let mut agent = agent(&provider);
        let mut events = Vec::new();
        let mut sink = |e: AgentEvent| events.push(e);

        let result = agent.run("ping it", &mut sink, &CancellationToken::new()).await.unwrap();

        assert_eq!(result.answer, "It said pong.");
        assert_eq!(result.rounds, 2);
        assert_eq!(result.tool_calls, 1);

        let kinds: Vec<&str> = events.iter().map(AgentEvent::event_type).collect();
        assert_eq!(kinds, vec!["text", "tool_call", "tool_result", "text", "done"]);
        assert!(matches!(
            &events[2],
            AgentEvent::ToolResult { success: true, output, .. } if output == "pong"
        ));

        // The assistant turn keeps the raw block; the result follows it
        let turns = agent.transcript().turns();
        assert_eq!(turns.len(), 5);
        assert!(turns[2].content.contains("<tool_call>{\"name\":\"echo\""));
        assert_eq!(turns[3].role, Role::Tool);
        assert_eq!(turns[3].content, "<tool_result name=\"echo\" success=\"true\">\npong\n</tool_result>");

        // The second request carried the tool result
        let requests = provider.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].turns.len(), 4);
        assert_eq!(requests[0].tools.len(), 2);
    }

    #[tokio::test]
    async fn multiple_calls_run_in_order() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            turn(&[
                "<tool_call>{\"name\":\"echo\",\"text\":\"first\"}</tool_call>",
                "<tool_call>{\"name\":\"echo\",\"arguments\":{\"text\":\"second\"}}</tool_call>",
            ]),
            turn(&["done"]),
        ]));
        let mut agent = agent(&provider);

        let result = agent.run("go", &mut NullSink, &CancellationToken::new()).await.unwrap();

        assert_eq!(result.tool_calls, 2);
        let tool_turns: Vec<&str> = agent
            .transcript()
            .turns()
            .iter()
            .filter(|t| t.role == Role::Tool)
            .map(|t| t.content.as_str())
            .collect();
        assert_eq!(tool_turns.len(), 2);
        assert!(tool_turns[0].contains("first"));
        assert!(tool_turns[1].contains("second"));
    }

    #[tokio::test]
    async fn failing_tool_becomes_result() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            turn(&["<tool_call>{\"name\":\"broken\"}</tool_call>"]),
            turn(&["Sorry, that failed."]),
        ]));
        let mut agent = agent(&provider);

        let result = agent.run("try", &mut NullSink, &CancellationToken::new()).await.unwrap();

        assert_eq!(result.answer, "Sorry, that failed.");
        let tool_turn = &agent.transcript().turns()[3];
        assert_eq!(tool_turn.role, Role::Tool);
        assert!(tool_turn.content.contains("success=\"false\""));
        assert!(tool_turn.content.contains("disk on fire"));
    }

    #[tokio::test]
    async fn unknown_tool_is_fatal_and_runs_nothing() {
        let provider = Arc::new(ScriptedProvider::new(vec![turn(&[
            "<tool_call>{\"name\":\"echo\",\"text\":\"a\"}</tool_call>",
            "<tool_call>{\"name\":\"rm_rf\"}</tool_call>",
        ])]));
        let mut agent = agent(&provider);
        let mut events = Vec::new();
        let mut sink = |e: AgentEvent| events.push(e);

        let err = agent.run("go", &mut sink, &CancellationToken::new()).await.unwrap_err();

        assert!(matches!(err, Error::Tool(ToolError::NotFound(ref name)) if name == "rm_rf"));
        assert!(events.iter().all(|e| !matches!(e, AgentEvent::ToolCall { .. })));
        // The assistant turn stays, no tool results were appended
        assert_eq!(agent.transcript().count_role(Role::Tool), 0);
        assert_eq!(agent.transcript().last().unwrap().role, Role::Assistant);
    }

    #[tokio::test]
    async fn interrupted_stream_is_retried() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            interrupted(&["Hel"]),
            interrupted(&[]),
            interrupted(&["Hello wor"]),
            turn(&["Hello world"]),
        ]));
        let mut agent = agent(&provider);
        let mut events = Vec::new();
        let mut sink = |e: AgentEvent| events.push(e);

        let result = agent.run("hi", &mut sink, &CancellationToken::new()).await.unwrap();

        assert_eq!(result.answer, "Hello world");
        assert_eq!(provider.call_count(), 4);
        let retries: Vec<u32> = events
            .iter()
            .filter_map(|e| match e {
                AgentEvent::Retry { attempt, .. } => Some(*attempt),
                _ => None,
            })
            .collect();
        assert_eq!(retries, vec![2, 3, 4]);

        // Only the successful attempt reaches the transcript
        assert_eq!(agent.transcript().count_role(Role::Assistant), 1);
        assert_eq!(agent.transcript().last().unwrap().content, "Hello world");
        // Every attempt sent the identical transcript
        let requests = provider.requests();
        assert!(requests.iter().all(|r| r.turns.len() == 2));
    }

    #[tokio::test]
    async fn calls_closed_before_an_interruption_run_once() {
        let call = "<tool_call>{\"name\":\"echo\",\"text\":\"once\"}</tool_call>";
        let provider = Arc::new(ScriptedProvider::new(vec![
            interrupted(&[call]),
            interrupted(&[call, " and more"]),
            interrupted(&["Sure. ", call]),
            turn(&["Sure. ", call]),
            turn(&["Echoed."]),
        ]));
        let mut agent = agent(&provider);
        let mut events = Vec::new();
        let mut sink = |e: AgentEvent| events.push(e);

        let result = agent.run("echo once", &mut sink, &CancellationToken::new()).await.unwrap();

        assert_eq!(result.answer, "Echoed.");
        assert_eq!(result.tool_calls, 1);
        assert_eq!(provider.call_count(), 5);
        let dispatched = events
            .iter()
            .filter(|e| matches!(e, AgentEvent::ToolCall { .. }))
            .count();
        assert_eq!(dispatched, 1);

        let transcript = agent.transcript();
        assert_eq!(transcript.count_role(Role::Tool), 1);
        assert_eq!(transcript.count_role(Role::Assistant), 2);
        let roles: Vec<Role> = transcript.turns().iter().map(|t| t.role).collect();
        assert_eq!(
            roles,
            vec![Role::System, Role::User, Role::Assistant, Role::Tool, Role::Assistant]
        );
    }

    #[tokio::test]
    async fn retries_exhausted_surfaces_error() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            interrupted(&["a"]),
            interrupted(&["b"]),
            interrupted(&["c"]),
        ]));
        let mut agent = agent(&provider).with_retry_policy(RetryPolicy::immediate(3));

        let err = agent.run("hi", &mut NullSink, &CancellationToken::new()).await.unwrap_err();

        assert!(matches!(err, Error::Provider(ProviderError::StreamInterrupted(_))));
        assert_eq!(provider.call_count(), 3);
        assert_eq!(agent.transcript().count_role(Role::Assistant), 0);
    }

    #[tokio::test]
    async fn non_transient_error_is_not_retried() {
        let provider = Arc::new(ScriptedProvider::failing(vec![
            ProviderError::AuthenticationFailed("bad key".into()),
        ]));
        let mut agent = agent(&provider);

        let err = agent.run("hi", &mut NullSink, &CancellationToken::new()).await.unwrap_err();

        assert!(matches!(err, Error::Provider(ProviderError::AuthenticationFailed(_))));
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn round_limit_is_fatal() {
        let call = "<tool_call>{\"name\":\"echo\",\"text\":\"again\"}</tool_call>";
        let provider = Arc::new(ScriptedProvider::new(vec![turn(&[call]), turn(&[call]), turn(&[call])]));
        let mut agent = agent(&provider).with_max_rounds(3);

        let err = agent.run("loop", &mut NullSink, &CancellationToken::new()).await.unwrap_err();

        assert!(matches!(err, Error::RoundLimit { rounds: 3 }));
        assert_eq!(agent.transcript().count_role(Role::Tool), 3);
    }

    #[tokio::test]
    async fn cancellation_while_streaming() {
        let provider = Arc::new(ScriptedProvider::new(vec![vec![
            Step::Text("partial".into()),
            Step::Hang,
        ]]));
        let mut agent = agent(&provider);
        let cancel = CancellationToken::new();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let err = agent.run("hi", &mut NullSink, &cancel).await.unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        // The user turn stays; no assistant turn was appended
        assert_eq!(agent.transcript().last().unwrap().role, Role::User);
    }

    #[tokio::test]
    async fn cancellation_between_tools() {
        let provider = Arc::new(ScriptedProvider::new(vec![turn(&[
            "<tool_call>{\"name\":\"echo\",\"text\":\"x\"}</tool_call>",
            "<tool_call>{\"name\":\"echo\",\"text\":\"y\"}</tool_call>",
        ])]));
        let mut agent = agent(&provider);
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let mut sink = move |e: AgentEvent| {
            if matches!(e, AgentEvent::ToolResult { .. }) {
                token.cancel();
            }
        };

        let err = agent.run("go", &mut sink, &cancel).await.unwrap_err();

        assert!(matches!(err, Error::Cancelled));
        // The first tool ran and its result stays; the second never ran
        assert_eq!(agent.transcript().count_role(Role::Tool), 1);
    }

    #[tokio::test]
    async fn reported_usage_overrides_estimate() {
        let provider = Arc::new(ScriptedProvider::new(vec![vec![
            Step::Usage(UsageReport {
                input_tokens: Some(1234),
                output_tokens: None,
            }),
            Step::Text("abcdefgh".into()),
            Step::Usage(UsageReport {
                input_tokens: None,
                output_tokens: Some(7),
            }),
            Step::Done,
        ]]));
        let mut agent = agent(&provider);

        let result = agent.run("hi", &mut NullSink, &CancellationToken::new()).await.unwrap();

        assert_eq!(result.usage, Usage::new(1234, 7));
        assert_eq!(agent.session_usage(), Usage::new(1234, 7));
    }

    #[tokio::test]
    async fn usage_estimated_when_not_reported() {
        let provider = Arc::new(ScriptedProvider::new(vec![turn(&["abcdefgh"])]));
        let mut agent = agent(&provider);

        let result = agent.run("hi", &mut NullSink, &CancellationToken::new()).await.unwrap();

        // 8 chars of output ≈ 2 tokens
        assert_eq!(result.usage.output_tokens, 2);
        let expected_input = estimate_request_tokens(&provider.requests()[0]);
        assert_eq!(result.usage.input_tokens, expected_input);
        assert!(expected_input > 0);
    }

    #[tokio::test]
    async fn precount_replaces_heuristic() {
        let provider = Arc::new(ScriptedProvider::new(vec![turn(&["ok"])]).with_precount(999));
        let mut agent = agent(&provider).with_precount_tokens(true);

        let result = agent.run("hi", &mut NullSink, &CancellationToken::new()).await.unwrap();
        assert_eq!(result.usage.input_tokens, 999);
    }

    #[tokio::test]
    async fn session_usage_accumulates_across_interactions() {
        let usage = |i, o| Step::Usage(UsageReport {
            input_tokens: Some(i),
            output_tokens: Some(o),
        });
        let provider = Arc::new(ScriptedProvider::new(vec![
            vec![Step::Text("one".into()), usage(10, 1), Step::Done],
            vec![
                Step::Text("<tool_call>{\"name\":\"missing\"}</tool_call>".into()),
                usage(20, 2),
                Step::Done,
            ],
            vec![Step::Text("three".into()), usage(30, 3), Step::Done],
        ]));
        let mut agent = agent(&provider);
        let cancel = CancellationToken::new();

        let first = agent.run("a", &mut NullSink, &cancel).await.unwrap();
        assert_eq!(first.usage, Usage::new(10, 1));

        // A failed interaction still counts towards the session
        assert!(agent.run("b", &mut NullSink, &cancel).await.is_err());
        assert_eq!(agent.session_usage(), Usage::new(30, 3));

        let third = agent.run("c", &mut NullSink, &cancel).await.unwrap();
        assert_eq!(third.usage, Usage::new(30, 3));
        assert_eq!(agent.session_usage(), Usage::new(60, 6));
    }

    #[tokio::test]
    async fn empty_prompt_continues_transcript() {
        let provider = Arc::new(ScriptedProvider::new(vec![turn(&["a"]), turn(&["b"])]));
        let mut agent = agent(&provider);
        let cancel = CancellationToken::new();

        agent.run("hi", &mut NullSink, &cancel).await.unwrap();
        agent.run("  ", &mut NullSink, &cancel).await.unwrap();

        assert_eq!(agent.transcript().count_role(Role::User), 1);
        assert_eq!(agent.transcript().count_role(Role::Assistant), 2);
    }

    #[tokio::test]
    async fn malformed_call_is_ignored() {
        let provider = Arc::new(ScriptedProvider::new(vec![turn(&[
            "Here: <tool_call>{oops}</tool_call> nothing else.",
        ])]));
        let mut agent = agent(&provider);

        let result = agent.run("hi", &mut NullSink, &CancellationToken::new()).await.unwrap();
        assert_eq!(result.answer, "Here:  nothing else.");
        assert_eq!(result.rounds, 1);
    }

    #[test]
    fn from_config_builds_system_prompt() {
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let mut config = AppConfig::default();
        config.agent.system_prompt = Some("Custom base.".into());
        let agent = AgentLoop::from_config(&config, provider, Arc::new(registry()));

        let first = &agent.transcript().turns()[0];
        assert_eq!(first.role, Role::System);
        assert!(first.content.starts_with("Custom base."));
        assert!(first.content.contains("### echo"));
        assert_eq!(agent.model(), config.model);
    }

    #[test]
    fn tool_result_format() {
        let formatted = format_tool_result("read_file", &ToolResult::failure("no such file"));
        assert_eq!(
            formatted,
            "<tool_result name=\"read_file\" success=\"false\">\nno such file\n</tool_result>"
        );
    }
}
