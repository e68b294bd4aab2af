//! Terminal and JSON-lines renderers for agent events.

use std::io::Write;

use crossterm::style::{Color, Stylize};
use halu_agent::{AgentEvent, DisplaySink};
use halu_core::provider::Usage;

/// Longest tool output shown inline before it is cut.
const RESULT_PREVIEW_CHARS: usize = 120;

/// How the CLI presents output, chosen once from the global flags.
#[derive(Debug, Clone, Copy)]
pub struct OutputMode {
    pub json: bool,
    pub color: bool,
}

impl OutputMode {
    pub fn new(json: bool, color: bool) -> Self {
        Self { json, color }
    }

    /// A sink writing to stdout in this mode.
    pub fn sink(&self) -> Box<dyn DisplaySink> {
        if self.json {
            Box::new(JsonLinesSink::new(std::io::stdout()))
        } else {
            Box::new(TerminalSink::new(std::io::stdout(), self.color))
        }
    }

    pub fn paint(&self, text: &str, color: Color) -> String {
        paint(self.color, text, color)
    }
}

fn paint(enabled: bool, text: &str, color: Color) -> String {
    if enabled {
        text.with(color).to_string()
    } else {
        text.to_string()
    }
}

/// Streams text as it arrives and prints tool activity on its own lines.
pub struct TerminalSink<W: Write + Send> {
    out: W,
    color: bool,
    at_line_start: bool,
}

impl<W: Write + Send> TerminalSink<W> {
    pub fn new(out: W, color: bool) -> Self {
        Self {
            out,
            color,
            at_line_start: true,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn line(&mut self, text: &str) {
        if !self.at_line_start {
            let _ = writeln!(self.out);
        }
        let _ = writeln!(self.out, "{text}");
        self.at_line_start = true;
    }
}

impl<W: Write + Send> DisplaySink for TerminalSink<W> {
    fn emit(&mut self, event: AgentEvent) {
        match event {
            AgentEvent::Text { content } => {
                let _ = write!(self.out, "{content}");
                if let Some(last) = content.chars().last() {
                    self.at_line_start = last == '\n';
                }
            }
            AgentEvent::ToolCall { name, arguments } => {
                let args = serde_json::Value::Object(arguments).to_string();
                let text = paint(self.color, &format!("  → {name} {args}"), Color::Cyan);
                self.line(&text);
            }
            AgentEvent::ToolResult {
                name,
                success,
                output,
            } => {
                let text = if success {
                    let size = output.chars().count();
                    paint(self.color, &format!("  ✓ {name} ({size} chars)"), Color::Green)
                } else {
                    paint(
                        self.color,
                        &format!("  ✗ {name}: {}", preview(&output)),
                        Color::Red,
                    )
                };
                self.line(&text);
            }
            AgentEvent::Retry {
                attempt,
                max_attempts,
                reason,
            } => {
                let text = paint(
                    self.color,
                    &format!("  ↻ {reason}; retrying ({attempt}/{max_attempts})"),
                    Color::Yellow,
                );
                self.line(&text);
            }
            AgentEvent::Done { .. } => {
                if !self.at_line_start {
                    let _ = writeln!(self.out);
                    self.at_line_start = true;
                }
            }
        }
        let _ = self.out.flush();
    }
}

/// One JSON object per event, one event per line.
pub struct JsonLinesSink<W: Write + Send> {
    out: W,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> DisplaySink for JsonLinesSink<W> {
    fn emit(&mut self, event: AgentEvent) {
        match serde_json::to_string(&event) {
            Ok(line) => {
                let _ = writeln!(self.out, "{line}");
                let _ = self.out.flush();
            }
            Err(e) => tracing::warn!(error = %e, "Could not serialize event"),
        }
    }
}

/// First line of `text`, cut to a readable length.
fn preview(text: &str) -> String {
    let first = text.lines().next().unwrap_or_default();
    if first.chars().count() > RESULT_PREVIEW_CHARS {
        let cut: String = first.chars().take(RESULT_PREVIEW_CHARS).collect();
        format!("{cut}…")
    } else {
        first.to_string()
    }
}

/// One-line usage summary, with cost when the model's price is known.
pub fn usage_line(label: &str, usage: &Usage, cost: Option<f64>) -> String {
    let cost = match cost {
        Some(c) => format!("${c:.6}"),
        None => "unknown".into(),
    };
    format!(
        "{label}: {} input + {} output tokens, cost {cost}",
        usage.input_tokens, usage.output_tokens
    )
}
