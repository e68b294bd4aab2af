//! Streaming tool-call scanner.
//!
//! The model asks for tools in-band, by writing a JSON payload between
//! `<tool_call>` and `</tool_call>` in its ordinary text output. The scanner
//! sits between the transport and the display: it confirms plain text as
//! soon as it provably isn't part of a tag, and captures complete call
//! blocks for the agent loop to dispatch.
//!
//! It is a character automaton, so the result never depends on where the
//! transport happened to cut the stream into fragments:
//!
//! - **Plain**: text passes straight through, except `<`, which opens a
//!   candidate tag.
//! - **MaybeTag**: characters collect in a small pending buffer. Sentinels
//!   are compared with all whitespace removed (`< tool_call >` is an open
//!   tag, `< / tool_call >` a close tag). The buffer is kept while it could
//!   still become a sentinel and stays within a small raw budget; otherwise
//!   it is released as text and the character that broke the match is
//!   looked at again.
//! - **InCall**: everything goes into the raw span. A `<` opens a close-tag
//!   candidate under the same rules; failed candidates stay in the span.
//!
//! Only the character that breaks a candidate can start a new one, so
//! re-examining that single character is enough to never miss a tag.

use halu_core::tool::ToolCallRequest;
use serde_json::{Map, Value};
use tracing::{debug, warn};

pub const OPEN_TAG: &str = "<tool_call>";
pub const CLOSE_TAG: &str = "</tool_call>";

/// Raw length budget for an unfinished candidate, padding included. A
/// sentinel is 12 chars once whitespace is removed, leaving room for a few
/// spaces around its parts.
const MAX_TAG_CHARS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Plain,
    MaybeTag,
    InCall,
}

/// What a candidate buffer currently looks like.
#[derive(Debug, PartialEq, Eq)]
enum Candidate {
    Open,
    Close,
    Partial,
    Dead,
}

fn classify(pending: &str) -> Candidate {
    let normalized: String = pending.chars().filter(|c| !c.is_whitespace()).collect();
    if normalized == OPEN_TAG {
        Candidate::Open
    } else if normalized == CLOSE_TAG {
        Candidate::Close
    } else if (OPEN_TAG.starts_with(&normalized) || CLOSE_TAG.starts_with(&normalized))
        && pending.chars().count() <= MAX_TAG_CHARS
    {
        Candidate::Partial
    } else {
        Candidate::Dead
    }
}

/// Everything one model turn produced once its stream has ended.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanOutcome {
    /// Text released only at end of stream (an unfinished `<...` candidate).
    /// Already included in `plain_text`.
    pub trailing_text: String,
    /// All plain text of the turn, tool-call blocks removed.
    pub plain_text: String,
    /// Decoded calls, in the order they were closed.
    pub calls: Vec<ToolCallRequest>,
    /// Closed blocks whose payload could not be decoded.
    pub malformed: usize,
}

/// Incremental scanner for one model turn.
#[derive(Debug)]
pub struct StreamScanner {
    mode: Mode,
    content: String,
    pending: String,
    span: String,
    completed: Vec<String>,
}

impl StreamScanner {
    pub fn new() -> Self {
        Self {
            mode: Mode::Plain,
            content: String::new(),
            pending: String::new(),
            span: String::new(),
            completed: Vec::new(),
        }
    }

    /// Consume one fragment, returning the plain text it confirmed.
    pub fn feed(&mut self, fragment: &str) -> String {
        let mut out = String::new();
        for ch in fragment.chars() {
            self.step(ch, &mut out);
        }
        self.content.push_str(&out);
        out
    }

    /// Number of call blocks closed so far.
    pub fn completed_calls(&self) -> usize {
        self.completed.len()
    }

    fn step(&mut self, ch: char, out: &mut String) {
        match self.mode {
            Mode::Plain => {
                if ch == '<' {
                    self.pending.push(ch);
                    self.mode = Mode::MaybeTag;
                } else {
                    out.push(ch);
                }
            }
            Mode::MaybeTag => {
                self.pending.push(ch);
                match classify(&self.pending) {
                    Candidate::Open => {
                        self.span = std::mem::take(&mut self.pending);
                        self.mode = Mode::InCall;
                    }
                    Candidate::Close => {
                        // A close tag with nothing open is just text
                        out.push_str(&self.pending);
                        self.pending.clear();
                        self.mode = Mode::Plain;
                    }
                    Candidate::Partial => {}
                    Candidate::Dead => {
                        let breaking = self.release_pending(out);
                        self.mode = Mode::Plain;
                        self.step(breaking, out);
                    }
                }
            }
            Mode::InCall => {
                if self.pending.is_empty() {
                    if ch == '<' {
                        self.pending.push(ch);
                    } else {
                        self.span.push(ch);
                    }
                    return;
                }

                self.pending.push(ch);
                match classify(&self.pending) {
                    Candidate::Close => {
                        self.span.push_str(&self.pending);
                        self.pending.clear();
                        let span = std::mem::take(&mut self.span);
                        debug!(chars = span.chars().count(), "Captured tool call block");
                        self.completed.push(span);
                        self.mode = Mode::Plain;
                    }
                    Candidate::Partial => {}
                    Candidate::Open | Candidate::Dead => {
                        let mut failed = std::mem::take(&mut self.pending);
                        let breaking = failed.pop().unwrap_or(ch);
                        self.span.push_str(&failed);
                        self.step(breaking, out);
                    }
                }
            }
        }
    }

    /// Emit the pending buffer minus its last char, and hand that char back.
    fn release_pending(&mut self, out: &mut String) -> char {
        let mut failed = std::mem::take(&mut self.pending);
        let breaking = failed.pop().unwrap_or('<');
        out.push_str(&failed);
        breaking
    }

    /// End of stream: release or discard what is still buffered and decode
    /// the captured blocks.
    pub fn finish(mut self) -> ScanOutcome {
        let trailing_text = match self.mode {
            Mode::Plain => String::new(),
            Mode::MaybeTag => std::mem::take(&mut self.pending),
            Mode::InCall => {
                debug!(
                    chars = self.span.chars().count() + self.pending.chars().count(),
                    "Discarding unterminated tool call"
                );
                String::new()
            }
        };
        self.content.push_str(&trailing_text);

        let mut calls = Vec::with_capacity(self.completed.len());
        let mut malformed = 0;
        for span in self.completed {
            match decode_call(&span) {
                Ok(call) => calls.push(call),
                Err(e) => {
                    warn!(error = %e, span = %span, "Dropping malformed tool call");
                    malformed += 1;
                }
            }
        }

        ScanOutcome {
            trailing_text,
            plain_text: self.content,
            calls,
            malformed,
        }
    }
}

impl Default for StreamScanner {
    fn default() -> Self {
        Self::new()
    }
}

/// Why a captured block could not become a call.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("no payload between the tags")]
    NoPayload,

    #[error("payload is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("payload is not a JSON object")]
    NotAnObject,

    #[error("payload has no string \"name\" field")]
    MissingName,
}

/// Decode a raw block (tags included) into a call.
///
/// The payload is the text between the first `>` and the last `<`. It must
/// be a JSON object with a string `name`; the remaining fields are the
/// arguments. A lone `arguments` (or `parameters`) object is unwrapped, so
/// both `{"name":"t","x":1}` and `{"name":"t","arguments":{"x":1}}` decode
/// to the same call.
pub fn decode_call(raw_span: &str) -> Result<ToolCallRequest, DecodeError> {
    let start = raw_span.find('>').ok_or(DecodeError::NoPayload)?;
    let end = raw_span.rfind('<').ok_or(DecodeError::NoPayload)?;
    if end <= start {
        return Err(DecodeError::NoPayload);
    }
    let payload = raw_span[start + 1..end].trim();
    if payload.is_empty() {
        return Err(DecodeError::NoPayload);
    }

    let value: Value =
        serde_json::from_str(payload).map_err(|e| DecodeError::InvalidJson(e.to_string()))?;
    let Value::Object(mut fields) = value else {
        return Err(DecodeError::NotAnObject);
    };

    let name = match fields.remove("name") {
        Some(Value::String(name)) if !name.trim().is_empty() => name,
        _ => return Err(DecodeError::MissingName),
    };

    Ok(ToolCallRequest {
        name,
        arguments: unwrap_arguments(fields),
        raw_span: raw_span.to_string(),
    })
}

fn unwrap_arguments(mut fields: Map<String, Value>) -> Map<String, Value> {
    if fields.len() == 1 {
        for key in ["arguments", "parameters"] {
            if matches!(fields.get(key), Some(Value::Object(_))) {
                if let Some(Value::Object(inner)) = fields.remove(key) {
                    return inner;
                }
            }
        }
    }
    fields
}
