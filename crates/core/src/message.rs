//! Turn and Transcript domain types.
//!
//! The transcript is the single source of truth for a session:
//! User prompt → Assistant turn (raw, tags included) → Tool results → Assistant turn → ...
//! It is append-only; a turn is never edited or removed once pushed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TranscriptError;

/// Unique identifier for a session's transcript.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who authored a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions (tool catalogue, calling convention)
    System,
    /// The end user
    User,
    /// The model
    Assistant,
    /// Tool execution result
    Tool,
}

/// A single entry in the transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    /// Who produced this turn
    pub role: Role,

    /// The text content. Assistant turns keep the raw model output,
    /// tool-call blocks included.
    pub content: String,

    /// When the turn was appended
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Ordered, append-only sequence of turns.
///
/// Two invariants are checked on append:
/// - a system turn may only open the transcript;
/// - a tool-result turn must directly follow an assistant turn or another
///   tool-result turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    id: SessionId,
    turns: Vec<Turn>,
    created_at: DateTime<Utc>,
}

impl Transcript {
    /// Create an empty transcript.
    pub fn new() -> Self {
        Self {
            id: SessionId::new(),
            turns: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Create a transcript opened by a system turn.
    pub fn with_system(prompt: impl Into<String>) -> Self {
        let mut transcript = Self::new();
        transcript.turns.push(Turn::new(Role::System, prompt));
        transcript
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Append a system turn. Only valid on an empty transcript.
    pub fn push_system(&mut self, content: impl Into<String>) -> Result<(), TranscriptError> {
        if !self.turns.is_empty() {
            return Err(TranscriptError::SystemNotFirst {
                position: self.turns.len(),
            });
        }
        self.turns.push(Turn::new(Role::System, content));
        Ok(())
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.turns.push(Turn::new(Role::User, content));
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.turns.push(Turn::new(Role::Assistant, content));
    }

    /// Append a tool-result turn after the assistant turn that requested it.
    pub fn push_tool_result(&mut self, content: impl Into<String>) -> Result<(), TranscriptError> {
        match self.turns.last().map(|t| t.role) {
            Some(Role::Assistant) | Some(Role::Tool) => {
                self.turns.push(Turn::new(Role::Tool, content));
                Ok(())
            }
            _ => Err(TranscriptError::OrphanToolResult),
        }
    }

    /// All turns, oldest first.
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// Number of turns with the given role.
    pub fn count_role(&self, role: Role) -> usize {
        self.turns.iter().filter(|t| t.role == role).count()
    }
}

impl Default for Transcript {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_turns() {
        let mut t = Transcript::with_system("be helpful");
        t.push_user("Hello");
        t.push_assistant("Hi there");

        assert_eq!(t.len(), 3);
        assert_eq!(t.turns()[0].role, Role::System);
        assert_eq!(t.turns()[1].content, "Hello");
        assert_eq!(t.last().unwrap().role, Role::Assistant);
    }

    #[test]
    fn system_turn_only_first() {
        let mut t = Transcript::new();
        t.push_system("rules").unwrap();
        let err = t.push_system("more rules").unwrap_err();
        assert_eq!(err, TranscriptError::SystemNotFirst { position: 1 });
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn tool_result_must_follow_assistant_or_tool() {
        let mut t = Transcript::new();
        t.push_user("list files");
        assert_eq!(
            t.push_tool_result("orphan").unwrap_err(),
            TranscriptError::OrphanToolResult
        );

        t.push_assistant("<tool_call>{\"name\":\"list_files\"}</tool_call>");
        t.push_tool_result("first").unwrap();
        t.push_tool_result("second").unwrap();
        assert_eq!(t.count_role(Role::Tool), 2);
    }

    #[test]
    fn role_serializes_lowercase() {
        let json = serde_json::to_string(&Role::Assistant).unwrap();
        assert_eq!(json, "\"assistant\"");
    }

    #[test]
    fn session_ids_are_unique() {
        assert_ne!(Transcript::new().id(), Transcript::new().id());
    }
}
