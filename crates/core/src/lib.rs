//! # Halu Core
//!
//! Domain types, traits, and error definitions for the Halu agent loop.
//! This crate has **no transport or UI dependencies**: it defines the
//! transcript model and the two contracts the loop consumes (model
//! transport and tool registry). Implementations live in their own crates.

pub mod error;
pub mod message;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, ProviderError, Result, ToolError, TranscriptError};
pub use message::{Role, SessionId, Transcript, Turn};
pub use provider::{Provider, ProviderRequest, StreamEvent, ToolDefinition, Usage, UsageReport};
pub use tool::{Tool, ToolCallRequest, ToolRegistry, ToolResult};
