//! The agent loop for Halu.
//!
//! One interaction follows a **Stream → Scan → Dispatch** cycle:
//!
//! 1. **Receive** a user prompt and append it to the transcript
//! 2. **Stream** the model's reply, confirming plain text to the display as
//!    it arrives and capturing `<tool_call>` blocks on the side
//! 3. **If tool calls**: run them in order, append the results, loop back to
//!    step 2
//! 4. **If plain text only**: that turn is the answer
//!
//! Interrupted streams are replayed with back-off, and the number of tool
//! rounds per interaction is capped.

pub mod loop_runner;
pub mod prompt;
pub mod retry;
pub mod scanner;
pub mod stream_event;
pub mod token;

#[cfg(test)]
mod test_helpers;

pub use loop_runner::{AgentLoop, Interaction, format_tool_result};
pub use prompt::build_system_prompt;
pub use retry::{RetryDecision, RetryPolicy};
pub use scanner::{ScanOutcome, StreamScanner};
pub use stream_event::{AgentEvent, DisplaySink, NullSink};
