//! Model transport implementations for Halu.
//!
//! All providers implement the `halu_core::Provider` trait and stream
//! over Server-Sent Events. The router picks one from configuration.

pub mod anthropic;
mod http;
pub mod openai_compat;
pub mod router;
pub mod sse;

pub use anthropic::AnthropicProvider;
pub use openai_compat::OpenAiCompatProvider;
pub use router::build_provider;
