//! Cost estimation for Halu.
//!
//! Turns the token usage the agent loop accumulates into an estimated USD
//! spend, using built-in model prices plus overrides from `[pricing]` in
//! the config file.

pub mod pricing;

pub use pricing::{ModelPricing, PricingTable};
