//! Security module for Halu: filesystem sandboxing for the file tools.
//!
//! Provides:
//! - **Path policy**: resolve tool-supplied paths against the workspace,
//!   confine them to allowed roots and block forbidden locations

pub mod path;

pub use path::{PathPolicy, PathValidationError};
