//! Usage meters: parse Claude Code `/usage` output into samples.
//!
//! Capturing the screen is left to the caller (a tmux pane capture, a saved
//! file, a pipe); this module only turns the text into structured meters.

pub mod parser;
pub mod types;

pub use parser::parse_usage_output;
pub use types::{UsageMeter, UsageSnapshot};
