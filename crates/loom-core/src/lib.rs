//! Foundational low-level utilities shared across loom crates.
//!
//! Provides the wall-clock helpers used to stamp sub-agent lifecycles and to
//! render the `timeCost` field carried by lifecycle envelopes.

pub mod time_utils;

pub use time_utils::{current_unix_timestamp_ms, format_elapsed_ms, span_since_unix_ms};
