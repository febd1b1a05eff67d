// src/logs/mod.rs
// =============================================================================
// The user-facing crawl log served by GET /logs.
//
// This is separate from the process log (tracing): it holds short,
// human-readable lines about fetches and jobs, bounded in size.
// =============================================================================

mod buffer;

pub use buffer::{LogBuffer, LogEntry, LogLevel};
