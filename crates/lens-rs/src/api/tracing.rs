//! Correlation IDs for agent runs.
//!
//! Each harness run gets a `trace_id`; each round within it a `span_id`.
//! Both show up in log lines so a run can be followed through interleaved
//! output.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

/// Generate a unique trace ID for an agent run.
pub fn generate_trace_id() -> String {
    let ts = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let count = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("run-{ts:x}-{count:04x}")
}

/// Span ID for a round within a run.
pub fn generate_span_id(trace_id: &str, round: u32) -> String {
    format!("{trace_id}:r{round}")
}
