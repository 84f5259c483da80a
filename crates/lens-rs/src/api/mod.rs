//! Model API plumbing shared by the agent loop and the vision tool.
//!
//! - [`retry`]: transient error detection (429, 5xx, network timeouts) with
//!   configurable exponential backoff. Never retries 400/401 errors.
//! - [`tracing`]: correlation IDs (`trace_id` / `span_id`) for runs and rounds.

pub mod retry;
pub mod tracing;

pub use retry::{RetryConfig, retry_api_call};
pub use tracing::{generate_span_id, generate_trace_id};
