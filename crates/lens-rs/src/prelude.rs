//! Convenience re-exports for common `lens-rs` types.
//!
//! ```ignore
//! use lens_rs::prelude::*;
//! ```
//!
//! Covers the client, [`Message`] constructors, [`Harness`] and its configs,
//! the context pipeline, and the tool types. Stage internals such as the
//! classifier and truncation helpers are left to their modules.

// ── Core types ──────────────────────────────────────────────────────
pub use crate::{ChatClient, ChatRequest, Message, OpenRouterClient, ToolDef, json_schema_for};

// ── Agent runtime ───────────────────────────────────────────────────
pub use crate::agent::{
    CompositeEventHandler, EventHandler, FnEventHandler, Harness, HarnessConfig, HarnessEvent,
    HarnessResult, LoggingHandler, NoopHandler, PipelineConfig, ToolResultHandler,
};

// ── Context pipeline ────────────────────────────────────────────────
pub use crate::context::{
    ContextMiddleware, ContextPipeline, ConversationState, PayloadSlot, PayloadStore,
};

// ── Tools ───────────────────────────────────────────────────────────
pub use crate::tools::{
    AnalyzeScreenshot, CommandTool, FnTool, SaveResults, Tool, ToolFuture, ToolSet,
    VisionConfig, load_command_tools, parse_tool_args,
};
