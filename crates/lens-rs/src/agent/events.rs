//! Events, handlers, and run results for the [`Harness`](super::harness::Harness).
//!
//! The harness reports the lifecycle of a run through [`HarnessEvent`]
//! variants. Callers implement [`EventHandler`] to observe them.
//!
//! | Handler | Use case |
//! |---------|----------|
//! | [`NoopHandler`] | Tests or fire-and-forget runs |
//! | [`LoggingHandler`] | Structured logging via `tracing` |
//! | [`FnEventHandler`] | Quick closures for simple callbacks |
//! | [`ToolResultHandler`] | Per-tool-name callbacks (e.g. recording saved files) |
//! | [`CompositeEventHandler`] | Compose multiple handlers in order |

use crate::Message;
use tracing::{debug, info, warn};

// ── Events ─────────────────────────────────────────────────────────

/// Events emitted by the harness during a run.
#[derive(Debug)]
pub enum HarnessEvent<'a> {
    /// A new round is starting. Sizes are measured after the pre-call hook.
    RoundStart {
        round: u32,
        max_rounds: u32,
        messages: usize,
        context_chars: usize,
    },
    /// The model returned text (may be alongside tool calls).
    Text(&'a str),
    /// The model is requesting tool calls this round.
    ToolCallsReceived { round: u32, count: usize },
    /// A single tool is about to be executed.
    ToolExecuting { name: &'a str, arguments: &'a str },
    /// A single tool finished executing.
    ToolResult {
        name: &'a str,
        call_id: &'a str,
        result: &'a str,
    },
    /// Token usage reported by the API for this round.
    TokenUsage {
        prompt_tokens: u32,
        completion_tokens: u32,
    },
    /// The agent finished (no more tool calls).
    Finished,
    /// The agent hit the round limit without finishing.
    RoundLimitReached { max_rounds: u32 },
    /// The stop signal was raised; the run ended before `round`.
    Interrupted { round: u32 },
}

impl HarnessEvent<'_> {
    /// Total tokens for a `TokenUsage` event, `None` for all others.
    pub fn total_tokens(&self) -> Option<u64> {
        if let HarnessEvent::TokenUsage {
            prompt_tokens,
            completion_tokens,
        } = self
        {
            Some(*prompt_tokens as u64 + *completion_tokens as u64)
        } else {
            None
        }
    }
}

/// Handler for harness events.
///
/// ```ignore
/// struct Printer;
///
/// impl EventHandler for Printer {
///     fn on_event(&self, event: &HarnessEvent<'_>) {
///         if let HarnessEvent::ToolResult { name, result, .. } = event {
///             println!("[{name}] {} bytes", result.len());
///         }
///     }
/// }
/// ```
pub trait EventHandler: Send + Sync {
    /// Called for each event during the harness run.
    fn on_event(&self, event: &HarnessEvent<'_>) {
        let _ = event;
    }
}

/// A handler that ignores every event.
pub struct NoopHandler;
impl EventHandler for NoopHandler {}

/// An event handler backed by a closure.
pub struct FnEventHandler<F>(F)
where
    F: Fn(&HarnessEvent<'_>) + Send + Sync;

impl<F> FnEventHandler<F>
where
    F: Fn(&HarnessEvent<'_>) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> EventHandler for FnEventHandler<F>
where
    F: Fn(&HarnessEvent<'_>) + Send + Sync,
{
    fn on_event(&self, event: &HarnessEvent<'_>) {
        (self.0)(event)
    }
}

/// An event handler that delegates to multiple inner handlers, in
/// registration order.
///
/// ```ignore
/// let handler = CompositeEventHandler::new()
///     .with(LoggingHandler)
///     .with_if(!quiet, ProgressPrinter);
/// ```
#[derive(Default)]
pub struct CompositeEventHandler {
    handlers: Vec<Box<dyn EventHandler>>,
}

impl CompositeEventHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a handler to the chain.
    pub fn with(mut self, handler: impl EventHandler + 'static) -> Self {
        self.handlers.push(Box::new(handler));
        self
    }

    /// Add a handler only when `condition` holds.
    pub fn with_if(self, condition: bool, handler: impl EventHandler + 'static) -> Self {
        if condition { self.with(handler) } else { self }
    }
}

impl EventHandler for CompositeEventHandler {
    fn on_event(&self, event: &HarnessEvent<'_>) {
        for handler in &self.handlers {
            handler.on_event(event);
        }
    }
}

/// Boxed callback for a tool result.
type ToolResultCallback = Box<dyn Fn(&str) + Send + Sync>;

/// Dispatches `ToolResult` events to per-tool-name callbacks. All other
/// events are ignored.
#[derive(Default)]
pub struct ToolResultHandler {
    callbacks: Vec<(String, ToolResultCallback)>,
}

impl ToolResultHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for a tool name. Several callbacks may share a
    /// name; all fire.
    pub fn on(
        mut self,
        tool_name: impl Into<String>,
        callback: impl Fn(&str) + Send + Sync + 'static,
    ) -> Self {
        self.callbacks.push((tool_name.into(), Box::new(callback)));
        self
    }
}

impl EventHandler for ToolResultHandler {
    fn on_event(&self, event: &HarnessEvent<'_>) {
        if let HarnessEvent::ToolResult { name, result, .. } = event {
            for (tool_name, callback) in &self.callbacks {
                if tool_name == name {
                    callback(result);
                }
            }
        }
    }
}

/// An event handler that logs events via `tracing`.
pub struct LoggingHandler;

impl EventHandler for LoggingHandler {
    fn on_event(&self, event: &HarnessEvent<'_>) {
        match event {
            HarnessEvent::RoundStart {
                round,
                max_rounds,
                messages,
                context_chars,
            } => {
                info!("[round {round}/{max_rounds}] {messages} messages, {context_chars} chars");
            }
            HarnessEvent::Text(text) => {
                let preview: String = text.chars().take(200).collect();
                debug!(
                    "LLM text: {preview}{}",
                    if text.chars().count() > 200 { "..." } else { "" }
                );
            }
            HarnessEvent::ToolCallsReceived { round, count } => {
                debug!("{count} tool call(s) in round {round}");
            }
            HarnessEvent::ToolExecuting { name, .. } => {
                debug!("Executing tool: {name}");
            }
            HarnessEvent::ToolResult { name, result, .. } => {
                debug!("Tool {name} result: {} bytes", result.len());
            }
            HarnessEvent::TokenUsage {
                prompt_tokens,
                completion_tokens,
            } => {
                debug!("Tokens: prompt={prompt_tokens}, completion={completion_tokens}");
            }
            HarnessEvent::Finished => {
                info!("Agent finished (no more tool calls)");
            }
            HarnessEvent::RoundLimitReached { max_rounds } => {
                warn!("Agent hit round limit ({max_rounds})");
            }
            HarnessEvent::Interrupted { round } => {
                info!("Agent interrupted before round {round}");
            }
        }
    }
}

// ── Run result ─────────────────────────────────────────────────────

/// The result of a complete [`Harness::run()`](super::harness::Harness::run).
#[derive(Debug, Default)]
pub struct HarnessResult {
    /// Unique trace ID for this run.
    pub trace_id: String,
    /// The conversation as it stood when the run ended, after the last
    /// pre-call hook.
    pub messages: Vec<Message>,
    /// Text output from the model across all rounds.
    pub text_output: Vec<String>,
    /// The last text-only assistant reply, if the agent finished.
    pub final_response: Option<String>,
    pub total_prompt_tokens: u32,
    pub total_completion_tokens: u32,
    /// Number of rounds executed.
    pub rounds_used: u32,
    /// Whether the agent finished naturally.
    pub finished: bool,
    /// Whether the stop signal ended the run.
    pub interrupted: bool,
}

impl HarnessResult {
    /// Concatenated text output from all rounds.
    pub fn text(&self) -> String {
        self.text_output.join("\n\n")
    }

    /// Total tokens (prompt + completion).
    pub fn total_tokens(&self) -> u32 {
        self.total_prompt_tokens + self.total_completion_tokens
    }
}
