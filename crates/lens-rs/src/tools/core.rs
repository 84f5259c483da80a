//! Tool abstraction for function-calling agents.
//!
//! The [`Tool`] trait defines the interface every tool implements: a static
//! API definition (name, description, JSON schema) and an async `execute`
//! method. Tools are collected into a [`ToolSet`] which handles dispatch,
//! definition export, validation, and timeouts.

use crate::ToolDef;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tracing::{debug, info, trace};

/// Boxed future returned by [`Tool::execute`].
pub type ToolFuture<'a> = Pin<Box<dyn Future<Output = String> + Send + 'a>>;

/// Default timeout for tool execution (120 seconds). Browser tools wait on
/// page loads, so this is generous.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(120);

// ── Tool trait ─────────────────────────────────────────────────────

/// A tool that an agent can invoke via function-calling.
///
/// ```ignore
/// struct PageTitle { browser: Browser }
///
/// impl Tool for PageTitle {
///     fn definition(&self) -> ToolDef { /* ... */ }
///
///     fn execute(&self, _arguments: &str) -> ToolFuture<'_> {
///         Box::pin(async move { self.browser.title().await })
///     }
/// }
/// ```
pub trait Tool: Send + Sync {
    /// The tool definition sent to the model API.
    fn definition(&self) -> ToolDef;

    /// Execute the tool with the given raw JSON arguments string.
    ///
    /// Errors are returned as `"Error: ..."` strings rather than panicking;
    /// the harness passes the string back to the model as the tool result
    /// regardless.
    fn execute(&self, arguments: &str) -> ToolFuture<'_>;

    /// The tool's name (delegates to the definition).
    fn name(&self) -> String {
        self.definition().function.name.clone()
    }
}

// ── ToolSet ────────────────────────────────────────────────────────

/// A collection of tools dispatched by name.
///
/// Results are returned whole. Screenshot tools hand back multi-megabyte
/// payloads that the context pipeline offloads; bounding text is the
/// truncation stage's job.
///
/// ```ignore
/// let tools = ToolSet::new()
///     .with_arg_validation(true)
///     .with_default_timeout(Some(Duration::from_secs(60)))
///     .with(AnalyzeScreenshot::new(client, store, vision))
///     .with_if(save_enabled, SaveResults::new(workspace));
///
/// let defs = tools.definitions();
/// ```
pub struct ToolSet {
    tools: BTreeMap<String, Box<dyn Tool>>,
    /// Whether to validate tool arguments against JSON Schema before execution.
    validate_args: bool,
    /// Default timeout for tool execution. `None` disables timeouts.
    default_timeout: Option<Duration>,
}

impl fmt::Debug for ToolSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolSet")
            .field("tools", &self.names())
            .field("validate_args", &self.validate_args)
            .finish()
    }
}

impl Default for ToolSet {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolSet {
    /// Create an empty tool set.
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
            validate_args: false,
            default_timeout: None,
        }
    }

    /// Enable JSON Schema argument validation before tool execution.
    pub fn with_arg_validation(mut self, enabled: bool) -> Self {
        self.validate_args = enabled;
        self
    }

    /// Set a timeout applied to every tool. `None` disables timeouts.
    pub fn with_default_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.register_boxed(Box::new(tool));
    }

    /// Register an already boxed tool.
    pub fn register_boxed(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name();
        if self.tools.contains_key(&name) {
            debug!("Replacing tool {name}");
        }
        self.tools.insert(name, tool);
    }

    /// Register a tool (builder pattern).
    pub fn with(mut self, tool: impl Tool + 'static) -> Self {
        self.register(tool);
        self
    }

    /// Register a tool only when `condition` holds.
    pub fn with_if(self, condition: bool, tool: impl Tool + 'static) -> Self {
        if condition { self.with(tool) } else { self }
    }

    /// All tool definitions for the model API, ordered by name.
    pub fn definitions(&self) -> Vec<ToolDef> {
        self.tools.values().map(|t| t.definition()).collect()
    }

    /// Registered tool names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Execute a tool call by name, with optional validation and timeout.
    /// Unknown tools and validation failures come back as error
    /// strings the model can correct from.
    pub async fn execute(&self, name: &str, arguments: &str) -> String {
        let Some(tool) = self.tools.get(name) else {
            return format!("Error: unknown tool '{name}'");
        };

        if self.validate_args
            && let Some(error) = validate_tool_arguments(tool.as_ref(), arguments)
        {
            return error;
        }

        log_tool_call(name, arguments);
        let start = std::time::Instant::now();

        let result = if let Some(limit) = self.default_timeout {
            match tokio::time::timeout(limit, tool.execute(arguments)).await {
                Ok(r) => r,
                Err(_) => {
                    info!(
                        "Tool {name} timed out after {:.1}s",
                        start.elapsed().as_secs_f64()
                    );
                    format!(
                        "Error: tool '{name}' timed out after {:.0} seconds.",
                        limit.as_secs_f64()
                    )
                }
            }
        } else {
            tool.execute(arguments).await
        };

        debug!(
            "Tool {name} completed in {:.0}ms ({} bytes)",
            start.elapsed().as_secs_f64() * 1000.0,
            result.len()
        );
        trace!(
            "Tool {name} result preview: {}",
            result.chars().take(300).collect::<String>()
        );

        result
    }
}

// ── FnTool ────────────────────────────────────────────────────────

/// Type-erased async handler for [`FnTool`].
type ErasedToolHandler =
    Box<dyn Fn(String) -> Pin<Box<dyn Future<Output = String> + Send>> + Send + Sync>;

/// A closure-based tool that parses arguments and delegates to a handler.
///
/// Use it for stateless tools. Tools that hold shared state (a client, a
/// payload store) are clearer as a struct implementing [`Tool`].
///
/// ```ignore
/// #[derive(Deserialize, JsonSchema)]
/// struct EchoArgs { text: String }
///
/// let tool = FnTool::new(
///     ToolDef::new("echo", "Echo the input", json_schema_for::<EchoArgs>()),
///     |args: EchoArgs| async move { args.text },
/// );
/// ```
pub struct FnTool {
    def: ToolDef,
    handler: ErasedToolHandler,
}

impl FnTool {
    pub fn new<A, F, Fut>(def: ToolDef, handler: F) -> Self
    where
        A: serde::de::DeserializeOwned + Send + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = String> + Send + 'static,
    {
        let erased = move |raw: String| -> Pin<Box<dyn Future<Output = String> + Send>> {
            match parse_tool_args::<A>(&raw) {
                Ok(args) => Box::pin(handler(args)),
                Err(e) => Box::pin(async move { e }),
            }
        };
        Self {
            def,
            handler: Box::new(erased),
        }
    }
}

impl Tool for FnTool {
    fn definition(&self) -> ToolDef {
        self.def.clone()
    }

    fn execute(&self, arguments: &str) -> ToolFuture<'_> {
        (self.handler)(arguments.to_string())
    }
}

impl fmt::Debug for FnTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnTool")
            .field("name", &self.def.function.name)
            .finish()
    }
}

// ── Helpers ────────────────────────────────────────────────────────

/// Validate tool arguments against the tool's declared JSON Schema.
///
/// Returns `None` if valid, or an error string for the model to
/// self-correct from.
pub fn validate_tool_arguments(tool: &dyn Tool, arguments: &str) -> Option<String> {
    let args_value: serde_json::Value = match serde_json::from_str(arguments) {
        Ok(v) => v,
        Err(e) => {
            return Some(format!(
                "Error: invalid JSON arguments for tool '{}': {e}. \
                 Please provide valid JSON matching the tool's parameter schema.",
                tool.name()
            ));
        }
    };

    let schema = tool.definition().function.parameters;
    // An invalid schema is the tool's problem, not the model's.
    let Ok(validator) = jsonschema::validator_for(&schema) else {
        return None;
    };

    let errors: Vec<String> = validator
        .iter_errors(&args_value)
        .map(|e| format!("  - {}: {e}", e.instance_path()))
        .collect();

    if errors.is_empty() {
        None
    } else {
        Some(format!(
            "Error: argument validation failed for tool '{}':\n{}\n\
             Please fix the arguments and try again.",
            tool.name(),
            errors.join("\n")
        ))
    }
}

/// Log a tool call at INFO level with a short preview of its arguments.
pub fn log_tool_call(name: &str, arguments: &str) {
    let mut chars = arguments.chars();
    let args_preview: String = chars.by_ref().take(120).collect();
    let more = if chars.next().is_some() { "..." } else { "" };
    info!("[tool] {name}({args_preview}{more})");
    trace!("[tool] {name} arguments: {arguments}");
}

/// Parse raw JSON arguments into a typed struct.
///
/// The error is already formatted for the model, so tools can return it
/// directly:
///
/// ```ignore
/// let args: MyArgs = match parse_tool_args(&arguments) {
///     Ok(a) => a,
///     Err(e) => return e,
/// };
/// ```
pub fn parse_tool_args<T: serde::de::DeserializeOwned>(arguments: &str) -> Result<T, String> {
    // Some models send an empty string for tools without arguments.
    let arguments = if arguments.trim().is_empty() {
        "{}"
    } else {
        arguments
    };
    serde_json::from_str(arguments).map_err(|e| {
        format!(
            "Error: invalid tool arguments: {e}. \
             Please provide valid JSON matching the tool's parameter schema."
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use schemars::JsonSchema;
    use serde::Deserialize;

    #[derive(Deserialize, JsonSchema)]
    struct EchoArgs {
        /// Text to echo back.
        text: String,
    }

    fn echo_tool() -> FnTool {
        FnTool::new(
            ToolDef::new("echo", "Echo the input", crate::json_schema_for::<EchoArgs>()),
            |args: EchoArgs| async move { args.text },
        )
    }

    struct Slow;

    impl Tool for Slow {
        fn definition(&self) -> ToolDef {
            ToolDef::new("slow", "Sleeps", serde_json::json!({"type": "object"}))
        }

        fn execute(&self, _arguments: &str) -> ToolFuture<'_> {
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "done".to_string()
            })
        }
    }

    #[tokio::test]
    async fn dispatches_by_name() {
        let tools = ToolSet::new().with(echo_tool());
        assert_eq!(tools.execute("echo", r#"{"text":"hi"}"#).await, "hi");
        assert_eq!(
            tools.execute("nope", "{}").await,
            "Error: unknown tool 'nope'"
        );
    }

    #[tokio::test]
    async fn payload_sized_results_are_returned_whole() {
        let tools = ToolSet::new().with(echo_tool());
        let big = "A".repeat(2_000_000);
        let args = serde_json::json!({ "text": big }).to_string();
        assert_eq!(tools.execute("echo", &args).await.len(), 2_000_000);
    }

    #[tokio::test]
    async fn validation_rejects_bad_arguments() {
        let tools = ToolSet::new().with(echo_tool()).with_arg_validation(true);
        let out = tools.execute("echo", r#"{"text": 5}"#).await;
        assert!(out.starts_with("Error: argument validation failed for tool 'echo'"));
        let out = tools.execute("echo", "not json").await;
        assert!(out.starts_with("Error: invalid JSON arguments"));
    }

    #[tokio::test]
    async fn fn_tool_reports_parse_errors() {
        let out = echo_tool().execute(r#"{"wrong": 1}"#).await;
        assert!(out.starts_with("Error: invalid tool arguments"));
    }

    #[tokio::test]
    async fn timeout_becomes_error_text() {
        let tools = ToolSet::new()
            .with(Slow)
            .with_default_timeout(Some(Duration::from_millis(50)));
        let out = tools.execute("slow", "{}").await;
        assert_eq!(out, "Error: tool 'slow' timed out after 0 seconds.");
    }

    #[test]
    fn names_are_sorted_and_deduplicated() {
        let tools = ToolSet::new()
            .with(Slow)
            .with(echo_tool())
            .with_if(true, echo_tool())
            .with_if(false, Slow);
        assert_eq!(tools.names(), vec!["echo", "slow"]);
        assert_eq!(tools.len(), 2);
        assert!(tools.contains("echo"));
        let defs = tools.definitions();
        assert_eq!(defs[0].function.name, "echo");
    }

    #[test]
    fn empty_arguments_parse_as_empty_object() {
        #[derive(Deserialize)]
        struct NoArgs {}
        assert!(parse_tool_args::<NoArgs>("").is_ok());
        assert!(parse_tool_args::<NoArgs>("  ").is_ok());
    }
}
