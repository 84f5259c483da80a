//! Context-bounding middleware for screenshot-driven browser agents.
//!
//! A browser agent that takes screenshots re-sends every tool result to the
//! model on every call. Left alone, a handful of base64 screenshots blow
//! through any context window. `lens-rs` sits between the agent loop and the
//! model and keeps what the model sees small:
//!
//! 1. **Offload**: large embedded images are written to a
//!    [`PayloadStore`](context::PayloadStore) and replaced with a short
//!    placeholder pointing at the saved file.
//! 2. **Truncation**: any remaining oversized text fragment is cut to a
//!    character limit with a marker recording how much was removed.
//! 3. **Compaction**: once tool results accumulate past a threshold, older
//!    results are collapsed, keeping the most recent few and any excluded
//!    tools.
//!
//! The saved image is not lost: the
//! [`AnalyzeScreenshot`](tools::vision::AnalyzeScreenshot) tool reads it
//! back, recompresses it, and asks a vision model for a structured textual
//! extraction. Only that distilled text enters the conversation.
//!
//! # Getting started
//!
//! ```ignore
//! use lens_rs::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), String> {
//!     let client = Arc::new(OpenRouterClient::new(std::env::var("OPENROUTER_KEY").unwrap())?);
//!     let store: Arc<dyn PayloadStore> = Arc::new(PayloadSlot::in_workspace("./workspace"));
//!
//!     let pipeline_config = PipelineConfig::default();
//!     let pipeline = ContextPipeline::from_config(&pipeline_config, store.clone());
//!
//!     let tools = ToolSet::new()
//!         .with(AnalyzeScreenshot::new(client.clone(), store, pipeline_config.vision.clone()));
//!
//!     let result = Harness::new(client.as_ref(), &tools, &pipeline, HarnessConfig::default())
//!         .with_event_handler(&LoggingHandler)
//!         .run(vec![Message::system("..."), Message::user("...")])
//!         .await?;
//!
//!     println!("{}", result.final_response.unwrap_or_default());
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`context`] | Conversation state, payload classifier, offload/truncation/compaction stages, the [`ContextPipeline`](context::ContextPipeline) |
//! | [`tools`] | [`Tool`](tools::Tool) trait, [`ToolSet`](tools::ToolSet), vision extraction, result saving, external command tools |
//! | [`agent`] | Reference agent loop ([`Harness`](agent::Harness)), configuration, events |
//! | [`api`] | Retry with backoff, trace IDs |

pub mod agent;
pub mod api;
pub mod context;
pub mod prelude;
pub mod tools;

use futures::future::BoxFuture;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

// Re-export schemars for downstream crates.
pub use schemars;

// ── Constants ──────────────────────────────────────────────────────

pub const OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

/// Default model for the agent loop.
pub const DEFAULT_MODEL: &str = "anthropic/claude-sonnet-4";

/// Default model for screenshot extraction. Must accept image input.
pub const DEFAULT_VISION_MODEL: &str = "openai/gpt-4o-mini";

// ── Schema generation ──────────────────────────────────────────────

/// Generate a JSON Schema `serde_json::Value` from a type that implements
/// `schemars::JsonSchema`, in the shape the function-calling API expects.
///
/// # Example
///
/// ```
/// use lens_rs::json_schema_for;
/// use schemars::JsonSchema;
/// use serde::Deserialize;
///
/// #[derive(Deserialize, JsonSchema)]
/// struct SaveArgs {
///     content: String,
///     #[serde(default)]
///     filename: Option<String>,
/// }
///
/// let schema = json_schema_for::<SaveArgs>();
/// assert_eq!(schema["type"], "object");
/// assert!(schema["required"].as_array().unwrap().contains(&"content".into()));
/// ```
pub fn json_schema_for<T: JsonSchema>() -> serde_json::Value {
    let schema = schemars::schema_for!(T);
    serde_json::to_value(schema)
        .unwrap_or_else(|_| serde_json::json!({"type": "object", "properties": {}}))
}

// ── Request types ──────────────────────────────────────────────────

/// Chat completion request body (OpenAI-compatible). Unset optional fields
/// are omitted from serialization.
#[derive(Serialize, Debug, Default, Clone)]
pub struct ChatRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    pub messages: Vec<Message>,

    #[serde(skip_serializing_if = "is_zero_u32")]
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDef>>,
}

fn is_zero_u32(v: &u32) -> bool {
    *v == 0
}

// ── Message types ──────────────────────────────────────────────────

/// Role of a message in the conversation.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::System => write!(f, "system"),
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
            MessageRole::Tool => write!(f, "tool"),
        }
    }
}

/// Message content: either a single string or an ordered list of parts.
///
/// Serializes untagged, so the wire shape is the plain chat-completions
/// format (`"content": "..."` or `"content": [ ... ]`).
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

/// One element of a multi-part message.
///
/// Tool runtimes are loose about what they put here: bare strings, typed
/// blocks (`{"type": "text", "text": ...}`, `{"type": "image_url", ...}`),
/// or ad-hoc dictionaries that carry a `text` field next to metadata. All of
/// them round-trip unchanged; only the text they carry is ever rewritten.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum ContentPart {
    Raw(String),
    Block(serde_json::Map<String, serde_json::Value>),
}

impl ContentPart {
    /// A typed `{"type": "text"}` block.
    pub fn text(text: impl Into<String>) -> Self {
        let mut block = serde_json::Map::new();
        block.insert("type".into(), "text".into());
        block.insert("text".into(), serde_json::Value::String(text.into()));
        ContentPart::Block(block)
    }

    /// A typed `{"type": "image_url"}` block. `url` is usually a
    /// `data:image/...;base64,` URI.
    pub fn image_url(url: impl Into<String>) -> Self {
        let mut block = serde_json::Map::new();
        block.insert("type".into(), "image_url".into());
        block.insert(
            "image_url".into(),
            serde_json::json!({ "url": url.into() }),
        );
        ContentPart::Block(block)
    }

    /// The textual fragment this part carries, if any. For blocks this is
    /// the string-valued `text` field; other fields are never inspected.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContentPart::Raw(s) => Some(s),
            ContentPart::Block(map) => map.get("text").and_then(|v| v.as_str()),
        }
    }

    /// Mutable access to the textual fragment, if any.
    pub fn text_mut(&mut self) -> Option<&mut String> {
        match self {
            ContentPart::Raw(s) => Some(s),
            ContentPart::Block(map) => match map.get_mut("text") {
                Some(serde_json::Value::String(s)) => Some(s),
                _ => None,
            },
        }
    }
}

impl MessageContent {
    /// The content as a single string, when it is one.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            MessageContent::Text(s) => Some(s),
            MessageContent::Parts(_) => None,
        }
    }

    /// Visit every textual fragment. Non-text parts are skipped.
    pub fn for_each_text(&self, mut f: impl FnMut(&str)) {
        match self {
            MessageContent::Text(s) => f(s),
            MessageContent::Parts(parts) => parts.iter().filter_map(|p| p.as_text()).for_each(f),
        }
    }

    /// Visit every textual fragment mutably. Non-text parts are skipped.
    pub fn for_each_text_mut(&mut self, mut f: impl FnMut(&mut String)) {
        match self {
            MessageContent::Text(s) => f(s),
            MessageContent::Parts(parts) => parts.iter_mut().filter_map(|p| p.text_mut()).for_each(f),
        }
    }

    /// Total number of characters across all textual fragments.
    pub fn text_chars(&self) -> usize {
        let mut total = 0;
        self.for_each_text(|s| total += s.chars().count());
        total
    }

    /// All textual fragments joined with newlines.
    pub fn joined_text(&self) -> String {
        let mut pieces = Vec::new();
        self.for_each_text(|s| pieces.push(s.to_string()));
        pieces.join("\n")
    }
}

impl From<String> for MessageContent {
    fn from(s: String) -> Self {
        MessageContent::Text(s)
    }
}

impl From<&str> for MessageContent {
    fn from(s: &str) -> Self {
        MessageContent::Text(s.to_string())
    }
}

/// A message in the conversation.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Message {
    pub role: MessageRole,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<MessageContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    fn with_role(role: MessageRole, content: Option<MessageContent>) -> Self {
        Self {
            role,
            content,
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(MessageRole::System, Some(MessageContent::Text(content.into())))
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(MessageRole::User, Some(MessageContent::Text(content.into())))
    }

    /// A user message made of several parts (text plus images).
    pub fn user_parts(parts: Vec<ContentPart>) -> Self {
        Self::with_role(MessageRole::User, Some(MessageContent::Parts(parts)))
    }

    pub fn assistant_text(content: impl Into<String>) -> Self {
        Self::with_role(
            MessageRole::Assistant,
            Some(MessageContent::Text(content.into())),
        )
    }

    pub fn assistant_tool_calls(calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls: Some(calls),
            ..Self::with_role(MessageRole::Assistant, None)
        }
    }

    pub fn tool_result(call_id: impl Into<String>, content: impl Into<MessageContent>) -> Self {
        Self {
            tool_call_id: Some(call_id.into()),
            ..Self::with_role(MessageRole::Tool, Some(content.into()))
        }
    }

    /// The content as a single string, when it is one.
    pub fn text(&self) -> Option<&str> {
        self.content.as_ref().and_then(|c| c.as_text())
    }

    /// Character count of all textual content in this message.
    pub fn text_chars(&self) -> usize {
        self.content.as_ref().map_or(0, |c| c.text_chars())
    }

    /// Names of the tools this message calls (empty for non-assistant messages).
    pub fn tool_call_names(&self) -> Vec<&str> {
        self.tool_calls
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|c| c.function.name.as_str())
            .collect()
    }
}

// ── Tool types ─────────────────────────────────────────────────────

/// The type of a tool definition. Currently always `Function`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum ToolType {
    #[serde(rename = "function")]
    Function,
}

/// Tool definition sent to the API (OpenAI function-calling format).
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ToolDef {
    #[serde(rename = "type")]
    pub tool_type: ToolType,
    pub function: FunctionDef,
}

impl ToolDef {
    /// Create a function-calling tool definition.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            tool_type: ToolType::Function,
            function: FunctionDef {
                name: name.into(),
                description: description.into(),
                parameters,
            },
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct FunctionDef {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// The type of a tool call. Currently always `Function`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum CallType {
    #[serde(rename = "function")]
    Function,
}

/// A tool call returned by the model.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: CallType,
    pub function: FunctionCallData,
}

impl ToolCall {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            call_type: CallType::Function,
            function: FunctionCallData {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct FunctionCallData {
    pub name: String,
    pub arguments: String,
}

// ── Response types ─────────────────────────────────────────────────

/// Raw API response (internal deserialization target).
#[derive(Deserialize, Debug)]
struct RawChatResponse {
    choices: Option<Vec<RawChoice>>,
    error: Option<ApiErrorResponse>,
    #[serde(default)]
    usage: Option<UsageInfo>,
}

#[derive(Deserialize, Debug)]
struct RawChoice {
    message: RawResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct RawResponseMessage {
    content: Option<String>,
    tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Deserialize, Debug)]
struct ApiErrorResponse {
    message: String,
}

/// Clean return type from [`ChatClient::chat`].
#[derive(Debug, Default, Clone)]
pub struct ChatCompletion {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Option<UsageInfo>,
    pub finish_reason: Option<String>,
}

/// Token usage statistics.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct UsageInfo {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

// ── Client ─────────────────────────────────────────────────────────

/// Anything that can answer a chat completion request.
///
/// The agent loop and the vision tool only talk to the model through this
/// trait, so tests can substitute a scripted client.
pub trait ChatClient: Send + Sync {
    fn chat<'a>(&'a self, body: &'a ChatRequest) -> BoxFuture<'a, Result<ChatCompletion, String>>;
}

/// Async HTTP client for an OpenAI-compatible chat completions endpoint
/// (OpenRouter by default).
pub struct OpenRouterClient {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    referer: String,
    title: String,
}

impl OpenRouterClient {
    /// Create a new client with the given API key and default headers.
    pub fn new(api_key: impl Into<String>) -> Result<Self, String> {
        Self::with_headers(api_key, "https://github.com/lens-rs", "lens-rs")
    }

    /// Create a new client with custom Referer and X-Title headers.
    pub fn with_headers(
        api_key: impl Into<String>,
        referer: impl Into<String>,
        title: impl Into<String>,
    ) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .user_agent("lens-rs/0.1")
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| format!("failed to build HTTP client: {e}"))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            endpoint: OPENROUTER_URL.to_string(),
            referer: referer.into(),
            title: title.into(),
        })
    }

    /// Point the client at a different chat completions URL.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Send a chat completion request.
    pub async fn chat(&self, body: &ChatRequest) -> Result<ChatCompletion, String> {
        debug!(
            "LLM request: model={}, messages={}, tools={}, max_tokens={}",
            body.model.as_deref().unwrap_or("(none)"),
            body.messages.len(),
            body.tools.as_ref().map_or(0, |t| t.len()),
            body.max_tokens,
        );
        trace!(
            "Request payload size: {} bytes",
            serde_json::to_string(body).map_or(0, |s| s.len())
        );

        let start = Instant::now();

        let resp = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("HTTP-Referer", &self.referer)
            .header("X-Title", &self.title)
            .json(body)
            .send()
            .await
            .map_err(|e| format!("request failed: {e}"))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| format!("failed to read response: {e}"))?;

        debug!(
            "LLM response: HTTP {} in {:.1}s ({} bytes)",
            status,
            start.elapsed().as_secs_f64(),
            text.len()
        );

        if !status.is_success() {
            return Err(format!("chat API HTTP {status}: {text}"));
        }

        parse_chat_response(&text)
    }
}

impl ChatClient for OpenRouterClient {
    fn chat<'a>(&'a self, body: &'a ChatRequest) -> BoxFuture<'a, Result<ChatCompletion, String>> {
        Box::pin(OpenRouterClient::chat(self, body))
    }
}

/// Parse a chat completions response body.
fn parse_chat_response(text: &str) -> Result<ChatCompletion, String> {
    let parsed: RawChatResponse =
        serde_json::from_str(text).map_err(|e| format!("failed to parse response: {e}"))?;

    if let Some(err) = parsed.error {
        return Err(format!("chat API error: {}", err.message));
    }

    if let Some(ref usage) = parsed.usage {
        debug!(
            "Token usage: prompt={}, completion={}, total={}",
            usage.prompt_tokens.unwrap_or(0),
            usage.completion_tokens.unwrap_or(0),
            usage.total_tokens.unwrap_or(0),
        );
    }

    match parsed.choices.and_then(|c| c.into_iter().next()) {
        Some(c) => {
            let tool_calls = c.message.tool_calls.unwrap_or_default();
            debug!(
                "LLM output: {} chars text, {} tool call(s)",
                c.message.content.as_ref().map_or(0, |s| s.len()),
                tool_calls.len()
            );
            Ok(ChatCompletion {
                content: c.message.content,
                tool_calls,
                usage: parsed.usage,
                finish_reason: c.finish_reason,
            })
        }
        None => {
            debug!("LLM output: empty (no choices)");
            Ok(ChatCompletion {
                usage: parsed.usage,
                ..Default::default()
            })
        }
    }
}
