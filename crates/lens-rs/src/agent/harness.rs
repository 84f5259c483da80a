//! Agent harness: the tool-use loop with context hooks around every call.
//!
//! The [`Harness`] runs the conversation through the [`ContextPipeline`],
//! sends it with the tool definitions to the model, executes any returned
//! tool calls via the [`ToolSet`], appends the results, and repeats until the
//! model produces a text-only response, the round limit is reached, or the
//! stop signal is raised.

use super::config::HarnessConfig;
use super::events::{EventHandler, HarnessEvent, HarnessResult, NoopHandler};
use crate::api::retry::retry_api_call;
use crate::context::pipeline::ContextPipeline;
use crate::context::state::ConversationState;
use crate::tools::core::ToolSet;
use crate::{ChatClient, ChatRequest, Message, MessageRole};
use tracing::{debug, info, warn};

/// Retries for an empty reply (no text, no tool calls) before giving up.
const MAX_EMPTY_RESPONSE_RETRIES: u32 = 3;

/// The agentic tool-use loop.
///
/// ```ignore
/// let pipeline = ContextPipeline::from_config(&PipelineConfig::default(), store.clone());
/// let tools = ToolSet::new().with(AnalyzeScreenshot::new(client.clone(), store, vision));
///
/// let result = Harness::new(client.as_ref(), &tools, &pipeline, config)
///     .with_event_handler(&LoggingHandler)
///     .with_stop_signal(|| stop.load(Ordering::Relaxed))
///     .run(vec![Message::user("...")])
///     .await?;
/// ```
///
/// `Harness<'a>` borrows the client, tools, pipeline, and event handler.
/// Bind them to `let` bindings before building the harness so they outlive
/// `.run()`.
pub struct Harness<'a> {
    client: &'a dyn ChatClient,
    tools: &'a ToolSet,
    pipeline: &'a ContextPipeline,
    config: HarnessConfig,
    event_handler: &'a dyn EventHandler,
    /// Checked before each round. Returning `true` ends the run as
    /// interrupted.
    stop_signal: Option<Box<dyn Fn() -> bool + Send + Sync + 'a>>,
}

impl<'a> Harness<'a> {
    pub fn new(
        client: &'a dyn ChatClient,
        tools: &'a ToolSet,
        pipeline: &'a ContextPipeline,
        config: HarnessConfig,
    ) -> Self {
        Self {
            client,
            tools,
            pipeline,
            config,
            event_handler: &NoopHandler,
            stop_signal: None,
        }
    }

    pub fn with_event_handler(mut self, handler: &'a dyn EventHandler) -> Self {
        self.event_handler = handler;
        self
    }

    pub fn with_stop_signal(mut self, signal: impl Fn() -> bool + Send + Sync + 'a) -> Self {
        self.stop_signal = Some(Box::new(signal));
        self
    }

    fn stop_requested(&self) -> bool {
        self.stop_signal.as_ref().is_some_and(|signal| signal())
    }

    /// Run the loop to completion.
    ///
    /// When `config.system_prompt` is set and `messages` does not already
    /// start with a system message, the prompt is prepended.
    ///
    /// Returns `Err` only when a model call fails after retries; tool
    /// failures are passed back to the model as results.
    pub async fn run(self, mut messages: Vec<Message>) -> Result<HarnessResult, String> {
        if let Some(prompt) = &self.config.system_prompt
            && messages.first().is_none_or(|m| m.role != MessageRole::System)
        {
            messages.insert(0, Message::system(prompt.as_str()));
        }

        let mut state = ConversationState::new(messages);
        let mut result = HarnessResult {
            trace_id: crate::api::tracing::generate_trace_id(),
            ..Default::default()
        };
        info!(
            "Harness run started: trace_id={}, model={}, stages={:?}",
            result.trace_id,
            self.config.model,
            self.pipeline.stage_names()
        );

        let tool_defs = self.tools.definitions();
        let tools_option = (!tool_defs.is_empty()).then_some(tool_defs);
        let mut empty_retries = 0;

        for round in 1..=self.config.max_rounds {
            if self.stop_requested() {
                info!("Stop signal received, ending agent loop");
                result.interrupted = true;
                self.event_handler
                    .on_event(&HarnessEvent::Interrupted { round });
                break;
            }
            result.rounds_used = round;
            debug!(
                "[{}] round {round} starting",
                crate::api::tracing::generate_span_id(&result.trace_id, round)
            );

            // ── Pre-call hook ──
            state = self.pipeline.before_model(state);
            self.event_handler.on_event(&HarnessEvent::RoundStart {
                round,
                max_rounds: self.config.max_rounds,
                messages: state.len(),
                context_chars: state.messages().iter().map(Message::text_chars).sum(),
            });

            // ── Model call ──
            let body = ChatRequest {
                model: Some(self.config.model.clone()),
                messages: state.messages().to_vec(),
                max_tokens: self.config.max_tokens,
                temperature: Some(self.config.temperature),
                tools: tools_option.clone(),
                ..Default::default()
            };
            let completion =
                retry_api_call(&self.config.retry, || self.client.chat(&body)).await?;

            if let Some(usage) = &completion.usage {
                let prompt_tokens = usage.prompt_tokens.unwrap_or(0);
                let completion_tokens = usage.completion_tokens.unwrap_or(0);
                result.total_prompt_tokens += prompt_tokens;
                result.total_completion_tokens += completion_tokens;
                self.event_handler.on_event(&HarnessEvent::TokenUsage {
                    prompt_tokens,
                    completion_tokens,
                });
            }

            let text = completion.content.filter(|t| !t.trim().is_empty());
            if let Some(t) = &text {
                self.event_handler.on_event(&HarnessEvent::Text(t));
                result.text_output.push(t.clone());
            }

            // ── Text-only reply: done ──
            if completion.tool_calls.is_empty() {
                let Some(text) = text else {
                    empty_retries += 1;
                    if empty_retries <= MAX_EMPTY_RESPONSE_RETRIES {
                        warn!(
                            "Empty response at round {round}, retrying \
                             ({empty_retries}/{MAX_EMPTY_RESPONSE_RETRIES})"
                        );
                        continue;
                    }
                    warn!("Giving up after {MAX_EMPTY_RESPONSE_RETRIES} empty responses");
                    break;
                };
                state.push(Message::assistant_text(text.as_str()));
                self.pipeline.after_model(&state);
                result.final_response = Some(text);
                result.finished = true;
                self.event_handler.on_event(&HarnessEvent::Finished);
                break;
            }
            empty_retries = 0;

            // ── Tool calls ──
            let calls = completion.tool_calls;
            self.event_handler.on_event(&HarnessEvent::ToolCallsReceived {
                round,
                count: calls.len(),
            });
            let mut assistant = Message::assistant_tool_calls(calls.clone());
            if let Some(t) = text {
                assistant.content = Some(t.into());
            }
            state.push(assistant);
            self.pipeline.after_model(&state);

            for call in &calls {
                let name = call.function.name.as_str();
                let arguments = call.function.arguments.as_str();
                self.event_handler
                    .on_event(&HarnessEvent::ToolExecuting { name, arguments });
                let output = self.tools.execute(name, arguments).await;
                self.event_handler.on_event(&HarnessEvent::ToolResult {
                    name,
                    call_id: &call.id,
                    result: &output,
                });
                state.push(Message::tool_result(&call.id, output));
            }
        }

        if !result.finished && !result.interrupted && result.rounds_used == self.config.max_rounds
        {
            self.event_handler.on_event(&HarnessEvent::RoundLimitReached {
                max_rounds: self.config.max_rounds,
            });
        }

        info!(
            "Harness run ended: rounds={}, finished={}, interrupted={}, tokens={}",
            result.rounds_used,
            result.finished,
            result.interrupted,
            result.total_tokens()
        );
        result.messages = state.into_messages();
        Ok(result)
    }
}
