//! Tool-result compaction: collapse old tool results once they add up.
//!
//! Offload and truncation bound each fragment; compaction bounds the sum.
//! The contract is [`CompactionPolicy`]: given the state, return a state
//! whose old tool results may have been collapsed. [`ClearToolUses`] is the
//! default policy. Once the estimated tokens across all tool-result messages
//! exceed a trigger, it replaces the content of every tool result except the
//! most recent `keep` (and those from excluded tools) with a placeholder.
//!
//! Messages are collapsed in place, never removed, so every tool call keeps
//! its matching result message.

use super::pipeline::ContextMiddleware;
use super::state::ConversationState;
use crate::{MessageContent, MessageRole};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

/// Default characters per token for size estimates.
pub const DEFAULT_CHARS_PER_TOKEN: f64 = 3.5;

/// Default replacement for a cleared tool result.
pub const DEFAULT_CLEARED_PLACEHOLDER: &str = "[cleared]";

/// Estimate tokens for a character count.
pub fn estimate_tokens(chars: usize, chars_per_token: f64) -> usize {
    (chars as f64 / chars_per_token) as usize
}

/// What a compaction pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompactionReport {
    /// Estimated tool-result tokens before the pass.
    pub tool_tokens: usize,
    /// Tool results collapsed in this pass.
    pub cleared: usize,
    /// Characters removed from the conversation.
    pub freed_chars: usize,
}

/// A strategy for collapsing accumulated tool results.
pub trait CompactionPolicy: Send + Sync {
    fn compact(&self, state: ConversationState) -> (ConversationState, CompactionReport);
}

/// Settings for [`ClearToolUses`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompactionConfig {
    /// Estimated tool-result tokens above which a pass clears anything.
    pub trigger_tokens: usize,
    /// Number of most recent tool results never cleared.
    pub keep: usize,
    /// Tools whose results are never cleared.
    pub excluded_tools: HashSet<String>,
    /// Also blank the arguments of the tool call behind a cleared result.
    pub clear_tool_inputs: bool,
    /// Replacement content for cleared results.
    pub placeholder: String,
    pub chars_per_token: f64,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            trigger_tokens: 5_000,
            keep: 5,
            excluded_tools: HashSet::from([super::offload::DEFAULT_ANALYZE_TOOL.to_string()]),
            clear_tool_inputs: false,
            placeholder: DEFAULT_CLEARED_PLACEHOLDER.to_string(),
            chars_per_token: DEFAULT_CHARS_PER_TOKEN,
        }
    }
}

impl CompactionConfig {
    /// Never clear results of the named tool.
    pub fn exclude_tool(mut self, name: impl Into<String>) -> Self {
        self.excluded_tools.insert(name.into());
        self
    }

    pub fn with_trigger_tokens(mut self, tokens: usize) -> Self {
        self.trigger_tokens = tokens;
        self
    }

    pub fn with_keep(mut self, keep: usize) -> Self {
        self.keep = keep;
        self
    }
}

/// Default policy: clear all but the most recent `keep` tool results.
#[derive(Debug, Clone, Default)]
pub struct ClearToolUses {
    config: CompactionConfig,
}

impl ClearToolUses {
    pub fn new(config: CompactionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CompactionConfig {
        &self.config
    }
}

impl CompactionPolicy for ClearToolUses {
    fn compact(&self, mut state: ConversationState) -> (ConversationState, CompactionReport) {
        let cfg = &self.config;
        let messages = state.messages_mut();

        // call id -> (assistant message index, call index, tool name)
        let mut calls: HashMap<String, (usize, usize, String)> = HashMap::new();
        for (i, msg) in messages.iter().enumerate() {
            for (j, call) in msg.tool_calls.as_deref().unwrap_or_default().iter().enumerate() {
                calls.insert(call.id.clone(), (i, j, call.function.name.clone()));
            }
        }

        let results: Vec<usize> = messages
            .iter()
            .enumerate()
            .filter(|(_, m)| m.role == MessageRole::Tool)
            .map(|(i, _)| i)
            .collect();

        let tool_chars: usize = results.iter().map(|&i| messages[i].text_chars()).sum();
        let mut report = CompactionReport {
            tool_tokens: estimate_tokens(tool_chars, cfg.chars_per_token),
            ..Default::default()
        };
        if report.tool_tokens <= cfg.trigger_tokens {
            return (state, report);
        }

        let clearable = results.len().saturating_sub(cfg.keep);
        for &i in &results[..clearable] {
            let call = messages[i]
                .tool_call_id
                .as_ref()
                .and_then(|id| calls.get(id));
            if let Some((_, _, name)) = call
                && cfg.excluded_tools.contains(name)
            {
                continue;
            }
            if messages[i].text() == Some(cfg.placeholder.as_str()) {
                continue;
            }

            let before = messages[i].text_chars();
            messages[i].content = Some(MessageContent::Text(cfg.placeholder.clone()));
            report.cleared += 1;
            report.freed_chars += before.saturating_sub(cfg.placeholder.chars().count());

            if cfg.clear_tool_inputs
                && let Some(&(a, j, _)) = call
                && let Some(tc) = messages[a].tool_calls.as_mut().and_then(|c| c.get_mut(j))
            {
                tc.function.arguments = "{}".to_string();
            }
        }

        debug!(
            "Compaction: {} tool tokens, cleared {} result(s), freed {} chars",
            report.tool_tokens, report.cleared, report.freed_chars
        );
        (state, report)
    }
}

/// Adapts any [`CompactionPolicy`] into a pipeline stage.
pub struct CompactionStage {
    policy: Box<dyn CompactionPolicy>,
}

impl CompactionStage {
    pub fn new(policy: impl CompactionPolicy + 'static) -> Self {
        Self {
            policy: Box::new(policy),
        }
    }
}

impl ContextMiddleware for CompactionStage {
    fn name(&self) -> &str {
        "compaction"
    }

    fn before_model(&self, state: ConversationState) -> ConversationState {
        let (state, report) = self.policy.compact(state);
        if report.cleared > 0 {
            info!(
                "Cleared {} old tool result(s), freed {} chars",
                report.cleared, report.freed_chars
            );
        }
        state
    }
}
