//! Per-fragment length bound plus per-call diagnostics.
//!
//! Anything the offload stage let through is capped here: a fragment over
//! the limit keeps its first `limit` characters and gets a marker recording
//! how many were dropped. Truncating an already-truncated fragment is a
//! no-op, so running the stage on every call never compounds markers.

use super::pipeline::ContextMiddleware;
use super::state::ConversationState;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

/// Default per-fragment character limit.
pub const DEFAULT_TRUNCATION_LIMIT: usize = 4_000;

const MARKER_PREFIX: &str = "\n... [TRUNCATED ";
const MARKER_SUFFIX: &str = " chars]";

/// Length of the reply preview logged after each model call.
const RESPONSE_PREVIEW_CHARS: usize = 150;

/// Truncation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TruncationConfig {
    /// Maximum characters kept per text fragment.
    pub limit: usize,
}

impl Default for TruncationConfig {
    fn default() -> Self {
        Self {
            limit: DEFAULT_TRUNCATION_LIMIT,
        }
    }
}

/// Truncate `fragment` to `limit` characters with a marker.
///
/// Returns `None` when the fragment is within the limit or is already the
/// output of a previous truncation at the same limit.
pub fn truncate_fragment(fragment: &str, limit: usize) -> Option<String> {
    let (cut, _) = fragment.char_indices().nth(limit)?;
    let (head, tail) = fragment.split_at(cut);
    if is_marker(tail) {
        return None;
    }
    let removed = tail.chars().count();
    Some(format!("{head}{MARKER_PREFIX}{removed}{MARKER_SUFFIX}"))
}

fn is_marker(tail: &str) -> bool {
    tail.strip_prefix(MARKER_PREFIX)
        .and_then(|rest| rest.strip_suffix(MARKER_SUFFIX))
        .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
}

/// Pre-call stage that bounds fragment length, and post-call diagnostics.
///
/// Carries the process-wide model call counter, which exists only for
/// log lines.
pub struct TruncationStage {
    limit: usize,
    verbose: bool,
    calls: AtomicU64,
}

impl TruncationStage {
    pub fn new(config: TruncationConfig) -> Self {
        Self {
            limit: config.limit,
            verbose: false,
            calls: AtomicU64::new(0),
        }
    }

    /// Log per-call diagnostics at INFO instead of DEBUG.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Number of pre-call passes so far.
    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    /// Run one truncation pass. Returns the new state and the number of
    /// fragments cut.
    pub fn truncate(&self, mut state: ConversationState) -> (ConversationState, usize) {
        let limit = self.limit;
        let cut = state.rewrite_text(|fragment| truncate_fragment(fragment, limit));
        (state, cut)
    }

    fn log(&self, line: &str) {
        if self.verbose {
            info!("{line}");
        } else {
            debug!("{line}");
        }
    }
}

impl ContextMiddleware for TruncationStage {
    fn name(&self) -> &str {
        "truncation"
    }

    fn before_model(&self, state: ConversationState) -> ConversationState {
        let call = self.calls.fetch_add(1, Ordering::Relaxed) + 1;
        let (state, cut) = self.truncate(state);
        if cut > 0 {
            debug!("Truncated {cut} fragment(s) to {} chars", self.limit);
        }
        self.log(&format!("[Call #{call}] Processing {} messages", state.len()));
        state
    }

    fn after_model(&self, state: &ConversationState) {
        let Some(last) = state.last() else {
            return;
        };
        let names = last.tool_call_names();
        if !names.is_empty() {
            self.log(&format!("Tools called: {names:?}"));
        } else if let Some(content) = &last.content {
            let text = content.joined_text();
            if !text.is_empty() {
                let preview: String = text.chars().take(RESPONSE_PREVIEW_CHARS).collect();
                self.log(&format!("Response: {preview}..."));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ContentPart, Message, MessageContent};

    #[test]
    fn short_fragment_untouched() {
        assert_eq!(truncate_fragment("hello", 10), None);
        assert_eq!(truncate_fragment(&"x".repeat(10), 10), None);
    }

    #[test]
    fn long_fragment_cut_with_count() {
        let out = truncate_fragment(&"x".repeat(6_000), 4_000).unwrap();
        assert!(out.starts_with(&"x".repeat(4_000)));
        assert!(out.ends_with("\n... [TRUNCATED 2000 chars]"));
        assert_eq!(out.chars().count(), 4_000 + "\n... [TRUNCATED 2000 chars]".len());
    }

    #[test]
    fn truncation_is_idempotent() {
        let once = truncate_fragment(&"y".repeat(9_000), 4_000).unwrap();
        assert_eq!(truncate_fragment(&once, 4_000), None);
    }

    #[test]
    fn cuts_on_char_boundaries() {
        let s = "é".repeat(20);
        let out = truncate_fragment(&s, 5).unwrap();
        assert!(out.starts_with("ééééé\n"));
        assert!(out.ends_with("[TRUNCATED 15 chars]"));
    }

    #[test]
    fn lookalike_marker_is_still_cut() {
        let s = format!("{}\n... [TRUNCATED lots chars]", "z".repeat(10));
        assert!(truncate_fragment(&s, 10).is_some());
    }

    #[test]
    fn stage_truncates_every_text_shape_and_counts_calls() {
        let stage = TruncationStage::new(TruncationConfig { limit: 10 });
        let state = ConversationState::new(vec![
            Message::user("a".repeat(30)),
            Message::tool_result(
                "c1",
                MessageContent::Parts(vec![
                    ContentPart::Raw("b".repeat(30)),
                    ContentPart::text("c".repeat(30)),
                    ContentPart::image_url(format!("data:image/png;base64,{}", "A".repeat(50))),
                ]),
            ),
        ]);

        let state = stage.before_model(state);
        let state = stage.before_model(state);
        assert_eq!(stage.call_count(), 2);

        assert_eq!(
            state.messages()[0].text(),
            Some("aaaaaaaaaa\n... [TRUNCATED 20 chars]")
        );
        let MessageContent::Parts(parts) = state.messages()[1].content.as_ref().unwrap() else {
            panic!("expected parts");
        };
        assert!(parts[0].as_text().unwrap().ends_with("[TRUNCATED 20 chars]"));
        assert!(parts[1].as_text().unwrap().ends_with("[TRUNCATED 20 chars]"));
        // Image blocks carry no text fragment and pass through untouched.
        let ContentPart::Block(img) = &parts[2] else {
            panic!("expected block");
        };
        assert_eq!(img["image_url"]["url"].as_str().unwrap().len(), 72);
    }

    #[test]
    fn after_model_handles_empty_state() {
        let stage = TruncationStage::new(TruncationConfig::default());
        stage.after_model(&ConversationState::default());
    }
}
