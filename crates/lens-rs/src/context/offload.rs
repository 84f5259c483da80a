//! Screenshot offload: move embedded images out of the conversation.
//!
//! Every text fragment the [`ClassifierConfig`] flags is decoded, written to
//! the shared [`PayloadStore`], and replaced with a short placeholder that
//! names the saved file and the tool that can read it. A fragment that fails
//! to decode or save is still replaced, with a placeholder asking the agent
//! to try again; the pass never aborts.

use super::classifier::ClassifierConfig;
use super::payload::{PayloadStore, decode_payload};
use super::pipeline::ContextMiddleware;
use super::state::ConversationState;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Name of the tool the placeholder points the agent at.
pub const DEFAULT_ANALYZE_TOOL: &str = "analyze_saved_screenshot";

/// Replacement text when a payload could not be saved.
pub const SAVE_FAILED_PLACEHOLDER: &str =
    "[Screenshot captured but could not be saved. Try again.]";

/// Placeholder for a successfully saved payload.
pub fn saved_placeholder(path: &Path, analyze_tool: &str) -> String {
    format!(
        "[Screenshot saved to {}. Call {analyze_tool}() to extract structured information from it.]",
        path.display()
    )
}

/// Pre-call stage that replaces large embedded payloads with placeholders.
pub struct OffloadStage {
    classifier: ClassifierConfig,
    store: Arc<dyn PayloadStore>,
    analyze_tool: String,
    verbose: bool,
}

impl OffloadStage {
    pub fn new(classifier: ClassifierConfig, store: Arc<dyn PayloadStore>) -> Self {
        Self {
            classifier,
            store,
            analyze_tool: DEFAULT_ANALYZE_TOOL.to_string(),
            verbose: false,
        }
    }

    /// Name the extraction tool in placeholders.
    pub fn with_analyze_tool(mut self, name: impl Into<String>) -> Self {
        self.analyze_tool = name.into();
        self
    }

    /// Log each interception at INFO instead of DEBUG.
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Run one offload pass. Returns the new state and the number of
    /// fragments intercepted.
    pub fn offload(&self, mut state: ConversationState) -> (ConversationState, usize) {
        let intercepted = state.rewrite_text(|fragment| {
            let kind = self.classifier.classify(fragment)?;
            let chars = fragment.chars().count();
            let placeholder = match decode_payload(fragment).and_then(|b| self.store.store(&b)) {
                Ok(path) => {
                    if self.verbose {
                        info!("Intercepted screenshot data ({chars} chars, {kind:?}), saved to file");
                    } else {
                        debug!("Intercepted screenshot data ({chars} chars, {kind:?}), saved to file");
                    }
                    saved_placeholder(&path, &self.analyze_tool)
                }
                Err(e) => {
                    warn!("Intercepted screenshot data ({chars} chars, {kind:?}) but offload failed: {e}");
                    SAVE_FAILED_PLACEHOLDER.to_string()
                }
            };
            Some(placeholder)
        });
        (state, intercepted)
    }
}

impl ContextMiddleware for OffloadStage {
    fn name(&self) -> &str {
        "offload"
    }

    fn before_model(&self, state: ConversationState) -> ConversationState {
        self.offload(state).0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::payload::{CaptureError, PayloadSlot};
    use crate::{ContentPart, Message, MessageContent};
    use base64::Engine;
    use std::path::PathBuf;

    fn big_data_uri() -> String {
        data_uri_of(7)
    }

    fn data_uri_of(byte: u8) -> String {
        let raw = vec![byte; 30_000];
        format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(raw)
        )
    }

    struct FailingStore;

    impl PayloadStore for FailingStore {
        fn store(&self, _bytes: &[u8]) -> Result<PathBuf, CaptureError> {
            Err(CaptureError::Write {
                path: PathBuf::from("/nowhere"),
                source: std::io::Error::other("disk full"),
            })
        }
        fn latest(&self) -> Result<Option<Vec<u8>>, CaptureError> {
            Ok(None)
        }
    }

    #[test]
    fn replaces_string_content_and_saves_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let slot = Arc::new(PayloadSlot::in_workspace(dir.path()));
        let stage = OffloadStage::new(ClassifierConfig::default(), slot.clone());

        let state = ConversationState::new(vec![
            Message::user("find jobs"),
            Message::tool_result("c1", big_data_uri()),
        ]);
        let (state, n) = stage.offload(state);

        assert_eq!(n, 1);
        assert_eq!(state.messages()[0].text(), Some("find jobs"));
        let placeholder = state.messages()[1].text().unwrap();
        assert!(placeholder.starts_with("[Screenshot saved to "));
        assert!(placeholder.contains("current_screenshot.png"));
        assert!(placeholder.contains("analyze_saved_screenshot()"));
        assert_eq!(slot.latest().unwrap().unwrap(), vec![7u8; 30_000]);
    }

    #[test]
    fn replaces_payloads_inside_parts_and_keeps_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let stage = OffloadStage::new(
            ClassifierConfig::default(),
            Arc::new(PayloadSlot::in_workspace(dir.path())),
        );

        let mut block = serde_json::Map::new();
        block.insert("type".into(), "text".into());
        block.insert("text".into(), big_data_uri().into());
        block.insert("id".into(), "shot-1".into());

        let state = ConversationState::new(vec![Message::tool_result(
            "c1",
            MessageContent::Parts(vec![
                ContentPart::Raw(big_data_uri()),
                ContentPart::Block(block),
                ContentPart::text("page title"),
            ]),
        )]);
        let (state, n) = stage.offload(state);
        assert_eq!(n, 2);

        let MessageContent::Parts(parts) = state.messages()[0].content.as_ref().unwrap() else {
            panic!("expected parts");
        };
        assert!(parts[0].as_text().unwrap().starts_with("[Screenshot saved"));
        assert!(parts[1].as_text().unwrap().starts_with("[Screenshot saved"));
        let ContentPart::Block(map) = &parts[1] else {
            panic!("expected block");
        };
        assert_eq!(map["id"], "shot-1");
        assert_eq!(parts[2].as_text(), Some("page title"));
    }

    #[test]
    fn slot_holds_last_payload_of_the_pass() {
        let dir = tempfile::tempdir().unwrap();
        let slot = Arc::new(PayloadSlot::in_workspace(dir.path()));
        let stage = OffloadStage::new(ClassifierConfig::default(), slot.clone());

        let state = ConversationState::new(vec![
            Message::tool_result("c1", data_uri_of(1)),
            Message::user("next page"),
            Message::tool_result("c2", data_uri_of(2)),
        ]);
        let (state, n) = stage.offload(state);

        assert_eq!(n, 2);
        assert!(state.messages()[0].text().unwrap().starts_with("[Screenshot saved"));
        assert!(state.messages()[2].text().unwrap().starts_with("[Screenshot saved"));
        assert_eq!(slot.latest().unwrap().unwrap(), vec![2u8; 30_000]);
    }

    #[test]
    fn undecodable_payload_gets_retry_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        let slot = Arc::new(PayloadSlot::in_workspace(dir.path()));
        let stage = OffloadStage::new(ClassifierConfig::default(), slot.clone());
        let garbage = format!("data:image/png;base64,{}", "#".repeat(20_000));
        let (state, n) = stage.offload(ConversationState::new(vec![Message::user(garbage)]));
        assert_eq!(n, 1);
        assert_eq!(state.messages()[0].text(), Some(SAVE_FAILED_PLACEHOLDER));
        assert!(slot.latest().unwrap().is_none());
    }

    #[test]
    fn write_failure_gets_retry_placeholder() {
        let stage = OffloadStage::new(ClassifierConfig::default(), Arc::new(FailingStore));
        let (state, _) =
            stage.offload(ConversationState::new(vec![Message::user(big_data_uri())]));
        assert_eq!(state.messages()[0].text(), Some(SAVE_FAILED_PLACEHOLDER));
    }

    #[test]
    fn custom_tool_name_in_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        let stage = OffloadStage::new(
            ClassifierConfig::default(),
            Arc::new(PayloadSlot::in_workspace(dir.path())),
        )
        .with_analyze_tool("read_capture");
        let (state, _) =
            stage.offload(ConversationState::new(vec![Message::user(big_data_uri())]));
        assert!(state.messages()[0].text().unwrap().contains("read_capture()"));
    }
}
