//! The hook contract between the agent loop and the context stages.
//!
//! The driver calls [`ContextPipeline::before_model`] on the full state right
//! before each model call and sends whatever comes back; it calls
//! [`ContextPipeline::after_model`] once the reply has been appended. Stages
//! run in registration order. The order matters: offload must see payloads
//! before truncation would cut them into undecodable prefixes.

use super::classifier::ClassifierConfig;
use super::compaction::{ClearToolUses, CompactionStage};
use super::offload::OffloadStage;
use super::payload::PayloadStore;
use super::state::ConversationState;
use super::truncation::TruncationStage;
use crate::agent::config::PipelineConfig;
use std::sync::Arc;
use tracing::trace;

/// A stage in the context pipeline.
///
/// Both hooks default to doing nothing, so a stage implements only the side
/// it cares about.
pub trait ContextMiddleware: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Transform the state before a model call.
    fn before_model(&self, state: ConversationState) -> ConversationState {
        state
    }

    /// Observe the state after the reply has been appended.
    fn after_model(&self, _state: &ConversationState) {}
}

/// Ordered list of stages run around every model call.
#[derive(Default)]
pub struct ContextPipeline {
    stages: Vec<Box<dyn ContextMiddleware>>,
}

impl ContextPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage.
    pub fn with(mut self, stage: impl ContextMiddleware + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    /// Append a stage only when `enabled`.
    pub fn with_if(self, enabled: bool, stage: impl ContextMiddleware + 'static) -> Self {
        if enabled { self.with(stage) } else { self }
    }

    /// The standard pipeline: offload, truncation, then compaction when
    /// enabled. Offloaded payloads go to `store`.
    pub fn from_config(config: &PipelineConfig, store: Arc<dyn PayloadStore>) -> Self {
        let classifier: ClassifierConfig = config.classifier.clone();
        Self::new()
            .with(
                OffloadStage::new(classifier, store)
                    .with_analyze_tool(config.analyze_tool.clone())
                    .with_verbose(config.verbose),
            )
            .with(TruncationStage::new(config.truncation.clone()).with_verbose(config.verbose))
            .with_if(
                config.compaction.enabled,
                CompactionStage::new(ClearToolUses::new(config.compaction.config.clone())),
            )
    }

    /// Names of the registered stages, in order.
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Run every stage's pre-call hook in order.
    pub fn before_model(&self, mut state: ConversationState) -> ConversationState {
        for stage in &self.stages {
            let before = state.len();
            state = stage.before_model(state);
            debug_assert_eq!(
                state.len(),
                before,
                "stage {} changed the message count",
                stage.name()
            );
            trace!("stage {} done", stage.name());
        }
        state
    }

    /// Run every stage's post-call hook in order.
    pub fn after_model(&self, state: &ConversationState) {
        for stage in &self.stages {
            stage.after_model(state);
        }
    }
}

impl std::fmt::Debug for ContextPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextPipeline")
            .field("stages", &self.stage_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Message;
    use crate::context::payload::PayloadSlot;
    use std::sync::Mutex;

    struct Tag(&'static str, Arc<Mutex<Vec<String>>>);

    impl ContextMiddleware for Tag {
        fn name(&self) -> &str {
            self.0
        }

        fn before_model(&self, mut state: ConversationState) -> ConversationState {
            self.1.lock().unwrap().push(format!("before:{}", self.0));
            state.rewrite_text(|s| Some(format!("{s}{}", self.0)));
            state
        }

        fn after_model(&self, _state: &ConversationState) {
            self.1.lock().unwrap().push(format!("after:{}", self.0));
        }
    }

    struct Passive;

    impl ContextMiddleware for Passive {
        fn name(&self) -> &str {
            "passive"
        }
    }

    #[test]
    fn stages_run_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = ContextPipeline::new()
            .with(Tag("a", log.clone()))
            .with(Passive)
            .with(Tag("b", log.clone()));

        let state = pipeline.before_model(ConversationState::new(vec![Message::user("x")]));
        pipeline.after_model(&state);

        assert_eq!(state.messages()[0].text(), Some("xab"));
        assert_eq!(
            *log.lock().unwrap(),
            vec!["before:a", "before:b", "after:a", "after:b"]
        );
    }

    #[test]
    fn empty_pipeline_is_identity() {
        let pipeline = ContextPipeline::new();
        assert!(pipeline.is_empty());
        let state = pipeline.before_model(ConversationState::new(vec![Message::user("hi")]));
        assert_eq!(state.messages()[0].text(), Some("hi"));
    }

    #[test]
    fn with_if_skips_disabled_stages() {
        let pipeline = ContextPipeline::new().with_if(false, Passive).with_if(true, Passive);
        assert_eq!(pipeline.stage_names(), vec!["passive"]);
    }

    #[test]
    fn standard_pipeline_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(PayloadSlot::in_workspace(dir.path()));

        let pipeline = ContextPipeline::from_config(&PipelineConfig::default(), store.clone());
        assert_eq!(
            pipeline.stage_names(),
            vec!["offload", "truncation", "compaction"]
        );

        let mut config = PipelineConfig::default();
        config.compaction.enabled = false;
        let pipeline = ContextPipeline::from_config(&config, store);
        assert_eq!(pipeline.stage_names(), vec!["offload", "truncation"]);
    }
}
