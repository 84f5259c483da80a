//! Context bounding: keep the conversation small enough to send.
//!
//! A browser agent's tool results are dominated by screenshots and page
//! dumps. Left alone, a handful of them overflow any context window. The
//! stages here run on the whole conversation right before every model call:
//!
//! 1. **[`offload`]** moves embedded base64 images (detected by
//!    [`classifier`]) into a [`PayloadStore`] and leaves a short placeholder.
//! 2. **[`truncation`]** caps every remaining text fragment.
//! 3. **[`compaction`]** collapses old tool results once their total grows
//!    past a trigger.
//!
//! [`pipeline`] defines the hook contract the agent loop calls and composes
//! the stages. Stages rewrite content in place; none inserts, removes, or
//! reorders messages.

pub mod classifier;
pub mod compaction;
pub mod offload;
pub mod payload;
pub mod pipeline;
pub mod state;
pub mod truncation;

pub use classifier::{ClassifierConfig, PayloadMatch};
pub use compaction::{
    ClearToolUses, CompactionConfig, CompactionPolicy, CompactionReport, CompactionStage,
    DEFAULT_CHARS_PER_TOKEN,
};
pub use offload::{DEFAULT_ANALYZE_TOOL, OffloadStage};
pub use payload::{CaptureError, KeyedPayloadStore, PayloadSlot, PayloadStore};
pub use pipeline::{ContextMiddleware, ContextPipeline};
pub use state::ConversationState;
pub use truncation::{TruncationConfig, TruncationStage};
