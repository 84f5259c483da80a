//! Agent runtime: the [`Harness`] loop and its supporting modules.
//!
//! - [`harness::Harness`] runs the tool-use loop with the context pipeline
//!   applied before every model call. Start here.
//! - [`config`] holds [`HarnessConfig`] for the loop and [`PipelineConfig`]
//!   for the context stages and the vision tool.
//! - [`events`] has the [`EventHandler`] trait and [`HarnessEvent`] enum for
//!   observing the loop, with [`LoggingHandler`], [`CompositeEventHandler`],
//!   [`FnEventHandler`], and [`ToolResultHandler`].

pub mod config;
pub mod events;
pub mod harness;

pub use config::{HarnessConfig, PipelineCompactionConfig, PipelineConfig, Toggle};
pub use events::{
    CompositeEventHandler, EventHandler, FnEventHandler, HarnessEvent, HarnessResult,
    LoggingHandler, NoopHandler, ToolResultHandler,
};
pub use harness::Harness;
