//! Tool abstractions for function-calling agents.
//!
//! Every agent capability is a [`Tool`] implementor collected into a
//! [`ToolSet`], which handles dispatch, argument validation, and timeouts.
//!
//! - [`core`]: [`Tool`] trait, [`ToolSet`], [`FnTool`], argument helpers.
//! - [`vision`]: [`AnalyzeScreenshot`], which recompresses the latest
//!   offloaded capture and asks a vision model about it.
//! - [`save`]: [`SaveResults`], markdown output into the workspace.
//! - [`command`]: [`CommandTool`], external tools described in a JSON file
//!   and run as shell commands (browser automation lives there).

pub mod command;
pub mod core;
pub mod save;
pub mod vision;

pub use command::{CommandTool, load_command_tools, render_command};
pub use core::{
    DEFAULT_TOOL_TIMEOUT, FnTool, Tool, ToolFuture, ToolSet, parse_tool_args,
    validate_tool_arguments,
};
pub use save::{DEFAULT_RESULTS_FILE, SaveResults, saved_path};
pub use vision::{AnalyzeScreenshot, NO_SCREENSHOT, Recompressed, VisionConfig, recompress};
