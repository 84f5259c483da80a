//! LinkedIn job-search agent built on lens-rs.
//!
//! The agent drives a browser through external tools, captures the search
//! results page, and extracts the listings with a vision model. The lens-rs
//! pipeline keeps those captures out of the conversation.
//!
//! # Library usage
//!
//! ```ignore
//! use lens_jobs::{JobsConfig, job_search_task};
//! use lens_rs::prelude::*;
//!
//! let config = JobsConfig::default();
//! let store: Arc<dyn PayloadStore> = Arc::new(PayloadSlot::in_workspace(&config.workspace));
//! let pipeline = config.build_pipeline(store.clone());
//! let tools = config.build_tool_set(client.clone(), store)?;
//!
//! let result = Harness::new(client.as_ref(), &tools, &pipeline, config.build_harness_config())
//!     .run(vec![Message::user(job_search_task(&config.job_title, config.num_jobs))])
//!     .await?;
//! ```
//!
//! # Binary
//!
//! ```sh
//! lens-jobs --job-title "Data Scientist" --num-jobs 10 --browser-tools browser.json
//! lens-jobs --list-files
//! lens-jobs --show-summary
//! ```

pub mod config;
pub mod prompt;
pub mod tools;
pub mod workspace;

pub use config::JobsConfig;
pub use prompt::{job_search_task, jobs_system_prompt};
pub use tools::JobToolsExt;
