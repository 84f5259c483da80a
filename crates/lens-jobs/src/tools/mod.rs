//! Job-search tools and the [`JobToolsExt`] trait for registering them on a
//! [`ToolSet`].

use lens_rs::agent::ToolResultHandler;
use lens_rs::tools::{AnalyzeScreenshot, SaveResults, ToolSet, VisionConfig, saved_path};
use lens_rs::{ChatClient, context::PayloadStore};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

// ── Tool names and defaults ─────────────────────────────────────────

pub const SAVE_JOB_RESULTS: &str = "save_job_results";
pub const JOB_RESULTS_FILE: &str = "job_results.md";
pub const JOB_RESULTS_TITLE: &str = "LinkedIn Job Search Results";

/// Extraction prompt for LinkedIn search result pages. `{max_items}` is
/// replaced with the requested job count.
pub const LINKEDIN_EXTRACTION_PROMPT: &str = "\
Analyze this LinkedIn job search results screenshot.

Extract ALL visible job listings from the LEFT PANEL (the job cards list).

For EACH job card visible, extract:
1. Job Title
2. Company Name
3. Location (City, State, Country)
4. Work Type (On-site, Remote, Hybrid) if shown
5. Time Posted (e.g., \"1 week ago\", \"3 days ago\")

Format your response as a numbered markdown list:

1. **[Job Title]** - [Company] - [Location] ([Work Type]) - [Time Posted]
2. ...

Extract up to {max_items} jobs. Include ALL jobs you can see in the left panel.
If any field is not visible, write \"N/A\".

IMPORTANT: Count carefully and list EVERY job card you see in the left panel.";

// ── Extension trait ─────────────────────────────────────────────────

/// Registers the vision tool and the results tool.
///
/// ```ignore
/// let tools = ToolSet::new().with_job_tools(client, store, vision, analyze_tool, "agent_workspace");
/// ```
pub trait JobToolsExt {
    fn with_job_tools(
        self,
        client: Arc<dyn ChatClient>,
        store: Arc<dyn PayloadStore>,
        vision: VisionConfig,
        analyze_tool: &str,
        workspace: impl Into<PathBuf>,
    ) -> Self;
}

impl JobToolsExt for ToolSet {
    fn with_job_tools(
        self,
        client: Arc<dyn ChatClient>,
        store: Arc<dyn PayloadStore>,
        vision: VisionConfig,
        analyze_tool: &str,
        workspace: impl Into<PathBuf>,
    ) -> Self {
        self.with(AnalyzeScreenshot::new(client, store, vision).with_name(analyze_tool))
            .with(
                SaveResults::new(workspace)
                    .with_name(SAVE_JOB_RESULTS)
                    .with_title(JOB_RESULTS_TITLE)
                    .with_default_file(JOB_RESULTS_FILE),
            )
    }
}

// ── Result tracking ─────────────────────────────────────────────────

/// Event handler that appends every path written by `save_job_results` to
/// `sink`. Failed saves are ignored.
pub fn saved_results_recorder(sink: Arc<Mutex<Vec<PathBuf>>>) -> ToolResultHandler {
    ToolResultHandler::new().on(SAVE_JOB_RESULTS, move |result| {
        if let Some(path) = saved_path(result) {
            sink.lock().unwrap_or_else(|e| e.into_inner()).push(path);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use lens_rs::agent::{EventHandler, HarnessEvent};

    fn result<'a>(name: &'a str, text: &'a str) -> HarnessEvent<'a> {
        HarnessEvent::ToolResult {
            name,
            call_id: "c1",
            result: text,
        }
    }

    #[test]
    fn recorder_keeps_successful_saves_only() {
        let saved = Arc::new(Mutex::new(Vec::new()));
        let handler = saved_results_recorder(saved.clone());

        handler.on_event(&result(
            SAVE_JOB_RESULTS,
            "Successfully saved results to: /ws/job_results.md",
        ));
        handler.on_event(&result(SAVE_JOB_RESULTS, "Error: invalid filename '../x'"));
        handler.on_event(&result(
            "browser_navigate",
            "Successfully saved results to: /elsewhere.md",
        ));

        assert_eq!(*saved.lock().unwrap(), vec![PathBuf::from("/ws/job_results.md")]);
    }

    #[tokio::test]
    async fn recorder_sees_real_tool_output() {
        let dir = tempfile::tempdir().unwrap();
        let saved = Arc::new(Mutex::new(Vec::new()));
        let handler = saved_results_recorder(saved.clone());
        let tools = ToolSet::new().with(
            SaveResults::new(dir.path())
                .with_name(SAVE_JOB_RESULTS)
                .with_default_file(JOB_RESULTS_FILE),
        );

        let out = tools
            .execute(SAVE_JOB_RESULTS, r#"{"content": "1. Rust"}"#)
            .await;
        handler.on_event(&result(SAVE_JOB_RESULTS, &out));

        assert_eq!(*saved.lock().unwrap(), vec![dir.path().join(JOB_RESULTS_FILE)]);
    }
}
