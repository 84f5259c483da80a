//! Job-search agent configuration with sensible defaults.
//!
//! [`JobsConfig`] captures everything a run needs and converts it into
//! lens-rs types via [`build_harness_config`](JobsConfig::build_harness_config),
//! [`build_pipeline`](JobsConfig::build_pipeline), and
//! [`build_tool_set`](JobsConfig::build_tool_set). It can be loaded from a
//! JSON file; missing keys take their defaults.

use lens_rs::ChatClient;
use lens_rs::agent::{HarnessConfig, PipelineConfig};
use lens_rs::context::{ContextPipeline, PayloadStore};
use lens_rs::tools::{DEFAULT_TOOL_TIMEOUT, ToolSet, VisionConfig, load_command_tools};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use crate::prompt::jobs_system_prompt;
use crate::tools::{JobToolsExt, LINKEDIN_EXTRACTION_PROMPT};

pub const DEFAULT_JOB_TITLE: &str = "Generative AI Architect";
pub const DEFAULT_NUM_JOBS: u32 = 5;

/// Configuration for a job-search run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    /// Agent model identifier. Default: [`lens_rs::DEFAULT_MODEL`].
    pub model: String,
    /// Maximum tool-use round-trips. Default: `40`.
    pub max_rounds: u32,
    /// Maximum tokens per agent response. Default: `4096`.
    pub max_tokens: u32,
    /// Workspace for captures and saved results. Default: `"agent_workspace"`.
    pub workspace: PathBuf,
    /// Run the browser headless. Exported to browser tools as `LENS_HEADLESS`.
    pub headless: bool,
    /// JSON file describing the browser tools. Without it the agent only
    /// has the vision and results tools.
    pub browser_tools: Option<PathBuf>,
    pub job_title: String,
    pub num_jobs: u32,
    /// Context stages and vision tool. The vision prompt defaults to the
    /// LinkedIn extraction prompt.
    pub pipeline: PipelineConfig,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            model: lens_rs::DEFAULT_MODEL.to_string(),
            max_rounds: 40,
            max_tokens: 4096,
            workspace: PathBuf::from("agent_workspace"),
            headless: false,
            browser_tools: None,
            job_title: DEFAULT_JOB_TITLE.to_string(),
            num_jobs: DEFAULT_NUM_JOBS,
            pipeline: PipelineConfig {
                vision: VisionConfig::default().with_prompt(LINKEDIN_EXTRACTION_PROMPT),
                ..Default::default()
            },
        }
    }
}

impl JobsConfig {
    /// Load from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, String> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read {}: {e}", path.display()))?;
        serde_json::from_str(&contents)
            .map_err(|e| format!("failed to parse {}: {e}", path.display()))
    }

    /// Harness settings: the job-search system prompt at temperature 0.
    pub fn build_harness_config(&self) -> HarnessConfig {
        HarnessConfig::new(self.model.clone(), jobs_system_prompt())
            .with_max_rounds(self.max_rounds)
            .with_max_tokens(self.max_tokens)
            .with_temperature(0.0)
    }

    pub fn build_pipeline(&self, store: Arc<dyn PayloadStore>) -> ContextPipeline {
        ContextPipeline::from_config(&self.pipeline, store)
    }

    /// Browser tools from [`browser_tools`](Self::browser_tools) plus the
    /// vision and results tools.
    pub fn build_tool_set(
        &self,
        client: Arc<dyn ChatClient>,
        store: Arc<dyn PayloadStore>,
    ) -> Result<ToolSet, String> {
        let mut tools = ToolSet::new()
            .with_arg_validation(true)
            .with_default_timeout(Some(DEFAULT_TOOL_TIMEOUT));
        if let Some(path) = &self.browser_tools {
            let browser = load_command_tools(path, self.headless)?;
            info!("Loaded {} browser tools from {}", browser.len(), path.display());
            for tool in browser {
                tools.register(tool.with_workdir(&self.workspace));
            }
        }
        let tools = tools.with_job_tools(
            client,
            store,
            self.pipeline.vision.clone(),
            &self.pipeline.analyze_tool,
            &self.workspace,
        );
        info!("Total tools available: {}", tools.len());
        Ok(tools)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lens_rs::{ChatCompletion, ChatRequest};
    use std::future::Future;
    use std::pin::Pin;

    /// A client the tests never call.
    struct Unreachable;

    impl ChatClient for Unreachable {
        fn chat<'a>(
            &'a self,
            _body: &'a ChatRequest,
        ) -> Pin<Box<dyn Future<Output = Result<ChatCompletion, String>> + Send + 'a>> {
            Box::pin(async { Err("not called".to_string()) })
        }
    }

    fn store(dir: &Path) -> Arc<dyn PayloadStore> {
        Arc::new(lens_rs::context::PayloadSlot::in_workspace(dir))
    }

    #[test]
    fn defaults_match_the_cli() {
        let config = JobsConfig::default();
        assert_eq!(config.job_title, "Generative AI Architect");
        assert_eq!(config.num_jobs, 5);
        assert_eq!(config.max_rounds, 40);
        assert!(!config.headless);
        assert!(config.pipeline.vision.prompt.contains("LinkedIn"));
    }

    #[test]
    fn harness_config_is_deterministic() {
        let harness = JobsConfig::default().build_harness_config();
        assert_eq!(harness.temperature, 0.0);
        assert_eq!(harness.max_rounds, 40);
        assert!(harness.system_prompt.unwrap().contains("browser_screenshot"));
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.json");
        std::fs::write(&path, r#"{"num_jobs": 12, "headless": true}"#).unwrap();

        let config = JobsConfig::load(&path).unwrap();
        assert_eq!(config.num_jobs, 12);
        assert!(config.headless);
        assert_eq!(config.job_title, DEFAULT_JOB_TITLE);
        assert_eq!(config.pipeline, JobsConfig::default().pipeline);
        assert!(JobsConfig::load(dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn tool_set_without_browser_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = JobsConfig {
            workspace: dir.path().to_path_buf(),
            ..Default::default()
        };
        let tools = config
            .build_tool_set(Arc::new(Unreachable), store(dir.path()))
            .unwrap();
        assert_eq!(tools.names(), vec!["analyze_saved_screenshot", "save_job_results"]);
    }

    #[test]
    fn tool_set_loads_browser_tools() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("browser.json");
        std::fs::write(
            &file,
            r#"[{
                "type": "function",
                "function": {
                    "name": "browser_navigate",
                    "description": "Open a URL",
                    "parameters": {"type": "object", "properties": {"url": {"type": "string"}}}
                },
                "execute": "echo {{url}}"
            }]"#,
        )
        .unwrap();
        let config = JobsConfig {
            workspace: dir.path().to_path_buf(),
            browser_tools: Some(file),
            ..Default::default()
        };
        let tools = config
            .build_tool_set(Arc::new(Unreachable), store(dir.path()))
            .unwrap();
        assert!(tools.contains("browser_navigate"));
        assert_eq!(tools.len(), 3);

        let bad = JobsConfig {
            browser_tools: Some(dir.path().join("nope.json")),
            ..Default::default()
        };
        assert!(bad.build_tool_set(Arc::new(Unreachable), store(dir.path())).is_err());
    }

    #[test]
    fn pipeline_registers_default_stages() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = JobsConfig::default().build_pipeline(store(dir.path()));
        assert_eq!(pipeline.stage_names(), vec!["offload", "truncation", "compaction"]);
    }
}
