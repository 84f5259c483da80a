//! Configuration types for the [`Harness`](super::harness::Harness) and the
//! context pipeline.
//!
//! [`HarnessConfig`] covers the model call itself and is built in code.
//! [`PipelineConfig`] covers the context stages and the vision tool; every
//! field has a default, so a JSON file only needs the keys it changes.
//!
//! ```ignore
//! let harness = HarnessConfig::new("anthropic/claude-sonnet-4", "You are a browser agent.")
//!     .with_max_rounds(40)
//!     .with_retries(3);
//!
//! let pipeline = PipelineConfig::load("lens.json")?;
//! ```

use crate::api::retry::RetryConfig;
use crate::context::classifier::ClassifierConfig;
use crate::context::compaction::CompactionConfig;
use crate::context::offload::DEFAULT_ANALYZE_TOOL;
use crate::context::truncation::TruncationConfig;
use crate::tools::vision::VisionConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

// ── Generic toggle ────────────────────────────────────────────────

/// Enabled/disabled wrapper for an optional stage's configuration.
///
/// When `enabled` is `false` the stage is not registered at all, regardless
/// of the inner config values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Toggle<T: Default> {
    /// Whether this stage is active.
    pub enabled: bool,
    /// Stage-specific configuration.
    pub config: T,
}

impl<T: Default> Toggle<T> {
    /// A disabled instance with default inner config.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            config: T::default(),
        }
    }
}

impl<T: Default> Default for Toggle<T> {
    fn default() -> Self {
        Self {
            enabled: true,
            config: T::default(),
        }
    }
}

/// Compaction stage configuration.
pub type PipelineCompactionConfig = Toggle<CompactionConfig>;

// ── Pipeline config ───────────────────────────────────────────────

/// Settings for the context stages and the vision tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub classifier: ClassifierConfig,
    pub truncation: TruncationConfig,
    /// Tool-result compaction. Enabled by default.
    pub compaction: PipelineCompactionConfig,
    pub vision: VisionConfig,
    /// Tool name the offload placeholder tells the agent to call.
    pub analyze_tool: String,
    /// Log per-call diagnostics at INFO.
    pub verbose: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            classifier: ClassifierConfig::default(),
            truncation: TruncationConfig::default(),
            compaction: PipelineCompactionConfig::default(),
            vision: VisionConfig::default(),
            analyze_tool: DEFAULT_ANALYZE_TOOL.to_string(),
            verbose: true,
        }
    }
}

impl PipelineConfig {
    /// Load from a JSON file. Missing keys take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, String> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read {}: {e}", path.display()))?;
        serde_json::from_str(&contents)
            .map_err(|e| format!("failed to parse {}: {e}", path.display()))
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_vision_model(mut self, model: impl Into<String>) -> Self {
        self.vision.model = model.into();
        self
    }
}

// ── Harness config ────────────────────────────────────────────────

/// Configuration for a [`Harness`](super::harness::Harness) run.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Model identifier (e.g. `"anthropic/claude-sonnet-4"`).
    pub model: String,
    /// Maximum tool-use round-trips before stopping.
    pub max_rounds: u32,
    /// Maximum tokens per model response.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
    /// Retry configuration for transient API failures.
    pub retry: RetryConfig,
    /// System prompt, prepended to the conversation when set.
    pub system_prompt: Option<String>,
}

impl HarnessConfig {
    /// Create a config with a model and system prompt.
    pub fn new(model: impl Into<String>, system_prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            system_prompt: Some(system_prompt.into()),
            ..Default::default()
        }
    }

    /// Set the maximum number of tool-use round-trips.
    pub fn with_max_rounds(mut self, max_rounds: u32) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    /// Set the maximum tokens per model response.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Set the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Enable automatic retries for transient API failures (429, 5xx,
    /// network errors). Pass `0` to disable.
    pub fn with_retries(mut self, max_retries: u32) -> Self {
        self.retry = RetryConfig::with_retries(max_retries);
        self
    }
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            model: crate::DEFAULT_MODEL.to_string(),
            max_rounds: 40,
            max_tokens: 4096,
            temperature: 0.0,
            retry: RetryConfig::default(),
            system_prompt: None,
        }
    }
}
