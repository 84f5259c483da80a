//! Save the agent's findings as a markdown file in the workspace.

use crate::ToolDef;
use crate::tools::core::{Tool, ToolFuture, parse_tool_args};
use schemars::JsonSchema;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

/// File name used when the model does not pass one.
pub const DEFAULT_RESULTS_FILE: &str = "results.md";

/// Start of a successful result; the saved path follows it.
pub const SAVED_PREFIX: &str = "Successfully saved results to: ";

/// The path named by a successful [`SaveResults`] result.
pub fn saved_path(result: &str) -> Option<PathBuf> {
    result.strip_prefix(SAVED_PREFIX).map(PathBuf::from)
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SaveArgs {
    /// The content to save (markdown formatted).
    pub content: String,
    /// Name of the file to create inside the workspace. A bare file name;
    /// directories are not allowed.
    #[serde(default)]
    pub filename: Option<String>,
}

/// Writes `# <title>\n\nGenerated: <timestamp>\n\n<content>` to a file in
/// the workspace, overwriting any previous file of the same name.
#[derive(Debug, Clone)]
pub struct SaveResults {
    workspace: PathBuf,
    name: String,
    title: String,
    default_file: String,
}

impl SaveResults {
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self {
            workspace: workspace.into(),
            name: "save_results".into(),
            title: "Agent Results".into(),
            default_file: DEFAULT_RESULTS_FILE.into(),
        }
    }

    /// Register under a different tool name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Heading written at the top of every saved file.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_default_file(mut self, filename: impl Into<String>) -> Self {
        self.default_file = filename.into();
        self
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    fn save(&self, args: SaveArgs) -> Result<PathBuf, String> {
        let filename = args
            .filename
            .as_deref()
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .unwrap_or(&self.default_file);
        validate_filename(filename)?;

        std::fs::create_dir_all(&self.workspace)
            .map_err(|e| format!("failed to create {}: {e}", self.workspace.display()))?;
        let path = self.workspace.join(filename);
        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
        let document = format!("# {}\n\nGenerated: {timestamp}\n\n{}", self.title, args.content);
        std::fs::write(&path, document)
            .map_err(|e| format!("failed to write {}: {e}", path.display()))?;
        info!("Saved {} bytes of results to {}", args.content.len(), path.display());
        Ok(path)
    }
}

/// A bare file name: no separators, no parent references.
fn validate_filename(filename: &str) -> Result<(), String> {
    if filename.contains('/') || filename.contains('\\') || filename.contains("..") {
        return Err(format!(
            "invalid filename '{filename}': use a plain file name without directories"
        ));
    }
    Ok(())
}

impl Tool for SaveResults {
    fn definition(&self) -> ToolDef {
        ToolDef::new(
            &self.name,
            format!(
                "Save results to a markdown file in the workspace directory. \
                 The filename defaults to {}.",
                self.default_file
            ),
            crate::json_schema_for::<SaveArgs>(),
        )
    }

    fn execute(&self, arguments: &str) -> ToolFuture<'_> {
        let arguments = arguments.to_string();
        Box::pin(async move {
            let args: SaveArgs = match parse_tool_args(&arguments) {
                Ok(a) => a,
                Err(e) => return e,
            };
            match self.save(args) {
                Ok(path) => format!("{SAVED_PREFIX}{}", path.display()),
                Err(e) => format!("Error: {e}"),
            }
        })
    }
}
