//! External tools defined in a JSON file and run as shell commands.
//!
//! Browser automation lives outside this crate. A tools file lists each
//! tool in function-calling format plus an `execute` command template:
//!
//! ```json
//! [{
//!   "type": "function",
//!   "function": {
//!     "name": "browser_navigate",
//!     "description": "Open a URL",
//!     "parameters": {"type": "object", "properties": {"url": {"type": "string"}}}
//!   },
//!   "execute": "browser-cli navigate {{url}}"
//! }]
//! ```
//!
//! `{{param}}` placeholders are replaced with shell-quoted argument values,
//! so templates must not add their own quotes around them. Placeholders
//! with no matching argument are dropped. Commands run through `sh -c` with
//! `LENS_HEADLESS`, `LENS_TOOL_NAME`, and `LENS_TOOL_ARGS` in the
//! environment.

use crate::tools::core::{Tool, ToolFuture};
use crate::{FunctionDef, ToolDef, ToolType};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, warn};

/// One entry of a tools file.
#[derive(Debug, Deserialize)]
struct ToolFileEntry {
    #[serde(rename = "type")]
    tool_type: ToolType,
    function: FunctionDef,
    /// Shell command template with `{{param}}` placeholders.
    execute: String,
}

/// A tool that runs a rendered shell command and returns its stdout.
#[derive(Debug, Clone)]
pub struct CommandTool {
    def: ToolDef,
    template: String,
    headless: bool,
    workdir: Option<PathBuf>,
}

impl CommandTool {
    pub fn new(def: ToolDef, template: impl Into<String>) -> Self {
        Self {
            def,
            template: template.into(),
            headless: true,
            workdir: None,
        }
    }

    /// Exported to the command as `LENS_HEADLESS=1` or `0`.
    pub fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    pub fn with_workdir(mut self, workdir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(workdir.into());
        self
    }
}

/// Load every tool from a JSON tools file.
pub fn load_command_tools(path: impl AsRef<Path>, headless: bool) -> Result<Vec<CommandTool>, String> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read tools file '{}': {e}", path.display()))?;
    let entries: Vec<ToolFileEntry> = serde_json::from_str(&content)
        .map_err(|e| format!("failed to parse tools file '{}': {e}", path.display()))?;

    Ok(entries
        .into_iter()
        .map(|entry| {
            CommandTool::new(
                ToolDef {
                    tool_type: entry.tool_type,
                    function: entry.function,
                },
                entry.execute,
            )
            .with_headless(headless)
        })
        .collect())
}

/// Quote `value` for POSIX `sh`.
fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Drop `{{...}}` placeholders left after substitution.
fn strip_placeholders(cmd: &str) -> String {
    let mut out = String::with_capacity(cmd.len());
    let mut rest = cmd;
    while let Some(start) = rest.find("{{") {
        let (before, after) = rest.split_at(start);
        out.push_str(before);
        let inner = after.strip_prefix("{{").unwrap_or(after);
        match inner.split_once("}}") {
            Some((_, tail)) => rest = tail,
            None => {
                out.push_str(after);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// Substitute `{{param}}` placeholders in a command template.
pub fn render_command(template: &str, arguments_json: &str) -> Result<String, String> {
    let args: serde_json::Value = if arguments_json.trim().is_empty() {
        serde_json::Value::Object(serde_json::Map::new())
    } else {
        serde_json::from_str(arguments_json).map_err(|e| format!("invalid arguments: {e}"))?
    };
    let Some(obj) = args.as_object() else {
        return Err("arguments must be a JSON object".to_string());
    };

    let mut cmd = template.to_string();
    for (key, value) in obj {
        let placeholder = format!("{{{{{key}}}}}");
        let replacement = match value {
            serde_json::Value::String(s) => shell_quote(s),
            serde_json::Value::Null => String::new(),
            other => shell_quote(&other.to_string()),
        };
        cmd = cmd.replace(&placeholder, &replacement);
    }

    let mut cmd = strip_placeholders(&cmd);
    while cmd.contains("  ") {
        cmd = cmd.replace("  ", " ");
    }
    Ok(cmd.trim().to_string())
}

impl Tool for CommandTool {
    fn definition(&self) -> ToolDef {
        self.def.clone()
    }

    fn execute(&self, arguments: &str) -> ToolFuture<'_> {
        let arguments = arguments.to_string();
        Box::pin(async move {
            let name = &self.def.function.name;
            let cmd = match render_command(&self.template, &arguments) {
                Ok(c) => c,
                Err(e) => return format!("Error rendering command: {e}"),
            };
            debug!("[tool] {name}: {cmd}");

            let mut command = Command::new("sh");
            command
                .arg("-c")
                .arg(&cmd)
                .env("LENS_HEADLESS", if self.headless { "1" } else { "0" })
                .env("LENS_TOOL_NAME", name)
                .env("LENS_TOOL_ARGS", &arguments)
                .kill_on_drop(true);
            if let Some(dir) = &self.workdir {
                command.current_dir(dir);
            }

            let output = match command.output().await {
                Ok(o) => o,
                Err(e) => return format!("Error executing tool '{name}': {e}"),
            };

            let stdout = String::from_utf8_lossy(&output.stdout);
            let stderr = String::from_utf8_lossy(&output.stderr);

            if !output.status.success() {
                warn!("Tool {name} exited with {}", output.status);
                format!(
                    "Error: tool '{name}' exited with {}.\nstdout:\n{stdout}\nstderr:\n{stderr}",
                    output.status
                )
            } else if stderr.trim().is_empty() {
                stdout.into_owned()
            } else {
                format!("{stdout}\n\n[stderr]\n{stderr}")
            }
        })
    }
}
