//! Workspace inspection: the file tree and the run summary.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

/// Summary file the agent may write, relative to the workspace.
pub const SUMMARY_FILE: &str = "data/summary.md";

/// Render `dir` as an indented tree: each directory as `name/`, each file
/// as `name (N bytes)`. Files come before subdirectories, both sorted.
pub fn workspace_tree(dir: &Path) -> Result<String, String> {
    if !dir.is_dir() {
        return Err(format!("Directory does not exist: {}", dir.display()));
    }
    let mut out = String::new();
    walk(dir, 0, &mut out).map_err(|e| format!("failed to list {}: {e}", dir.display()))?;
    Ok(out)
}

fn walk(dir: &Path, depth: usize, out: &mut String) -> std::io::Result<()> {
    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| dir.display().to_string());
    let _ = writeln!(out, "{}{name}/", "  ".repeat(depth));

    let mut files = Vec::new();
    let mut dirs: Vec<PathBuf> = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let meta = entry.metadata()?;
        if meta.is_dir() {
            dirs.push(entry.path());
        } else {
            files.push((entry.file_name().to_string_lossy().into_owned(), meta.len()));
        }
    }
    files.sort();
    dirs.sort();

    let indent = "  ".repeat(depth + 1);
    for (file, size) in files {
        let _ = writeln!(out, "{indent}{file} ({size} bytes)");
    }
    for sub in dirs {
        walk(&sub, depth + 1, out)?;
    }
    Ok(())
}

/// Contents of [`SUMMARY_FILE`], if the agent wrote one.
pub fn read_summary(workspace: &Path) -> Option<String> {
    std::fs::read_to_string(workspace.join(SUMMARY_FILE)).ok()
}
