//! File system tools: read, write, and list within the workspace.

use std::path::{Path, PathBuf};

use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;

use super::truncate_byte_boundary;
use crate::{arg_str, arg_u64, DangerClass, ParamSpec, ParamType, Tool, ToolOutcome, ToolSpec};

fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

pub struct ReadFileTool {
    pub workspace_root: PathBuf,
}

#[async_trait]
impl Tool for ReadFileTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "read_file".to_string(),
            description: "Read the contents of a file within the workspace.".to_string(),
            params: vec![
                ParamSpec::required("path", "Relative path from the workspace root"),
                ParamSpec::optional("max_bytes", "Maximum bytes to read (default: 65536)")
                    .typed(ParamType::Integer),
            ],
            danger: DangerClass::Safe,
        }
    }

    async fn run(&self, args: &serde_json::Value) -> Result<ToolOutcome> {
        let rel_path = arg_str(args, "path")
            .ok_or_else(|| anyhow::anyhow!("missing required param: path"))?;
        let max_bytes = arg_u64(args, "max_bytes").unwrap_or(65536) as usize;

        let full = self.workspace_root.join(rel_path);
        let extension = extension_of(&full);

        let content = match tokio::fs::read_to_string(&full).await {
            Ok(content) => content,
            Err(err) => {
                return Ok(ToolOutcome::error(format!("cannot read '{rel_path}': {err}"))
                    .with_meta("path", rel_path)
                    .with_meta("extension", extension));
            }
        };

        let size = content.len();
        let output = if size > max_bytes {
            let end = truncate_byte_boundary(&content, max_bytes);
            format!("{}…[truncated at {} bytes]", &content[..end], max_bytes)
        } else {
            content
        };

        Ok(ToolOutcome::success(output)
            .with_meta("path", rel_path)
            .with_meta("extension", extension)
            .with_meta("file_size", size as u64))
    }
}

pub struct WriteFileTool {
    pub workspace_root: PathBuf,
}

#[async_trait]
impl Tool for WriteFileTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "write_file".to_string(),
            description: "Write content to a file within the workspace (creates or overwrites)."
                .to_string(),
            params: vec![
                ParamSpec::required("path", "Relative path from the workspace root"),
                ParamSpec::required("content", "File content to write"),
            ],
            danger: DangerClass::Mutating,
        }
    }

    async fn run(&self, args: &serde_json::Value) -> Result<ToolOutcome> {
        let rel_path = arg_str(args, "path")
            .ok_or_else(|| anyhow::anyhow!("missing required param: path"))?;
        let content = arg_str(args, "content")
            .ok_or_else(|| anyhow::anyhow!("missing required param: content"))?;

        let full = self.workspace_root.join(rel_path);
        let extension = extension_of(&full);

        if let Some(parent) = full.parent() {
            if let Err(err) = tokio::fs::create_dir_all(parent).await {
                return Ok(ToolOutcome::error(format!(
                    "cannot create parent directory for '{rel_path}': {err}"
                ))
                .with_meta("path", rel_path));
            }
        }

        match tokio::fs::write(&full, content).await {
            Ok(()) => Ok(ToolOutcome::success(format!(
                "wrote {} bytes to {rel_path}",
                content.len()
            ))
            .with_meta("path", rel_path)
            .with_meta("extension", extension)
            .with_meta("file_size", content.len() as u64)),
            Err(err) => Ok(ToolOutcome::error(format!("cannot write '{rel_path}': {err}"))
                .with_meta("path", rel_path)
                .with_meta("extension", extension)),
        }
    }
}

pub struct ListDirTool {
    pub workspace_root: PathBuf,
}

#[async_trait]
impl Tool for ListDirTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "list_dir".to_string(),
            description: "List directory entries within the workspace.".to_string(),
            params: vec![
                ParamSpec::optional("path", "Relative directory path (default: workspace root)"),
                ParamSpec::optional("sort", "Sort order").one_of(&["name", "size"]),
            ],
            danger: DangerClass::Safe,
        }
    }

    async fn run(&self, args: &serde_json::Value) -> Result<ToolOutcome> {
        let rel_path = arg_str(args, "path").unwrap_or(".");
        let sort = arg_str(args, "sort").unwrap_or("name");
        let full = self.workspace_root.join(rel_path);

        let mut read_dir = match tokio::fs::read_dir(&full).await {
            Ok(rd) => rd,
            Err(err) => {
                return Ok(ToolOutcome::error(format!("cannot list '{rel_path}': {err}"))
                    .with_meta("path", rel_path));
            }
        };

        let mut entries: Vec<(String, u64, bool)> = Vec::new();
        while let Ok(Some(entry)) = read_dir.next_entry().await {
            let name = entry.file_name().to_string_lossy().to_string();
            let meta = entry.metadata().await.ok();
            let size = meta.as_ref().map(|m| m.len()).unwrap_or(0);
            let is_dir = meta.map(|m| m.is_dir()).unwrap_or(false);
            entries.push((name, size, is_dir));
        }

        match sort {
            "size" => entries.sort_by(|a, b| b.1.cmp(&a.1)),
            _ => entries.sort_by(|a, b| a.0.cmp(&b.0)),
        }

        let listing = entries
            .iter()
            .map(|(name, size, is_dir)| {
                if *is_dir {
                    format!("{name}/")
                } else {
                    format!("{name} ({size} bytes)")
                }
            })
            .collect::<Vec<_>>()
            .join("\n");

        Ok(ToolOutcome::success(if listing.is_empty() {
            "(empty directory)".to_string()
        } else {
            listing
        })
        .with_meta("path", rel_path)
        .with_meta("entries", json!(entries.len())))
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
