//! Shell execution tool.
//!
//! The tool itself only runs the command; the command whitelist, sudo
//! policy, and the hard outer timeout are enforced by the executor before
//! `run` is ever reached.

use std::path::PathBuf;

use anyhow::Result;
use async_trait::async_trait;

use super::truncate_byte_boundary;
use crate::{arg_str, arg_u64, DangerClass, ParamSpec, ParamType, Tool, ToolOutcome, ToolSpec};

/// Cap on combined stdout+stderr kept from one command.
const MAX_CAPTURED_OUTPUT: usize = 32_768;

pub struct RunShellTool {
    pub workspace_root: PathBuf,
}

#[async_trait]
impl Tool for RunShellTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "run_shell".to_string(),
            description: "Execute a shell command within the workspace directory. \
                Each invocation runs in a fresh shell — `cd` does not persist \
                between calls. Chain commands with `&&` if they must share state."
                .to_string(),
            params: vec![
                ParamSpec::required("command", "Shell command to execute"),
                ParamSpec::optional("timeout_secs", "Max execution time in seconds (default: 30)")
                    .typed(ParamType::Integer),
            ],
            danger: DangerClass::Privileged,
        }
    }

    async fn run(&self, args: &serde_json::Value) -> Result<ToolOutcome> {
        let command = arg_str(args, "command")
            .ok_or_else(|| anyhow::anyhow!("missing required param: command"))?;
        let timeout_secs = arg_u64(args, "timeout_secs").unwrap_or(30);

        let run = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(&self.workspace_root)
            .output();

        let output = match tokio::time::timeout(std::time::Duration::from_secs(timeout_secs), run)
            .await
        {
            Ok(Ok(output)) => output,
            Ok(Err(err)) => {
                return Ok(ToolOutcome::error(format!("failed to spawn shell: {err}"))
                    .with_meta("command", command));
            }
            Err(_) => {
                return Ok(ToolOutcome::timeout(format!(
                    "command timed out after {timeout_secs}s"
                ))
                .with_meta("command", command)
                .with_meta("timeout_secs", timeout_secs));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let combined = if stderr.is_empty() {
            stdout.to_string()
        } else {
            format!("{stdout}\n[stderr] {stderr}")
        };

        let result = if combined.len() > MAX_CAPTURED_OUTPUT {
            let end = truncate_byte_boundary(&combined, MAX_CAPTURED_OUTPUT);
            format!("{}…[truncated at {MAX_CAPTURED_OUTPUT} bytes]", &combined[..end])
        } else {
            combined
        };

        let exit_code = output.status.code().unwrap_or(-1);
        let outcome = if output.status.success() {
            ToolOutcome::success(result)
        } else {
            ToolOutcome::error(result)
        };
        Ok(outcome
            .with_meta("command", command)
            .with_meta("exit_code", exit_code))
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tool() -> RunShellTool {
        RunShellTool {
            workspace_root: std::env::temp_dir(),
        }
    }

    #[tokio::test]
    async fn echo_succeeds() -> Result<()> {
        let outcome = tool().run(&json!({"command": "echo hi"})).await?;
        assert!(outcome.is_success());
        assert_eq!(outcome.output.trim(), "hi");
        assert_eq!(outcome.metadata["exit_code"], 0);
        Ok(())
    }

    #[tokio::test]
    async fn nonzero_exit_is_error_outcome() -> Result<()> {
        let outcome = tool().run(&json!({"command": "false"})).await?;
        assert_eq!(outcome.status, crate::ToolStatus::Error);
        assert_eq!(outcome.metadata["exit_code"], 1);
        Ok(())
    }

    #[tokio::test]
    async fn stderr_is_captured() -> Result<()> {
        let outcome = tool().run(&json!({"command": "echo oops 1>&2"})).await?;
        assert!(outcome.output.contains("[stderr] oops"));
        Ok(())
    }

    #[tokio::test]
    async fn timeout_produces_timeout_outcome() -> Result<()> {
        let outcome = tool()
            .run(&json!({"command": "sleep 5", "timeout_secs": 1}))
            .await?;
        assert_eq!(outcome.status, crate::ToolStatus::Timeout);
        assert!(outcome.output.contains("timed out after 1s"));
        Ok(())
    }
}
