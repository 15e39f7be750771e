//! Sandbox and command safety checks applied before a tool runs.

use std::path::{Component, Path, PathBuf};

use reagent_config::SafetyConfig;
use reagent_core::AgentError;

/// Resolve `target` against `root` without touching the filesystem, so the
/// check also works for paths that do not exist yet.  `..` components are
/// folded lexically; anything that lands outside `root` is rejected.
pub fn resolve_within(root: &Path, target: &str) -> Result<PathBuf, AgentError> {
    let candidate = if Path::new(target).is_absolute() {
        PathBuf::from(target)
    } else {
        root.join(target)
    };

    let mut normalized = PathBuf::new();
    for component in candidate.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    return Err(path_escape_error(target));
                }
            }
            other => normalized.push(other),
        }
    }

    if !normalized.starts_with(root) {
        return Err(path_escape_error(target));
    }
    Ok(normalized)
}

fn path_escape_error(target: &str) -> AgentError {
    AgentError::safety(format!("path '{target}' escapes the working directory"))
        .with_detail("path", target)
}

/// Policy derived from [`SafetyConfig`] plus the resolved working directory.
#[derive(Debug, Clone)]
pub struct SafetyPolicy {
    config: SafetyConfig,
    working_directory: PathBuf,
}

/// Result of the path check: the resolved path and whether it lies outside
/// the workspace (possible only when sandbox mode is off).
#[derive(Debug, Clone)]
pub struct PathVerdict {
    pub resolved: PathBuf,
    pub outside_workspace: bool,
}

impl SafetyPolicy {
    pub fn new(config: SafetyConfig, working_directory: PathBuf) -> Self {
        Self {
            config,
            working_directory,
        }
    }

    pub fn working_directory(&self) -> &Path {
        &self.working_directory
    }

    /// Validate a path argument.  With sandbox mode on, the path must
    /// resolve inside the working directory; with it off, outside paths are
    /// permitted but flagged so the confirmation policy can treat them as
    /// mutating-equivalent.  Blocked path prefixes and disallowed extensions
    /// are rejected either way.
    pub fn check_path(&self, target: &str, will_read: bool) -> Result<PathVerdict, AgentError> {
        let (resolved, outside) = if self.config.sandbox_mode {
            (resolve_within(&self.working_directory, target)?, false)
        } else {
            let candidate = if Path::new(target).is_absolute() {
                PathBuf::from(target)
            } else {
                self.working_directory.join(target)
            };
            let outside = !candidate.starts_with(&self.working_directory);
            (candidate, outside)
        };

        let resolved_str = resolved.to_string_lossy();
        for blocked in &self.config.blocked_paths {
            if resolved_str.starts_with(blocked.as_str()) {
                return Err(AgentError::safety(format!(
                    "path '{target}' is under the blocked prefix '{blocked}'"
                ))
                .with_detail("path", target));
            }
        }

        if let Some(ext) = resolved.extension().map(|e| e.to_string_lossy().to_lowercase()) {
            if !self.config.allowed_extensions.is_empty()
                && !self.config.allowed_extensions.contains(&ext)
            {
                return Err(AgentError::safety(format!(
                    "extension '{ext}' is not allowed"
                ))
                .with_detail("path", target)
                .with_detail("extension", ext.clone()));
            }
        }

        if will_read {
            if let Ok(meta) = std::fs::metadata(&resolved) {
                let max_bytes = self.config.max_file_size_mb * 1024 * 1024;
                if meta.is_file() && meta.len() > max_bytes {
                    return Err(AgentError::safety(format!(
                        "file too large: {} bytes exceeds the {} byte limit",
                        meta.len(),
                        max_bytes
                    ))
                    .with_detail("path", target)
                    .with_detail("file_size", meta.len().to_string())
                    .with_detail("max_size", max_bytes.to_string()));
                }
            }
        }

        Ok(PathVerdict {
            resolved,
            outside_workspace: outside,
        })
    }

    /// Validate a shell command against the dangerous blocklist, the sudo
    /// policy, and the command whitelist.  Returns whether the command runs
    /// under sudo (the caller may require an extra confirmation for it).
    pub fn check_command(&self, command: &str) -> Result<bool, AgentError> {
        let trimmed = command.trim();
        let lowered = trimmed.to_lowercase();

        // The blocklist wins over everything, superuser mode included.
        for dangerous in &self.config.dangerous_commands {
            if lowered.contains(&dangerous.to_lowercase()) {
                return Err(AgentError::safety(format!(
                    "command matches the dangerous blocklist entry '{dangerous}'"
                ))
                .with_detail("command", trimmed));
            }
        }

        let mut words = trimmed.split_whitespace();
        let first = words.next().unwrap_or_default();
        let is_sudo = first == "sudo";

        let program = if is_sudo {
            if !self.config.superuser_mode {
                return Err(AgentError::safety(
                    "sudo is disabled (superuser_mode = false)",
                )
                .with_detail("command", trimmed));
            }
            let target = words.next().unwrap_or_default();
            if !self.config.sudo_whitelist.is_empty()
                && !self.config.sudo_whitelist.contains(target)
            {
                return Err(AgentError::safety(format!(
                    "'{target}' is not in the sudo whitelist"
                ))
                .with_detail("command", trimmed));
            }
            return Ok(true);
        } else {
            first
        };

        if !self.config.command_whitelist.is_empty()
            && !self.config.command_whitelist.contains(program)
        {
            return Err(AgentError::safety(format!(
                "'{program}' is not in the command whitelist"
            ))
            .with_detail("command", trimmed));
        }

        Ok(is_sudo)
    }

    pub fn require_sudo_confirmation(&self) -> bool {
        self.config.require_sudo_confirmation
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use reagent_core::ErrorKind;

    fn policy(mutator: impl FnOnce(&mut SafetyConfig)) -> (SafetyPolicy, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = SafetyConfig::default();
        mutator(&mut config);
        (SafetyPolicy::new(config, dir.path().to_path_buf()), dir)
    }

    #[test]
    fn resolve_rejects_dotdot_escape() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve_within(dir.path(), "../outside.txt").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Safety);
    }

    #[test]
    fn resolve_accepts_nested_relative() {
        let dir = tempfile::tempdir().unwrap();
        let resolved = resolve_within(dir.path(), "a/b/../c.txt").unwrap();
        assert_eq!(resolved, dir.path().join("a/c.txt"));
    }

    #[test]
    fn resolve_rejects_absolute_outside() {
        let dir = tempfile::tempdir().unwrap();
        assert!(resolve_within(dir.path(), "/etc/passwd").is_err());
    }

    #[test]
    fn sandbox_blocks_outside_paths() {
        let (policy, _dir) = policy(|_| {});
        let err = policy.check_path("../../etc/hosts", true).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Safety);
    }

    #[test]
    fn no_sandbox_flags_outside_paths() {
        let (policy, _dir) = policy(|c| {
            c.sandbox_mode = false;
            c.blocked_paths.clear();
        });
        let verdict = policy.check_path("/tmp/elsewhere.txt", false).unwrap();
        assert!(verdict.outside_workspace);
    }

    #[test]
    fn blocked_prefix_rejected_even_without_sandbox() {
        let (policy, _dir) = policy(|c| c.sandbox_mode = false);
        let err = policy.check_path("/etc/passwd", true).unwrap_err();
        assert!(err.message.contains("blocked prefix"));
    }

    #[test]
    fn disallowed_extension_rejected() {
        let (policy, _dir) = policy(|_| {});
        let err = policy.check_path("binary.exe", true).unwrap_err();
        assert_eq!(err.detail("extension"), Some("exe"));
    }

    #[test]
    fn extensionless_paths_pass() {
        let (policy, _dir) = policy(|_| {});
        assert!(policy.check_path("Makefile", true).is_ok());
    }

    #[test]
    fn oversized_file_rejected_for_reads() {
        let (policy, dir) = policy(|c| c.max_file_size_mb = 0);
        std::fs::write(dir.path().join("big.txt"), "some bytes").unwrap();
        let err = policy.check_path("big.txt", true).unwrap_err();
        assert!(err.message.contains("file too large"));
        assert!(err.detail("file_size").is_some());
    }

    #[test]
    fn whitelisted_command_passes() {
        let (policy, _dir) = policy(|_| {});
        assert!(!policy.check_command("ls -la").unwrap());
    }

    #[test]
    fn unlisted_command_rejected() {
        let (policy, _dir) = policy(|_| {});
        let err = policy.check_command("nmap -sV target").unwrap_err();
        assert!(err.message.contains("not in the command whitelist"));
    }

    #[test]
    fn dangerous_command_always_blocked() {
        let (policy, _dir) = policy(|c| c.superuser_mode = true);
        let err = policy.check_command("sudo rm -rf / --no-preserve-root").unwrap_err();
        assert!(err.message.contains("dangerous blocklist"));
    }

    #[test]
    fn sudo_requires_superuser_mode() {
        let (policy, _dir) = policy(|_| {});
        let err = policy.check_command("sudo apt update").unwrap_err();
        assert!(err.message.contains("superuser_mode"));
    }

    #[test]
    fn sudo_whitelist_enforced_in_superuser_mode() {
        let (policy, _dir) = policy(|c| c.superuser_mode = true);
        assert!(policy.check_command("sudo apt update").unwrap());
        let err = policy.check_command("sudo visudo").unwrap_err();
        assert!(err.message.contains("sudo whitelist"));
    }
}
