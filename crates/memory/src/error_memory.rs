//! Error pattern memory.
//!
//! Every non-success tool outcome is logged here before it surfaces to the
//! model as an observation.  The memory feeds three consumers: pre-flight
//! warnings before a tool runs again, remediation suggestions matched from a
//! keyword catalog, and aggregate pattern reports for the operator.
//!
//! Events live in the `errors` collection and are mirrored to an append-only
//! audit file (`error_logs.json`, one JSON object per line) that survives
//! collection pruning.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::schema::{ErrorEvent, MetaValue, Metadata};
use crate::store::Collection;

// ── Remediation catalog ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionKind {
    Create,
    Validate,
    Config,
    Permission,
    Install,
    Manual,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Remediation {
    pub suggestion: String,
    pub severity: Severity,
    pub action_kind: ActionKind,
    pub auto_fixable: bool,
}

struct CatalogPattern {
    /// All keywords must appear (case-insensitive) in the error string.
    keywords: &'static [&'static str],
    tool: Option<&'static str>,
    operation: Option<&'static str>,
    /// Template with `{placeholder}` slots filled from event metadata.
    suggestion: &'static str,
    severity: Severity,
    action_kind: ActionKind,
    auto_fixable: bool,
}

/// Ordered catalog — first match wins, so specific patterns come before
/// broad ones.
static CATALOG: LazyLock<Vec<CatalogPattern>> = LazyLock::new(|| {
    vec![
        CatalogPattern {
            keywords: &["no such file"],
            tool: None,
            operation: None,
            suggestion: "The path {path} does not exist. Create it first or list the parent directory to find the right name.",
            severity: Severity::High,
            action_kind: ActionKind::Create,
            auto_fixable: true,
        },
        CatalogPattern {
            keywords: &["permission denied"],
            tool: None,
            operation: None,
            suggestion: "Access to {path} was denied. Check file ownership and mode, or pick a path inside the working directory.",
            severity: Severity::High,
            action_kind: ActionKind::Permission,
            auto_fixable: false,
        },
        CatalogPattern {
            keywords: &["escapes", "working directory"],
            tool: None,
            operation: None,
            suggestion: "The path {path} resolves outside the working directory. Use a relative path inside it, or disable sandbox_mode deliberately.",
            severity: Severity::High,
            action_kind: ActionKind::Config,
            auto_fixable: false,
        },
        CatalogPattern {
            keywords: &["extension", "not allowed"],
            tool: None,
            operation: None,
            suggestion: "Files with extension '{extension}' are blocked. Add '{extension}' to allowed_extensions if this type should be readable.",
            severity: Severity::Medium,
            action_kind: ActionKind::Config,
            auto_fixable: false,
        },
        CatalogPattern {
            keywords: &["file too large"],
            tool: None,
            operation: None,
            suggestion: "The file is {file_size} bytes but the limit is {max_size}. Read it in chunks or raise max_file_size_mb.",
            severity: Severity::Medium,
            action_kind: ActionKind::Validate,
            auto_fixable: false,
        },
        CatalogPattern {
            keywords: &["not in the command whitelist"],
            tool: Some("run_shell"),
            operation: None,
            suggestion: "The command is not whitelisted. Add it to command_whitelist or use one of the allowed commands.",
            severity: Severity::Medium,
            action_kind: ActionKind::Config,
            auto_fixable: false,
        },
        CatalogPattern {
            keywords: &["command not found"],
            tool: Some("run_shell"),
            operation: None,
            suggestion: "The binary is not installed or not on PATH. Install it before retrying.",
            severity: Severity::High,
            action_kind: ActionKind::Install,
            auto_fixable: true,
        },
        CatalogPattern {
            keywords: &["no module named"],
            tool: Some("run_shell"),
            operation: None,
            suggestion: "A Python dependency is missing. Install it with pip before rerunning the script.",
            severity: Severity::High,
            action_kind: ActionKind::Install,
            auto_fixable: true,
        },
        CatalogPattern {
            keywords: &["timed out"],
            tool: None,
            operation: None,
            suggestion: "The operation exceeded its timeout. Narrow the work (smaller file, tighter query) or raise tool_timeout_seconds.",
            severity: Severity::Medium,
            action_kind: ActionKind::Validate,
            auto_fixable: false,
        },
        CatalogPattern {
            keywords: &["denied by user"],
            tool: None,
            operation: None,
            suggestion: "The user declined this action. Explain why it is needed or propose a safer alternative.",
            severity: Severity::Low,
            action_kind: ActionKind::Manual,
            auto_fixable: false,
        },
        CatalogPattern {
            keywords: &["missing required"],
            tool: None,
            operation: None,
            suggestion: "A required argument was missing from the call. Re-read the tool schema and supply every required field.",
            severity: Severity::Medium,
            action_kind: ActionKind::Validate,
            auto_fixable: true,
        },
    ]
});

// ── Reports ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct PreflightReport {
    pub warnings: Vec<String>,
    pub recommended_validations: Vec<String>,
    pub confidence: f32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatternReport {
    pub total: usize,
    pub by_tool: BTreeMap<String, usize>,
    pub by_operation: BTreeMap<String, usize>,
    pub top_error_types: Vec<(String, usize)>,
    pub by_extension: BTreeMap<String, usize>,
    pub problematic_paths: Vec<(String, usize)>,
    pub recommendations: Vec<String>,
}

// ── ErrorMemory ──────────────────────────────────────────────────────────────

pub struct ErrorMemory {
    audit_path: Option<PathBuf>,
}

impl ErrorMemory {
    /// Audit mirror under `log_dir/error_logs.json`.
    pub fn open(log_dir: impl AsRef<Path>) -> Self {
        Self {
            audit_path: Some(log_dir.as_ref().join("error_logs.json")),
        }
    }

    pub fn ephemeral() -> Self {
        Self { audit_path: None }
    }

    /// Log one failure: upsert into the errors collection and append to the
    /// audit file.  Returns the event id.
    pub fn log(
        &self,
        errors: &Collection,
        tool: &str,
        operation: &str,
        error: &str,
        meta: Metadata,
    ) -> String {
        let mut event = ErrorEvent::new(tool, operation, error, meta);
        event.remediation = self.remediate(&event).map(|r| r.suggestion);
        let id = event.id.to_string();

        errors.upsert(event.to_record());
        self.append_audit(&event);
        id
    }

    fn append_audit(&self, event: &ErrorEvent) {
        let Some(path) = &self.audit_path else { return };
        let result = (|| -> anyhow::Result<()> {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut file = fs::OpenOptions::new().create(true).append(true).open(path)?;
            writeln!(file, "{}", serde_json::to_string(event)?)?;
            Ok(())
        })();
        if let Err(err) = result {
            warn!(path = %path.display(), error = %err, "failed to append error audit record");
        }
    }

    /// Warnings for an upcoming invocation, based on similar past failures.
    /// Exact matches on `path` or `extension` metadata count more than loose
    /// document similarity.
    pub fn preflight(
        &self,
        errors: &Collection,
        tool: &str,
        operation: &str,
        args_meta: &Metadata,
    ) -> PreflightReport {
        let mut report = PreflightReport::default();

        let same_tool: Vec<_> = errors
            .all()
            .into_iter()
            .filter(|record| {
                record.metadata.get("tool").and_then(MetaValue::as_str) == Some(tool)
            })
            .collect();
        if same_tool.is_empty() {
            return report;
        }

        let mut exact_hits = 0usize;
        for key in ["path", "extension"] {
            let Some(wanted) = args_meta.get(key).and_then(MetaValue::as_str) else {
                continue;
            };
            let count = same_tool
                .iter()
                .filter(|record| {
                    record.metadata.get(key).and_then(MetaValue::as_str) == Some(wanted)
                })
                .count();
            if count > 0 {
                exact_hits += count;
                report.warnings.push(format!(
                    "{count} previous {tool} failure(s) on {key} '{wanted}'"
                ));
            }
        }

        let op_count = same_tool
            .iter()
            .filter(|record| {
                record.metadata.get("operation").and_then(MetaValue::as_str) == Some(operation)
            })
            .count();
        if op_count > 0 && report.warnings.is_empty() {
            report.warnings.push(format!(
                "{op_count} previous failure(s) for {tool} {operation}"
            ));
        }

        if !report.warnings.is_empty() {
            if args_meta.contains_key("path") {
                report
                    .recommended_validations
                    .push("verify the path exists before the call".to_string());
            }
            report
                .recommended_validations
                .push("double-check arguments against the tool schema".to_string());
            report.confidence =
                (0.3 + 0.2 * exact_hits.max(op_count) as f32).min(0.9);
        }
        report
    }

    /// Match an event against the remediation catalog.  All keywords of a
    /// pattern must appear in the error string and its tool/operation
    /// filters must hold; the first matching pattern wins.  A generic
    /// fallback guarantees every error yields some suggestion.
    pub fn remediate(&self, event: &ErrorEvent) -> Option<Remediation> {
        let haystack = event.error.to_lowercase();

        for pattern in CATALOG.iter() {
            if let Some(tool) = pattern.tool {
                if tool != event.tool {
                    continue;
                }
            }
            if let Some(operation) = pattern.operation {
                if operation != event.operation {
                    continue;
                }
            }
            if pattern
                .keywords
                .iter()
                .all(|kw| haystack.contains(&kw.to_lowercase()))
            {
                return Some(Remediation {
                    suggestion: substitute(pattern.suggestion, event),
                    severity: pattern.severity,
                    action_kind: pattern.action_kind,
                    auto_fixable: pattern.auto_fixable,
                });
            }
        }

        Some(Remediation {
            suggestion: format!(
                "Review the arguments passed to {} ({}) against its schema and retry with corrected input.",
                event.tool, event.operation
            ),
            severity: Severity::Low,
            action_kind: ActionKind::Manual,
            auto_fixable: false,
        })
    }

    /// Aggregate failure patterns over the last `window_days`, optionally
    /// restricted to one tool.
    pub fn analyze(
        &self,
        errors: &Collection,
        window_days: i64,
        tool: Option<&str>,
    ) -> PatternReport {
        let cutoff = Utc::now() - Duration::days(window_days);
        let mut report = PatternReport::default();
        let mut error_types: BTreeMap<String, usize> = BTreeMap::new();
        let mut paths: BTreeMap<String, usize> = BTreeMap::new();

        for record in errors.all() {
            if record.ts < cutoff {
                continue;
            }
            let record_tool = record
                .metadata
                .get("tool")
                .and_then(MetaValue::as_str)
                .unwrap_or("unknown")
                .to_string();
            if let Some(wanted) = tool {
                if record_tool != wanted {
                    continue;
                }
            }
            report.total += 1;
            *report.by_tool.entry(record_tool).or_default() += 1;

            let operation = record
                .metadata
                .get("operation")
                .and_then(MetaValue::as_str)
                .unwrap_or("unknown")
                .to_string();
            *report.by_operation.entry(operation).or_default() += 1;

            *error_types
                .entry(classify_error(&record.document).to_string())
                .or_default() += 1;

            if let Some(ext) = record.metadata.get("extension").and_then(MetaValue::as_str) {
                *report.by_extension.entry(ext.to_string()).or_default() += 1;
            }
            if let Some(path) = record.metadata.get("path").and_then(MetaValue::as_str) {
                *paths.entry(path.to_string()).or_default() += 1;
            }
        }

        report.top_error_types = sorted_desc(error_types);
        report.problematic_paths = sorted_desc(paths)
            .into_iter()
            .filter(|(_, count)| *count >= 2)
            .collect();

        if let Some((top_tool, count)) = report
            .by_tool
            .iter()
            .max_by_key(|(_, count)| **count)
            .map(|(t, c)| (t.clone(), *c))
        {
            if count >= 3 {
                report.recommendations.push(format!(
                    "{count} of {} recent failures come from {top_tool}; add pre-flight validation for it",
                    report.total
                ));
            }
        }
        if let Some((path, count)) = report.problematic_paths.first() {
            report.recommendations.push(format!(
                "path '{path}' failed {count} times; verify it before further calls"
            ));
        }

        report
    }
}

fn sorted_desc(map: BTreeMap<String, usize>) -> Vec<(String, usize)> {
    let mut items: Vec<_> = map.into_iter().collect();
    items.sort_by(|(ak, av), (bk, bv)| bv.cmp(av).then(ak.cmp(bk)));
    items
}

/// Coarse keyword bucket for an error string.
fn classify_error(error: &str) -> &'static str {
    let lower = error.to_lowercase();
    if lower.contains("no such file") || lower.contains("not found") {
        "not_found"
    } else if lower.contains("permission") || lower.contains("denied") {
        "permission"
    } else if lower.contains("timed out") || lower.contains("timeout") {
        "timeout"
    } else if lower.contains("missing required") || lower.contains("invalid") {
        "validation"
    } else if lower.contains("connection") || lower.contains("network") {
        "network"
    } else {
        "other"
    }
}

/// Fill `{placeholder}` slots from event metadata plus the tool/operation
/// fields.  Unknown placeholders are left as-is.
fn substitute(template: &str, event: &ErrorEvent) -> String {
    let mut out = template
        .replace("{tool}", &event.tool)
        .replace("{operation}", &event.operation);
    for (key, value) in &event.meta {
        out = out.replace(&format!("{{{key}}}"), &value.render());
    }
    out
}

// ── Tests ────────────────────────────────────────────────────────────────────
