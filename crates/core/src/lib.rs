//! Shared error taxonomy for the agent runtime.
//!
//! Every subsystem (LLM client, tool executor, reasoner, config loader)
//! reports failures as an [`AgentError`] carrying an [`ErrorKind`] plus a
//! scalar details map.  The reasoner state machine transitions on the kind,
//! so error values replace exceptions-as-control-flow: budget exhaustion,
//! malformed tool invocations, and cancellation all arrive as ordinary
//! `Result` values.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ── Error kinds ──────────────────────────────────────────────────────────────

/// Failure classes the runtime distinguishes.
///
/// | Kind            | Retried | Typical source                            |
/// |-----------------|---------|-------------------------------------------|
/// | `Configuration` | no      | invalid settings, fatal at startup        |
/// | `LlmTransient`  | yes     | network, timeout, 429, 5xx                |
/// | `LlmPermanent`  | no      | auth, quota, schema-invalid payload       |
/// | `ToolUseFailed` | no      | provider rejected a malformed tool call   |
/// | `ToolValidation`| no      | args violate the tool schema or sandbox   |
/// | `ToolExecution` | no      | runtime failure inside a tool             |
/// | `ToolTimeout`   | no      | tool exceeded its hard timeout            |
/// | `Safety`        | no      | sandbox / blocklist / privilege denial    |
/// | `Budget`        | no      | per-task token budget exceeded            |
/// | `Cancelled`     | no      | deadline elapsed or user abort            |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    Configuration,
    LlmTransient,
    LlmPermanent,
    ToolUseFailed,
    ToolValidation,
    ToolExecution,
    ToolTimeout,
    Safety,
    Budget,
    Cancelled,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::LlmTransient => "llm_transient",
            ErrorKind::LlmPermanent => "llm_permanent",
            ErrorKind::ToolUseFailed => "tool_use_failed",
            ErrorKind::ToolValidation => "tool_validation",
            ErrorKind::ToolExecution => "tool_execution",
            ErrorKind::ToolTimeout => "tool_timeout",
            ErrorKind::Safety => "safety",
            ErrorKind::Budget => "budget",
            ErrorKind::Cancelled => "cancelled",
        }
    }
}

// ── AgentError ───────────────────────────────────────────────────────────────

/// A classified runtime failure with optional structured context.
///
/// `details` holds scalar key/value pairs ("path", "extension",
/// "failed_generation", …) consumed by the error memory and the recovery
/// path.  Keys are conventional, not enumerated.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("{}: {message}", kind.as_str())]
pub struct AgentError {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, String>,
}

impl AgentError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: BTreeMap::new(),
        }
    }

    /// Attach one detail key/value pair (builder style).
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, message)
    }

    pub fn llm_transient(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::LlmTransient, message)
    }

    pub fn llm_permanent(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::LlmPermanent, message)
    }

    /// Provider rejected the assistant turn as a malformed tool invocation.
    /// Any partial generation the provider returned is preserved under the
    /// `failed_generation` detail key for the recovery turn.
    pub fn tool_use_failed(message: impl Into<String>, failed_generation: Option<String>) -> Self {
        let mut err = Self::new(ErrorKind::ToolUseFailed, message);
        if let Some(text) = failed_generation {
            err.details.insert("failed_generation".to_string(), text);
        }
        err
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ToolValidation, message)
    }

    pub fn execution(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ToolExecution, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ToolTimeout, message)
    }

    pub fn safety(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Safety, message)
    }

    pub fn budget(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Budget, message)
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Cancelled, message)
    }

    pub fn detail(&self, key: &str) -> Option<&str> {
        self.details.get(key).map(String::as_str)
    }
}

// ── Free predicates ──────────────────────────────────────────────────────────

/// Whether the failure is worth retrying with backoff.  Only transient LLM
/// failures qualify; everything else either surfaces to the model as an
/// observation or forces finalization.
pub fn is_retryable(err: &AgentError) -> bool {
    err.kind == ErrorKind::LlmTransient
}

/// Whether the final user-facing text should name this failure explicitly
/// rather than fold it into an observation the model can correct.
pub fn should_alert_user(err: &AgentError) -> bool {
    matches!(
        err.kind,
        ErrorKind::Configuration | ErrorKind::LlmPermanent | ErrorKind::Budget | ErrorKind::Cancelled
    )
}

// ── Tests ────────────────────────────────────────────────────────────────────
