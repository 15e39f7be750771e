//! Tool mediation: validation, safety checks, confirmation, timeouts, and
//! observation shaping.
//!
//! [`ToolExecutor::execute`] is the single entry point the reasoner uses to
//! run a tool call.  Every non-success outcome is logged to the error memory
//! before the observation is returned, so the pattern memory sees each
//! failure exactly once.

pub mod safety;

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

use reagent_config::ConfirmationMode;
use reagent_core::ErrorKind;
use reagent_memory::schema::{MetaValue, Metadata};
use reagent_memory::{ErrorMemory, MemoryStores};
use reagent_tools::{DangerClass, ToolOutcome, ToolRegistry, ToolStatus};

pub use safety::{resolve_within, PathVerdict, SafetyPolicy};

// ── Confirmation flow ────────────────────────────────────────────────────────

/// A request sent to the user for confirmation.
#[derive(Debug, Clone)]
pub struct ConfirmationRequest {
    pub tool_name: String,
    pub args: Value,
    pub risk_summary: String,
    /// Pre-flight warnings from the error memory, shown alongside the ask.
    pub warnings: Vec<String>,
}

/// The user's decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationDecision {
    Approve,
    Deny,
}

/// Channel-based confirmation gate: the executor sends a request, the
/// attached interface answers via the oneshot.
pub type ConfirmationSender =
    mpsc::Sender<(ConfirmationRequest, oneshot::Sender<ConfirmationDecision>)>;
pub type ConfirmationReceiver =
    mpsc::Receiver<(ConfirmationRequest, oneshot::Sender<ConfirmationDecision>)>;

pub fn confirmation_channel() -> (ConfirmationSender, ConfirmationReceiver) {
    mpsc::channel(16)
}

/// Decides whether a specific invocation needs user confirmation.
///
/// | Mode   | Asks for                                             |
/// |--------|------------------------------------------------------|
/// | `Yes`  | nothing                                              |
/// | `No`   | every call                                           |
/// | `Auto` | mutating / privileged calls, out-of-workspace paths, |
/// |        | and sudo when require_sudo_confirmation is set       |
#[derive(Debug, Clone, Copy)]
pub struct ConfirmationPolicy {
    pub mode: ConfirmationMode,
}

impl ConfirmationPolicy {
    pub fn new(mode: ConfirmationMode) -> Self {
        Self { mode }
    }

    pub fn must_ask(&self, danger: DangerClass, outside_workspace: bool, sudo_confirm: bool) -> bool {
        match self.mode {
            ConfirmationMode::Yes => false,
            ConfirmationMode::No => true,
            ConfirmationMode::Auto => {
                danger != DangerClass::Safe || outside_workspace || sudo_confirm
            }
        }
    }
}

// ── Executor ─────────────────────────────────────────────────────────────────

/// One mediated tool execution: the raw outcome plus the observation string
/// appended to the reasoning window.
#[derive(Debug, Clone)]
pub struct Execution {
    pub outcome: ToolOutcome,
    pub observation: String,
    pub warnings: Vec<String>,
    /// Set when the call never reached the tool (unknown, invalid, blocked).
    pub refusal: Option<ErrorKind>,
}

pub struct ToolExecutor {
    safety: SafetyPolicy,
    confirmation: ConfirmationPolicy,
    confirmation_timeout: Duration,
    tool_timeout: Duration,
    truncate_chars: usize,
    stores: Arc<MemoryStores>,
    error_memory: Arc<ErrorMemory>,
    confirm_tx: Option<ConfirmationSender>,
}

impl ToolExecutor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        safety: SafetyPolicy,
        confirmation: ConfirmationPolicy,
        confirmation_timeout: Duration,
        tool_timeout: Duration,
        truncate_chars: usize,
        stores: Arc<MemoryStores>,
        error_memory: Arc<ErrorMemory>,
    ) -> Self {
        Self {
            safety,
            confirmation,
            confirmation_timeout,
            tool_timeout,
            truncate_chars,
            stores,
            error_memory,
            confirm_tx: None,
        }
    }

    /// Attach the interactive confirmation channel.  Without one, every ASK
    /// decision resolves to deny.
    pub fn with_confirmation_channel(mut self, tx: ConfirmationSender) -> Self {
        self.confirm_tx = Some(tx);
        self
    }

    /// Execute one tool call through the full mediation pipeline:
    /// lookup → validate → safety → confirmation → run (with timeout) →
    /// error logging → observation shaping.
    pub async fn execute(&self, registry: &ToolRegistry, name: &str, args: &Value) -> Execution {
        let Some(tool) = registry.get(name) else {
            let outcome = ToolOutcome::error(format!("unknown tool: {name}"));
            return self.finish(name, "lookup", args, outcome, vec![], Some(ErrorKind::ToolValidation));
        };
        let spec = tool.spec();
        let operation = primary_operation(name);

        // 1. Schema validation.
        if let Err(err) = tool.validate(args) {
            let outcome = ToolOutcome::error(err.message.clone());
            return self.finish(name, operation, args, outcome, vec![], Some(err.kind));
        }

        // 2. Safety checks (paths, extensions, size caps, shell policy).
        let mut outside_workspace = false;
        let mut sudo_confirm = false;
        if let Some(path) = args.get("path").and_then(Value::as_str) {
            let will_read = spec.danger == DangerClass::Safe;
            match self.safety.check_path(path, will_read) {
                Ok(verdict) => outside_workspace = verdict.outside_workspace,
                Err(err) => {
                    let outcome = ToolOutcome::blocked(err.message.clone());
                    return self.finish(name, operation, args, outcome, vec![], Some(err.kind));
                }
            }
        }
        if let Some(command) = args.get("command").and_then(Value::as_str) {
            match self.safety.check_command(command) {
                Ok(is_sudo) => {
                    sudo_confirm = is_sudo && self.safety.require_sudo_confirmation();
                }
                Err(err) => {
                    let outcome = ToolOutcome::blocked(err.message.clone());
                    return self.finish(name, operation, args, outcome, vec![], Some(err.kind));
                }
            }
        }

        // 3. Pre-flight warnings from past failures.
        let preflight = self.error_memory.preflight(
            &self.stores.errors,
            name,
            operation,
            &args_to_metadata(args),
        );
        for warning in &preflight.warnings {
            warn!(tool = name, warning = %warning, "pre-flight warning");
        }

        // 4. Confirmation.
        if self
            .confirmation
            .must_ask(spec.danger, outside_workspace, sudo_confirm)
        {
            let approved = self
                .request_confirmation(name, args, preflight.warnings.clone())
                .await;
            if !approved {
                info!(tool = name, "tool execution denied by user");
                let outcome =
                    ToolOutcome::blocked(format!("execution of '{name}' denied by user"));
                return self.finish(
                    name,
                    operation,
                    args,
                    outcome,
                    preflight.warnings,
                    Some(ErrorKind::Safety),
                );
            }
        }

        // 5. Run under the hard timeout.
        info!(tool = name, "executing tool");
        let outcome = match tokio::time::timeout(self.tool_timeout, tool.run(args)).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(err)) => ToolOutcome::error(format!("{name} failed: {err}")),
            Err(_) => ToolOutcome::timeout(format!(
                "{name} timed out after {}s (tool timeout)",
                self.tool_timeout.as_secs()
            )),
        };

        self.finish(name, operation, args, outcome, preflight.warnings, None)
    }

    /// Log non-success outcomes to the error memory, then shape the
    /// observation string.
    fn finish(
        &self,
        name: &str,
        operation: &str,
        args: &Value,
        outcome: ToolOutcome,
        warnings: Vec<String>,
        refusal: Option<ErrorKind>,
    ) -> Execution {
        if outcome.status != ToolStatus::Success {
            let error_text = outcome
                .error
                .clone()
                .unwrap_or_else(|| outcome.output.clone());
            let mut meta = outcome_metadata(&outcome);
            for (key, value) in args_to_metadata(args) {
                meta.entry(key).or_insert(value);
            }
            self.error_memory
                .log(&self.stores.errors, name, operation, &error_text, meta);
        }

        let observation = shape_observation(&outcome, self.truncate_chars);
        Execution {
            outcome,
            observation,
            warnings,
            refusal,
        }
    }

    async fn request_confirmation(&self, name: &str, args: &Value, warnings: Vec<String>) -> bool {
        let Some(tx) = &self.confirm_tx else {
            warn!(tool = name, "confirmation required but no channel attached; denying");
            return false;
        };

        let request = ConfirmationRequest {
            tool_name: name.to_string(),
            args: args.clone(),
            risk_summary: risk_summary(name, args),
            warnings,
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        if tx.send((request, reply_tx)).await.is_err() {
            warn!(tool = name, "confirmation channel closed; denying");
            return false;
        }

        match tokio::time::timeout(self.confirmation_timeout, reply_rx).await {
            Ok(Ok(decision)) => decision == ConfirmationDecision::Approve,
            Ok(Err(_)) => {
                warn!(tool = name, "confirmation reply dropped; denying");
                false
            }
            Err(_) => {
                warn!(tool = name, "confirmation timed out; denying");
                false
            }
        }
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

/// Status-prefixed, truncated observation for the LLM.
pub fn shape_observation(outcome: &ToolOutcome, truncate_chars: usize) -> String {
    let text = outcome.output.trim();
    let chars: Vec<char> = text.chars().collect();
    let body = if chars.len() > truncate_chars {
        let kept: String = chars[..truncate_chars].iter().collect();
        format!("{kept}…[truncated]")
    } else {
        text.to_string()
    };
    format!("{}: {}", outcome.status.prefix(), body)
}

/// The primary verb a tool performs, used as the error memory's operation
/// label.
fn primary_operation(tool: &str) -> &'static str {
    match tool {
        "read_file" => "read",
        "write_file" => "write",
        "list_dir" => "list",
        "run_shell" => "execute",
        "web_search" => "search",
        _ => "execute",
    }
}

fn risk_summary(name: &str, args: &Value) -> String {
    match name {
        "run_shell" => format!(
            "Execute shell command: {}",
            args.get("command").and_then(Value::as_str).unwrap_or("(unknown)")
        ),
        "write_file" => format!(
            "Write to file: {}",
            args.get("path").and_then(Value::as_str).unwrap_or("(unknown)")
        ),
        "read_file" => format!(
            "Read file: {}",
            args.get("path").and_then(Value::as_str).unwrap_or("(unknown)")
        ),
        _ => format!("Execute tool: {name}"),
    }
}

/// Scalar argument values as error-memory metadata.
fn args_to_metadata(args: &Value) -> Metadata {
    let mut meta = Metadata::new();
    if let Some(object) = args.as_object() {
        for (key, value) in object {
            let converted = match value {
                Value::String(s) => Some(MetaValue::Str(s.clone())),
                Value::Number(n) => n.as_f64().map(MetaValue::Num),
                Value::Bool(b) => Some(MetaValue::Bool(*b)),
                _ => None,
            };
            if let Some(converted) = converted {
                meta.insert(key.clone(), converted);
            }
        }
        if let Some(path) = object.get("path").and_then(Value::as_str) {
            if let Some(ext) = std::path::Path::new(path)
                .extension()
                .map(|e| e.to_string_lossy().to_lowercase())
            {
                meta.insert("extension".to_string(), MetaValue::Str(ext));
            }
        }
    }
    meta
}

fn outcome_metadata(outcome: &ToolOutcome) -> Metadata {
    let mut meta = Metadata::new();
    for (key, value) in &outcome.metadata {
        let converted = match value {
            Value::String(s) => Some(MetaValue::Str(s.clone())),
            Value::Number(n) => n.as_f64().map(MetaValue::Num),
            Value::Bool(b) => Some(MetaValue::Bool(*b)),
            _ => None,
        };
        if let Some(converted) = converted {
            meta.insert(key.clone(), converted);
        }
    }
    meta
}

// ── Tests ────────────────────────────────────────────────────────────────────
