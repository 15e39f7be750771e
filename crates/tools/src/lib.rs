//! Tool trait, outcome types, and the registry.
//!
//! Tools are plain values registered explicitly at startup — no decorators,
//! no ambient state.  Each tool exposes a schema ([`ToolSpec`]), validates
//! its arguments against it, and returns a tagged [`ToolOutcome`].  Safety
//! policy and confirmation live one layer up in the executor; tools only
//! know how to do their job inside the workspace they were given.

use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use reagent_core::AgentError;

pub mod builtins;
pub mod schema;

pub use builtins::{ListDirTool, ReadFileTool, RunShellTool, WebSearchTool, WriteFileTool};
pub use schema::{
    specs_to_function_definitions, DangerClass, ParamSpec, ParamType, ToolSpec,
};

// ── Outcome ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ToolStatus {
    Success,
    Error,
    Blocked,
    Timeout,
}

impl ToolStatus {
    /// Prefix used when shaping the observation string for the LLM.
    pub fn prefix(&self) -> &'static str {
        match self {
            ToolStatus::Success => "Success",
            ToolStatus::Error => "Error",
            ToolStatus::Blocked => "Blocked",
            ToolStatus::Timeout => "Timeout",
        }
    }
}

/// Result of one tool invocation.  `output` is the only field the LLM sees
/// (possibly truncated); `metadata` feeds the error memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutcome {
    pub status: ToolStatus,
    #[serde(default)]
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Scalar context: path, extension, file_size, …
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl ToolOutcome {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            status: ToolStatus::Success,
            output: output.into(),
            error: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            status: ToolStatus::Error,
            output: message.clone(),
            error: Some(message),
            metadata: BTreeMap::new(),
        }
    }

    pub fn blocked(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            status: ToolStatus::Blocked,
            output: message.clone(),
            error: Some(message),
            metadata: BTreeMap::new(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            status: ToolStatus::Timeout,
            output: message.clone(),
            error: Some(message),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == ToolStatus::Success
    }
}

// ── Tool trait ───────────────────────────────────────────────────────────────

#[async_trait]
pub trait Tool: Send + Sync {
    fn spec(&self) -> ToolSpec;

    /// Check `args` against the schema.  The default implementation verifies
    /// the argument object shape, required params, declared types, and
    /// enumerated values.
    fn validate(&self, args: &serde_json::Value) -> Result<(), AgentError> {
        validate_args(&self.spec(), args)
    }

    async fn run(&self, args: &serde_json::Value) -> Result<ToolOutcome>;
}

/// Schema validation shared by every tool.
pub fn validate_args(spec: &ToolSpec, args: &serde_json::Value) -> Result<(), AgentError> {
    let Some(object) = args.as_object() else {
        return Err(AgentError::validation(format!(
            "{}: arguments must be a JSON object",
            spec.name
        )));
    };

    for param in &spec.params {
        let Some(value) = object.get(&param.name) else {
            if param.required {
                return Err(AgentError::validation(format!(
                    "{}: missing required param: {}",
                    spec.name, param.name
                ))
                .with_detail("param", param.name.clone()));
            }
            continue;
        };
        if !param.param_type.matches(value) {
            return Err(AgentError::validation(format!(
                "{}: param '{}' must be of type {}",
                spec.name,
                param.name,
                param.param_type.as_str()
            ))
            .with_detail("param", param.name.clone()));
        }
        if !param.allowed_values.is_empty() {
            let as_str = value.as_str().unwrap_or_default();
            if !param.allowed_values.iter().any(|v| v == as_str) {
                return Err(AgentError::validation(format!(
                    "{}: param '{}' must be one of [{}]",
                    spec.name,
                    param.name,
                    param.allowed_values.join(", ")
                ))
                .with_detail("param", param.name.clone()));
            }
        }
    }
    Ok(())
}

// ── Argument helpers ─────────────────────────────────────────────────────────

pub fn arg_str<'a>(args: &'a serde_json::Value, name: &str) -> Option<&'a str> {
    args.get(name).and_then(|v| v.as_str())
}

pub fn arg_u64(args: &serde_json::Value, name: &str) -> Option<u64> {
    args.get(name).and_then(|v| v.as_u64())
}

// ── Registry ─────────────────────────────────────────────────────────────────

/// Central registry for all available tools, populated once at startup.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.push(tool);
    }

    pub fn list_specs(&self) -> Vec<ToolSpec> {
        self.tools.iter().map(|t| t.spec()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools
            .iter()
            .find(|t| t.spec().name == name)
            .map(|t| t.as_ref())
    }

    /// The `tools` array for the chat API.
    pub fn function_definitions(&self) -> serde_json::Value {
        specs_to_function_definitions(&self.list_specs())
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
