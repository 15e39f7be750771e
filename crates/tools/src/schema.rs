//! JSON-schema builder for tool parameter definitions.
//!
//! The builder only admits the JSON-schema type enumeration, so a tool
//! cannot ship an invalid `parameters` object — the mistake class of typos
//! like `type: "list"` is unrepresentable.  Operation-style parameters carry
//! their allowed values and render as an `enum`.

use serde::{Deserialize, Serialize};
use serde_json::json;

/// The JSON-schema primitive types, and nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
    Null,
}

impl ParamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Integer => "integer",
            ParamType::Number => "number",
            ParamType::Boolean => "boolean",
            ParamType::Array => "array",
            ParamType::Object => "object",
            ParamType::Null => "null",
        }
    }

    /// Whether `value` conforms to this type.
    pub fn matches(&self, value: &serde_json::Value) -> bool {
        match self {
            ParamType::String => value.is_string(),
            ParamType::Integer => value.is_i64() || value.is_u64(),
            ParamType::Number => value.is_number(),
            ParamType::Boolean => value.is_boolean(),
            ParamType::Array => value.is_array(),
            ParamType::Object => value.is_object(),
            ParamType::Null => value.is_null(),
        }
    }
}

/// One parameter of a tool schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    pub description: String,
    pub param_type: ParamType,
    pub required: bool,
    /// Enumerated allowed values; empty = unrestricted.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_values: Vec<String>,
}

impl ParamSpec {
    pub fn required(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            param_type: ParamType::String,
            required: true,
            allowed_values: vec![],
        }
    }

    pub fn optional(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            required: false,
            ..Self::required(name, description)
        }
    }

    pub fn typed(mut self, param_type: ParamType) -> Self {
        self.param_type = param_type;
        self
    }

    /// Restrict to an enumerated set of values (operation-style params).
    pub fn one_of(mut self, values: &[&str]) -> Self {
        self.allowed_values = values.iter().map(|v| v.to_string()).collect();
        self
    }
}

/// Per-tool danger classification consumed by the confirmation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DangerClass {
    /// Pure reads and queries.
    Safe,
    /// Writes, deletes, anything that changes state.
    Mutating,
    /// Shell access and other escalation-capable surfaces.
    Privileged,
}

/// Static metadata about a tool, used by the LLM to decide which to call and
/// by the confirmation policy to decide whether to ask first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub params: Vec<ParamSpec>,
    pub danger: DangerClass,
}

impl ToolSpec {
    /// Render the OpenAI-compatible function definition for this tool.
    pub fn function_definition(&self) -> serde_json::Value {
        let mut properties = serde_json::Map::new();
        let mut required = Vec::new();
        for param in &self.params {
            let mut prop = json!({
                "type": param.param_type.as_str(),
                "description": param.description,
            });
            if !param.allowed_values.is_empty() {
                prop["enum"] = json!(param.allowed_values);
            }
            properties.insert(param.name.clone(), prop);
            if param.required {
                required.push(param.name.clone());
            }
        }
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": {
                    "type": "object",
                    "properties": properties,
                    "required": required,
                }
            }
        })
    }
}

/// The `tools` array passed to the chat API.
pub fn specs_to_function_definitions(specs: &[ToolSpec]) -> serde_json::Value {
    json!(specs.iter().map(ToolSpec::function_definition).collect::<Vec<_>>())
}

// ── Tests ────────────────────────────────────────────────────────────────────
