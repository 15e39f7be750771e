use serde::{Deserialize, Serialize};
use serde_json::json;

// ── Chat message types ───────────────────────────────────────────────────────

/// Role in a chat conversation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
    Tool,
}

/// A single message in the reasoning window.
///
/// Ordering is significant: the first message is always the system prompt,
/// the second always the original user task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: Option<String>,
    /// Tool calls requested by the assistant (only on assistant messages).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// When role == Tool, identifies which tool call this result answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: ChatRole::System, content: Some(content.into()), tool_calls: vec![], tool_call_id: None }
    }
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: Some(content.into()), tool_calls: vec![], tool_call_id: None }
    }
    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: ChatRole::Assistant, content: Some(content.into()), tool_calls: vec![], tool_call_id: None }
    }
    pub fn assistant_tool_calls(tool_calls: Vec<ToolCall>) -> Self {
        Self { role: ChatRole::Assistant, content: None, tool_calls, tool_call_id: None }
    }
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self { role: ChatRole::Tool, content: Some(content.into()), tool_calls: vec![], tool_call_id: Some(tool_call_id.into()) }
    }

    /// Rough token estimate (chars / 4) used for window pruning.  Cheap and
    /// deliberately pessimistic-free; the real budget comes from usage.
    pub fn estimated_tokens(&self) -> u64 {
        let mut chars = self.content.as_deref().map(str::len).unwrap_or(0);
        for call in &self.tool_calls {
            chars += call.function.name.len() + call.function.arguments.to_string().len();
        }
        (chars / 4) as u64
    }
}

/// A tool call requested by the LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique ID for this call (used to correlate tool results).  Some
    /// providers omit it, in which case one is generated.
    #[serde(default)]
    pub id: String,
    /// Always "function" for OpenAI-compatible APIs.
    #[serde(default = "default_tool_call_type")]
    pub r#type: String,
    pub function: ToolCallFunction,
}

fn default_tool_call_type() -> String {
    "function".to_string()
}

/// Function name and parsed arguments within a tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallFunction {
    pub name: String,
    /// Providers send arguments as a JSON string; we normalize to a parsed
    /// value for downstream consumers.
    #[serde(default)]
    pub arguments: serde_json::Value,
}

// ── Request / response ───────────────────────────────────────────────────────

/// Forces or forbids tool use on a single call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolChoice {
    Auto,
    Required,
    None,
}

impl ToolChoice {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolChoice::Auto => "auto",
            ToolChoice::Required => "required",
            ToolChoice::None => "none",
        }
    }
}

/// One chat completion request as the reasoner issues it.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    /// Function definitions array, or `None` to force a plain text answer.
    pub tools: Option<serde_json::Value>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub tool_choice: Option<ToolChoice>,
}

/// Token usage reported by the provider.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

/// Parsed provider response.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    /// Text content (may be empty when tool_calls are present).
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    /// "stop", "tool_calls", "length", …
    pub finish_reason: String,
    pub usage: Usage,
}

impl ChatResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tool_calls: vec![],
            finish_reason: "stop".to_string(),
            usage: Usage::default(),
        }
    }
}

// ── Wire conversion ──────────────────────────────────────────────────────────

/// Convert messages to the OpenAI-compatible wire format.  Assistant tool
/// calls serialize their arguments back to a JSON string, and tool-role
/// messages carry the correlated `tool_call_id`.
pub fn messages_to_wire(messages: &[ChatMessage]) -> Vec<serde_json::Value> {
    messages
        .iter()
        .map(|m| {
            let role = match m.role {
                ChatRole::System => "system",
                ChatRole::User => "user",
                ChatRole::Assistant => "assistant",
                ChatRole::Tool => "tool",
            };
            let mut msg = json!({ "role": role });
            match &m.content {
                Some(content) => msg["content"] = json!(content),
                None => msg["content"] = json!(null),
            }
            if !m.tool_calls.is_empty() {
                let calls: Vec<serde_json::Value> = m
                    .tool_calls
                    .iter()
                    .map(|tc| {
                        json!({
                            "id": tc.id,
                            "type": "function",
                            "function": {
                                "name": tc.function.name,
                                "arguments": tc.function.arguments.to_string(),
                            }
                        })
                    })
                    .collect();
                msg["tool_calls"] = json!(calls);
            }
            if let Some(id) = &m.tool_call_id {
                msg["tool_call_id"] = json!(id);
            }
            msg
        })
        .collect()
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_set_roles() {
        assert_eq!(ChatMessage::system("s").role, ChatRole::System);
        assert_eq!(ChatMessage::user("u").role, ChatRole::User);
        assert_eq!(ChatMessage::assistant("a").role, ChatRole::Assistant);
        let tool = ChatMessage::tool_result("call_0", "out");
        assert_eq!(tool.role, ChatRole::Tool);
        assert_eq!(tool.tool_call_id.as_deref(), Some("call_0"));
    }

    #[test]
    fn estimated_tokens_scales_with_length() {
        let msg = ChatMessage::user("x".repeat(400));
        assert_eq!(msg.estimated_tokens(), 100);
    }

    #[test]
    fn wire_format_stringifies_tool_call_arguments() {
        let call = ToolCall {
            id: "call_1".into(),
            r#type: "function".into(),
            function: ToolCallFunction {
                name: "read_file".into(),
                arguments: json!({"path": "README.md"}),
            },
        };
        let wire = messages_to_wire(&[ChatMessage::assistant_tool_calls(vec![call])]);
        let args = wire[0]["tool_calls"][0]["function"]["arguments"].as_str().unwrap();
        assert!(args.contains("README.md"));
        assert!(wire[0]["content"].is_null());
    }

    #[test]
    fn wire_format_carries_tool_call_id() {
        let wire = messages_to_wire(&[ChatMessage::tool_result("call_7", "Success: done")]);
        assert_eq!(wire[0]["role"], "tool");
        assert_eq!(wire[0]["tool_call_id"], "call_7");
    }
}
