//! Provider backends.
//!
//! The production backend speaks an OpenAI-compatible `/chat/completions`
//! endpoint.  Failure mapping is the important part: transient conditions
//! (network, timeout, 429, 5xx) become `LlmTransient` so the client retries
//! them; auth and quota problems become `LlmPermanent`; and a 400 whose body
//! names a malformed tool invocation becomes `ToolUseFailed` with the
//! provider's partial generation preserved for the recovery turn.

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use reagent_core::AgentError;

use crate::types::{
    messages_to_wire, ChatRequest, ChatResponse, ToolCall, ToolCallFunction, Usage,
};

#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, AgentError>;
}

// ── HTTP backend ─────────────────────────────────────────────────────────────

pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl HttpBackend {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
        timeout_seconds: u64,
    ) -> Result<Self, AgentError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_seconds))
            .build()
            .map_err(|err| AgentError::configuration(format!("building http client: {err}")))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key,
            model: model.into(),
        })
    }
}

#[async_trait]
impl ChatBackend for HttpBackend {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, AgentError> {
        let endpoint = format!(
            "{}/chat/completions",
            self.base_url.trim_end_matches('/')
        );

        let mut payload = json!({
            "model": self.model,
            "messages": messages_to_wire(&request.messages),
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
        });
        if let Some(tools) = &request.tools {
            payload["tools"] = tools.clone();
        }
        if let Some(choice) = request.tool_choice {
            payload["tool_choice"] = json!(choice.as_str());
        }

        let mut builder = self.client.post(&endpoint).json(&payload);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|err| {
            if err.is_timeout() {
                AgentError::llm_transient(format!("request timed out: {err}"))
            } else {
                AgentError::llm_transient(format!("network error: {err}"))
            }
        })?;

        let status = response.status();
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|err| AgentError::llm_transient(format!("unreadable response body: {err}")))?;

        if !status.is_success() {
            return Err(classify_http_error(status.as_u16(), &body));
        }

        debug!(model = %self.model, "chat completion ok");
        parse_chat_response(&body)
    }
}

/// Map a non-2xx status plus its error body onto the taxonomy.
fn classify_http_error(status: u16, body: &serde_json::Value) -> AgentError {
    let error_obj = body.get("error");
    let message = error_obj
        .and_then(|e| e.get("message"))
        .and_then(|m| m.as_str())
        .unwrap_or("provider error")
        .to_string();
    let code = error_obj
        .and_then(|e| e.get("code"))
        .and_then(|c| c.as_str())
        .unwrap_or_default();

    if code == "tool_use_failed" {
        let failed_generation = error_obj
            .and_then(|e| e.get("failed_generation"))
            .and_then(|g| g.as_str())
            .map(str::to_string);
        return AgentError::tool_use_failed(message, failed_generation);
    }

    match status {
        429 => AgentError::llm_transient(format!("rate limited ({status}): {message}")),
        500..=599 => AgentError::llm_transient(format!("server error ({status}): {message}")),
        401 | 403 => AgentError::llm_permanent(format!("auth failure ({status}): {message}"))
            .with_detail("status", status.to_string()),
        _ => AgentError::llm_permanent(format!("provider rejected request ({status}): {message}"))
            .with_detail("status", status.to_string()),
    }
}

/// Parse a non-streaming chat completion body.
pub fn parse_chat_response(body: &serde_json::Value) -> Result<ChatResponse, AgentError> {
    let choice = body
        .get("choices")
        .and_then(|c| c.get(0))
        .ok_or_else(|| AgentError::llm_permanent("response has no choices"))?;
    let message = choice.get("message");

    let content = message
        .and_then(|m| m.get("content"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();

    let finish_reason = choice
        .get("finish_reason")
        .and_then(|v| v.as_str())
        .unwrap_or("stop")
        .to_string();

    let tool_calls = message
        .and_then(|m| m.get("tool_calls"))
        .and_then(|v| v.as_array())
        .map(|calls| parse_tool_calls(calls))
        .unwrap_or_default();

    let usage = body
        .get("usage")
        .and_then(|u| serde_json::from_value::<Usage>(u.clone()).ok())
        .unwrap_or_default();

    Ok(ChatResponse {
        content,
        tool_calls,
        finish_reason,
        usage,
    })
}

/// Parse a provider tool_calls array.  Arguments arrive as a JSON string on
/// most providers; parse them into a value, defaulting to `{}` on garbage so
/// validation (not parsing) produces the user-visible error.
fn parse_tool_calls(calls: &[serde_json::Value]) -> Vec<ToolCall> {
    calls
        .iter()
        .enumerate()
        .filter_map(|(i, tc)| {
            let id = tc.get("id").and_then(|v| v.as_str()).unwrap_or("").to_string();
            let func = tc.get("function")?;
            let name = func.get("name")?.as_str()?.to_string();
            let arguments = func
                .get("arguments")
                .map(|v| {
                    if let Some(s) = v.as_str() {
                        serde_json::from_str(s).unwrap_or(json!({}))
                    } else {
                        v.clone()
                    }
                })
                .unwrap_or(json!({}));
            Some(ToolCall {
                id: if id.is_empty() { format!("call_{i}") } else { id },
                r#type: "function".to_string(),
                function: ToolCallFunction { name, arguments },
            })
        })
        .collect()
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use reagent_core::ErrorKind;

    #[test]
    fn parse_text_response() {
        let body = json!({
            "choices": [{
                "message": {"content": "hello"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 10, "completion_tokens": 2, "total_tokens": 12}
        });
        let response = parse_chat_response(&body).unwrap();
        assert_eq!(response.content, "hello");
        assert!(response.tool_calls.is_empty());
        assert_eq!(response.usage.total_tokens, 12);
    }

    #[test]
    fn parse_tool_call_with_string_arguments() {
        let body = json!({
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_abc",
                        "type": "function",
                        "function": {
                            "name": "read_file",
                            "arguments": "{\"path\": \"README.md\"}"
                        }
                    }]
                },
                "finish_reason": "tool_calls"
            }]
        });
        let response = parse_chat_response(&body).unwrap();
        assert_eq!(response.tool_calls.len(), 1);
        let call = &response.tool_calls[0];
        assert_eq!(call.function.name, "read_file");
        assert_eq!(call.function.arguments["path"], "README.md");
        assert_eq!(response.finish_reason, "tool_calls");
    }

    #[test]
    fn missing_call_id_is_generated() {
        let calls = json!([{
            "function": {"name": "web_search", "arguments": "{}"}
        }]);
        let parsed = parse_tool_calls(calls.as_array().unwrap());
        assert_eq!(parsed[0].id, "call_0");
    }

    #[test]
    fn garbage_arguments_default_to_empty_object() {
        let calls = json!([{
            "id": "call_1",
            "function": {"name": "read_file", "arguments": "{broken json"}
        }]);
        let parsed = parse_tool_calls(calls.as_array().unwrap());
        assert_eq!(parsed[0].function.arguments, json!({}));
    }

    #[test]
    fn status_429_is_transient() {
        let err = classify_http_error(429, &json!({"error": {"message": "slow down"}}));
        assert_eq!(err.kind, ErrorKind::LlmTransient);
    }

    #[test]
    fn status_503_is_transient() {
        let err = classify_http_error(503, &json!({}));
        assert_eq!(err.kind, ErrorKind::LlmTransient);
    }

    #[test]
    fn status_401_is_permanent() {
        let err = classify_http_error(401, &json!({"error": {"message": "bad key"}}));
        assert_eq!(err.kind, ErrorKind::LlmPermanent);
        assert_eq!(err.detail("status"), Some("401"));
    }

    #[test]
    fn tool_use_failed_preserves_generation() {
        let body = json!({
            "error": {
                "message": "Failed to call a function",
                "code": "tool_use_failed",
                "failed_generation": "<function=read_file{\"path\""
            }
        });
        let err = classify_http_error(400, &body);
        assert_eq!(err.kind, ErrorKind::ToolUseFailed);
        assert!(err.detail("failed_generation").unwrap().contains("read_file"));
    }

    #[test]
    fn empty_choices_is_permanent() {
        let err = parse_chat_response(&json!({"choices": []})).unwrap_err();
        assert_eq!(err.kind, ErrorKind::LlmPermanent);
    }
}
