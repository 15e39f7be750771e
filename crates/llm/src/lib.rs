//! Chat/function-calling client.
//!
//! [`ChatBackend`] is the seam between the runtime and the provider: the
//! production [`HttpBackend`] speaks an OpenAI-compatible chat completions
//! API, tests inject scripted backends.  [`LlmClient`] wraps any backend
//! with the pieces the reasoner relies on: a sliding-window rate limiter,
//! exponential-backoff retry for transient failures, cumulative token
//! accounting, and structured surfacing of malformed-tool-call rejections.

pub mod backend;
pub mod client;
pub mod types;

pub use backend::{ChatBackend, HttpBackend};
pub use client::{LlmClient, LlmStats, RateLimiter};
pub use types::{
    ChatMessage, ChatRequest, ChatResponse, ChatRole, ToolCall, ToolCallFunction, ToolChoice,
    Usage,
};
