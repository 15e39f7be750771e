//! Client wrapper: rate limiting, retry with backoff, token accounting.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use reagent_core::{is_retryable, AgentError};

use crate::backend::ChatBackend;
use crate::types::{ChatRequest, ChatResponse};

// ── Rate limiter ─────────────────────────────────────────────────────────────

/// Sliding 60-second window of request instants.  Process-wide state behind a
/// single mutex; the lock is never held across an await.
pub struct RateLimiter {
    rpm: u32,
    window: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// `rpm == 0` disables limiting.
    pub fn new(rpm: u32) -> Self {
        Self {
            rpm,
            window: Mutex::new(VecDeque::new()),
        }
    }

    /// Wait until a slot frees up, or fail with `Cancelled` when the deadline
    /// would pass first.
    pub async fn acquire(&self, deadline: Option<Instant>) -> Result<(), AgentError> {
        if self.rpm == 0 {
            return Ok(());
        }
        loop {
            let wait = {
                let mut window = self.window.lock().expect("rate limiter mutex poisoned");
                let now = Instant::now();
                while let Some(front) = window.front() {
                    if now.duration_since(*front) >= Duration::from_secs(60) {
                        window.pop_front();
                    } else {
                        break;
                    }
                }
                if (window.len() as u32) < self.rpm {
                    window.push_back(now);
                    return Ok(());
                }
                let oldest = *window.front().expect("window is non-empty here");
                (oldest + Duration::from_secs(60)).saturating_duration_since(now)
            };

            if let Some(deadline) = deadline {
                if Instant::now() + wait > deadline {
                    return Err(AgentError::cancelled(
                        "task deadline reached while waiting for a rate limit slot",
                    ));
                }
            }
            debug!(wait_ms = wait.as_millis() as u64, "rate limiter waiting");
            tokio::time::sleep(wait).await;
        }
    }
}

// ── Statistics ───────────────────────────────────────────────────────────────

/// Cumulative, process-wide token counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LlmStats {
    pub calls: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

// ── Client ───────────────────────────────────────────────────────────────────

pub struct LlmClient {
    backend: Arc<dyn ChatBackend>,
    limiter: RateLimiter,
    max_retries: u32,
    retry_delay: Duration,
    stats: Mutex<LlmStats>,
}

impl LlmClient {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        rate_limit_rpm: u32,
        max_retries: u32,
        retry_delay: Duration,
    ) -> Self {
        Self {
            backend,
            limiter: RateLimiter::new(rate_limit_rpm),
            max_retries,
            retry_delay,
            stats: Mutex::new(LlmStats::default()),
        }
    }

    /// Issue one chat completion.  Transient failures are retried with
    /// delays `d·2^k` up to `max_retries`; everything else surfaces
    /// immediately (a `ToolUseFailed` rejection in particular goes straight
    /// to the reasoner's recovery path).
    pub async fn chat_with_tools(
        &self,
        request: &ChatRequest,
        deadline: Option<Instant>,
    ) -> Result<ChatResponse, AgentError> {
        for attempt in 0..=self.max_retries {
            self.limiter.acquire(deadline).await?;

            match self.backend.chat(request).await {
                Ok(response) => {
                    self.record_usage(&response);
                    return Ok(response);
                }
                Err(err) if is_retryable(&err) && attempt < self.max_retries => {
                    let delay = self.retry_delay * 2u32.pow(attempt);
                    warn!(
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient LLM failure, backing off"
                    );
                    if let Some(deadline) = deadline {
                        if Instant::now() + delay > deadline {
                            return Err(AgentError::cancelled(
                                "task deadline reached during retry backoff",
                            ));
                        }
                    }
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
        unreachable!("retry loop always returns on the final attempt")
    }

    fn record_usage(&self, response: &ChatResponse) {
        let mut stats = self.stats.lock().expect("stats mutex poisoned");
        stats.calls += 1;
        stats.prompt_tokens += response.usage.prompt_tokens;
        stats.completion_tokens += response.usage.completion_tokens;
        stats.total_tokens += response.usage.total_tokens;
    }

    pub fn stats(&self) -> LlmStats {
        *self.stats.lock().expect("stats mutex poisoned")
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
