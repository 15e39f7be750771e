//! The bounded reasoning window.
//!
//! The reasoner is the sole writer.  `window[0]` is always the system prompt
//! and `window[1]` the original user task; pruning is a pure function that
//! preserves both and keeps the most recent turns intact.

use reagent_llm::{ChatMessage, ChatRole};

pub struct MessageWindow {
    messages: Vec<ChatMessage>,
}

impl MessageWindow {
    pub fn new(system_prompt: impl Into<String>, task: impl Into<String>) -> Self {
        Self {
            messages: vec![ChatMessage::system(system_prompt), ChatMessage::user(task)],
        }
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    /// Replace the system prompt content (memory-context injection happens
    /// before the first LLM call of a task).
    pub fn set_system(&mut self, content: impl Into<String>) {
        self.messages[0] = ChatMessage::system(content);
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn estimated_tokens(&self) -> u64 {
        self.messages.iter().map(ChatMessage::estimated_tokens).sum()
    }

    /// Apply [`prune`] in place.
    pub fn prune_to(&mut self, max_messages: usize, token_budget: u64) {
        self.messages = prune(&self.messages, max_messages, token_budget);
    }

    /// Drop everything but the system prompt and original task.  Used by the
    /// housekeeper to free transient state between tasks.
    pub fn reset_turns(&mut self) {
        self.messages.truncate(2);
    }
}

/// Pure pruning function.
///
/// Triggers when the message count exceeds `max_messages` or the estimated
/// token load exceeds 70% of `token_budget` (0 disables the token trigger).
/// The first two messages always survive.  The cut never lands on a
/// tool-role message, so an assistant tool-call message is never separated
/// from its observations.
pub fn prune(messages: &[ChatMessage], max_messages: usize, token_budget: u64) -> Vec<ChatMessage> {
    let estimated: u64 = messages.iter().map(ChatMessage::estimated_tokens).sum();
    let over_count = messages.len() > max_messages;
    let over_tokens = token_budget > 0 && estimated > (token_budget * 7) / 10;
    if !over_count && !over_tokens || messages.len() <= 2 {
        return messages.to_vec();
    }

    // A token-triggered prune cuts deeper than a count-triggered one: it
    // keeps only half of the current turns.
    let count_keep = max_messages.saturating_sub(2).max(2);
    let token_keep = (messages.len().saturating_sub(2) / 2).max(2);
    let keep_recent = match (over_count, over_tokens) {
        (_, true) if token_keep < count_keep => token_keep,
        (true, _) => count_keep,
        _ => token_keep,
    };

    let mut start = messages.len().saturating_sub(keep_recent).max(2);
    while start < messages.len() && messages[start].role == ChatRole::Tool {
        start += 1;
    }

    let mut pruned = Vec::with_capacity(2 + messages.len() - start);
    pruned.push(messages[0].clone());
    pruned.push(messages[1].clone());
    pruned.extend(messages[start..].iter().cloned());
    pruned
}

// ── Tests ────────────────────────────────────────────────────────────────────
