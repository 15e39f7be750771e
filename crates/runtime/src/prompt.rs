//! System prompt assembly.
//!
//! The base prompt anchors the model to its role and ground rules; the
//! retriever's memory block is appended before the first LLM call of each
//! task.  Keeping this a plain string function keeps the reasoner focused on
//! orchestration.

/// Base system prompt for the tool-calling loop.
pub fn base_prompt(agent_name: &str, working_directory: &str) -> String {
    format!(
        "You are {agent_name}, an autonomous assistant that completes tasks by \
         calling the provided tools.\n\
         Working directory: {working_directory}.\n\
         RULES:\n\
         1. Use tools for anything that touches files, the shell, or the web — \
            never invent their results.\n\
         2. A TOOL RESULT is ground truth; if it conflicts with what you expected, \
            the result wins.\n\
         3. When a tool fails, read the error, adjust the arguments, and try a \
            different approach rather than repeating the same call.\n\
         4. When the task is done, answer the user directly and concisely in the \
            language they used.\n\
         5. Never fabricate file contents, command output, or search results."
    )
}

/// Append the rendered memory block to the base prompt.
pub fn with_memory_context(base: &str, memory_block: &str) -> String {
    if memory_block.is_empty() {
        base.to_string()
    } else {
        format!("{base}\n\n{memory_block}")
    }
}

/// Corrective user message for the tool-use recovery turn.  Includes the
/// provider's rejected generation when available so the model can see what
/// it got wrong.
pub fn recovery_message(failed_generation: Option<&str>) -> String {
    let mut message = String::from(
        "Your previous tool call was malformed and was rejected. \
         Call exactly one tool using the proper function-calling format, with \
         valid JSON arguments containing every required parameter. \
         Do not write the call as plain text.",
    );
    if let Some(failed) = failed_generation {
        let snippet: String = failed.chars().take(300).collect();
        message.push_str("\n\nYour rejected output was:\n");
        message.push_str(&snippet);
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_prompt_names_agent_and_workdir() {
        let prompt = base_prompt("Reagent", "/work");
        assert!(prompt.contains("You are Reagent"));
        assert!(prompt.contains("/work"));
    }

    #[test]
    fn memory_block_is_appended() {
        let combined = with_memory_context("BASE", "MEMORY CONTEXT:\n- fact");
        assert!(combined.starts_with("BASE\n\n"));
        assert!(combined.contains("MEMORY CONTEXT:"));
    }

    #[test]
    fn empty_memory_block_leaves_base_unchanged() {
        assert_eq!(with_memory_context("BASE", ""), "BASE");
    }

    #[test]
    fn recovery_message_includes_failed_snippet() {
        let message = recovery_message(Some("<function=read_file{"));
        assert!(message.contains("rejected"));
        assert!(message.contains("<function=read_file{"));
    }
}
