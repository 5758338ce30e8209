//! Context-window trimming for conversation histories.
//!
//! Long agent sessions accumulate tool output fast; without a budget the
//! history pushes the original task out of the model's effective
//! attention window. Trimming removes the oldest messages first under two
//! hard rules:
//!
//! - the leading system message is never removed, and
//! - an assistant message carrying tool calls is only removed together
//!   with its paired `tool` reply messages, so no orphaned tool result
//!   ever survives a trim.

use crate::session::entities::{Message, Role};
use serde::{Deserialize, Serialize};

/// Token budget for a conversation history.
///
/// Estimation uses the coarse ~4 chars/token heuristic plus a fixed
/// per-message overhead; precision does not matter here, headroom does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextBudget {
    max_tokens: usize,
}

impl ContextBudget {
    pub fn new(max_tokens: usize) -> Self {
        Self { max_tokens }
    }

    /// Default budget matching common small-model context windows.
    pub fn default_window() -> Self {
        Self { max_tokens: 4096 }
    }

    /// No trimming at all.
    pub fn unlimited() -> Self {
        Self {
            max_tokens: usize::MAX,
        }
    }

    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }
}

/// Per-message fixed overhead (role plus framing), in estimated tokens.
const MESSAGE_OVERHEAD: usize = 4;

/// Per-tool-call fixed overhead, in estimated tokens.
const TOOL_CALL_OVERHEAD: usize = 5;

/// Estimate the token cost of a message list (~4 chars per token).
pub fn estimate_tokens(messages: &[Message]) -> usize {
    messages.iter().map(estimate_message).sum()
}

fn estimate_message(message: &Message) -> usize {
    let mut total = MESSAGE_OVERHEAD + message.content.len() / 4;
    for call in &message.tool_calls {
        total += TOOL_CALL_OVERHEAD + call.name.len() / 4;
        for value in call.arguments.values() {
            total += value.to_string().len() / 4;
        }
    }
    total
}

/// Trim a history to fit the budget.
///
/// Removes the oldest non-system messages first. When the candidate is an
/// assistant message with tool calls, its contiguous run of `tool` replies
/// is removed with it in the same step. A lone trailing message is never
/// removed: the most recent exchange always survives, even over budget.
pub fn trim_history(messages: Vec<Message>, budget: ContextBudget) -> Vec<Message> {
    if estimate_tokens(&messages) <= budget.max_tokens() {
        return messages;
    }

    let mut result = messages;
    let protected_head = if result.first().is_some_and(|m| m.role == Role::System) {
        1
    } else {
        0
    };

    while estimate_tokens(&result) > budget.max_tokens() {
        // Index of the oldest removable message.
        let start = protected_head;
        if start >= result.len().saturating_sub(1) {
            break;
        }

        // Assistant tool-call messages take their paired tool replies along.
        let mut end = start + 1;
        if result[start].has_tool_calls() {
            while end < result.len() && result[end].role == Role::Tool {
                end += 1;
            }
        }
        // Never drop the final message of the conversation.
        if end >= result.len() {
            break;
        }

        result.drain(start..end);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::entities::ToolCall;

    fn long_user(content_len: usize) -> Message {
        Message::user("x".repeat(content_len))
    }

    #[test]
    fn test_under_budget_untouched() {
        let messages = vec![Message::system("sys"), Message::user("hi")];
        let trimmed = trim_history(messages.clone(), ContextBudget::new(1000));
        assert_eq!(trimmed.len(), messages.len());
    }

    #[test]
    fn test_trims_oldest_first() {
        let messages = vec![
            Message::system("sys"),
            long_user(4000),
            long_user(4000),
            Message::user("latest"),
        ];
        let trimmed = trim_history(messages, ContextBudget::new(1100));

        assert_eq!(trimmed[0].role, Role::System);
        assert_eq!(trimmed.last().unwrap().content, "latest");
        assert!(trimmed.len() < 4);
    }

    #[test]
    fn test_system_message_survives_any_budget() {
        let messages = vec![Message::system("never drop me"), long_user(8000), long_user(10)];
        let trimmed = trim_history(messages, ContextBudget::new(10));
        assert_eq!(trimmed[0].role, Role::System);
        assert_eq!(trimmed[0].content, "never drop me");
    }

    #[test]
    fn test_tool_pairs_removed_together() {
        let call = ToolCall::new("read_file").with_arg("filepath", "a.txt");
        let call_id = call.id.clone();
        let messages = vec![
            Message::system("sys"),
            Message::assistant_with_tool_calls("x".repeat(4000), vec![call]),
            Message::tool(call_id, "y".repeat(4000)),
            Message::user("follow-up"),
            Message::assistant("answer"),
        ];

        let trimmed = trim_history(messages, ContextBudget::new(200));

        // No orphaned tool message may survive.
        for msg in &trimmed {
            assert_ne!(msg.role, Role::Tool, "orphaned tool message survived trim");
        }
        assert_eq!(trimmed[0].role, Role::System);
    }

    #[test]
    fn test_last_message_always_survives() {
        let messages = vec![long_user(100_000)];
        let trimmed = trim_history(messages, ContextBudget::new(10));
        assert_eq!(trimmed.len(), 1);
    }

    #[test]
    fn test_estimate_counts_tool_calls() {
        let plain = vec![Message::assistant("hello")];
        let with_call = vec![Message::assistant_with_tool_calls(
            "hello",
            vec![ToolCall::new("search_files").with_arg("query", "needle in haystack")],
        )];
        assert!(estimate_tokens(&with_call) > estimate_tokens(&plain));
    }
}
