//! Fixed texts the relay sends.

use crate::channels::SuggestedPrompt;
use crate::llm::{MessageRole, ThreadMessage};

pub const GREETING: &str = "Hi, how can I help?";

pub const THINKING_STATUS: &str = "is thinking...";

pub const RUN_FAILED_REPLY: &str =
    "Sorry, I wasn't able to generate a response this time. Please try again.";

pub const TIMED_OUT_REPLY: &str =
    "Sorry, the assistant is taking too long to respond. Please try again in a moment.";

pub const ERROR_REPLY: &str = "Sorry, something went wrong while processing your request.";

/// Prompts offered when a thread opens. Threads opened from a channel get an
/// extra channel-specific prompt.
pub fn suggested_prompts(in_channel: bool) -> Vec<SuggestedPrompt> {
    let mut prompts = vec![SuggestedPrompt::new(
        "What can you do?",
        "What kinds of questions can you help me with?",
    )];
    if in_channel {
        prompts.push(SuggestedPrompt::new(
            "Summarize channel",
            "Can you summarize the recent discussion in the channel I'm viewing?",
        ));
    }
    prompts
}

/// Join the text of assistant messages, oldest first, one per line.
pub fn assistant_reply(messages: &[ThreadMessage]) -> String {
    messages
        .iter()
        .filter(|m| m.role == MessageRole::Assistant)
        .map(|m| m.text.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}
