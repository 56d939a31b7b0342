//! Transcript construction, code-block extraction, and output truncation.

use rlm_providers::ChatMessage;

/// The ordered message list sent to the LLM for the next call. Mutated only
/// by appending.
pub struct Transcript {
    messages: Vec<ChatMessage>,
}

impl Transcript {
    pub fn new(system_prompt: String, user_query: &str) -> Self {
        Self {
            messages: vec![
                ChatMessage::system(system_prompt),
                ChatMessage::user(user_query),
            ],
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn push_assistant(&mut self, content: &str) {
        self.messages.push(ChatMessage::assistant(content));
    }

    pub fn push_user(&mut self, content: &str) {
        self.messages.push(ChatMessage::user(content));
    }
}

/// Extract the last fenced ```repl block from an assistant message. Fences
/// with any other (or no) language label don't count, and an empty block is
/// treated as absent.
pub fn extract_repl_block(content: &str) -> Option<String> {
    let mut last = None;
    let mut rest = content;

    while let Some(start) = rest.find("```repl") {
        let after = &rest[start + "```repl".len()..];
        match after.find("```") {
            Some(end) => {
                last = Some(after[..end].trim().to_owned());
                rest = &after[end + 3..];
            }
            None => break, // unterminated fence
        }
    }

    last.filter(|code| !code.is_empty())
}

/// Shorten REPL output for the transcript. The log always keeps the full
/// output; only the model sees the truncated form. Lengths are in characters
/// to stay agnostic of multi-byte output.
pub fn truncate_output(text: &str, truncate_len: usize) -> String {
    let chars = text.chars().count();
    if chars > truncate_len {
        let tail: String = text.chars().skip(chars - truncate_len).collect();
        format!("[TRUNCATED: Last {truncate_len} chars shown].. {tail}")
    } else if text.is_empty() {
        "[EMPTY OUTPUT]".to_owned()
    } else {
        format!("[FULL OUTPUT SHOWN]... {text}")
    }
}
