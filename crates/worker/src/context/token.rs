//! Token estimation utilities.
//!
//! Uses a character-based heuristic (4 characters per token by default).
//! This approximation is accurate within ~10% for BPE tokenizers on
//! English text, and keeps sizing deterministic.

use dialectic_core::{Message, SizedPayload, TokenCounter};

/// Per-message overhead for role name, delimiters and formatting markers.
const MESSAGE_OVERHEAD: u64 = 4;

/// Estimate the token count for a string. Rounds up.
pub fn estimate_tokens(text: &str, chars_per_token: usize) -> u64 {
    if text.is_empty() {
        return 0;
    }
    let per = chars_per_token.max(1);
    text.chars().count().div_ceil(per) as u64
}

/// Character-heuristic [`TokenCounter`].
#[derive(Debug, Clone, Copy)]
pub struct CharEstimateCounter {
    chars_per_token: usize,
}

impl CharEstimateCounter {
    pub fn new(chars_per_token: usize) -> Self {
        Self {
            chars_per_token: chars_per_token.max(1),
        }
    }

    fn message_tokens(&self, message: &Message) -> u64 {
        MESSAGE_OVERHEAD + estimate_tokens(&message.content, self.chars_per_token)
    }
}

impl Default for CharEstimateCounter {
    fn default() -> Self {
        Self::new(4)
    }
}

impl TokenCounter for CharEstimateCounter {
    /// Resource documents are sized as if they were user messages.
    fn count(&self, payload: &SizedPayload) -> u64 {
        let system = payload
            .system_instruction
            .as_deref()
            .map(|s| MESSAGE_OVERHEAD + self.count_text(s))
            .unwrap_or(0);
        let prompt = if payload.prompt_closes_history() {
            0
        } else {
            MESSAGE_OVERHEAD + self.count_text(&payload.message)
        };
        let history: u64 = payload.messages.iter().map(|m| self.message_tokens(m)).sum();
        let documents: u64 = payload
            .resource_documents
            .iter()
            .map(|d| MESSAGE_OVERHEAD + self.count_text(&d.content))
            .sum();
        system + prompt + history + documents
    }

    fn count_text(&self, text: &str) -> u64 {
        estimate_tokens(text, self.chars_per_token)
    }
}
