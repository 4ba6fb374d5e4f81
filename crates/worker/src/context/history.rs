//! Immutable head and tail of a conversation history.
//!
//! The head is the leading system message (if any) plus the first
//! exchange; the tail is the last `tail_len` messages. Both are anchors:
//! they are never compressed and survive normalization verbatim.

use std::ops::Range;

use dialectic_core::{Message, Role};

/// Messages in the first exchange.
const FIRST_TURN_LEN: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryWindow {
    head_end: usize,
    tail_start: usize,
}

impl HistoryWindow {
    pub fn new(history: &[Message], tail_len: usize) -> Self {
        let system = usize::from(history.first().is_some_and(|m| m.role == Role::System));
        let head_end = (system + FIRST_TURN_LEN).min(history.len());
        let tail_start = history.len().saturating_sub(tail_len).max(head_end);
        Self {
            head_end,
            tail_start,
        }
    }

    pub fn is_anchor(&self, index: usize) -> bool {
        index < self.head_end || index >= self.tail_start
    }

    /// Indices that may be compressed or merged.
    pub fn middle(&self) -> Range<usize> {
        self.head_end..self.tail_start
    }
}
