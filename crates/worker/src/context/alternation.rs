//! Turn alternation normalization.
//!
//! Providers reject histories with two consecutive turns from the same
//! role. After compression the history may contain such runs; this module
//! repairs them without touching anchors:
//! - system messages are hoisted into the leading block
//! - adjacent mutable turns with the same role are merged
//! - two anchors of the same role get a neutral spacer turn between them
//! - the sequence starts with a user turn and closes on a user turn: the
//!   history's own trailing user turn, or else the current prompt

use dialectic_core::{Message, Role};

use crate::context::history::HistoryWindow;

const DEFAULT_USER_SPACER: &str = "Go on.";
const ASSISTANT_SPACER: &str = "Understood.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnNormalizer {
    user_spacer: String,
}

impl TurnNormalizer {
    pub fn new(user_spacer: impl Into<String>) -> Self {
        Self {
            user_spacer: user_spacer.into(),
        }
    }

    fn spacer(&self, role: Role) -> Message {
        match role {
            Role::Assistant => Message::assistant(ASSISTANT_SPACER),
            _ => Message::user(self.user_spacer.clone()),
        }
    }

    /// Shape `history` into the request's message list. `closing_prompt`
    /// becomes the final user turn when the history does not end on one.
    pub fn normalize(
        &self,
        history: &[Message],
        window: &HistoryWindow,
        closing_prompt: &str,
    ) -> Vec<Message> {
        let mut system = Vec::new();
        let mut turns: Vec<(Message, bool)> = Vec::with_capacity(history.len() + 1);

        for (index, message) in history.iter().enumerate() {
            if message.role == Role::System {
                system.push(message.clone());
                continue;
            }
            let anchor = window.is_anchor(index);
            match turns.last_mut() {
                Some((last, last_anchor)) if last.role == message.role => {
                    if !*last_anchor && !anchor {
                        last.content.push_str("\n\n");
                        last.content.push_str(&message.content);
                    } else {
                        turns.push((self.spacer(message.role.opposite()), false));
                        turns.push((message.clone(), anchor));
                    }
                }
                _ => turns.push((message.clone(), anchor)),
            }
        }

        if turns.first().is_some_and(|(m, _)| m.role == Role::Assistant) {
            turns.insert(0, (self.spacer(Role::User), false));
        }
        if !turns.last().is_some_and(|(m, _)| m.role == Role::User) {
            turns.push((Message::user(closing_prompt), false));
        }

        system.extend(turns.into_iter().map(|(m, _)| m));
        system
    }
}

impl Default for TurnNormalizer {
    fn default() -> Self {
        Self::new(DEFAULT_USER_SPACER)
    }
}

/// True when no two adjacent non-system turns share a role and system
/// messages only appear in the leading block.
pub fn is_alternating(messages: &[Message]) -> bool {
    let first_turn = messages
        .iter()
        .position(|m| m.role != Role::System)
        .unwrap_or(messages.len());
    let turns = &messages[first_turn..];
    turns.iter().all(|m| m.role != Role::System)
        && turns.windows(2).all(|w| w[0].role != w[1].role)
}
