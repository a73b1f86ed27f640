//! Context-window trimming with a cheap token estimate.

use crate::types::{Message, Role};

/// Roughly 4 characters per token.
fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        0
    } else {
        ((text.len() + 3) / 4).max(1)
    }
}

/// Trims old turns so the request fits the model's input budget.
///
/// Always keeps the system message and the last `keep_last_n` messages;
/// drops the oldest of the rest first. Pure: operates on a slice and
/// returns the trimmed copy.
#[derive(Debug, Clone)]
pub struct ContextWindow {
    /// Hard cap for the request messages.
    pub max_input_tokens: usize,
    /// Budget left for the model to answer.
    pub response_reserve_tokens: usize,
    /// Most-recent messages kept unconditionally (besides the system one).
    pub keep_last_n: usize,
}

impl ContextWindow {
    pub fn new(max_input_tokens: usize) -> Self {
        Self {
            max_input_tokens,
            response_reserve_tokens: 1024,
            keep_last_n: 6,
        }
    }

    fn message_tokens(message: &Message) -> usize {
        // Per-message overhead for role and separators.
        4 + estimate_tokens(&message.content)
    }

    fn total(messages: &[Message]) -> usize {
        messages.iter().map(Self::message_tokens).sum()
    }

    pub fn fit(&self, messages: &[Message]) -> Vec<Message> {
        if messages.is_empty() {
            return Vec::new();
        }
        let target = self
            .max_input_tokens
            .saturating_sub(self.response_reserve_tokens)
            .max(1);

        let (system, rest): (Vec<Message>, &[Message]) = match messages.first() {
            Some(m) if m.role == Role::System => (vec![messages[0].clone()], &messages[1..]),
            _ => (Vec::new(), messages),
        };

        let keep_tail = self.keep_last_n.min(rest.len());
        let mut head: Vec<Message> = rest[..rest.len() - keep_tail].to_vec();
        let tail: Vec<Message> = rest[rest.len() - keep_tail..].to_vec();

        while !head.is_empty()
            && Self::total(&system) + Self::total(&head) + Self::total(&tail) > target
        {
            head.remove(0);
        }

        let mut fitted: Vec<Message> = system.into_iter().chain(head).chain(tail).collect();

        // Still over budget: shed the oldest non-system messages, keeping at
        // least the most recent one.
        let floor = usize::from(fitted.first().map(|m| m.role) == Some(Role::System));
        while Self::total(&fitted) > target && fitted.len() > floor + 1 {
            fitted.remove(floor);
        }
        fitted
    }
}
