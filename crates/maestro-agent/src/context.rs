//! Conversation window for model calls.

use maestro_core::{Message, Role};

/// Selects the recent conversation turns sent with a model call.
pub struct ContextWindow {
    messages: Vec<Message>,
    max_messages: usize,
}

impl ContextWindow {
    /// Empty window keeping at most `max_messages` turns.
    pub fn new(max_messages: usize) -> Self {
        Self {
            messages: Vec::new(),
            max_messages,
        }
    }

    /// Build a window over an existing history, keeping the newest turns.
    /// System turns are dropped; instructions travel separately.
    pub fn from_history(history: &[Message], max_messages: usize) -> Self {
        let mut window = Self::new(max_messages);
        for message in history.iter().filter(|m| m.role != Role::System) {
            window.push(message.clone());
        }
        window
    }

    /// Append a turn, evicting the oldest past the limit.
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
        self.truncate();
    }

    /// Turns currently in the window.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Consume the window.
    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }

    fn truncate(&mut self) {
        if self.messages.len() > self.max_messages {
            let excess = self.messages.len() - self.max_messages;
            self.messages.drain(..excess);
        }
    }

    /// Estimated prompt tokens for the window.
    pub fn estimated_tokens(&self) -> u64 {
        estimate_tokens(&joined_content(&self.messages))
    }
}

/// Rough token estimate: one token per four characters, rounded up.
pub fn estimate_tokens(text: &str) -> u64 {
    text.chars().count().div_ceil(4) as u64
}

/// Turn contents joined by single spaces, the text used for estimation.
pub fn joined_content(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}
