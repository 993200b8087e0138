//! Chat Memory Window (C6): a per-request, bounded reconstruction of recent
//! turns from the conversation store (spec.md §4.4).
//!
//! Loads the last `W` messages in reverse time order, re-orders them
//! ascending, and feeds them into a deque capped at `2W` entries. The window
//! grows during the request as tool interactions add messages; on overflow
//! the oldest entries are evicted, except for a system preamble at index 0
//! which is never evicted. Not shared across requests — persistence is via
//! the conversation store, not this struct.

use std::collections::VecDeque;

use crate::llm::ChatMessage;
use crate::models::{Message, Role};
use crate::store::ConversationStore;

pub struct ChatMemoryWindow {
    messages: VecDeque<ChatMessage>,
    capacity: usize,
    has_system_preamble: bool,
}

impl ChatMemoryWindow {
    /// Build a window for `conversation_id` from the store's tail, sized by
    /// `context_window` (`W`). `W = 0` is valid and produces an empty window
    /// with no prior-history memory (spec.md §8 boundary behaviour).
    pub fn load(
        store: &ConversationStore,
        conversation_id: &str,
        context_window: usize,
    ) -> anyhow::Result<Self> {
        let mut history = if context_window == 0 {
            Vec::new()
        } else {
            store.tail(conversation_id, context_window as i64)?
        };
        // `tail` returns newest-first; the window presents oldest-first.
        history.reverse();

        let capacity = (context_window * 2).max(1);
        let mut messages = VecDeque::with_capacity(capacity);
        for message in &history {
            messages.push_back(to_chat_message(message));
        }

        Ok(Self {
            messages,
            capacity,
            has_system_preamble: false,
        })
    }

    /// Empty window with no store-backed history, for a fresh conversation.
    pub fn empty(context_window: usize) -> Self {
        Self {
            messages: VecDeque::with_capacity((context_window * 2).max(1)),
            capacity: (context_window * 2).max(1),
            has_system_preamble: false,
        }
    }

    pub fn with_system_preamble(mut self, preamble: impl Into<String>) -> Self {
        self.messages.push_front(ChatMessage::system(preamble));
        self.has_system_preamble = true;
        self
    }

    /// Append a new entry, evicting the oldest non-preamble entry if the
    /// deque would exceed `2W`.
    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push_back(message);
        self.evict_if_needed();
    }

    fn evict_if_needed(&mut self) {
        while self.messages.len() > self.capacity {
            let evict_index = if self.has_system_preamble { 1 } else { 0 };
            if evict_index >= self.messages.len() {
                break;
            }
            self.messages.remove(evict_index);
        }
    }

    pub fn as_slice(&self) -> Vec<ChatMessage> {
        self.messages.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

fn to_chat_message(message: &Message) -> ChatMessage {
    match Role::parse(&message.role) {
        Some(Role::User) => ChatMessage::user(message.content.clone()),
        Some(Role::Assistant) => ChatMessage::assistant(message.content.clone()),
        Some(Role::Tool) => ChatMessage::tool_result(message.id.to_string(), message.content.clone()),
        None => ChatMessage::user(message.content.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_window_has_no_messages() {
        let window = ChatMemoryWindow::empty(0);
        assert!(window.is_empty());
    }

    #[test]
    fn window_evicts_oldest_past_2w() {
        let mut window = ChatMemoryWindow::empty(2); // capacity 4
        for i in 0..6 {
            window.push(ChatMessage::user(format!("msg-{i}")));
        }
        assert_eq!(window.len(), 4);
        let kept = window.as_slice();
        assert_eq!(kept.first().unwrap().content, "msg-2");
        assert_eq!(kept.last().unwrap().content, "msg-5");
    }

    #[test]
    fn system_preamble_survives_eviction() {
        let mut window = ChatMemoryWindow::empty(1).with_system_preamble("you are an assistant");
        for i in 0..10 {
            window.push(ChatMessage::user(format!("msg-{i}")));
        }
        let kept = window.as_slice();
        assert_eq!(kept.first().unwrap().content, "you are an assistant");
    }
}
