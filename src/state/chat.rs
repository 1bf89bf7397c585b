//! Observable chat state
//!
//! The presentation layer owns what is on screen; the session controller only
//! gets this handle and mutates through it. Every mutation is published as a
//! whole snapshot on a `watch` channel.

use super::{reduce, Conversation, ConversationSummary, Update};
use std::sync::Arc;
use tokio::sync::watch;

/// Everything the presentation layer renders
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatSnapshot {
    /// The open conversation, `None` before one is selected or created
    pub current: Option<Conversation>,
    pub conversations: Vec<ConversationSummary>,
    /// A turn is in flight
    pub loading: bool,
    /// Message of the last failed turn, cleared on the next send
    pub last_error: Option<String>,
}

impl ChatSnapshot {
    pub fn current_id(&self) -> Option<&str> {
        self.current.as_ref().map(|c| c.id.as_str())
    }

    /// Run `update` through the reducer against the open conversation.
    ///
    /// Returns whether anything changed.
    pub fn apply(&mut self, update: &Update) -> bool {
        let Some(current) = self.current.as_ref() else {
            return false;
        };
        let next = reduce(current, update);
        if &next == current {
            return false;
        }
        self.current = Some(next);
        true
    }

    /// Rename a list entry; returns whether it existed and changed
    pub fn rename_entry(&mut self, id: &str, title: &str) -> bool {
        match self.conversations.iter_mut().find(|c| c.id == id) {
            Some(entry) if entry.title != title => {
                entry.title = title.to_string();
                true
            }
            _ => false,
        }
    }

    /// Put a freshly created conversation at the head of the list
    pub fn insert_entry(&mut self, summary: ConversationSummary) {
        self.conversations.retain(|c| c.id != summary.id);
        self.conversations.insert(0, summary);
    }

    pub fn remove_entry(&mut self, id: &str) -> bool {
        let before = self.conversations.len();
        self.conversations.retain(|c| c.id != id);
        self.conversations.len() != before
    }
}

/// Cloneable handle to the single chat state value
#[derive(Debug, Clone)]
pub struct ChatState {
    tx: Arc<watch::Sender<ChatSnapshot>>,
}

impl Default for ChatState {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatState {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ChatSnapshot::default());
        Self { tx: Arc::new(tx) }
    }

    /// Receive every published snapshot
    pub fn subscribe(&self) -> watch::Receiver<ChatSnapshot> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> ChatSnapshot {
        self.tx.borrow().clone()
    }

    pub fn current_id(&self) -> Option<String> {
        self.tx.borrow().current_id().map(String::from)
    }

    /// Mutate in place; subscribers are only notified when `f` returns true.
    ///
    /// The closure runs under the channel's write lock, so checks made inside
    /// it cannot race other writers.
    pub fn update(&self, f: impl FnOnce(&mut ChatSnapshot) -> bool) -> bool {
        self.tx.send_if_modified(f)
    }

    /// Replace the open conversation
    pub fn set_current(&self, conversation: Option<Conversation>) {
        self.update(|snapshot| {
            if snapshot.current == conversation {
                return false;
            }
            snapshot.current = conversation;
            true
        });
    }

    pub fn set_conversations(&self, conversations: Vec<ConversationSummary>) {
        self.update(|snapshot| {
            if snapshot.conversations == conversations {
                return false;
            }
            snapshot.conversations = conversations;
            true
        });
    }

    pub fn clear_error(&self) {
        self.update(|snapshot| snapshot.last_error.take().is_some());
    }
}
