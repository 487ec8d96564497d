//! In-process chat message store
//!
//! `ChatStore` is the default `MessageAdapter`: an explicit container for a
//! surface's message list and running flag. Hosts subscribe to the revision
//! counter to learn when to re-render.

use crate::adapter::MessageAdapter;
use crate::types::{ChatMessage, Role};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::watch;

/// Message list plus running flag, shared between engine and host
pub struct ChatStore {
    messages: RwLock<Vec<ChatMessage>>,
    running: AtomicBool,

    /// Bumped on every mutation
    revision: watch::Sender<u64>,
}

impl Default for ChatStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatStore {
    pub fn new() -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            messages: RwLock::new(Vec::new()),
            running: AtomicBool::new(false),
            revision,
        }
    }

    /// Receiver that changes whenever the list or running flag changes
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Last message, if any
    pub fn last(&self) -> Option<ChatMessage> {
        self.read().last().cloned()
    }

    /// Newest assistant message
    ///
    /// Steering appends user messages after the assistant message a turn
    /// is still writing into, so the tail of the list is not always it.
    pub fn last_assistant(&self) -> Option<ChatMessage> {
        self.read()
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .cloned()
    }

    pub fn get(&self, id: &str) -> Option<ChatMessage> {
        self.read().iter().find(|m| m.id == id).cloned()
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<ChatMessage>> {
        self.messages.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<ChatMessage>> {
        self.messages.write().unwrap_or_else(|p| p.into_inner())
    }

    fn bump(&self) {
        self.revision.send_modify(|r| *r += 1);
    }
}

impl MessageAdapter for ChatStore {
    fn messages(&self) -> Vec<ChatMessage> {
        self.read().clone()
    }

    fn push(&self, message: ChatMessage) {
        self.write().push(message);
        self.bump();
    }

    fn update(&self, id: &str, f: &mut dyn FnMut(&mut ChatMessage)) -> bool {
        let found = {
            let mut messages = self.write();
            match messages.iter_mut().find(|m| m.id == id) {
                Some(message) => {
                    f(message);
                    true
                }
                None => false,
            }
        };
        if found {
            self.bump();
        }
        found
    }

    fn remove(&self, id: &str) -> bool {
        let removed = {
            let mut messages = self.write();
            let before = messages.len();
            messages.retain(|m| m.id != id);
            messages.len() != before
        };
        if removed {
            self.bump();
        }
        removed
    }

    fn replace_all(&self, messages: Vec<ChatMessage>) {
        *self.write() = messages;
        self.bump();
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn set_running(&self, running: bool) {
        if self.running.swap(running, Ordering::SeqCst) != running {
            self.bump();
        }
    }

    fn contains(&self, id: &str) -> bool {
        self.read().iter().any(|m| m.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_update_remove() {
        let store = ChatStore::new();
        let msg = ChatMessage::user("hello", Vec::new());
        let id = msg.id.clone();
        store.push(msg);
        assert_eq!(store.len(), 1);

        assert!(store.update(&id, &mut |m| m.content.push_str(" world")));
        assert_eq!(store.get(&id).unwrap().content, "hello world");
        assert!(!store.update("missing", &mut |m| m.content.clear()));

        assert!(store.remove(&id));
        assert!(!store.remove(&id));
        assert!(store.is_empty());
    }

    #[test]
    fn test_revision_bumps() {
        let store = ChatStore::new();
        let rx = store.subscribe();
        assert_eq!(store.revision(), 0);

        store.push(ChatMessage::assistant());
        store.set_running(true);
        // Setting the same value again is not a change
        store.set_running(true);
        assert_eq!(store.revision(), 2);
        assert!(rx.has_changed().unwrap());

        store.replace_all(Vec::new());
        assert_eq!(store.revision(), 3);
        assert!(store.is_empty());
    }

    #[test]
    fn test_last_assistant_skips_trailing_user_messages() {
        let store = ChatStore::new();
        assert!(store.last_assistant().is_none());

        store.push(ChatMessage::user("first", Vec::new()));
        let reply = ChatMessage::assistant();
        let reply_id = reply.id.clone();
        store.push(reply);
        store.push(ChatMessage::user("also this", Vec::new()));

        assert_eq!(store.last().unwrap().role, Role::User);
        assert_eq!(store.last_assistant().unwrap().id, reply_id);
    }

    #[test]
    fn test_running_flag() {
        let store = ChatStore::default();
        assert!(!store.is_running());
        store.set_running(true);
        assert!(store.is_running());
        store.set_running(false);
        assert!(!store.is_running());
    }
}
