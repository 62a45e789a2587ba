//! In-memory conversation threads.
//!
//! One mutex guards the thread map and the id counter; every operation
//! is a short critical section with no I/O inside. Thread ids come from
//! a single monotonically increasing counter and are never reused.
//! Messages are append-only and strictly ordered: each chat turn adds
//! the user message first and the bot reply second.

use anyhow::{bail, Result};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::models::ChatMessage;

pub struct ConversationStore {
    inner: Mutex<Inner>,
}

struct Inner {
    next_id: i64,
    threads: HashMap<i64, Vec<ChatMessage>>,
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                next_id: 1,
                threads: HashMap::new(),
            }),
        }
    }

    /// Create a new empty thread and return its id.
    pub fn create(&self) -> i64 {
        let mut inner = self.inner.lock().expect("thread lock poisoned");
        let id = inner.next_id;
        inner.next_id += 1;
        inner.threads.insert(id, Vec::new());
        id
    }

    /// Resolve the thread for a chat turn: allocate a fresh one when no
    /// id is supplied, otherwise require the id to exist.
    pub fn create_or_get(&self, thread_id: Option<i64>) -> Result<i64> {
        match thread_id {
            None => Ok(self.create()),
            Some(id) => {
                let inner = self.inner.lock().expect("thread lock poisoned");
                if inner.threads.contains_key(&id) {
                    Ok(id)
                } else {
                    bail!("Thread not found: {id}")
                }
            }
        }
    }

    /// Append a message to an existing thread.
    pub fn append(&self, thread_id: i64, message: ChatMessage) -> Result<()> {
        let mut inner = self.inner.lock().expect("thread lock poisoned");
        match inner.threads.get_mut(&thread_id) {
            Some(messages) => {
                messages.push(message);
                Ok(())
            }
            None => bail!("Thread not found: {thread_id}"),
        }
    }

    /// Snapshot of a thread's messages, in append order.
    pub fn messages(&self, thread_id: i64) -> Result<Vec<ChatMessage>> {
        let inner = self.inner.lock().expect("thread lock poisoned");
        match inner.threads.get(&thread_id) {
            Some(messages) => Ok(messages.clone()),
            None => bail!("Thread not found: {thread_id}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;

    #[test]
    fn test_ids_monotonic_and_unique() {
        let store = ConversationStore::new();
        let a = store.create();
        let b = store.create();
        let c = store.create();
        assert!(a < b && b < c);
    }

    #[test]
    fn test_create_or_get_unknown_id_fails() {
        let store = ConversationStore::new();
        let err = store.create_or_get(Some(99)).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_create_or_get_existing_id() {
        let store = ConversationStore::new();
        let id = store.create();
        assert_eq!(store.create_or_get(Some(id)).unwrap(), id);
        // Resolving an existing id must not allocate a new thread.
        let next = store.create();
        assert_eq!(next, id + 1);
    }

    #[test]
    fn test_turn_ordering_user_then_bot() {
        let store = ConversationStore::new();
        let id = store.create();
        for turn in 1..=3 {
            store
                .append(id, ChatMessage::user(format!("q{turn}")))
                .unwrap();
            store.append(id, ChatMessage::bot(format!("a{turn}"))).unwrap();
        }

        let messages = store.messages(id).unwrap();
        assert_eq!(messages.len(), 6);
        for (i, msg) in messages.iter().enumerate() {
            let expected = if i % 2 == 0 { Role::User } else { Role::Bot };
            assert_eq!(msg.role, expected);
        }
        assert_eq!(messages[4].content, "q3");
        assert_eq!(messages[5].content, "a3");
    }

    #[test]
    fn test_append_unknown_thread_fails() {
        let store = ConversationStore::new();
        assert!(store.append(7, ChatMessage::user("hi")).is_err());
        assert!(store.messages(7).is_err());
    }

    #[test]
    fn test_concurrent_threads_stay_isolated() {
        use std::sync::Arc;

        let store = Arc::new(ConversationStore::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            handles.push(std::thread::spawn(move || {
                let id = store.create();
                for turn in 0..20 {
                    store.append(id, ChatMessage::user(format!("q{turn}"))).unwrap();
                    store.append(id, ChatMessage::bot(format!("a{turn}"))).unwrap();
                }
                id
            }));
        }

        for handle in handles {
            let id = handle.join().unwrap();
            let messages = store.messages(id).unwrap();
            assert_eq!(messages.len(), 40);
            for (i, msg) in messages.iter().enumerate() {
                let expected = if i % 2 == 0 { Role::User } else { Role::Bot };
                assert_eq!(msg.role, expected);
            }
        }
    }
}
