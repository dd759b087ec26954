//! In-memory conversation history.
//!
//! Each conversation key owns a bounded, chronological deque of turns. When a deque
//! grows past the configured cap the oldest turns are dropped first. Nothing here is
//! persisted; a restart forgets every conversation.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;

use crate::config::HistoryScope;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConversationKey {
    User(u64),
    Channel(u64),
}

impl ConversationKey {
    pub fn for_scope(scope: HistoryScope, user_id: u64, channel_id: u64) -> Self {
        match scope {
            HistoryScope::User => ConversationKey::User(user_id),
            HistoryScope::Channel => ConversationKey::Channel(channel_id),
        }
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversationKey::User(id) => write!(f, "user:{}", id),
            ConversationKey::Channel(id) => write!(f, "channel:{}", id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

pub struct ConversationStore {
    max_turns: usize,
    histories: Mutex<HashMap<ConversationKey, VecDeque<Turn>>>,
    locks: Mutex<HashMap<ConversationKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl ConversationStore {
    /// A cap of zero is treated as one.
    pub fn new(max_turns: usize) -> Self {
        Self {
            max_turns: max_turns.max(1),
            histories: Mutex::new(HashMap::new()),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn append(&self, key: ConversationKey, role: Role, content: impl Into<String>) {
        let mut histories = self.histories.lock().unwrap_or_else(|e| e.into_inner());
        let history = histories.entry(key).or_default();
        Self::push_bounded(history, Turn::new(role, content), self.max_turns);
    }

    /// Appends a user turn and its reply under a single lock so no reader sees half an exchange.
    pub fn record_exchange(
        &self,
        key: ConversationKey,
        user_message: impl Into<String>,
        assistant_reply: impl Into<String>,
    ) {
        let mut histories = self.histories.lock().unwrap_or_else(|e| e.into_inner());
        let history = histories.entry(key).or_default();
        Self::push_bounded(history, Turn::new(Role::User, user_message), self.max_turns);
        Self::push_bounded(
            history,
            Turn::new(Role::Assistant, assistant_reply),
            self.max_turns,
        );
    }

    fn push_bounded(history: &mut VecDeque<Turn>, turn: Turn, max_turns: usize) {
        history.push_back(turn);
        while history.len() > max_turns {
            history.pop_front();
        }
    }

    pub fn reset(&self, key: ConversationKey) {
        let mut histories = self.histories.lock().unwrap_or_else(|e| e.into_inner());
        histories.remove(&key);
        drop(histories);
        self.release_lock(key);
    }

    pub fn clear_all(&self) {
        let mut histories = self.histories.lock().unwrap_or_else(|e| e.into_inner());
        histories.clear();
        drop(histories);

        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.retain(|_, key_lock| Arc::strong_count(key_lock) > 1);
    }

    /// Forgets the key's lock unless a guard or waiter still holds it. Callers that hold
    /// the guard should call this again after dropping it.
    pub fn release_lock(&self, key: ConversationKey) {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        if locks
            .get(&key)
            .is_some_and(|key_lock| Arc::strong_count(key_lock) == 1)
        {
            locks.remove(&key);
        }
    }

    /// Oldest first. Empty when the key has no history.
    pub fn snapshot(&self, key: ConversationKey) -> Vec<Turn> {
        let histories = self.histories.lock().unwrap_or_else(|e| e.into_inner());
        histories
            .get(&key)
            .map(|history| history.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self, key: ConversationKey) -> usize {
        let histories = self.histories.lock().unwrap_or_else(|e| e.into_inner());
        histories.get(&key).map_or(0, VecDeque::len)
    }

    /// Serializes work on one key. Different keys never contend.
    pub async fn lock(&self, key: ConversationKey) -> OwnedMutexGuard<()> {
        let key_lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks.entry(key).or_default().clone()
        };
        key_lock.lock_owned().await
    }

    #[cfg(test)]
    fn lock_entries(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
