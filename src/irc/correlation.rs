//! Single-fire correlation table.
//!
//! Turns a fire-and-forget outbound IRC command into an awaitable response.
//! Each awaitable kind (registration, join, whois) keeps its own table keyed
//! by the identifying string (nick, bare channel name, ...). A waiter
//! registers a slot before sending its command; the dispatch loop looks the
//! key up under a read lock and fires the slot at most once.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{oneshot, RwLock};

type Slot<T> = Arc<std::sync::Mutex<Option<oneshot::Sender<T>>>>;

/// A table of single-fire callbacks keyed by correlation id.
pub struct CorrelationTable<T> {
    slots: RwLock<HashMap<String, Slot<T>>>,
}

impl<T> Default for CorrelationTable<T> {
    fn default() -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
        }
    }
}

impl<T> CorrelationTable<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a waiter for `key`, returning the receiver half. Overwrites
    /// any prior waiter on the same key (the old receiver simply never
    /// fires, which is fine — it corresponds to an abandoned register/join).
    pub async fn register(&self, key: impl Into<String>) -> oneshot::Receiver<T> {
        let (tx, rx) = oneshot::channel();
        let slot = Arc::new(std::sync::Mutex::new(Some(tx)));
        self.slots.write().await.insert(key.into(), slot);
        rx
    }

    /// Removes any waiter registered under `key` without firing it.
    pub async fn remove(&self, key: &str) {
        self.slots.write().await.remove(key);
    }

    /// Looks `key` up under a read lock and fires its slot, if present and
    /// not already fired. A miss is not an error — it means nobody is
    /// waiting on this correlation id right now.
    pub async fn fire(&self, key: &str, value: T) {
        let slots = self.slots.read().await;
        if let Some(slot) = slots.get(key) {
            if let Some(tx) = slot.lock().unwrap().take() {
                let _ = tx.send(value);
            }
        }
    }
}
