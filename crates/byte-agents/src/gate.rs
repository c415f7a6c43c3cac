use byte_common::ConversationKey;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

/// Returned by [`ConversationGate::try_acquire`] when a cycle already holds
/// the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Busy;

/// Per-conversation mutual exclusion for response cycles.
///
/// One lock per key, created on first use and kept for the life of the
/// process. Cycles for different keys never block each other.
#[derive(Default)]
pub struct ConversationGate {
    locks: DashMap<ConversationKey, Arc<Mutex<()>>>,
}

/// Exclusive hold on one conversation, released on drop.
pub struct ConversationGuard {
    key: ConversationKey,
    _guard: OwnedMutexGuard<()>,
}

impl ConversationGuard {
    pub fn key(&self) -> &ConversationKey {
        &self.key
    }
}

impl Drop for ConversationGuard {
    fn drop(&mut self) {
        debug!(conversation = %self.key, "conversation lock released");
    }
}

impl ConversationGate {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, key: &ConversationKey) -> Arc<Mutex<()>> {
        // clone out so the map shard is not held while waiting on the lock
        Arc::clone(
            self.locks
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        )
    }

    /// Take the key's lock without waiting.
    pub fn try_acquire(&self, key: &ConversationKey) -> Result<ConversationGuard, Busy> {
        let guard = self.lock_for(key).try_lock_owned().map_err(|_| Busy)?;
        debug!(conversation = %key, "conversation lock acquired");
        Ok(ConversationGuard {
            key: key.clone(),
            _guard: guard,
        })
    }

    /// Wait for the key's lock. Used for writes that must not be dropped, such
    /// as passive context turns.
    pub async fn acquire(&self, key: &ConversationKey) -> ConversationGuard {
        let guard = self.lock_for(key).lock_owned().await;
        ConversationGuard {
            key: key.clone(),
            _guard: guard,
        }
    }

    /// Whether a cycle currently holds `key`.
    pub fn is_held(&self, key: &ConversationKey) -> bool {
        self.locks
            .get(key)
            .map(|lock| lock.try_lock().is_err())
            .unwrap_or(false)
    }

    /// Keys that have been seen so far.
    pub fn tracked_keys(&self) -> Vec<ConversationKey> {
        let mut keys: Vec<_> = self.locks.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }
}
