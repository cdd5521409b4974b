//! Process-local keyed locks
//!
//! Marks a key (an answer id, a paper-session id) as busy for as long as a
//! `KeyPermit` is alive. Acquisition never waits: a held key is reported to
//! the caller, who turns it into a conflict response.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::trace;

/// Map of currently held keys to the instant they were taken
pub struct KeyedLocks<K>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
{
    held: Arc<DashMap<K, Instant>>,
}

impl<K> Clone for KeyedLocks<K>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self { held: self.held.clone() }
    }
}

impl<K> Default for KeyedLocks<K>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> KeyedLocks<K>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self { held: Arc::new(DashMap::new()) }
    }

    /// Take the key if nobody holds it
    pub fn try_acquire(&self, key: K) -> Option<KeyPermit<K>> {
        match self.held.entry(key.clone()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                slot.insert(Instant::now());
                trace!(key = ?key, "Key acquired");
                Some(KeyPermit {
                    key,
                    held: self.held.clone(),
                })
            }
        }
    }

    pub fn is_locked(&self, key: &K) -> bool {
        self.held.contains_key(key)
    }

    /// Held keys with how long each has been held
    pub fn held(&self) -> Vec<(K, Duration)> {
        self.held
            .iter()
            .map(|e| (e.key().clone(), e.value().elapsed()))
            .collect()
    }
}

/// Proof of holding a key; dropping it frees the key
#[must_use = "the key is released as soon as the permit is dropped"]
pub struct KeyPermit<K>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
{
    key: K,
    held: Arc<DashMap<K, Instant>>,
}

impl<K> KeyPermit<K>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
{
    pub fn key(&self) -> &K {
        &self.key
    }
}

impl<K> Debug for KeyPermit<K>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPermit").field("key", &self.key).finish()
    }
}

impl<K> Drop for KeyPermit<K>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
{
    fn drop(&mut self) {
        self.held.remove(&self.key);
        trace!(key = ?self.key, "Key released");
    }
}
