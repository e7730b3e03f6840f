/*!
 * Coalescing work queue.
 *
 * Writers insert keyed values; a later insert for the same key replaces the
 * earlier one. A single reader waits until something is pending and then
 * drains everything at once.
 */
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;

use tokio::sync::Notify;

/// Last-write-wins map with a wake-up signal for its reader
#[derive(Debug)]
pub struct CoalescingQueue<K, V> {
    pending: Mutex<HashMap<K, V>>,
    ready: Notify,
}

impl<K: Eq + Hash, V> CoalescingQueue<K, V> {
    /// Create an empty queue
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            ready: Notify::new(),
        }
    }

    /// Record `value` for `key`, replacing anything pending for that key
    pub fn insert(&self, key: K, value: V) {
        {
            let mut pending = self.lock();
            pending.insert(key, value);
        }
        self.ready.notify_one();
    }

    /// Whether nothing is pending
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Number of pending keys
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Wait until at least one key is pending. Returns immediately if the
    /// queue is already non-empty.
    pub async fn wait_for_non_empty(&self) {
        loop {
            let notified = self.ready.notified();
            if !self.is_empty() {
                return;
            }
            notified.await;
        }
    }

    /// Take everything pending, leaving the queue empty
    pub fn drain(&self) -> HashMap<K, V> {
        std::mem::take(&mut *self.lock())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<K, V>> {
        // A panic while holding the lock cannot leave the map half-updated.
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<K: Eq + Hash, V> Default for CoalescingQueue<K, V> {
    fn default() -> Self {
        Self::new()
    }
}
