//! De-duplicating work queue with re-prioritisation.

use std::collections::{HashSet, VecDeque};
use std::hash::Hash;

/// FIFO of pending keys in which each key appears at most once.
///
/// Pushing a key that is already queued moves it to the front instead of
/// adding a second copy, so whatever the user looked at last is served
/// first.
#[derive(Debug)]
pub struct WorkQueue<K> {
    queue: VecDeque<K>,
    seen: HashSet<K>,
}

impl<K> Default for WorkQueue<K> {
    fn default() -> Self {
        Self {
            queue: VecDeque::new(),
            seen: HashSet::new(),
        }
    }
}

impl<K: Eq + Hash + Clone> WorkQueue<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.seen.contains(key)
    }

    /// Queues `key` at the back, or moves it to the front if already queued.
    /// Returns `true` if the key was new.
    pub fn push(&mut self, key: K) -> bool {
        if self.seen.contains(&key) {
            if let Some(pos) = self.queue.iter().position(|k| *k == key) {
                if let Some(existing) = self.queue.remove(pos) {
                    self.queue.push_front(existing);
                }
            }
            return false;
        }
        self.seen.insert(key.clone());
        self.queue.push_back(key);
        true
    }

    pub fn pop(&mut self) -> Option<K> {
        let key = self.queue.pop_front()?;
        self.seen.remove(&key);
        Some(key)
    }

    /// Drops `key` if it is waiting.
    pub fn remove(&mut self, key: &K) {
        if self.seen.remove(key) {
            self.queue.retain(|k| k != key);
        }
    }

    pub fn clear(&mut self) {
        self.queue.clear();
        self.seen.clear();
    }
}
