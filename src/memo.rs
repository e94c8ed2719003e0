//! Identity-keyed memoization
//!
//! Schema and optic nodes are immutable and shared through `Arc`, so the
//! allocation address is a stable identity for as long as the node lives.
//! Entries hold a `Weak` to the key: the allocation cannot be reused while
//! the entry exists, and entries whose key has been dropped are purged.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};

const PURGE_INTERVAL: usize = 256;

/// A cache from `Arc<T>` identity to a computed `V`
pub struct IdentityMemo<T, V> {
    inner: Mutex<MemoTable<T, V>>,
}

struct MemoTable<T, V> {
    entries: HashMap<usize, (Weak<T>, V)>,
    inserts: usize,
}

impl<T, V: Clone> IdentityMemo<T, V> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MemoTable {
                entries: HashMap::new(),
                inserts: 0,
            }),
        }
    }

    pub fn get(&self, key: &Arc<T>) -> Option<V> {
        let table = self.inner.lock();
        table
            .entries
            .get(&address(key))
            .filter(|(weak, _)| weak.strong_count() > 0)
            .map(|(_, value)| value.clone())
    }

    /// Return the cached value or compute it.
    ///
    /// The lock is not held while `compute` runs, so recursive lookups from
    /// inside `compute` are fine. If two computations race, the first stored
    /// value wins and is returned to both callers.
    pub fn get_or_insert_with(&self, key: &Arc<T>, compute: impl FnOnce() -> V) -> V {
        if let Some(value) = self.get(key) {
            return value;
        }
        let value = compute();
        let mut table = self.inner.lock();
        let addr = address(key);
        if let Some((weak, existing)) = table.entries.get(&addr) {
            if weak.strong_count() > 0 {
                return existing.clone();
            }
        }
        table.inserts += 1;
        if table.inserts % PURGE_INTERVAL == 0 {
            table.entries.retain(|_, (weak, _)| weak.strong_count() > 0);
        }
        table
            .entries
            .insert(addr, (Arc::downgrade(key), value.clone()));
        value
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T, V: Clone> Default for IdentityMemo<T, V> {
    fn default() -> Self {
        Self::new()
    }
}

fn address<T>(key: &Arc<T>) -> usize {
    Arc::as_ptr(key) as *const () as usize
}
