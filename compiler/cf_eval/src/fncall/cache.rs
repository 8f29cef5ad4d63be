//! Memoization of `CACHED` function results.

use std::collections::VecDeque;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use cf_ir::Rval;

#[derive(Debug, Default)]
struct CacheInner {
    entries: FxHashMap<String, Rval>,
    /// Insertion order, oldest first.
    order: VecDeque<String>,
}

/// Results keyed by the textual form of the resolved call, `name(a,b)`.
///
/// Lock-protected so the cache can be shared across threads. When full,
/// the oldest entry is evicted.
#[derive(Debug)]
pub struct FnCallCache {
    inner: RwLock<CacheInner>,
    capacity: usize,
}

impl FnCallCache {
    pub fn new(capacity: usize) -> Self {
        FnCallCache {
            inner: RwLock::new(CacheInner::default()),
            capacity,
        }
    }

    pub fn get(&self, key: &str) -> Option<Rval> {
        self.inner.read().entries.get(key).cloned()
    }

    pub fn insert(&self, key: String, value: Rval) {
        if self.capacity == 0 {
            return;
        }
        let mut inner = self.inner.write();
        if inner.entries.contains_key(&key) {
            inner.entries.insert(key, value);
            return;
        }
        while inner.entries.len() >= self.capacity {
            let Some(oldest) = inner.order.pop_front() else {
                break;
            };
            inner.entries.remove(&oldest);
        }
        inner.order.push_back(key.clone());
        inner.entries.insert(key, value);
    }

    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.entries.clear();
        inner.order.clear();
    }
}
