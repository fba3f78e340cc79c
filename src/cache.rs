//! In-memory bounded LRU cache for coding results.
//!
//! Keys on the exact `(question, response)` string pair. Capacity is fixed;
//! once full, the least-recently-used entry is evicted. Not persisted across
//! process restarts. A plain `Mutex` serializes access; throughput is a
//! handful of interactive requests, not a hot path.
//!
//! Results carrying an `error` are never stored: a transient transport
//! failure must stay retryable instead of being pinned for the session.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;

use crate::interpret::CodingResult;

pub const DEFAULT_CAPACITY: usize = 256;

type Key = (String, String);

struct Inner {
    entries: HashMap<Key, (u64, CodingResult)>,
    // Monotonic counter; the entry with the smallest stamp is the LRU.
    clock: u64,
}

/// Memoizes identical coding requests for the lifetime of the process.
pub struct SessionCache {
    capacity: usize,
    inner: Mutex<Inner>,
}

impl SessionCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                clock: 0,
            }),
        }
    }

    /// Return the cached result for the pair, or run `compute` and cache its
    /// output. Sequential identical calls invoke `compute` at most once.
    ///
    /// The lock is released while `compute` runs; two racing callers with the
    /// same key may both compute, and the later insert wins. Acceptable for
    /// the interactive workloads this serves.
    pub async fn get_or_compute<F, Fut>(
        &self,
        question: &str,
        response: &str,
        compute: F,
    ) -> CodingResult
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = CodingResult>,
    {
        let key = (question.to_string(), response.to_string());

        if let Some(hit) = self.get(&key) {
            return hit;
        }

        let result = compute().await;
        if !result.is_error() {
            self.insert(key, result.clone());
        }
        result
    }

    fn get(&self, key: &Key) -> Option<CodingResult> {
        let mut inner = self.lock();
        inner.clock += 1;
        let stamp = inner.clock;
        inner.entries.get_mut(key).map(|(used, result)| {
            *used = stamp;
            result.clone()
        })
    }

    fn insert(&self, key: Key, result: CodingResult) {
        let mut inner = self.lock();
        inner.clock += 1;
        let stamp = inner.clock;

        if inner.entries.len() >= self.capacity && !inner.entries.contains_key(&key) {
            if let Some(lru) = inner
                .entries
                .iter()
                .min_by_key(|(_, (used, _))| *used)
                .map(|(k, _)| k.clone())
            {
                inner.entries.remove(&lru);
            }
        }

        inner.entries.insert(key, (stamp, result));
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A poisoned lock means a panic mid-insert; the map itself is still
        // structurally sound, so keep serving.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for SessionCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
