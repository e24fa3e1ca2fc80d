//! Exclusive-by-key coordination, used by `OcspValidator` to coalesce
//! concurrent fetches for the same cache key.
//!
//! Mirrors the per-URL lock map `crl::cache::CrlCache` keeps internally:
//! a map of lazily-created, never-released `tokio::sync::Mutex` guards so
//! that at most one fetch per key runs concurrently, while unrelated keys
//! proceed independently. The map only grows with the set of distinct
//! live keys, which is bounded in practice.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Per-key mutex map. Locks are created on first use and never removed;
/// removing them would race a concurrent waiter that already cloned the
/// `Arc` for the same key.
#[derive(Debug, Default)]
pub struct KeyedLocker {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl KeyedLocker {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Get (creating if absent) the lock for `key`.
    pub fn get(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Number of distinct keys ever locked. Test/diagnostic only.
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}
