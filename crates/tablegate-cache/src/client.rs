//! The cache client seam and the in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::{CacheError, CacheKey};

/// Uniform access to the shared distributed cache.
///
/// Every method is async because the real backing store is remote: each
/// call is a suspension point, and the dispatch path must never block on
/// it. Reads may always be stale and writes may always race another
/// process's write — the cache itself is the serialization point, and the
/// documented policy is last-writer-wins.
///
/// There is no retry here. Backend failures surface to the caller of the
/// session-store operation in progress; retry/backoff, if any, belongs to
/// the concrete client.
///
/// # Trait bounds
///
/// `Send + Sync + 'static` because the client is shared across request
/// tasks for the life of the process.
pub trait CacheClient: Send + Sync + 'static {
    /// Reads the value at `key`. `Ok(None)` means the entry is absent —
    /// for session entries, that the session was invalidated elsewhere.
    async fn get(&self, key: &CacheKey) -> Result<Option<String>, CacheError>;

    /// Writes `value` at `key`, unconditionally overwriting.
    async fn set(&self, key: &CacheKey, value: &str) -> Result<(), CacheError>;

    /// Deletes the entry at `key`. Deleting an absent entry is not an error.
    async fn delete(&self, key: &CacheKey) -> Result<(), CacheError>;
}

// ---------------------------------------------------------------------------
// MemoryCache
// ---------------------------------------------------------------------------

/// An in-process [`CacheClient`] for development and tests.
///
/// Constructed from the same server-address list a real pool client would
/// take (the `cache_servers` config option); the list is recorded and
/// exposed through [`servers`](Self::servers) but all entries live in one
/// local map. Cloning yields a handle to the same underlying map, which is
/// how tests observe writes made by the code under test.
#[derive(Debug, Clone, Default)]
pub struct MemoryCache {
    servers: Vec<String>,
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryCache {
    /// Creates an empty cache, recording the configured server pool.
    pub fn new(servers: Vec<String>) -> Self {
        Self { servers, entries: Arc::new(Mutex::new(HashMap::new())) }
    }

    /// The configured server-address pool.
    pub fn servers(&self) -> &[String] {
        &self.servers
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.entries.lock().expect("cache mutex poisoned").len()
    }

    /// Returns `true` if the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CacheClient for MemoryCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<String>, CacheError> {
        let entries = self.entries.lock().expect("cache mutex poisoned");
        Ok(entries.get(key.as_str()).cloned())
    }

    async fn set(&self, key: &CacheKey, value: &str) -> Result<(), CacheError> {
        let mut entries = self.entries.lock().expect("cache mutex poisoned");
        entries.insert(key.as_str().to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &CacheKey) -> Result<(), CacheError> {
        let mut entries = self.entries.lock().expect("cache mutex poisoned");
        entries.remove(key.as_str());
        Ok(())
    }
}

// =========================================================================
// Tests
// =========================================================================
