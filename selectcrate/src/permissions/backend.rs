//! Pluggable storage for cached permission decisions.
//!
//! A backend stores two kinds of values: boolean decisions that expire, and
//! version counters that do not. Backends that can increment a counter
//! atomically should say so through [`CacheBackend::supports_atomic_increment`];
//! everyone else gets a read-increment-write fallback from
//! [`PermissionCache`](super::PermissionCache).

use async_trait::async_trait;
use moka::{Expiry, future::Cache};
use std::time::{Duration, Instant};

use crate::errors::CacheError;

/// A value held by a [`CacheBackend`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheValue {
    Decision(bool),
    Version(u64),
}

#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Fetch a value. `Ok(None)` is a miss.
    async fn get(&self, key: &str) -> Result<Option<CacheValue>, CacheError>;

    /// Store a value. `ttl = None` keeps it until evicted for capacity.
    async fn set(&self, key: &str, value: CacheValue, ttl: Option<Duration>) -> Result<(), CacheError>;

    /// Atomically increment a version counter, starting from zero, and return
    /// the new value.
    async fn incr(&self, _key: &str) -> Result<u64, CacheError> {
        Err(CacheError::Unsupported("atomic increment"))
    }

    fn supports_atomic_increment(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    value: CacheValue,
    ttl: Option<Duration>,
}

struct EntryExpiry;

impl Expiry<String, Entry> for EntryExpiry {
    fn expire_after_create(&self, _key: &String, entry: &Entry, _created_at: Instant) -> Option<Duration> {
        entry.ttl
    }

    fn expire_after_update(
        &self,
        _key: &String,
        entry: &Entry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        entry.ttl
    }
}

/// In-process backend on top of Moka with per-entry expiry.
#[derive(Clone)]
pub struct MemoryBackend {
    entries: Cache<String, Entry>,
}

impl std::fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBackend")
            .field("entry_count", &self.entries.entry_count())
            .finish()
    }
}

impl MemoryBackend {
    #[must_use]
    pub fn new(max_capacity: u64) -> Self {
        let entries = Cache::builder()
            .max_capacity(max_capacity)
            .expire_after(EntryExpiry)
            .build();
        Self { entries }
    }

    /// Runs pending evictions. Useful for testing TTL behavior.
    pub async fn run_pending_tasks(&self) {
        self.entries.run_pending_tasks().await;
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new(100_000)
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<CacheValue>, CacheError> {
        Ok(self.entries.get(key).await.map(|entry| entry.value))
    }

    async fn set(&self, key: &str, value: CacheValue, ttl: Option<Duration>) -> Result<(), CacheError> {
        self.entries.insert(key.to_string(), Entry { value, ttl }).await;
        Ok(())
    }

    async fn incr(&self, key: &str) -> Result<u64, CacheError> {
        let entry = self
            .entries
            .entry(key.to_string())
            .and_upsert_with(|existing| {
                let current = match existing.map(|e| e.into_value().value) {
                    Some(CacheValue::Version(n)) => n,
                    _ => 0,
                };
                std::future::ready(Entry {
                    value: CacheValue::Version(current.saturating_add(1)),
                    ttl: None,
                })
            })
            .await;

        match entry.into_value().value {
            CacheValue::Version(n) => Ok(n),
            CacheValue::Decision(_) => Err(CacheError::Backend(format!("{key} is not a counter"))),
        }
    }

    fn supports_atomic_increment(&self) -> bool {
        true
    }
}
