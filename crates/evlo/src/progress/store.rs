use std::time::{Duration, Instant};

use moka::sync::Cache;
use moka::Expiry;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Key-value store unavailable: {0}")]
    Unavailable(String),
}

/// String key-value store where every write carries its own TTL.
pub trait KeyValueStore: Send + Sync {
    fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError>;

    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

#[derive(Clone)]
struct StoredValue {
    value: String,
    ttl: Duration,
}

struct PerEntryTtl;

impl Expiry<String, StoredValue> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &StoredValue,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &StoredValue,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// In-process store backed by a bounded `moka` cache.
#[derive(Clone)]
pub struct InMemoryStore {
    cache: Cache<String, StoredValue>,
}

impl InMemoryStore {
    pub fn new(max_entries: u64) -> Self {
        Self {
            cache: Cache::builder()
                .max_capacity(max_entries)
                .expire_after(PerEntryTtl)
                .build(),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new(10_000)
    }
}

impl KeyValueStore for InMemoryStore {
    fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError> {
        self.cache.insert(key.to_string(), StoredValue { value, ttl });
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.cache.get(key).map(|stored| stored.value))
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.cache.invalidate(key);
        Ok(())
    }
}
