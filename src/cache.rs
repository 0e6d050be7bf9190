//! Cache Layer (spec §4.10): rate-limit counters, idempotent probe dedup,
//! and per-tenant rate-limit config maps, behind a trait so a null backend
//! is a legitimate deployment choice.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;

#[async_trait]
pub trait Cache: Send + Sync {
    async fn incr(&self, key: &str) -> u64;
    async fn expire(&self, key: &str, ttl: Duration);
    async fn get(&self, key: &str) -> Option<String>;
    async fn hgetall(&self, key: &str) -> HashMap<String, String>;
    async fn hset(&self, key: &str, fields: HashMap<String, String>);
}

struct Entry {
    value: String,
    counter: u64,
    hash: HashMap<String, String>,
    expires_at: Option<Instant>,
}

impl Default for Entry {
    fn default() -> Self {
        Self { value: String::new(), counter: 0, hash: HashMap::new(), expires_at: None }
    }
}

/// Single-process cache backend (spec §4.10 "implementer chooses storage").
/// Good enough for one orchestrator instance; horizontal scale needs an
/// external backend behind the same trait.
#[derive(Default)]
pub struct InMemoryCache {
    entries: Mutex<HashMap<String, Entry>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn is_live(entry: &Entry) -> bool {
        entry.expires_at.map(|at| Instant::now() < at).unwrap_or(true)
    }
}

#[async_trait]
impl Cache for InMemoryCache {
    async fn incr(&self, key: &str) -> u64 {
        let mut entries = self.entries.lock().await;
        let entry = entries.entry(key.to_string()).or_default();
        if !Self::is_live(entry) {
            *entry = Entry::default();
        }
        entry.counter += 1;
        entry.counter
    }

    async fn expire(&self, key: &str, ttl: Duration) {
        let mut entries = self.entries.lock().await;
        if let Some(entry) = entries.get_mut(key) {
            entry.expires_at = Some(Instant::now() + ttl);
        }
    }

    async fn get(&self, key: &str) -> Option<String> {
        let entries = self.entries.lock().await;
        entries.get(key).filter(|e| Self::is_live(e)).map(|e| e.value.clone())
    }

    async fn hgetall(&self, key: &str) -> HashMap<String, String> {
        let entries = self.entries.lock().await;
        entries.get(key).filter(|e| Self::is_live(e)).map(|e| e.hash.clone()).unwrap_or_default()
    }

    async fn hset(&self, key: &str, fields: HashMap<String, String>) {
        let mut entries = self.entries.lock().await;
        let entry = entries.entry(key.to_string()).or_default();
        entry.hash.extend(fields);
    }
}

/// No-op backend: every read misses, every write is discarded. All callers
/// must already treat cache misses as "proceed without the optimization"
/// (spec §4.10: "all cache misses degrade gracefully").
#[derive(Default)]
pub struct NullCache;

#[async_trait]
impl Cache for NullCache {
    async fn incr(&self, _key: &str) -> u64 {
        1
    }
    async fn expire(&self, _key: &str, _ttl: Duration) {}
    async fn get(&self, _key: &str) -> Option<String> {
        None
    }
    async fn hgetall(&self, _key: &str) -> HashMap<String, String> {
        HashMap::new()
    }
    async fn hset(&self, _key: &str, _fields: HashMap<String, String>) {}
}
