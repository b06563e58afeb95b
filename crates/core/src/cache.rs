//! Search result cache.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::episode::EpisodeRecord;

/// Cache key for a search: `query|season`, case-insensitive on the query.
pub fn cache_key(query: &str, season: Option<u32>) -> String {
    let season = season.map(|s| s.to_string()).unwrap_or_default();
    format!("{}|{}", query.trim().to_lowercase(), season)
}

#[async_trait]
pub trait SearchCache: Send + Sync {
    async fn get(&self, key: &str) -> Option<Vec<EpisodeRecord>>;

    async fn put(&self, key: &str, records: Vec<EpisodeRecord>);
}

struct Entry {
    stored_at: Instant,
    records: Vec<EpisodeRecord>,
}

/// In-memory cache with a fixed time-to-live. A zero TTL disables it.
pub struct MemorySearchCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, Entry>>,
}

impl MemorySearchCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl SearchCache for MemorySearchCache {
    async fn get(&self, key: &str) -> Option<Vec<EpisodeRecord>> {
        if self.ttl.is_zero() {
            return None;
        }
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|entry| entry.stored_at.elapsed() < self.ttl)
            .map(|entry| entry.records.clone())
    }

    async fn put(&self, key: &str, records: Vec<EpisodeRecord>) {
        if self.ttl.is_zero() {
            return;
        }
        let mut entries = self.entries.write().await;
        let ttl = self.ttl;
        entries.retain(|_, entry| entry.stored_at.elapsed() < ttl);
        entries.insert(
            key.to_string(),
            Entry {
                stored_at: Instant::now(),
                records,
            },
        );
    }
}
