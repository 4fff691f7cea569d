use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use common::{resolve_rank_range, Result, Store};

/// In-process `Store`. Used when no database is configured, and in tests.
///
/// Sorted sets are kept as `(score, member)` vectors in rank order.
#[derive(Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, String>>,
    sets: RwLock<HashMap<String, Vec<(i64, String)>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.values.write().await.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.read().await.get(key).cloned())
    }

    async fn zadd(&self, key: &str, score: i64, member: &str) -> Result<()> {
        let mut sets = self.sets.write().await;
        let set = sets.entry(key.to_string()).or_default();
        if let Some(idx) = set.iter().position(|(_, m)| m == member) {
            set.remove(idx);
        }
        // Insert after every entry that sorts before (score, member).
        let at = set.partition_point(|(s, m)| (*s, m.as_str()) < (score, member));
        set.insert(at, (score, member.to_string()));
        Ok(())
    }

    async fn zrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>> {
        let sets = self.sets.read().await;
        let Some(set) = sets.get(key) else {
            return Ok(Vec::new());
        };
        Ok(match resolve_rank_range(set.len(), start, stop) {
            Some(range) => set[range].iter().map(|(_, m)| m.clone()).collect(),
            None => Vec::new(),
        })
    }

    async fn zremrangebyrank(&self, key: &str, start: i64, stop: i64) -> Result<u64> {
        let mut sets = self.sets.write().await;
        let Some(set) = sets.get_mut(key) else {
            return Ok(0);
        };
        let removed = match resolve_rank_range(set.len(), start, stop) {
            Some(range) => set.drain(range).count() as u64,
            None => 0,
        };
        if removed > 0 {
            debug!(key, removed, "Trimmed sorted set");
        }
        Ok(removed)
    }

    async fn zcard(&self, key: &str) -> Result<u64> {
        Ok(self.sets.read().await.get(key).map_or(0, |s| s.len() as u64))
    }
}
