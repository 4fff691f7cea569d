use std::ops::Range;

use async_trait::async_trait;

use crate::Result;

/// Abstraction over the durable key / sorted-set store.
///
/// `MemoryStore` implements this in-process, `SqliteStore` on top of SQLite.
/// Keys are opaque strings. Sorted sets are ordered by `score` (the event
/// timestamp in milliseconds), ties broken by member, and ranks follow the
/// usual convention: `0` is the oldest entry and `-1` the newest.
#[async_trait]
pub trait Store: Send + Sync {
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Insert `member` with `score`, or move it to `score` if already present.
    async fn zadd(&self, key: &str, score: i64, member: &str) -> Result<()>;

    /// Members with rank in `start..=stop`, oldest first.
    async fn zrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>>;

    /// Remove members with rank in `start..=stop`. Returns the number removed.
    async fn zremrangebyrank(&self, key: &str, start: i64, stop: i64) -> Result<u64>;

    async fn zcard(&self, key: &str) -> Result<u64>;

    /// Keep only the newest `cap` members of a sorted set.
    async fn trim_to(&self, key: &str, cap: usize) -> Result<u64> {
        let keep = i64::try_from(cap).unwrap_or(i64::MAX - 1);
        self.zremrangebyrank(key, 0, -keep - 1).await
    }
}

/// Resolve an inclusive rank pair (negative = from the end) against a set of
/// `len` members. Returns `None` when the range selects nothing.
pub fn resolve_rank_range(len: usize, start: i64, stop: i64) -> Option<Range<usize>> {
    let len = i64::try_from(len).ok()?;
    let start = if start < 0 { (start + len).max(0) } else { start };
    let stop = if stop < 0 { stop + len } else { stop.min(len - 1) };
    if len == 0 || start >= len || stop < 0 || start > stop {
        return None;
    }
    Some(start as usize..stop as usize + 1)
}
