use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tracing::info;

use common::{resolve_rank_range, Result, Store};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS kv (
        key   TEXT PRIMARY KEY NOT NULL,
        value TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS zset (
        key    TEXT NOT NULL,
        member TEXT NOT NULL,
        score  INTEGER NOT NULL,
        PRIMARY KEY (key, member)
    )",
    "CREATE INDEX IF NOT EXISTS zset_rank ON zset (key, score, member)",
];

/// `Store` backed by SQLite through sqlx.
pub struct SqliteStore {
    db: SqlitePool,
}

impl SqliteStore {
    /// Connect and create the tables if needed.
    ///
    /// In-memory URLs get a single connection so every query sees the same database.
    pub async fn connect(url: &str) -> Result<Self> {
        let max_connections = if url.contains(":memory:") { 1 } else { 5 };
        let db = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        for statement in SCHEMA {
            sqlx::query(statement).execute(&db).await?;
        }
        info!(url, "SQLite store ready");
        Ok(Self { db })
    }

    async fn rank_range(&self, key: &str, start: i64, stop: i64) -> Result<Option<(i64, i64)>> {
        let len = self.zcard(key).await? as usize;
        Ok(resolve_rank_range(len, start, stop)
            .map(|r| (r.start as i64, (r.end - r.start) as i64)))
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn set(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let value = sqlx::query_scalar::<_, String>("SELECT value FROM kv WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.db)
            .await?;
        Ok(value)
    }

    async fn zadd(&self, key: &str, score: i64, member: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO zset (key, member, score) VALUES (?1, ?2, ?3)
             ON CONFLICT(key, member) DO UPDATE SET score = excluded.score",
        )
        .bind(key)
        .bind(member)
        .bind(score)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn zrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>> {
        let Some((offset, limit)) = self.rank_range(key, start, stop).await? else {
            return Ok(Vec::new());
        };
        let members = sqlx::query_scalar::<_, String>(
            "SELECT member FROM zset WHERE key = ?1
             ORDER BY score, member LIMIT ?2 OFFSET ?3",
        )
        .bind(key)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db)
        .await?;
        Ok(members)
    }

    async fn zremrangebyrank(&self, key: &str, start: i64, stop: i64) -> Result<u64> {
        let Some((offset, limit)) = self.rank_range(key, start, stop).await? else {
            return Ok(0);
        };
        let done = sqlx::query(
            "DELETE FROM zset WHERE rowid IN (
                SELECT rowid FROM zset WHERE key = ?1
                ORDER BY score, member LIMIT ?2 OFFSET ?3
             )",
        )
        .bind(key)
        .bind(limit)
        .bind(offset)
        .execute(&self.db)
        .await?;
        Ok(done.rows_affected())
    }

    async fn zcard(&self, key: &str) -> Result<u64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM zset WHERE key = ?1")
            .bind(key)
            .fetch_one(&self.db)
            .await?;
        Ok(count.max(0) as u64)
    }
}
