//! Redis backend.
//!
//! Primitives map one-to-one onto Redis commands. Every composite runs as
//! a Lua script, so `put`, `get`, reclamation and release are atomic on the
//! server.

use std::sync::LazyLock;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use tracing::debug;

use super::KeyValueStore;
use crate::error::Result;

/// KEYS: set, list. ARGV: member, record.
static ADD_UNIQUE_AND_APPEND: LazyLock<redis::Script> = LazyLock::new(|| {
    redis::Script::new(
        r"
        if redis.call('SADD', KEYS[1], ARGV[1]) == 0 then
            return 0
        end
        redis.call('RPUSH', KEYS[2], ARGV[2])
        return 1
        ",
    )
});

/// KEYS: list, expiry. ARGV: score.
static POP_AND_LEASE: LazyLock<redis::Script> = LazyLock::new(|| {
    redis::Script::new(
        r"
        local record = redis.call('LPOP', KEYS[1])
        if not record then
            return false
        end
        local ok, envelope = pcall(cjson.decode, record)
        if ok and type(envelope) == 'table' and type(envelope.key) == 'string' then
            redis.call('ZADD', KEYS[2], ARGV[1], envelope.key)
        end
        return record
        ",
    )
});

/// KEYS: set, expiry. ARGV: now.
static RECLAIM_EXPIRED: LazyLock<redis::Script> = LazyLock::new(|| {
    redis::Script::new(
        r"
        local expired = redis.call('ZRANGEBYSCORE', KEYS[2], 0, ARGV[1])
        for _, member in ipairs(expired) do
            redis.call('ZREM', KEYS[2], member)
            redis.call('SREM', KEYS[1], member)
        end
        return expired
        ",
    )
});

/// KEYS: set, expiry. ARGV: member.
static RELEASE_LEASE: LazyLock<redis::Script> = LazyLock::new(|| {
    redis::Script::new(
        r"
        if redis.call('ZREM', KEYS[2], ARGV[1]) == 0 then
            return 0
        end
        redis.call('SREM', KEYS[1], ARGV[1])
        return 1
        ",
    )
});

/// Store backed by a Redis (or Valkey) server.
#[derive(Clone)]
pub struct RedisStore {
    conn: MultiplexedConnection,
}

impl RedisStore {
    /// Connect to the server at `url` (e.g. `redis://localhost:6379`).
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        debug!("Connected to redis");
        Ok(Self { conn })
    }

    /// Wrap an existing connection.
    pub fn from_connection(conn: MultiplexedConnection) -> Self {
        Self { conn }
    }

    /// Delete the given keys. Used to tear down a queue's collections.
    pub async fn delete(&self, keys: &[&str]) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(keys.to_vec()).await?;
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn set_contains(&self, set: &str, member: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        Ok(conn.sismember(set, member).await?)
    }

    async fn set_add(&self, set: &str, member: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.sadd::<_, _, ()>(set, member).await?;
        Ok(())
    }

    async fn set_remove(&self, set: &str, member: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.srem::<_, _, ()>(set, member).await?;
        Ok(())
    }

    async fn list_append_tail(&self, list: &str, record: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.rpush::<_, _, ()>(list, record).await?;
        Ok(())
    }

    async fn list_pop_head(&self, list: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        Ok(conn.lpop(list, None).await?)
    }

    async fn sorted_range_by_score(&self, map: &str, min: f64, max: f64) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        Ok(conn.zrangebyscore(map, min, max).await?)
    }

    async fn sorted_remove(&self, map: &str, member: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let removed: i64 = conn.zrem(map, member).await?;
        Ok(removed > 0)
    }

    async fn sorted_set(&self, map: &str, member: &str, score: f64) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.zadd::<_, _, _, ()>(map, member, score).await?;
        Ok(())
    }

    async fn add_unique_and_append(
        &self,
        set: &str,
        list: &str,
        member: &str,
        record: &str,
    ) -> Result<bool> {
        let mut conn = self.conn.clone();
        let inserted: i64 = ADD_UNIQUE_AND_APPEND
            .key(set)
            .key(list)
            .arg(member)
            .arg(record)
            .invoke_async(&mut conn)
            .await?;
        Ok(inserted == 1)
    }

    async fn pop_and_lease(&self, list: &str, expiry: &str, score: f64) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let record: Option<String> = POP_AND_LEASE
            .key(list)
            .key(expiry)
            .arg(score)
            .invoke_async(&mut conn)
            .await?;
        Ok(record)
    }

    async fn reclaim_expired(&self, set: &str, expiry: &str, now: f64) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        let reclaimed: Vec<String> = RECLAIM_EXPIRED
            .key(set)
            .key(expiry)
            .arg(now)
            .invoke_async(&mut conn)
            .await?;
        Ok(reclaimed)
    }

    async fn release_lease(&self, set: &str, expiry: &str, member: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let released: i64 = RELEASE_LEASE
            .key(set)
            .key(expiry)
            .arg(member)
            .invoke_async(&mut conn)
            .await?;
        Ok(released == 1)
    }
}
