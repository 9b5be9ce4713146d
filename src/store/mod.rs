//! Key-value store capability the queue is built on.
//!
//! Any backend offering a set, a list and a score-ordered map can host a
//! queue. The two composite methods have default bodies that chain the
//! primitives; those defaults are NOT atomic, so two producers racing on
//! the same key can both insert, and a crash between pop and lease leaves
//! a membership entry with no payload or lease behind it. Backends that can
//! run them as one unit (see [`MemoryStore`], [`RedisStore`]) override them.
//!
//! Membership is only ever dropped for a key whose expiry entry this call
//! removed itself, so a key re-queued by someone else keeps its membership.

pub mod memory;
pub mod redis;

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

use async_trait::async_trait;

use tracing::warn;

use crate::envelope;
use crate::error::Result;

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn set_contains(&self, set: &str, member: &str) -> Result<bool>;

    async fn set_add(&self, set: &str, member: &str) -> Result<()>;

    async fn set_remove(&self, set: &str, member: &str) -> Result<()>;

    async fn list_append_tail(&self, list: &str, record: &str) -> Result<()>;

    /// Pops the head record, or `None` if the list is empty.
    async fn list_pop_head(&self, list: &str) -> Result<Option<String>>;

    /// Members with `min <= score <= max`, lowest score first.
    async fn sorted_range_by_score(&self, map: &str, min: f64, max: f64) -> Result<Vec<String>>;

    /// Removes `member`, returning whether it was present.
    async fn sorted_remove(&self, map: &str, member: &str) -> Result<bool>;

    /// Inserts or overwrites `member`'s score.
    async fn sorted_set(&self, map: &str, member: &str, score: f64) -> Result<()>;

    /// Adds `member` to `set` and appends `record` to `list`, unless `member`
    /// is already present. Returns whether anything was inserted.
    async fn add_unique_and_append(
        &self,
        set: &str,
        list: &str,
        member: &str,
        record: &str,
    ) -> Result<bool> {
        if self.set_contains(set, member).await? {
            return Ok(false);
        }
        self.set_add(set, member).await?;
        self.list_append_tail(list, record).await?;
        Ok(true)
    }

    /// Pops the head record and leases its envelope key in `expiry` at
    /// `score`. A record whose key can't be read is still popped and
    /// returned, without a lease.
    async fn pop_and_lease(&self, list: &str, expiry: &str, score: f64) -> Result<Option<String>> {
        let Some(record) = self.list_pop_head(list).await? else {
            return Ok(None);
        };
        match envelope::decode_key(&record) {
            Ok(key) => self.sorted_set(expiry, &key, score).await?,
            Err(e) => warn_orphaned(list, &e),
        }
        Ok(Some(record))
    }

    /// Drops every `expiry` entry scored at or below `now` together with its
    /// `set` membership. Returns the reclaimed members, lowest score first.
    async fn reclaim_expired(&self, set: &str, expiry: &str, now: f64) -> Result<Vec<String>> {
        let candidates = self.sorted_range_by_score(expiry, 0.0, now).await?;
        let mut reclaimed = Vec::with_capacity(candidates.len());
        for member in candidates {
            // Someone else got here first; the key may already be re-queued.
            if !self.sorted_remove(expiry, &member).await? {
                continue;
            }
            self.set_remove(set, &member).await?;
            reclaimed.push(member);
        }
        Ok(reclaimed)
    }

    /// Drops `member`'s lease and membership if it holds a lease. A pending
    /// (never fetched) member is left alone. Returns whether a lease was
    /// dropped.
    async fn release_lease(&self, set: &str, expiry: &str, member: &str) -> Result<bool> {
        if !self.sorted_remove(expiry, member).await? {
            return Ok(false);
        }
        self.set_remove(set, member).await?;
        Ok(true)
    }
}

/// A record without a readable key is consumed with no lease. If its key
/// was in the membership set, that entry now has nothing to expire it.
pub(crate) fn warn_orphaned(list: &str, error: &crate::error::Error) {
    warn!(
        list,
        error = %error,
        "record has no readable key; consumed without a lease, any membership entry for it is orphaned"
    );
}
