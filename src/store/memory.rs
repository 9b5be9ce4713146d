//! In-process store. Clones share the same collections.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{KeyValueStore, warn_orphaned};
use crate::envelope;
use crate::error::Result;

#[derive(Debug, Default)]
struct Collections {
    sets: HashMap<String, HashSet<String>>,
    lists: HashMap<String, VecDeque<String>>,
    sorted: HashMap<String, HashMap<String, f64>>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Collections>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records waiting in `list`.
    pub async fn list_len(&self, list: &str) -> usize {
        let inner = self.inner.lock().await;
        inner.lists.get(list).map_or(0, VecDeque::len)
    }

    /// Members of `set`, sorted.
    pub async fn set_members(&self, set: &str) -> Vec<String> {
        let inner = self.inner.lock().await;
        let mut members: Vec<String> = inner
            .sets
            .get(set)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default();
        members.sort();
        members
    }

    /// Score of `member` in `map`, if any.
    pub async fn score(&self, map: &str, member: &str) -> Option<f64> {
        let inner = self.inner.lock().await;
        inner.sorted.get(map).and_then(|m| m.get(member).copied())
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn set_contains(&self, set: &str, member: &str) -> Result<bool> {
        let inner = self.inner.lock().await;
        Ok(inner.sets.get(set).is_some_and(|s| s.contains(member)))
    }

    async fn set_add(&self, set: &str, member: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner
            .sets
            .entry(set.to_string())
            .or_default()
            .insert(member.to_string());
        Ok(())
    }

    async fn set_remove(&self, set: &str, member: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if let Some(s) = inner.sets.get_mut(set) {
            s.remove(member);
        }
        Ok(())
    }

    async fn list_append_tail(&self, list: &str, record: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner
            .lists
            .entry(list.to_string())
            .or_default()
            .push_back(record.to_string());
        Ok(())
    }

    async fn list_pop_head(&self, list: &str) -> Result<Option<String>> {
        let mut inner = self.inner.lock().await;
        Ok(inner.lists.get_mut(list).and_then(VecDeque::pop_front))
    }

    async fn sorted_range_by_score(&self, map: &str, min: f64, max: f64) -> Result<Vec<String>> {
        let inner = self.inner.lock().await;
        let Some(entries) = inner.sorted.get(map) else {
            return Ok(Vec::new());
        };
        let mut hits: Vec<(&String, f64)> = entries
            .iter()
            .filter(|(_, score)| **score >= min && **score <= max)
            .map(|(member, score)| (member, *score))
            .collect();
        // Same ordering as a Redis sorted set: score, then member.
        hits.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(b.0)));
        Ok(hits.into_iter().map(|(member, _)| member.clone()).collect())
    }

    async fn sorted_remove(&self, map: &str, member: &str) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        Ok(inner
            .sorted
            .get_mut(map)
            .is_some_and(|m| m.remove(member).is_some()))
    }

    async fn sorted_set(&self, map: &str, member: &str, score: f64) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner
            .sorted
            .entry(map.to_string())
            .or_default()
            .insert(member.to_string(), score);
        Ok(())
    }

    async fn add_unique_and_append(
        &self,
        set: &str,
        list: &str,
        member: &str,
        record: &str,
    ) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        if !inner
            .sets
            .entry(set.to_string())
            .or_default()
            .insert(member.to_string())
        {
            return Ok(false);
        }
        inner
            .lists
            .entry(list.to_string())
            .or_default()
            .push_back(record.to_string());
        Ok(true)
    }

    async fn pop_and_lease(&self, list: &str, expiry: &str, score: f64) -> Result<Option<String>> {
        let mut inner = self.inner.lock().await;
        let Some(record) = inner.lists.get_mut(list).and_then(VecDeque::pop_front) else {
            return Ok(None);
        };
        match envelope::decode_key(&record) {
            Ok(key) => {
                inner
                    .sorted
                    .entry(expiry.to_string())
                    .or_default()
                    .insert(key, score);
            }
            Err(e) => warn_orphaned(list, &e),
        }
        Ok(Some(record))
    }

    async fn reclaim_expired(&self, set: &str, expiry: &str, now: f64) -> Result<Vec<String>> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        let Some(entries) = inner.sorted.get_mut(expiry) else {
            return Ok(Vec::new());
        };
        let mut expired: Vec<(String, f64)> = entries
            .iter()
            .filter(|(_, score)| **score >= 0.0 && **score <= now)
            .map(|(member, score)| (member.clone(), *score))
            .collect();
        expired.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        for (member, _) in &expired {
            entries.remove(member);
        }
        if let Some(members) = inner.sets.get_mut(set) {
            for (member, _) in &expired {
                members.remove(member);
            }
        }
        Ok(expired.into_iter().map(|(member, _)| member).collect())
    }

    async fn release_lease(&self, set: &str, expiry: &str, member: &str) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        let leased = inner
            .sorted
            .get_mut(expiry)
            .is_some_and(|m| m.remove(member).is_some());
        if leased {
            if let Some(members) = inner.sets.get_mut(set) {
                members.remove(member);
            }
        }
        Ok(leased)
    }
}
