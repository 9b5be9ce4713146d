//! The default (non-atomic) composite path of `KeyValueStore`, and store
//! failures.
//!
//! `PrimitiveStore` forwards only the eight primitives to a `MemoryStore`,
//! so the queue runs on the trait's provided composite bodies. It can also
//! hold its next range query open, to interleave two producers.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use uniqueq::error::Result;
use uniqueq::{
    Error, KeyValueStore, ManualClock, MemoryStore, ReaperConfig, UniqueQueue, spawn_reaper,
};

#[derive(Clone, Default)]
struct PrimitiveStore {
    inner: MemoryStore,
    calls: Arc<AtomicUsize>,
    hold_next_range: Arc<AtomicBool>,
    range_held: Arc<Notify>,
    resume: Arc<Notify>,
}

impl PrimitiveStore {
    fn tick(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl KeyValueStore for PrimitiveStore {
    async fn set_contains(&self, set: &str, member: &str) -> Result<bool> {
        self.tick();
        self.inner.set_contains(set, member).await
    }

    async fn set_add(&self, set: &str, member: &str) -> Result<()> {
        self.tick();
        self.inner.set_add(set, member).await
    }

    async fn set_remove(&self, set: &str, member: &str) -> Result<()> {
        self.tick();
        self.inner.set_remove(set, member).await
    }

    async fn list_append_tail(&self, list: &str, record: &str) -> Result<()> {
        self.tick();
        self.inner.list_append_tail(list, record).await
    }

    async fn list_pop_head(&self, list: &str) -> Result<Option<String>> {
        self.tick();
        self.inner.list_pop_head(list).await
    }

    async fn sorted_range_by_score(&self, map: &str, min: f64, max: f64) -> Result<Vec<String>> {
        self.tick();
        let hits = self.inner.sorted_range_by_score(map, min, max).await?;
        if self.hold_next_range.swap(false, Ordering::SeqCst) {
            self.range_held.notify_one();
            self.resume.notified().await;
        }
        Ok(hits)
    }

    async fn sorted_remove(&self, map: &str, member: &str) -> Result<bool> {
        self.tick();
        self.inner.sorted_remove(map, member).await
    }

    async fn sorted_set(&self, map: &str, member: &str, score: f64) -> Result<()> {
        self.tick();
        self.inner.sorted_set(map, member, score).await
    }
}

/// Fails every call with `StoreUnavailable` while `down` is set.
#[derive(Clone, Default)]
struct FlakyStore {
    inner: MemoryStore,
    down: Arc<AtomicBool>,
    failures: Arc<AtomicUsize>,
}

impl FlakyStore {
    fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.down.load(Ordering::SeqCst) {
            self.failures.fetch_add(1, Ordering::SeqCst);
            return Err(Error::StoreUnavailable(redis::RedisError::from((
                redis::ErrorKind::IoError,
                "down",
            ))));
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FlakyStore {
    async fn set_contains(&self, set: &str, member: &str) -> Result<bool> {
        self.check()?;
        self.inner.set_contains(set, member).await
    }

    async fn set_add(&self, set: &str, member: &str) -> Result<()> {
        self.check()?;
        self.inner.set_add(set, member).await
    }

    async fn set_remove(&self, set: &str, member: &str) -> Result<()> {
        self.check()?;
        self.inner.set_remove(set, member).await
    }

    async fn list_append_tail(&self, list: &str, record: &str) -> Result<()> {
        self.check()?;
        self.inner.list_append_tail(list, record).await
    }

    async fn list_pop_head(&self, list: &str) -> Result<Option<String>> {
        self.check()?;
        self.inner.list_pop_head(list).await
    }

    async fn sorted_range_by_score(&self, map: &str, min: f64, max: f64) -> Result<Vec<String>> {
        self.check()?;
        self.inner.sorted_range_by_score(map, min, max).await
    }

    async fn sorted_remove(&self, map: &str, member: &str) -> Result<bool> {
        self.check()?;
        self.inner.sorted_remove(map, member).await
    }

    async fn sorted_set(&self, map: &str, member: &str, score: f64) -> Result<()> {
        self.check()?;
        self.inner.sorted_set(map, member, score).await
    }
}

fn test_queue(lease_seconds: i64) -> (UniqueQueue<PrimitiveStore>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(1_000_000));
    let queue = UniqueQueue::builder(PrimitiveStore::default())
        .lease_seconds(lease_seconds)
        .prefix("prim")
        .clock(clock.clone())
        .build()
        .expect("failed to build queue");
    (queue, clock)
}

#[tokio::test]
async fn default_composites_uphold_dedup_and_fifo() {
    let (queue, _clock) = test_queue(10);

    assert!(queue.put("x", "k1").await.unwrap());
    assert!(queue.put("y", "k2").await.unwrap());
    assert!(!queue.put("z", "k1").await.unwrap());

    assert_eq!(queue.get::<String>().await.unwrap(), "x");
    assert_eq!(queue.get::<String>().await.unwrap(), "y");
    assert!(matches!(queue.get::<String>().await, Err(Error::QueueEmpty)));
}

#[tokio::test]
async fn default_pop_and_lease_arms_expiry() {
    let (queue, clock) = test_queue(10);

    queue.put("x", "k1").await.unwrap();
    queue.get::<String>().await.unwrap();
    assert!(!queue.put("x", "k1").await.unwrap());

    clock.advance(Duration::from_secs(10));
    assert!(queue.put("x", "k1").await.unwrap());
}

#[tokio::test]
async fn duplicate_put_only_reads() {
    let (queue, _clock) = test_queue(10);
    queue.put("x", "k1").await.unwrap();

    let before = queue.store().calls.load(Ordering::SeqCst);
    assert!(!queue.put("x", "k1").await.unwrap());
    let after = queue.store().calls.load(Ordering::SeqCst);

    // One range query for reclamation, one membership check.
    assert_eq!(after - before, 2);
    assert_eq!(queue.store().inner.list_len("prim:list").await, 1);
}

#[tokio::test]
async fn construction_does_no_io() {
    let (queue, _clock) = test_queue(10);
    assert_eq!(queue.store().calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn stale_reclaim_does_not_strip_requeued_key() {
    let (queue, clock) = test_queue(10);
    let queue = Arc::new(queue);

    queue.put("old", "k").await.unwrap();
    queue.get::<String>().await.unwrap();
    clock.advance(Duration::from_secs(10));

    // First producer reads the expired lease on `k`, then stalls.
    queue.store().hold_next_range.store(true, Ordering::SeqCst);
    let first = {
        let queue = Arc::clone(&queue);
        tokio::spawn(async move { queue.put("other", "x").await })
    };
    queue.store().range_held.notified().await;

    // Second producer reclaims `k` and queues it again.
    assert!(queue.put("fresh", "k").await.unwrap());

    queue.store().resume.notify_one();
    assert!(first.await.unwrap().unwrap());

    let store = &queue.store().inner;
    assert_eq!(store.set_members("prim:set").await, vec!["k", "x"]);
    assert_eq!(store.list_len("prim:list").await, 2);
    assert!(!queue.put("dup", "k").await.unwrap());
}

fn flaky_queue(lease_seconds: i64) -> (UniqueQueue<FlakyStore>, FlakyStore, Arc<ManualClock>) {
    let store = FlakyStore::default();
    let clock = Arc::new(ManualClock::new(0));
    let queue = UniqueQueue::builder(store.clone())
        .lease_seconds(lease_seconds)
        .prefix("flaky")
        .clock(clock.clone())
        .build()
        .expect("failed to build queue");
    (queue, store, clock)
}

#[tokio::test]
async fn store_errors_reach_the_caller() {
    let (queue, store, _clock) = flaky_queue(10);
    queue.put("a", "k1").await.unwrap();

    store.set_down(true);
    assert!(matches!(
        queue.put("b", "k2").await,
        Err(Error::StoreUnavailable(_))
    ));
    assert!(matches!(
        queue.get::<String>().await,
        Err(Error::StoreUnavailable(_))
    ));
    assert!(matches!(
        queue.reclaim_expired().await,
        Err(Error::StoreUnavailable(_))
    ));
    assert!(matches!(
        queue.release("k1").await,
        Err(Error::StoreUnavailable(_))
    ));
    // One attempt per call, no retries.
    assert_eq!(store.failures.load(Ordering::SeqCst), 4);

    store.set_down(false);
    assert_eq!(queue.get::<String>().await.unwrap(), "a");
    assert!(matches!(queue.get::<String>().await, Err(Error::QueueEmpty)));
}

#[tokio::test(start_paused = true)]
async fn reaper_survives_store_outage() {
    let (queue, store, clock) = flaky_queue(5);
    let queue = Arc::new(queue);
    queue.put("a", "k1").await.unwrap();
    queue.get::<String>().await.unwrap();

    store.set_down(true);
    let handle = spawn_reaper(
        Arc::clone(&queue),
        ReaperConfig {
            interval: Duration::from_secs(1),
        },
    );
    clock.advance(Duration::from_secs(5));
    tokio::time::sleep(Duration::from_millis(2_500)).await;
    assert!(store.failures.load(Ordering::SeqCst) >= 2);

    store.set_down(false);
    assert!(queue.is_outstanding("k1").await.unwrap());
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(!queue.is_outstanding("k1").await.unwrap());

    assert_eq!(handle.stop().await, 1);
}
