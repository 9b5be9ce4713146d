//! The deduplicating, lease-based queue.
//!
//! State lives entirely in the store, in three collections per namespace:
//! a membership set of outstanding keys, a FIFO list of `{key, item}`
//! envelopes, and an expiry index of leased keys. A key is outstanding from
//! a successful `put` until its lease is reclaimed or it is released.
//!
//! There is no background coordinator: every `put` first reclaims expired
//! leases. Whether `put` and `get` are race-free depends on the store (see
//! [`KeyValueStore`]).

use std::sync::Arc;
use std::time::Duration;

use opentelemetry::KeyValue;
use rand::Rng;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{Instrument, debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::envelope;
use crate::error::{Error, Result};
use crate::namespace::Namespace;
use crate::store::KeyValueStore;
use crate::telemetry::metrics;
use crate::telemetry::queue::{record_key, start_queue_span};

pub struct UniqueQueue<S> {
    store: S,
    namespace: Namespace,
    lease: Duration,
    clock: Arc<dyn Clock>,
}

impl<S: KeyValueStore> UniqueQueue<S> {
    /// Create a queue leasing fetched items for `lease_seconds`.
    ///
    /// An empty or missing `prefix` gets a random one. Does no store I/O.
    pub fn new(store: S, lease_seconds: i64, prefix: Option<&str>) -> Result<Self> {
        let mut builder = Self::builder(store).lease_seconds(lease_seconds);
        if let Some(prefix) = prefix {
            builder = builder.prefix(prefix);
        }
        builder.build()
    }

    pub fn builder(store: S) -> QueueBuilder<S> {
        QueueBuilder {
            store,
            lease_seconds: None,
            prefix: None,
            clock: None,
        }
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn lease(&self) -> Duration {
        self.lease
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Enqueue `item` under `key` unless the key is already outstanding.
    ///
    /// Reclaims expired leases first. Returns `false` for a duplicate.
    pub async fn put<T: Serialize + ?Sized>(&self, item: &T, key: &str) -> Result<bool> {
        let span = start_queue_span("put", self.namespace.prefix());
        record_key(&span, key);
        async {
            self.reclaim_expired().await?;

            // Encode before touching the store so a bad item leaves no trace.
            let record = envelope::encode(key, item)?;

            let inserted = self
                .store
                .add_unique_and_append(
                    self.namespace.set(),
                    self.namespace.list(),
                    key,
                    &record,
                )
                .await?;

            if inserted {
                debug!(key, "queued");
            } else {
                debug!(key, set = self.namespace.set(), "key already outstanding");
            }
            metrics::puts().add(
                1,
                &[
                    self.queue_label(),
                    KeyValue::new("result", if inserted { "ok" } else { "duplicate" }),
                ],
            );
            Ok(inserted)
        }
        .instrument(span.clone())
        .await
    }

    /// Pop the oldest item and lease its key until `now + lease`.
    ///
    /// Fails with [`Error::QueueEmpty`] without mutating anything when no
    /// payload is waiting. The key stays in the membership set.
    pub async fn get<T: DeserializeOwned>(&self) -> Result<T> {
        let span = start_queue_span("get", self.namespace.prefix());
        async {
            let expires_at = self.clock.now_secs() + self.lease.as_secs_f64();
            let record = self
                .store
                .pop_and_lease(self.namespace.list(), self.namespace.expiry(), expires_at)
                .await?;

            let Some(record) = record else {
                metrics::gets().add(1, &[self.queue_label(), KeyValue::new("result", "empty")]);
                return Err(Error::QueueEmpty);
            };

            match envelope::decode::<T>(&record) {
                Ok(env) => {
                    record_key(&span, &env.key);
                    debug!(key = %env.key, expires_at, "leased");
                    metrics::gets().add(1, &[self.queue_label(), KeyValue::new("result", "ok")]);
                    Ok(env.item)
                }
                Err(e) => {
                    warn!(error = %e, "dropping undecodable payload");
                    metrics::gets()
                        .add(1, &[self.queue_label(), KeyValue::new("result", "corrupt")]);
                    Err(e)
                }
            }
        }
        .instrument(span.clone())
        .await
    }

    /// Drop every lease whose expiry is at or before now, making its key
    /// eligible for `put` again. Returns the reclaimed keys.
    pub async fn reclaim_expired(&self) -> Result<Vec<String>> {
        let now = self.clock.now_secs();
        let expired = self
            .store
            .reclaim_expired(self.namespace.set(), self.namespace.expiry(), now)
            .await?;

        if !expired.is_empty() {
            info!(
                queue = self.namespace.prefix(),
                count = expired.len(),
                "reclaimed expired leases"
            );
            metrics::reclaimed().add(expired.len() as u64, &[self.queue_label()]);
        }
        Ok(expired)
    }

    /// Acknowledge a fetched item: drop the lease on `key` and its
    /// membership so it can be put again right away.
    ///
    /// Only a leased key is released. A key whose payload is still waiting
    /// in the list stays outstanding, and the call returns `false`.
    pub async fn release(&self, key: &str) -> Result<bool> {
        let span = start_queue_span("release", self.namespace.prefix());
        record_key(&span, key);
        async {
            let released = self
                .store
                .release_lease(self.namespace.set(), self.namespace.expiry(), key)
                .await?;
            if released {
                debug!(key, "released");
                metrics::released().add(1, &[self.queue_label()]);
            } else {
                debug!(key, "no lease to release");
            }
            Ok(released)
        }
        .instrument(span.clone())
        .await
    }

    /// Whether `key` is pending or leased (and not yet reclaimed).
    pub async fn is_outstanding(&self, key: &str) -> Result<bool> {
        self.store.set_contains(self.namespace.set(), key).await
    }

    fn queue_label(&self) -> KeyValue {
        KeyValue::new("queue", self.namespace.prefix().to_string())
    }
}

/// Builder for [`UniqueQueue`].
pub struct QueueBuilder<S> {
    store: S,
    lease_seconds: Option<i64>,
    prefix: Option<String>,
    clock: Option<Arc<dyn Clock>>,
}

impl<S: KeyValueStore> QueueBuilder<S> {
    /// Lease duration in whole seconds. Required; must be positive.
    pub fn lease_seconds(mut self, secs: i64) -> Self {
        self.lease_seconds = Some(secs);
        self
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Build, drawing any generated prefix from the thread-local RNG.
    pub fn build(self) -> Result<UniqueQueue<S>> {
        self.build_with_rng(&mut rand::thread_rng())
    }

    /// Build, drawing any generated prefix from `rng`.
    pub fn build_with_rng<R: Rng + ?Sized>(self, rng: &mut R) -> Result<UniqueQueue<S>> {
        let lease = match self.lease_seconds {
            Some(secs) if secs > 0 => Duration::from_secs(secs as u64),
            Some(secs) => {
                return Err(Error::InvalidConfiguration(format!(
                    "lease duration must be a positive number of seconds, got {secs}"
                )));
            }
            None => {
                return Err(Error::InvalidConfiguration(
                    "lease duration is required".to_string(),
                ));
            }
        };

        let namespace = match self.prefix.filter(|p| !p.is_empty()) {
            Some(prefix) => Namespace::new(prefix),
            None => Namespace::random(rng),
        };
        debug!(
            set = namespace.set(),
            list = namespace.list(),
            expiry = namespace.expiry(),
            "queue namespace"
        );

        Ok(UniqueQueue {
            store: self.store,
            namespace,
            lease,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
        })
    }
}
