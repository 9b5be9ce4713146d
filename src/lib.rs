//! # uniqueq
//!
//! A deduplicating, at-least-once work queue on a shared key-value store.
//!
//! A key can have at most one payload pending or leased at a time. `get`
//! leases the item for a fixed duration; if the consumer never releases it,
//! the lease expires and the key becomes eligible for `put` again.
//!
//! ```no_run
//! # async fn demo() -> uniqueq::error::Result<()> {
//! use uniqueq::{RedisStore, UniqueQueue};
//!
//! let store = RedisStore::connect("redis://localhost:6379").await?;
//! let queue = UniqueQueue::new(store, 30, Some("thumbnails"))?;
//!
//! assert!(queue.put(&"video-17.mp4", "video-17").await?);
//! assert!(!queue.put(&"video-17.mp4", "video-17").await?); // duplicate
//!
//! let path: String = queue.get().await?;
//! // ... process, then optionally:
//! queue.release("video-17").await?;
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod config;
pub mod envelope;
pub mod error;
pub mod namespace;
pub mod queue;
pub mod reaper;
pub mod store;
pub mod telemetry;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Error, Result};
pub use namespace::Namespace;
pub use queue::{QueueBuilder, UniqueQueue};
pub use reaper::{ReaperConfig, ReaperHandle, spawn_reaper};
pub use store::{KeyValueStore, MemoryStore, RedisStore};
