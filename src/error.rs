//! Error types for uniqueq.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid queue configuration: {0}")]
    InvalidConfiguration(String),

    #[error("queue is empty")]
    QueueEmpty,

    #[error("corrupt payload: {0}")]
    CorruptPayload(#[source] serde_json::Error),

    #[error("failed to encode item: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("store unavailable: {0}")]
    StoreUnavailable(#[from] redis::RedisError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
