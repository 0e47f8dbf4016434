//! Key-value store used for idempotency markers and rate-limit counters.
//!
//! Every operation the billing flow relies on for cross-request coordination
//! is a single store command, so concurrent requests never race on a
//! read-modify-write pair:
//! - `increment` is an atomic increment-and-read (Redis `INCR`)
//! - `set_if_absent` is an atomic conditional write with TTL (Redis `SET NX EX`)
//!
//! Two backends are provided: [`RedisStore`] for deployments and
//! [`MemoryStore`] for single-process development and tests.

mod memory;
mod redis_store;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    /// The store did not answer within the configured bound. Retryable.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()>;

    /// Write `value` only if `key` does not exist. Returns `true` when this
    /// call created the key.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool>;

    async fn exists(&self, key: &str) -> StoreResult<bool>;

    /// Increment the integer at `key` (created as 0 when absent) and return
    /// the new value.
    async fn increment(&self, key: &str) -> StoreResult<i64>;

    /// Set a TTL on an existing key. Returns `false` when the key is absent.
    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool>;

    async fn delete(&self, key: &str) -> StoreResult<()>;
}
