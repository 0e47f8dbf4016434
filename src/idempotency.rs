//! Deduplication of externally delivered payment events.
//!
//! A key's presence means the event (or confirmed payment) was already
//! applied. Keys expire passively after [`DEFAULT_TTL`]; a redelivery after
//! expiry re-applies an effect that is idempotent in outcome (`is_paid = true`).

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::store::{KeyValueStore, StoreResult};

pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

const PROCESSED_MARKER: &str = "processed";

/// `<namespace>:<event type>:<event id>`, e.g.
/// `razorpay_webhook:payment.captured:pay_123`.
///
/// Providers reuse one object id across the events of its lifecycle, so the
/// event type is part of the key.
pub fn webhook_key(namespace: &str, event_type: &str, event_id: &str) -> String {
    format!("{}:{}:{}", namespace, event_type, event_id)
}

/// `<namespace>:<payment id>`, e.g. `razorpay_payment:pay_123`.
pub fn payment_key(namespace: &str, payment_id: &str) -> String {
    format!("{}:{}", namespace, payment_id)
}

#[derive(Clone)]
pub struct IdempotencyStore {
    store: Arc<dyn KeyValueStore>,
    ttl: Duration,
}

impl IdempotencyStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_ttl(store, DEFAULT_TTL)
    }

    pub fn with_ttl(store: Arc<dyn KeyValueStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub async fn is_processed(&self, key: &str) -> StoreResult<bool> {
        self.store.exists(key).await
    }

    /// Atomically take ownership of `key`.
    ///
    /// Returns `true` when this caller is the first to see the key and must
    /// apply the effect. A concurrent or repeated delivery gets `false`.
    pub async fn claim(&self, key: &str) -> StoreResult<bool> {
        let claimed = self
            .store
            .set_if_absent(key, PROCESSED_MARKER, self.ttl)
            .await?;
        debug!(key, claimed, "idempotency claim");
        Ok(claimed)
    }

    /// Give up a claim after the effect failed so a retry can apply it.
    pub async fn release(&self, key: &str) -> StoreResult<()> {
        self.store.delete(key).await
    }
}
