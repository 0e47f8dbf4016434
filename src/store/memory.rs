use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::time::Instant;

use super::{KeyValueStore, StoreError, StoreResult};

#[derive(Debug, Clone)]
struct StoredValue {
    value: String,
    expires_at: Option<Instant>,
}

impl StoredValue {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// In-process store with passive expiry.
///
/// Expired entries are treated as absent and replaced on the next write.
/// Keys that are never touched again are dropped by [`purge_expired`], which
/// [`spawn_cleanup_task`] runs periodically.
/// Per-key atomicity comes from the shard lock held by the entry API.
///
/// [`purge_expired`]: MemoryStore::purge_expired
/// [`spawn_cleanup_task`]: MemoryStore::spawn_cleanup_task
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, StoredValue>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove every expired entry and return how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, v| !v.is_expired(now));
        before.saturating_sub(self.entries.len())
    }

    /// Sweep expired entries every `interval` until the store is dropped.
    pub fn spawn_cleanup_task(store: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let store: Weak<Self> = Arc::downgrade(store);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;

                let Some(store) = store.upgrade() else {
                    break;
                };
                let purged = store.purge_expired();
                if purged > 0 {
                    tracing::debug!("Purged {} expired keys from in-process store", purged);
                }
            }
        })
    }

    fn live_value(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        let entry = self.entries.get(key)?;
        if entry.is_expired(now) {
            drop(entry);
            self.entries.remove_if(key, |_, v| v.is_expired(now));
            return None;
        }
        Some(entry.value.clone())
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.live_value(key))
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        self.entries.insert(
            key.to_string(),
            StoredValue {
                value: value.to_string(),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool> {
        let now = Instant::now();
        let fresh = StoredValue {
            value: value.to_string(),
            expires_at: Some(now + ttl),
        };

        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired(now) {
                    occupied.insert(fresh);
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(fresh);
                Ok(true)
            }
        }
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        Ok(self.live_value(key).is_some())
    }

    async fn increment(&self, key: &str) -> StoreResult<i64> {
        let now = Instant::now();

        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let stored = occupied.get_mut();
                if stored.is_expired(now) {
                    *stored = StoredValue {
                        value: "1".to_string(),
                        expires_at: None,
                    };
                    return Ok(1);
                }
                let current: i64 = stored.value.parse().map_err(|_| {
                    StoreError::Backend(format!("value at '{}' is not an integer", key))
                })?;
                let next = current + 1;
                stored.value = next.to_string();
                Ok(next)
            }
            Entry::Vacant(vacant) => {
                vacant.insert(StoredValue {
                    value: "1".to_string(),
                    expires_at: None,
                });
                Ok(1)
            }
        }
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        let now = Instant::now();
        match self.entries.get_mut(key) {
            Some(mut stored) if !stored.is_expired(now) => {
                stored.expires_at = Some(now + ttl);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_if_absent_only_first_writer_wins() {
        let store = MemoryStore::new();
        let ttl = Duration::from_secs(60);

        assert!(store.set_if_absent("k", "a", ttl).await.unwrap());
        assert!(!store.set_if_absent("k", "b", ttl).await.unwrap());
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn keys_expire_passively() {
        let store = MemoryStore::new();
        store
            .set_with_ttl("k", "v", Duration::from_secs(10))
            .await
            .unwrap();
        assert!(store.exists("k").await.unwrap());

        tokio::time::advance(Duration::from_secs(11)).await;

        assert!(!store.exists("k").await.unwrap());
        assert!(
            store
                .set_if_absent("k", "again", Duration::from_secs(10))
                .await
                .unwrap(),
            "an expired key must be claimable again"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn increment_restarts_after_expiry() {
        let store = MemoryStore::new();
        assert_eq!(store.increment("c").await.unwrap(), 1);
        assert!(store.expire("c", Duration::from_secs(5)).await.unwrap());
        assert_eq!(store.increment("c").await.unwrap(), 2);

        tokio::time::advance(Duration::from_secs(6)).await;

        assert_eq!(store.increment("c").await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cleanup_task_drops_untouched_expired_keys() {
        let store = Arc::new(MemoryStore::new());
        store
            .set_with_ttl("idem:evt_1", "processed", Duration::from_secs(10))
            .await
            .unwrap();
        store
            .set_with_ttl("idem:evt_2", "processed", Duration::from_secs(600))
            .await
            .unwrap();
        store.increment("ratelimit:/auth/login:10.0.0.1").await.unwrap();
        store
            .expire("ratelimit:/auth/login:10.0.0.1", Duration::from_secs(30))
            .await
            .unwrap();

        let task = MemoryStore::spawn_cleanup_task(&store, Duration::from_secs(60));

        // The sweep at t=60s runs before this sleep returns
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(store.entries.len(), 1);
        assert!(store.entries.contains_key("idem:evt_2"));

        drop(store);
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(task.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn purge_keeps_live_and_persistent_keys() {
        let store = MemoryStore::new();
        store.increment("no-ttl").await.unwrap();
        store
            .set_with_ttl("short", "v", Duration::from_secs(1))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;

        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.entries.len(), 1);
        assert_eq!(store.purge_expired(), 0);
    }

    #[tokio::test]
    async fn expire_on_missing_key_reports_false() {
        let store = MemoryStore::new();
        assert!(!store.expire("missing", Duration::from_secs(5)).await.unwrap());
    }

    #[tokio::test]
    async fn increment_rejects_non_integer_values() {
        let store = MemoryStore::new();
        store
            .set_with_ttl("k", "processed", Duration::from_secs(60))
            .await
            .unwrap();
        assert!(store.increment("k").await.is_err());
    }
}
