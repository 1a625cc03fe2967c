//! Content-addressed adapter response cache.
//!
//! Keys are the SHA-256 of the canonicalized call input. Entries carry a
//! per-tool TTL and are written only on successful calls; cancelled calls
//! never mutate the cache. A single in-flight call per key is enforced so
//! concurrent runs coalesce instead of duplicating upstream work.

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// A cached successful response
#[derive(Debug, Clone)]
pub struct CachedEntry {
    pub value: Value,
    pub digest: String,
    pub fetched_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Process-wide response cache, read-mostly
#[derive(Debug, Default)]
pub struct ResponseCache {
    entries: Mutex<HashMap<String, CachedEntry>>,
    in_flight: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, CachedEntry>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Acquire the single-flight lock for a key. Callers re-check the cache
    /// after acquisition; a coalesced waiter will find the leader's write.
    pub async fn lock_key(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut in_flight = match self.in_flight.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            in_flight
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };

        lock.lock_owned().await
    }

    /// A non-expired entry for the key, if any
    pub fn get(&self, key: &str, now: DateTime<Utc>) -> Option<CachedEntry> {
        let entries = self.entries();
        let entry = entries.get(key)?;
        if entry.expires_at <= now {
            return None;
        }

        Some(entry.clone())
    }

    pub fn put(
        &self,
        key: &str,
        value: Value,
        digest: String,
        fetched_at: DateTime<Utc>,
        ttl_s: u64,
    ) {
        let entry = CachedEntry {
            value,
            digest,
            fetched_at,
            expires_at: fetched_at + Duration::seconds(ttl_s as i64),
        };

        self.entries().insert(key.to_string(), entry);
    }

    /// Drop expired entries; called opportunistically
    pub fn evict_expired(&self, now: DateTime<Utc>) {
        self.entries().retain(|_, entry| entry.expires_at > now);
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_ttl_expiry() {
        crate::test_util::get_log_handle().await;
        ut_info!("(test_ttl_expiry) Start.");

        let cache = ResponseCache::new();
        let now = t0();
        cache.put("k1", json!({"price": 100}), "digest".to_string(), now, 3_600);

        assert!(cache.get("k1", now).is_some());
        assert!(cache.get("k1", now + Duration::seconds(3_599)).is_some());
        assert!(cache.get("k1", now + Duration::seconds(3_600)).is_none());

        cache.evict_expired(now + Duration::seconds(3_600));
        assert!(cache.is_empty());

        ut_info!("(test_ttl_expiry) Success.");
    }

    #[tokio::test]
    async fn test_single_flight_coalesces() {
        crate::test_util::get_log_handle().await;
        ut_info!("(test_single_flight_coalesces) Start.");

        let cache = Arc::new(ResponseCache::new());
        let guard = cache.lock_key("k1").await;

        // a second locker must wait until the leader releases
        let cache_clone = cache.clone();
        let waiter = tokio::spawn(async move {
            let _guard = cache_clone.lock_key("k1").await;
            cache_clone.get("k1", t0()).is_some()
        });

        tokio::task::yield_now().await;
        cache.put("k1", json!(1), "d".to_string(), t0(), 60);
        drop(guard);

        // the waiter sees the leader's write
        assert!(waiter.await.unwrap());

        ut_info!("(test_single_flight_coalesces) Success.");
    }
}
