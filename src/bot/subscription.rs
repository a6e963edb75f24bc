//! Cached channel-membership checks.
//!
//! Every gate decision would otherwise cost a `getChatMember` round trip;
//! results are cached for a few minutes instead. Failures are treated as
//! "not subscribed" and are NOT cached, so a flaky API answer never locks
//! a genuine subscriber out for the whole TTL.

use crate::config::{SUBSCRIPTION_CACHE_CAPACITY, SUBSCRIPTION_CACHE_TTL};
use moka::future::Cache;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// TTL cache in front of the membership check.
pub struct SubscriptionCache {
    results: Cache<i64, bool>,
}

impl Default for SubscriptionCache {
    fn default() -> Self {
        Self::new(SUBSCRIPTION_CACHE_TTL, SUBSCRIPTION_CACHE_CAPACITY)
    }
}

impl SubscriptionCache {
    #[must_use]
    pub fn new(ttl: Duration, capacity: u64) -> Self {
        Self {
            results: Cache::builder()
                .max_capacity(capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    /// Returns whether `tg_id` is subscribed, consulting the cache first.
    ///
    /// `check` performs the real API call and is only invoked on a cache
    /// miss. Both `true` and `false` results are cached; an error is
    /// reported as `false` without touching the cache.
    pub async fn is_subscribed<F, Fut>(&self, tg_id: i64, check: F) -> bool
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<bool>>,
    {
        if let Some(cached) = self.results.get(&tg_id).await {
            return cached;
        }

        match check().await {
            Ok(subscribed) => {
                self.results.insert(tg_id, subscribed).await;
                subscribed
            }
            Err(e) => {
                warn!("⚠️ Subscription check failed for {}: {}", tg_id, e);
                false
            }
        }
    }

    /// Forgets one user's cached result, e.g. after "I subscribed".
    pub async fn invalidate(&self, tg_id: i64) {
        self.results.invalidate(&tg_id).await;
    }

    /// Drops every cached result. Admin-only escape hatch.
    pub fn clear(&self) {
        self.results.invalidate_all();
    }

    /// Approximate number of cached verdicts, for the stats screen.
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.results.entry_count()
    }
}
