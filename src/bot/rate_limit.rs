//! Anti-spam machinery.
//!
//! A sliding-window rate limiter guards every user-facing handler, and a
//! small cooldown cache deduplicates repeated /help requests. Both live in
//! process memory; restarting the bot forgives everyone.

use crate::config::{
    HELP_COOLDOWN, MESSAGE_COOLDOWN, RATE_LIMIT_THRESHOLD, RATE_LIMIT_WINDOW,
};
use moka::future::Cache;
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::warn;

/// Outcome of a rate-limit check for one incoming event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Process the event.
    Admitted,
    /// Drop the event; the user sent too fast or is already blocked.
    /// The flag says whether this check is the one that tripped the
    /// threshold, so the caller can warn the user exactly once.
    Rejected { just_blocked: bool },
}

#[derive(Default)]
struct LimiterInner {
    /// Admitted event timestamps per user, pruned to the sliding window.
    events: HashMap<i64, VecDeque<Instant>>,
    /// Last admitted event per user, for the inter-message cooldown.
    last_admit: HashMap<i64, Instant>,
    /// Users who tripped the threshold. Sticky until [`RateLimiter::reset`].
    blocked: HashSet<i64>,
}

/// Sliding-window limiter with a sticky block list.
///
/// A user gets at most [`RATE_LIMIT_THRESHOLD`] admitted events per
/// [`RATE_LIMIT_WINDOW`], with at least [`MESSAGE_COOLDOWN`] between two
/// admitted events. Exceeding the threshold blocks the user until the
/// administrator clears the limiter.
pub struct RateLimiter {
    inner: Mutex<LimiterInner>,
    window: Duration,
    threshold: usize,
    cooldown: Duration,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RATE_LIMIT_WINDOW, RATE_LIMIT_THRESHOLD, MESSAGE_COOLDOWN)
    }
}

impl RateLimiter {
    #[must_use]
    pub fn new(window: Duration, threshold: usize, cooldown: Duration) -> Self {
        Self {
            inner: Mutex::new(LimiterInner::default()),
            window,
            threshold,
            cooldown,
        }
    }

    /// Checks one incoming event from `tg_id` against the limits.
    pub async fn admit(&self, tg_id: i64) -> Verdict {
        self.admit_at(tg_id, Instant::now()).await
    }

    /// Same as [`RateLimiter::admit`] with an injectable clock.
    ///
    /// Order matters: the block list wins over everything, then stale
    /// events are pruned, then the cooldown is checked (a cooldown hit is
    /// dropped but NOT counted toward the threshold), then the window
    /// counter.
    pub async fn admit_at(&self, tg_id: i64, now: Instant) -> Verdict {
        let mut inner = self.inner.lock().await;

        if inner.blocked.contains(&tg_id) {
            return Verdict::Rejected {
                just_blocked: false,
            };
        }

        let events = inner.events.entry(tg_id).or_default();
        while let Some(&oldest) = events.front() {
            if now.duration_since(oldest) > self.window {
                events.pop_front();
            } else {
                break;
            }
        }

        if let Some(&last) = inner.last_admit.get(&tg_id) {
            if now.duration_since(last) < self.cooldown {
                return Verdict::Rejected {
                    just_blocked: false,
                };
            }
        }

        let events = inner.events.entry(tg_id).or_default();
        if events.len() >= self.threshold {
            warn!("🚫 User {} exceeded rate limit, blocking", tg_id);
            inner.blocked.insert(tg_id);
            return Verdict::Rejected { just_blocked: true };
        }

        inner.events.entry(tg_id).or_default().push_back(now);
        inner.last_admit.insert(tg_id, now);
        Verdict::Admitted
    }

    /// Clears all counters and the block list. Admin-only escape hatch.
    pub async fn reset(&self) {
        let mut inner = self.inner.lock().await;
        inner.events.clear();
        inner.last_admit.clear();
        inner.blocked.clear();
    }

    /// Number of currently blocked users.
    pub async fn blocked_count(&self) -> usize {
        self.inner.lock().await.blocked.len()
    }

    /// Number of users with window bookkeeping in memory.
    pub async fn tracked_count(&self) -> usize {
        self.inner.lock().await.events.len()
    }
}

/// Per-user cooldown for repeated /help requests.
///
/// TTL-based: an entry exists iff the user asked for help within
/// [`HELP_COOLDOWN`].
pub struct HelpThrottle {
    recent: Cache<i64, ()>,
}

impl Default for HelpThrottle {
    fn default() -> Self {
        Self::new(HELP_COOLDOWN)
    }
}

impl HelpThrottle {
    #[must_use]
    pub fn new(cooldown: Duration) -> Self {
        Self {
            recent: Cache::builder()
                .max_capacity(10_000)
                .time_to_live(cooldown)
                .build(),
        }
    }

    /// Returns `true` if help should be shown, and starts the cooldown.
    pub async fn allow(&self, tg_id: i64) -> bool {
        if self.recent.get(&tg_id).await.is_some() {
            return false;
        }
        self.recent.insert(tg_id, ()).await;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter() -> RateLimiter {
        RateLimiter::new(Duration::from_secs(10), 5, Duration::from_secs(2))
    }

    #[tokio::test]
    async fn test_admits_spaced_messages() {
        let limiter = limiter();
        let start = Instant::now();
        for i in 0..5 {
            let at = start + Duration::from_secs(i * 3);
            // Window keeps at most 4 of these at any point, never trips
            assert_eq!(limiter.admit_at(1, at).await, Verdict::Admitted);
        }
        assert_eq!(limiter.tracked_count().await, 1);
        assert_eq!(limiter.blocked_count().await, 0);
    }

    #[tokio::test]
    async fn test_cooldown_drops_but_does_not_count() {
        let limiter = limiter();
        let start = Instant::now();
        assert_eq!(limiter.admit_at(1, start).await, Verdict::Admitted);

        // Within the 2s cooldown: dropped without blocking
        let verdict = limiter.admit_at(1, start + Duration::from_millis(500)).await;
        assert_eq!(
            verdict,
            Verdict::Rejected {
                just_blocked: false
            }
        );

        // After the cooldown the user is fine again
        assert_eq!(
            limiter.admit_at(1, start + Duration::from_secs(2)).await,
            Verdict::Admitted
        );
    }

    #[tokio::test]
    async fn test_threshold_blocks_stickily() {
        let limiter = limiter();
        let start = Instant::now();
        for i in 0..5u64 {
            let at = start + Duration::from_secs(i * 2);
            assert_eq!(limiter.admit_at(1, at).await, Verdict::Admitted);
        }

        // Sixth inside the window trips the threshold exactly once
        let at = start + Duration::from_secs(10);
        assert_eq!(
            limiter.admit_at(1, at).await,
            Verdict::Rejected { just_blocked: true }
        );
        assert_eq!(limiter.blocked_count().await, 1);

        // Block is sticky even after the window has long passed
        let later = start + Duration::from_secs(3600);
        assert_eq!(
            limiter.admit_at(1, later).await,
            Verdict::Rejected {
                just_blocked: false
            }
        );
    }

    #[tokio::test]
    async fn test_reset_readmits_blocked_user() {
        let limiter = limiter();
        let start = Instant::now();
        for i in 0..5u64 {
            limiter.admit_at(1, start + Duration::from_secs(i * 2)).await;
        }
        limiter.admit_at(1, start + Duration::from_secs(10)).await;
        assert_eq!(limiter.blocked_count().await, 1);

        limiter.reset().await;
        assert_eq!(limiter.blocked_count().await, 0);
        assert_eq!(
            limiter.admit_at(1, start + Duration::from_secs(20)).await,
            Verdict::Admitted
        );
    }

    #[tokio::test]
    async fn test_users_are_isolated() {
        let limiter = limiter();
        let start = Instant::now();
        for i in 0..5u64 {
            limiter.admit_at(1, start + Duration::from_secs(i * 2)).await;
        }
        limiter.admit_at(1, start + Duration::from_secs(10)).await;

        // User 2 is unaffected by user 1's block
        assert_eq!(
            limiter.admit_at(2, start + Duration::from_secs(10)).await,
            Verdict::Admitted
        );
    }

    #[tokio::test]
    async fn test_help_throttle() {
        let throttle = HelpThrottle::new(Duration::from_millis(50));
        assert!(throttle.allow(1).await);
        assert!(!throttle.allow(1).await);
        // Other users are unaffected
        assert!(throttle.allow(2).await);

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(throttle.allow(1).await);
    }
}
