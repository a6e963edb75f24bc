//! Telegram bot: dispatch, flows, anti-spam and the broadcast engine.

pub mod broadcast;
pub mod cities;
pub mod handlers;
pub mod rate_limit;
pub mod state;
pub mod subscription;
pub mod transport;
pub mod views;

use rate_limit::{HelpThrottle, RateLimiter};
use subscription::SubscriptionCache;

/// Shared in-memory services injected into every handler as one unit.
#[derive(Default)]
pub struct Services {
    pub limiter: RateLimiter,
    pub subscriptions: SubscriptionCache,
    pub help_guard: HelpThrottle,
}
