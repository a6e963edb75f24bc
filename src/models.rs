//! Domain records shared between the storage layer and the bot handlers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A bot user as stored in the `users` table.
///
/// Users are created on first contact and only ever soft-deactivated:
/// `is_blocked` is flipped when a broadcast delivery reports that the
/// user has blocked the bot.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    /// Internal primary key
    pub id: i64,
    /// Telegram user ID, unique
    pub tg_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    /// Interface language, defaults to `uk`
    pub lang: String,
    /// Display name of the last selected city
    pub last_city: Option<String>,
    pub is_active: bool,
    pub is_blocked: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_seen_at: Option<DateTime<Utc>>,
    /// Acquisition tag from the `/start` deep link
    pub utm_source: Option<String>,
}

/// City reference data joined from `cities` via its alias index.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct City {
    /// Stable city code, e.g. `kyiv`
    pub code: String,
    /// Ukrainian display name
    pub name_uk: String,
    /// Rental channel link; `None` means the channel is not yet available
    pub channel_url: Option<String>,
}

impl City {
    /// Whether the city has a rental channel users can be sent to
    #[must_use]
    pub fn has_channel(&self) -> bool {
        self.channel_url.as_deref().is_some_and(|url| !url.is_empty())
    }
}

/// Lifecycle of a single broadcast delivery row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    /// Created with the broadcast, not yet attempted
    Queued,
    Sent,
    /// The recipient has blocked the bot
    Blocked,
    Failed,
}

impl DeliveryStatus {
    /// Status value as stored in the `deliveries.status` column
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Sent => "sent",
            Self::Blocked => "blocked",
            Self::Failed => "failed",
        }
    }
}

/// One queued delivery, joined with the recipient's Telegram ID.
///
/// The broadcast engine iterates over a snapshot of these taken at
/// broadcast start; the set is never re-queried mid-run.
#[derive(Debug, Clone, FromRow)]
pub struct QueuedDelivery {
    /// `deliveries.id`
    pub delivery_id: i64,
    /// Internal user ID
    pub user_id: i64,
    /// Telegram chat to deliver to
    pub tg_id: i64,
}

/// Per-city selection counter for the admin panel.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct CityCount {
    pub city_name_uk: String,
    pub count: i64,
}

/// Aggregated counters for the admin panel.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AdminStats {
    pub total_users: i64,
    pub active_users: i64,
    pub blocked_users: i64,
    pub total_unsubscriptions: i64,
    pub new_users_7d: i64,
    pub unsubscribed_7d: i64,
    /// Top cities by selections over the last 30 days
    pub top_cities: Vec<CityCount>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_city_has_channel() {
        let mut city = City {
            code: "kyiv".to_string(),
            name_uk: "Київ".to_string(),
            channel_url: Some("https://t.me/orenda_kyiv".to_string()),
        };
        assert!(city.has_channel());

        city.channel_url = Some(String::new());
        assert!(!city.has_channel());

        city.channel_url = None;
        assert!(!city.has_channel());
    }

    #[test]
    fn test_delivery_status_round_trip() {
        assert_eq!(DeliveryStatus::Queued.as_str(), "queued");
        assert_eq!(DeliveryStatus::Sent.as_str(), "sent");
        assert_eq!(DeliveryStatus::Blocked.as_str(), "blocked");
        assert_eq!(DeliveryStatus::Failed.as_str(), "failed");
    }
}
