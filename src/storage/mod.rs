//! Persistence layer.
//!
//! One abstract [`Repository`] trait consumed by the bot, with two sqlx
//! adapters behind it: PostgreSQL (production) and SQLite (small installs,
//! tests). The backend is picked at startup from configuration; handlers
//! never branch on which adapter is active.
//!
//! Each trait method is a single logical operation. Paired writes that must
//! not be torn apart by a crash - "flag user blocked" + "record
//! unsubscription", "update last city" + "append history" - are issued
//! inside one transaction by the adapters.

mod postgres;
mod sqlite;

pub use postgres::PostgresRepository;
pub use sqlite::SqliteRepository;

use crate::config::Settings;
use crate::models::{AdminStats, City, DeliveryStatus, QueuedDelivery, User};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Errors surfaced by the persistence layer
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Abstract persistence operations consumed by the bot.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Repository: Send + Sync {
    /// Creates the schema if it does not exist yet. Idempotent.
    async fn init_schema(&self) -> Result<(), StorageError>;

    /// Inserts the city reference data and its alias index. Idempotent.
    async fn seed_cities(&self) -> Result<(), StorageError>;

    /// Upserts a user on contact and returns the internal ID.
    ///
    /// Refreshes profile fields and `last_seen_at` on every call.
    async fn save_user<'a>(
        &self,
        tg_id: i64,
        username: Option<&'a str>,
        first_name: Option<&'a str>,
        utm_source: Option<&'a str>,
    ) -> Result<i64, StorageError>;

    async fn get_user_by_tg_id(&self, tg_id: i64) -> Result<Option<User>, StorageError>;

    /// Flags a user as blocked (or unblocks) and, when blocking, records an
    /// unsubscription row in the same transaction.
    async fn set_user_blocked(
        &self,
        tg_id: i64,
        blocked: bool,
        reason: &str,
    ) -> Result<(), StorageError>;

    /// Number of users; `active_only` counts deliverable users only.
    async fn count_users(&self, active_only: bool) -> Result<i64, StorageError>;

    /// All users with `is_active` and not `is_blocked` - the broadcast
    /// recipient snapshot.
    async fn list_active_users(&self) -> Result<Vec<User>, StorageError>;

    /// Exact case-insensitive alias lookup against active cities.
    async fn find_city_by_alias(&self, input: &str) -> Result<Option<City>, StorageError>;

    /// Case-insensitive prefix lookup, shortest alias first.
    async fn find_cities_by_prefix(
        &self,
        prefix: &str,
        limit: i64,
    ) -> Result<Vec<City>, StorageError>;

    /// Active cities that already have a channel, for the picker keyboard.
    async fn available_cities(&self) -> Result<Vec<City>, StorageError>;

    /// Stores the user's city choice and appends it to the selection history
    /// in one transaction.
    async fn update_user_city(
        &self,
        tg_id: i64,
        city_code: &str,
        city_name: &str,
    ) -> Result<(), StorageError>;

    /// Creates a broadcast in `draft` status and returns its ID.
    async fn create_broadcast(
        &self,
        title: &str,
        body: &str,
        created_by_tg_id: i64,
    ) -> Result<i64, StorageError>;

    /// Creates one `queued` delivery per active user. Returns how many rows
    /// were inserted.
    async fn create_deliveries_for_broadcast(&self, broadcast_id: i64)
        -> Result<u64, StorageError>;

    async fn get_queued_deliveries(
        &self,
        broadcast_id: i64,
        limit: i64,
    ) -> Result<Vec<QueuedDelivery>, StorageError>;

    async fn update_delivery_status<'a>(
        &self,
        delivery_id: i64,
        status: DeliveryStatus,
        error_code: Option<&'a str>,
    ) -> Result<(), StorageError>;

    /// Moves the broadcast to `running` and stamps `started_at`.
    async fn mark_broadcast_started(&self, broadcast_id: i64) -> Result<(), StorageError>;

    /// Moves the broadcast to `completed`, stamps `finished_at` and stores
    /// the terminal delivery counters.
    async fn mark_broadcast_finished(
        &self,
        broadcast_id: i64,
        stats_json: &str,
    ) -> Result<(), StorageError>;

    async fn get_admin_stats(&self) -> Result<AdminStats, StorageError>;

    async fn log_admin_action<'a>(
        &self,
        admin_tg_id: i64,
        action: &str,
        payload_json: Option<&'a str>,
    ) -> Result<(), StorageError>;
}

/// City reference data seeded on startup.
pub(crate) struct SeedCity {
    pub code: &'static str,
    pub name_uk: &'static str,
    pub channel_url: Option<&'static str>,
    pub aliases: &'static [&'static str],
}

/// Cities without a `channel_url` resolve but are reported as
/// "not yet available" by the handlers.
pub(crate) const SEED_CITIES: &[SeedCity] = &[
    SeedCity {
        code: "kyiv",
        name_uk: "Київ",
        channel_url: Some("https://t.me/orenda_kyiv"),
        aliases: &["київ", "киев", "kyiv", "kiev"],
    },
    SeedCity {
        code: "lviv",
        name_uk: "Львів",
        channel_url: Some("https://t.me/orenda_lviv"),
        aliases: &["львів", "львов", "lviv"],
    },
    SeedCity {
        code: "odesa",
        name_uk: "Одеса",
        channel_url: Some("https://t.me/orenda_odesa"),
        aliases: &["одеса", "одесса", "odesa", "odessa"],
    },
    SeedCity {
        code: "kharkiv",
        name_uk: "Харків",
        channel_url: Some("https://t.me/orenda_kharkiv"),
        aliases: &["харків", "харьков", "kharkiv"],
    },
    SeedCity {
        code: "dnipro",
        name_uk: "Дніпро",
        channel_url: Some("https://t.me/orenda_dnipro"),
        aliases: &["дніпро", "днепр", "днипро", "dnipro"],
    },
    SeedCity {
        code: "vinnytsia",
        name_uk: "Вінниця",
        channel_url: Some("https://t.me/orenda_vinnytsia"),
        aliases: &["вінниця", "винница", "vinnytsia"],
    },
    SeedCity {
        code: "poltava",
        name_uk: "Полтава",
        channel_url: None,
        aliases: &["полтава", "poltava"],
    },
    SeedCity {
        code: "ternopil",
        name_uk: "Тернопіль",
        channel_url: None,
        aliases: &["тернопіль", "тернополь", "ternopil"],
    },
];

/// Connects to the backend selected by configuration.
///
/// A `DATABASE_URL` pointing at PostgreSQL wins; otherwise the bot falls
/// back to a local SQLite file.
///
/// # Errors
///
/// Returns an error if the connection cannot be established.
pub async fn connect(settings: &Settings) -> Result<Arc<dyn Repository>, StorageError> {
    match settings.database_url.as_deref() {
        Some(url) if url.starts_with("postgres") => {
            info!("🐘 Using PostgreSQL backend");
            Ok(Arc::new(PostgresRepository::connect(url).await?))
        }
        _ => {
            info!("📁 Using SQLite backend at {}", settings.sqlite_path);
            Ok(Arc::new(SqliteRepository::connect(&settings.sqlite_path).await?))
        }
    }
}
