//! SQLite adapter, used for small installs and in integration tests.

use super::{Repository, StorageError, SEED_CITIES};
use crate::models::{AdminStats, City, DeliveryStatus, QueuedDelivery, User};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS users (
        id               INTEGER PRIMARY KEY AUTOINCREMENT,
        tg_id            INTEGER UNIQUE NOT NULL,
        username         TEXT,
        first_name       TEXT,
        lang             TEXT NOT NULL DEFAULT 'uk',
        last_city        TEXT,
        is_active        BOOLEAN NOT NULL DEFAULT 1,
        is_blocked       BOOLEAN NOT NULL DEFAULT 0,
        created_at       TEXT NOT NULL,
        updated_at       TEXT NOT NULL,
        last_seen_at     TEXT,
        utm_source       TEXT
    )",
    "CREATE INDEX IF NOT EXISTS idx_users_tg_id ON users(tg_id)",
    "CREATE INDEX IF NOT EXISTS idx_users_is_active ON users(is_active)",
    "CREATE TABLE IF NOT EXISTS cities (
        code          TEXT PRIMARY KEY,
        name_uk       TEXT NOT NULL,
        channel_url   TEXT,
        is_active     BOOLEAN NOT NULL DEFAULT 1,
        created_at    TEXT NOT NULL,
        updated_at    TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS city_aliases (
        id        INTEGER PRIMARY KEY AUTOINCREMENT,
        city_code TEXT REFERENCES cities(code) ON DELETE CASCADE,
        alias     TEXT NOT NULL,
        UNIQUE(city_code, alias)
    )",
    "CREATE INDEX IF NOT EXISTS idx_city_alias ON city_aliases(alias)",
    "CREATE TABLE IF NOT EXISTS user_city_history (
        id             INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id        INTEGER REFERENCES users(id) ON DELETE CASCADE,
        city_code      TEXT REFERENCES cities(code),
        city_name_uk   TEXT NOT NULL,
        selected_at    TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS broadcasts (
        id              INTEGER PRIMARY KEY AUTOINCREMENT,
        title           TEXT,
        body_markdown   TEXT,
        status          TEXT NOT NULL DEFAULT 'draft',
        created_by      INTEGER REFERENCES users(id),
        created_at      TEXT NOT NULL,
        started_at      TEXT,
        finished_at     TEXT,
        stats_json      TEXT
    )",
    "CREATE TABLE IF NOT EXISTS deliveries (
        id              INTEGER PRIMARY KEY AUTOINCREMENT,
        broadcast_id    INTEGER REFERENCES broadcasts(id) ON DELETE CASCADE,
        user_id         INTEGER REFERENCES users(id) ON DELETE CASCADE,
        status          TEXT NOT NULL DEFAULT 'queued',
        attempts        INTEGER NOT NULL DEFAULT 0,
        error_code      TEXT,
        sent_at         TEXT,
        UNIQUE (broadcast_id, user_id)
    )",
    "CREATE INDEX IF NOT EXISTS idx_deliv_bcast_status ON deliveries(broadcast_id, status)",
    "CREATE TABLE IF NOT EXISTS unsubscriptions (
        id           INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id      INTEGER REFERENCES users(id) ON DELETE CASCADE,
        reason       TEXT,
        created_at   TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_unsub_user ON unsubscriptions(user_id)",
    "CREATE TABLE IF NOT EXISTS admin_actions (
        id            INTEGER PRIMARY KEY AUTOINCREMENT,
        admin_tg_id   INTEGER NOT NULL,
        action        TEXT NOT NULL,
        payload_json  TEXT,
        created_at    TEXT NOT NULL
    )",
];

const USER_COLUMNS: &str = "id, tg_id, username, first_name, lang, last_city, \
     is_active, is_blocked, created_at, updated_at, last_seen_at, utm_source";

/// SQLite-backed [`Repository`].
pub struct SqliteRepository {
    pool: SqlitePool,
}

impl SqliteRepository {
    /// Opens (and creates, if missing) the database file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub async fn connect(path: &str) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true);
        // SQLite has no server-side concurrency to exploit; one connection
        // keeps all writes serialized.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        Ok(Self { pool })
    }

    /// Opens a fresh in-memory database. Every instance is independent.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be created.
    pub async fn in_memory() -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(sqlx::Error::from)?
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl Repository for SqliteRepository {
    async fn init_schema(&self) -> Result<(), StorageError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn seed_cities(&self) -> Result<(), StorageError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        for city in SEED_CITIES {
            sqlx::query(
                "INSERT INTO cities (code, name_uk, channel_url, is_active, created_at, updated_at)
                 VALUES (?, ?, ?, 1, ?, ?)
                 ON CONFLICT (code) DO NOTHING",
            )
            .bind(city.code)
            .bind(city.name_uk)
            .bind(city.channel_url)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await?;

            for alias in city.aliases {
                sqlx::query(
                    "INSERT OR IGNORE INTO city_aliases (city_code, alias) VALUES (?, ?)",
                )
                .bind(city.code)
                .bind(alias)
                .execute(&mut *tx)
                .await?;
            }
        }
        tx.commit().await?;
        Ok(())
    }

    async fn save_user<'a>(
        &self,
        tg_id: i64,
        username: Option<&'a str>,
        first_name: Option<&'a str>,
        utm_source: Option<&'a str>,
    ) -> Result<i64, StorageError> {
        let now = Utc::now();
        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO users (tg_id, username, first_name, utm_source,
                                last_seen_at, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (tg_id) DO UPDATE SET
                 username = excluded.username,
                 first_name = excluded.first_name,
                 last_seen_at = excluded.last_seen_at,
                 updated_at = excluded.updated_at
             RETURNING id",
        )
        .bind(tg_id)
        .bind(username)
        .bind(first_name)
        .bind(utm_source)
        .bind(now)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn get_user_by_tg_id(&self, tg_id: i64) -> Result<Option<User>, StorageError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE tg_id = ?"
        ))
        .bind(tg_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn set_user_blocked(
        &self,
        tg_id: i64,
        blocked: bool,
        reason: &str,
    ) -> Result<(), StorageError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "UPDATE users SET is_blocked = ?, is_active = ?, updated_at = ? WHERE tg_id = ?",
        )
        .bind(blocked)
        .bind(!blocked)
        .bind(now)
        .bind(tg_id)
        .execute(&mut *tx)
        .await?;

        if blocked {
            sqlx::query(
                "INSERT INTO unsubscriptions (user_id, reason, created_at)
                 SELECT id, ?, ? FROM users WHERE tg_id = ?",
            )
            .bind(reason)
            .bind(now)
            .bind(tg_id)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn count_users(&self, active_only: bool) -> Result<i64, StorageError> {
        let query = if active_only {
            "SELECT COUNT(*) FROM users WHERE is_active = 1 AND is_blocked = 0"
        } else {
            "SELECT COUNT(*) FROM users"
        };
        Ok(sqlx::query_scalar::<_, i64>(query)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn list_active_users(&self) -> Result<Vec<User>, StorageError> {
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE is_active = 1 AND is_blocked = 0 ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(users)
    }

    async fn find_city_by_alias(&self, input: &str) -> Result<Option<City>, StorageError> {
        // Aliases are stored lowercase; Unicode folding happens here because
        // SQLite lower() only handles ASCII.
        let needle = input.trim().to_lowercase();
        let city = sqlx::query_as::<_, City>(
            "SELECT c.code, c.name_uk, c.channel_url
             FROM city_aliases a
             JOIN cities c ON c.code = a.city_code
             WHERE a.alias = ? AND c.is_active = 1
             LIMIT 1",
        )
        .bind(needle)
        .fetch_optional(&self.pool)
        .await?;
        Ok(city)
    }

    async fn find_cities_by_prefix(
        &self,
        prefix: &str,
        limit: i64,
    ) -> Result<Vec<City>, StorageError> {
        let needle = prefix.trim().to_lowercase();
        let cities = sqlx::query_as::<_, City>(
            "SELECT c.code, c.name_uk, c.channel_url
             FROM city_aliases a
             JOIN cities c ON c.code = a.city_code
             WHERE a.alias LIKE ? || '%' AND c.is_active = 1
             ORDER BY length(a.alias) ASC, a.id ASC
             LIMIT ?",
        )
        .bind(needle)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(cities)
    }

    async fn available_cities(&self) -> Result<Vec<City>, StorageError> {
        let cities = sqlx::query_as::<_, City>(
            "SELECT code, name_uk, channel_url FROM cities
             WHERE is_active = 1 AND channel_url IS NOT NULL AND channel_url != ''
             ORDER BY name_uk",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(cities)
    }

    async fn update_user_city(
        &self,
        tg_id: i64,
        city_code: &str,
        city_name: &str,
    ) -> Result<(), StorageError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE users SET last_city = ?, updated_at = ? WHERE tg_id = ?")
            .bind(city_name)
            .bind(now)
            .bind(tg_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "INSERT INTO user_city_history (user_id, city_code, city_name_uk, selected_at)
             SELECT id, ?, ?, ? FROM users WHERE tg_id = ?",
        )
        .bind(city_code)
        .bind(city_name)
        .bind(now)
        .bind(tg_id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn create_broadcast(
        &self,
        title: &str,
        body: &str,
        created_by_tg_id: i64,
    ) -> Result<i64, StorageError> {
        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO broadcasts (title, body_markdown, created_by, status, created_at)
             VALUES (?, ?, (SELECT id FROM users WHERE tg_id = ?), 'draft', ?)
             RETURNING id",
        )
        .bind(title)
        .bind(body)
        .bind(created_by_tg_id)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn create_deliveries_for_broadcast(
        &self,
        broadcast_id: i64,
    ) -> Result<u64, StorageError> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO deliveries (broadcast_id, user_id, status)
             SELECT ?, id, 'queued' FROM users
             WHERE is_active = 1 AND is_blocked = 0",
        )
        .bind(broadcast_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn get_queued_deliveries(
        &self,
        broadcast_id: i64,
        limit: i64,
    ) -> Result<Vec<QueuedDelivery>, StorageError> {
        let deliveries = sqlx::query_as::<_, QueuedDelivery>(
            "SELECT d.id AS delivery_id, d.user_id, u.tg_id
             FROM deliveries d
             JOIN users u ON u.id = d.user_id
             WHERE d.broadcast_id = ? AND d.status = 'queued'
             ORDER BY d.id
             LIMIT ?",
        )
        .bind(broadcast_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(deliveries)
    }

    async fn update_delivery_status<'a>(
        &self,
        delivery_id: i64,
        status: DeliveryStatus,
        error_code: Option<&'a str>,
    ) -> Result<(), StorageError> {
        sqlx::query(
            "UPDATE deliveries SET
                 status = ?,
                 attempts = attempts + 1,
                 error_code = ?,
                 sent_at = CASE WHEN ? THEN ? ELSE sent_at END
             WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(error_code)
        .bind(status == DeliveryStatus::Sent)
        .bind(Utc::now())
        .bind(delivery_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_broadcast_started(&self, broadcast_id: i64) -> Result<(), StorageError> {
        sqlx::query("UPDATE broadcasts SET status = 'running', started_at = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(broadcast_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_broadcast_finished(
        &self,
        broadcast_id: i64,
        stats_json: &str,
    ) -> Result<(), StorageError> {
        sqlx::query(
            "UPDATE broadcasts SET status = 'completed', finished_at = ?, stats_json = ?
             WHERE id = ?",
        )
        .bind(Utc::now())
        .bind(stats_json)
        .bind(broadcast_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_admin_stats(&self) -> Result<AdminStats, StorageError> {
        let week_ago = Utc::now() - Duration::days(7);
        let month_ago = Utc::now() - Duration::days(30);

        let total_users = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        let active_users = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM users WHERE is_active = 1 AND is_blocked = 0",
        )
        .fetch_one(&self.pool)
        .await?;
        let blocked_users =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE is_blocked = 1")
                .fetch_one(&self.pool)
                .await?;
        let total_unsubscriptions =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM unsubscriptions")
                .fetch_one(&self.pool)
                .await?;
        let new_users_7d =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE created_at >= ?")
                .bind(week_ago)
                .fetch_one(&self.pool)
                .await?;
        let unsubscribed_7d = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM unsubscriptions WHERE created_at >= ?",
        )
        .bind(week_ago)
        .fetch_one(&self.pool)
        .await?;
        let top_cities = sqlx::query_as::<_, crate::models::CityCount>(
            "SELECT city_name_uk, COUNT(*) AS count
             FROM user_city_history
             WHERE selected_at >= ?
             GROUP BY city_name_uk
             ORDER BY count DESC
             LIMIT 5",
        )
        .bind(month_ago)
        .fetch_all(&self.pool)
        .await?;

        Ok(AdminStats {
            total_users,
            active_users,
            blocked_users,
            total_unsubscriptions,
            new_users_7d,
            unsubscribed_7d,
            top_cities,
        })
    }

    async fn log_admin_action<'a>(
        &self,
        admin_tg_id: i64,
        action: &str,
        payload_json: Option<&'a str>,
    ) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO admin_actions (admin_tg_id, action, payload_json, created_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(admin_tg_id)
        .bind(action)
        .bind(payload_json)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
