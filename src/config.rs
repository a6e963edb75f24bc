//! Configuration and settings management
//!
//! Loads settings from environment variables and defines the tuning
//! constants for the anti-spam and broadcast machinery.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Application settings loaded from environment variables
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Telegram Bot API token
    pub telegram_token: String,

    /// Telegram ID of the single administrator
    #[serde(default)]
    pub admin_id: i64,

    /// Channel the user must be subscribed to (with leading `@`)
    #[serde(default = "default_channel")]
    pub channel: String,

    /// Public invite link for [`Settings::channel`]
    #[serde(default = "default_channel_link")]
    pub channel_link: String,

    /// Username of the human contact for rental requests (without `@`)
    #[serde(default = "default_admin_contact")]
    pub admin_contact: String,

    /// PostgreSQL connection string; SQLite is used when absent
    pub database_url: Option<String>,

    /// SQLite database file, used when `database_url` is not set
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: String,
}

fn default_channel() -> String {
    "@orenda_ukraine".to_string()
}

fn default_channel_link() -> String {
    "https://t.me/orenda_ukraine".to_string()
}

fn default_admin_contact() -> String {
    "orenda_admin".to_string()
}

fn default_sqlite_path() -> String {
    "bot_database.db".to_string()
}

impl Settings {
    /// Create new settings by loading from environment and files
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails.
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(Environment::with_prefix("APP").separator("__"))
            // Environment::default() auto-converts UPPER_SNAKE_CASE to snake_case;
            // ignore_empty treats empty env vars as unset
            .add_source(Environment::default().ignore_empty(true))
            .build()?;

        let mut settings: Self = s.try_deserialize()?;

        // Fallback: check environment variables directly if config didn't
        // pick them up (automatic mapping behavior differs between sources)
        if settings.database_url.is_none() {
            if let Ok(val) = std::env::var("DATABASE_URL") {
                if !val.is_empty() {
                    settings.database_url = Some(val);
                }
            }
        }
        if settings.admin_id == 0 {
            if let Ok(val) = std::env::var("ADMIN_ID") {
                settings.admin_id = val.parse().unwrap_or(0);
            }
        }

        Ok(settings)
    }

    /// Checks the `number:secret` shape of a Telegram bot token.
    ///
    /// Catches truncated tokens before the first network call.
    #[must_use]
    pub fn token_looks_valid(&self) -> bool {
        let mut parts = self.telegram_token.splitn(2, ':');
        let Some(id) = parts.next() else {
            return false;
        };
        let Some(secret) = parts.next() else {
            return false;
        };
        !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()) && secret.len() >= 35
    }

    /// Whether the given Telegram ID belongs to the administrator
    #[must_use]
    pub fn is_admin(&self, tg_id: i64) -> bool {
        self.admin_id != 0 && self.admin_id == tg_id
    }
}

// Anti-spam configuration
/// Max admitted events per user inside [`RATE_LIMIT_WINDOW`]
pub const RATE_LIMIT_THRESHOLD: usize = 5;
/// Sliding window for the per-user event counter
pub const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(10);
/// Minimum pause between two admitted events of one user
pub const MESSAGE_COOLDOWN: Duration = Duration::from_secs(2);

// Subscription check cache
/// How long a membership check result stays valid
pub const SUBSCRIPTION_CACHE_TTL: Duration = Duration::from_secs(300);
/// Upper bound on cached membership entries
pub const SUBSCRIPTION_CACHE_CAPACITY: u64 = 10_000;

// Broadcast engine
/// Pause between two outbound deliveries
pub const BROADCAST_THROTTLE: Duration = Duration::from_millis(50);
/// Progress message is refreshed every N processed recipients
pub const BROADCAST_PROGRESS_EVERY: usize = 10;

/// Cooldown for repeated help requests from one user
pub const HELP_COOLDOWN: Duration = Duration::from_secs(5);
