use dotenvy::dotenv;
use orenda_bot::bot::handlers::{schema, Command};
use orenda_bot::bot::state::State;
use orenda_bot::bot::Services;
use orenda_bot::config::Settings;
use orenda_bot::storage::{self, Repository};
use regex::Regex;
use std::io::{self, Write};
use std::sync::Arc;
use teloxide::dispatching::dialogue::InMemStorage;
use teloxide::error_handlers::LoggingErrorHandler;
use teloxide::prelude::*;
use teloxide::types::ChatId;
use teloxide::utils::command::BotCommands;
use tracing::{error, info, warn};
use tracing_subscriber::{prelude::*, EnvFilter};

/// Regex patterns for redacting sensitive data
struct RedactionPatterns {
    token_in_url: Regex,
    bare_token: Regex,
    token_prefix: Regex,
    database_url: Regex,
}

impl RedactionPatterns {
    /// Initialize all regex patterns
    ///
    /// # Errors
    ///
    /// Returns an error if any regex pattern is invalid
    fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            token_in_url: Regex::new(r"(https?://[^/]+/bot)([0-9]+:[A-Za-z0-9_-]+)(/['\s]*)")?,
            bare_token: Regex::new(r"([0-9]{8,10}:[A-Za-z0-9_-]{35})")?,
            token_prefix: Regex::new(r"(bot[0-9]{8,10}:)[A-Za-z0-9_-]+")?,
            database_url: Regex::new(r"(postgres(?:ql)?://[^:]+:)[^@]+(@)")?,
        })
    }

    fn redact(&self, input: &str) -> String {
        let mut output = input.to_string();
        output = self
            .token_in_url
            .replace_all(&output, "$1[TELEGRAM_TOKEN]$3")
            .to_string();
        output = self
            .bare_token
            .replace_all(&output, "[TELEGRAM_TOKEN]")
            .to_string();
        output = self
            .token_prefix
            .replace_all(&output, "$1[TELEGRAM_TOKEN]")
            .to_string();
        output = self
            .database_url
            .replace_all(&output, "$1[MASKED]$2")
            .to_string();
        output
    }
}

struct RedactingWriter<W: Write> {
    inner: W,
    patterns: Arc<RedactionPatterns>,
}

impl<W: Write> RedactingWriter<W> {
    const fn new(inner: W, patterns: Arc<RedactionPatterns>) -> Self {
        Self { inner, patterns }
    }
}

impl<W: Write> Write for RedactingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let s = String::from_utf8_lossy(buf);
        let redacted = self.patterns.redact(&s);
        self.inner.write_all(redacted.as_bytes())?;
        // We return the original buffer length to satisfy the contract,
        // even if the redacted string length differs.
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

struct RedactingMakeWriter<F> {
    make_inner: F,
    patterns: Arc<RedactionPatterns>,
}

impl<F> RedactingMakeWriter<F> {
    const fn new(make_inner: F, patterns: Arc<RedactionPatterns>) -> Self {
        Self {
            make_inner,
            patterns,
        }
    }
}

impl<'a, F, W> tracing_subscriber::fmt::MakeWriter<'a> for RedactingMakeWriter<F>
where
    F: Fn() -> W + 'static,
    W: Write,
{
    type Writer = RedactingWriter<W>;

    fn make_writer(&'a self) -> Self::Writer {
        RedactingWriter::new((self.make_inner)(), self.patterns.clone())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file
    dotenv().ok();

    // Initialize redaction patterns early (before logging)
    let patterns = Arc::new(RedactionPatterns::new().map_err(|e| {
        eprintln!("Failed to compile regex patterns: {e}");
        e
    })?);

    // Setup logging with redaction
    init_logging(patterns);

    info!("🚀 Starting Orenda bot...");

    let settings = init_settings();
    let repo = init_storage(&settings).await;

    let bot = Bot::new(settings.telegram_token.clone());
    prepare_bot(&bot, &settings).await;

    let services = Arc::new(Services::default());

    info!("✅ Bot is running...");

    Dispatcher::builder(bot, schema())
        .dependencies(dptree::deps![
            repo,
            settings,
            services,
            InMemStorage::<State>::new()
        ])
        .default_handler(|upd| async move {
            warn!("Unhandled update: {:?}", upd);
        })
        .error_handler(LoggingErrorHandler::with_custom_text(
            "Error in the update handler",
        ))
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}

fn init_logging(patterns: Arc<RedactionPatterns>) {
    let make_writer = RedactingMakeWriter::new(io::stderr, patterns);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(make_writer))
        .init();
}

fn init_settings() -> Arc<Settings> {
    match Settings::new() {
        Ok(s) => {
            if !s.token_looks_valid() {
                error!("TELEGRAM_TOKEN does not look like a bot token");
                std::process::exit(1);
            }
            if s.admin_id == 0 {
                warn!("ADMIN_ID is not set, admin features are disabled");
            }
            info!("Configuration loaded successfully.");
            Arc::new(s)
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    }
}

async fn init_storage(settings: &Settings) -> Arc<dyn Repository> {
    let repo = match storage::connect(settings).await {
        Ok(repo) => repo,
        Err(e) => {
            error!("Failed to connect to the database: {}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = repo.init_schema().await {
        error!("Failed to initialize the schema: {}", e);
        std::process::exit(1);
    }
    if let Err(e) = repo.seed_cities().await {
        error!("Failed to seed city data: {}", e);
        std::process::exit(1);
    }
    info!("💾 Storage initialized.");
    repo
}

/// Startup handshake: verify the token, publish the command menu, drop
/// the webhook and any backlog, tell the admin we are back.
async fn prepare_bot(bot: &Bot, settings: &Settings) {
    match bot.get_me().await {
        Ok(me) => info!("🤖 Authorized as @{}", me.username()),
        Err(e) => {
            error!("getMe failed, check TELEGRAM_TOKEN: {}", e);
            std::process::exit(1);
        }
    }

    if let Err(e) = bot.set_my_commands(Command::bot_commands()).await {
        warn!("Failed to publish bot commands: {}", e);
    }

    // Polling and a leftover webhook are mutually exclusive
    if let Err(e) = bot.delete_webhook().drop_pending_updates(true).await {
        warn!("Failed to delete webhook: {}", e);
    }

    if settings.admin_id != 0 {
        let _ = bot
            .send_message(ChatId(settings.admin_id), "🚀 Бот перезапущено")
            .await;
    }
}
