//! Update handlers and the dptree dispatch schema.
//!
//! Routing order matters: commands first, then menu buttons (so a button
//! press always escapes whatever flow the chat is in), then the dialogue
//! states, then the free-text fallback that treats unknown input as a
//! city guess.

use super::broadcast::{BroadcastPayload, Broadcaster};
use super::cities::{resolve_city, Resolution};
use super::rate_limit::Verdict;
use super::state::State;
use super::transport::{is_channel_member, StatusMessageProgress, TelegramTransport};
use super::{views, Services};
use crate::config::Settings;
use crate::models::City;
use crate::storage::Repository;
use serde_json::json;
use std::sync::Arc;
use teloxide::dispatching::dialogue::{self, InMemStorage};
use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;
use tracing::{info, warn};

pub type BotDialogue = Dialogue<State, InMemStorage<State>>;
type HandlerResult = anyhow::Result<()>;

/// Commands shown in the Telegram command menu.
#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase")]
pub enum Command {
    #[command(description = "почати роботу")]
    Start,
    #[command(description = "довідка")]
    Help,
    #[command(description = "скасувати поточну дію")]
    Cancel,
    #[command(description = "адмін-панель", hide)]
    Admin,
    #[command(description = "статистика", hide)]
    Stats,
    #[command(description = "розсилка", hide)]
    Broadcast,
}

/// Builds the full dispatch tree.
pub fn schema() -> UpdateHandler<anyhow::Error> {
    let commands = teloxide::filter_command::<Command, _>()
        .branch(dptree::case![Command::Help].endpoint(handle_help))
        .branch(dptree::case![Command::Cancel].endpoint(handle_cancel))
        .branch(dptree::case![Command::Admin].endpoint(handle_admin))
        .branch(dptree::case![Command::Stats].endpoint(handle_stats))
        .branch(dptree::case![Command::Broadcast].endpoint(handle_broadcast_command));

    let messages = Update::filter_message()
        // /start is matched on raw text: the command parser would reject
        // the deep-link payload ("/start promo_x") as excess arguments
        .branch(dptree::filter(is_start_command).endpoint(handle_start))
        .branch(commands)
        // Menu buttons escape any flow, so they are matched before states
        .branch(dptree::filter(is_menu_button).endpoint(handle_menu_button))
        .branch(dptree::case![State::AwaitingBroadcast].endpoint(handle_broadcast_input))
        .branch(dptree::case![State::AwaitingCity].endpoint(handle_city_input))
        .branch(
            dptree::case![State::SubscriptionGate { city_code, city_name }]
                .endpoint(handle_city_input),
        )
        .branch(dptree::endpoint(handle_fallback));

    dialogue::enter::<Update, InMemStorage<State>, State, _>()
        .branch(messages)
        .branch(Update::filter_callback_query().endpoint(handle_callback))
}

fn is_start_command(msg: Message) -> bool {
    msg.text().is_some_and(|text| {
        text.split_whitespace()
            .next()
            .is_some_and(|cmd| cmd == "/start" || cmd.starts_with("/start@"))
    })
}

fn is_menu_button(msg: Message) -> bool {
    matches!(
        msg.text(),
        Some(
            views::BTN_PICK_CITY
                | views::BTN_SUBSCRIBE
                | views::BTN_CHECK_SUB
                | views::BTN_HELP
                | views::BTN_CONTACT
                | views::BTN_ADMIN
                | views::BTN_ADMIN_STATS
                | views::BTN_ADMIN_USERS
                | views::BTN_ADMIN_BROADCAST
                | views::BTN_ADMIN_RESET_LIMITS
                | views::BTN_ADMIN_BACK
        )
    )
}

fn sender_id(msg: &Message) -> Option<i64> {
    msg.from.as_ref().map(|user| user.id.0.cast_signed())
}

/// Rate-limit gate for user-facing handlers. The administrator is exempt.
///
/// Returns `true` when the update should be processed. The warning is
/// sent exactly once, on the event that trips the threshold.
async fn admitted(
    bot: &Bot,
    msg: &Message,
    settings: &Settings,
    services: &Services,
) -> anyhow::Result<bool> {
    let Some(tg_id) = sender_id(msg) else {
        return Ok(false);
    };
    if settings.is_admin(tg_id) {
        return Ok(true);
    }
    match services.limiter.admit(tg_id).await {
        Verdict::Admitted => Ok(true),
        Verdict::Rejected { just_blocked } => {
            if just_blocked {
                bot.send_message(msg.chat.id, views::RATE_LIMITED).await?;
            }
            Ok(false)
        }
    }
}

async fn handle_start(
    bot: Bot,
    msg: Message,
    dialogue: BotDialogue,
    repo: Arc<dyn Repository>,
    settings: Arc<Settings>,
    services: Arc<Services>,
) -> HandlerResult {
    if !admitted(&bot, &msg, &settings, &services).await? {
        return Ok(());
    }
    let Some(tg_id) = sender_id(&msg) else {
        return Ok(());
    };

    // Deep-link payload: "/start promo_tiktok" tags the acquisition source
    let utm = msg
        .text()
        .and_then(|text| text.split_whitespace().nth(1));

    let from = msg.from.as_ref();
    repo.save_user(
        tg_id,
        from.and_then(|u| u.username.as_deref()),
        from.map(|u| u.first_name.as_str()),
        utm,
    )
    .await?;
    info!("👤 /start from {} (utm: {:?})", tg_id, utm);

    dialogue.update(State::Idle).await?;
    bot.send_message(
        msg.chat.id,
        views::welcome(from.map(|u| u.first_name.as_str())),
    )
    .reply_markup(views::main_menu(settings.is_admin(tg_id)))
    .await?;
    Ok(())
}

async fn handle_help(
    bot: Bot,
    msg: Message,
    dialogue: BotDialogue,
    settings: Arc<Settings>,
    services: Arc<Services>,
) -> HandlerResult {
    if !admitted(&bot, &msg, &settings, &services).await? {
        return Ok(());
    }
    let Some(tg_id) = sender_id(&msg) else {
        return Ok(());
    };
    // A command interrupts whatever flow was in progress
    dialogue.update(State::Idle).await?;
    // Repeated /help inside the cooldown is silently ignored
    if !services.help_guard.allow(tg_id).await {
        return Ok(());
    }
    bot.send_message(msg.chat.id, views::HELP).await?;
    Ok(())
}

async fn handle_cancel(bot: Bot, msg: Message, dialogue: BotDialogue) -> HandlerResult {
    let state = dialogue.get().await?.unwrap_or_default();
    if state.in_flow() {
        dialogue.update(State::Idle).await?;
        bot.send_message(msg.chat.id, views::CANCELLED).await?;
    } else {
        bot.send_message(msg.chat.id, views::NOTHING_TO_CANCEL).await?;
    }
    Ok(())
}

async fn handle_menu_button(
    bot: Bot,
    msg: Message,
    dialogue: BotDialogue,
    repo: Arc<dyn Repository>,
    settings: Arc<Settings>,
    services: Arc<Services>,
) -> HandlerResult {
    if !admitted(&bot, &msg, &settings, &services).await? {
        return Ok(());
    }
    let Some(tg_id) = sender_id(&msg) else {
        return Ok(());
    };

    match msg.text() {
        Some(views::BTN_PICK_CITY) => {
            dialogue.update(State::AwaitingCity).await?;
            let cities = repo.available_cities().await?;
            bot.send_message(msg.chat.id, views::ASK_CITY)
                .reply_markup(views::city_picker(&cities))
                .await?;
        }
        Some(views::BTN_SUBSCRIBE) => {
            bot.send_message(msg.chat.id, views::subscribe_prompt(&settings.channel))
                .reply_markup(views::subscription_gate(&settings.channel_link))
                .await?;
        }
        Some(views::BTN_CHECK_SUB) => {
            services.subscriptions.invalidate(tg_id).await;
            let subscribed = services
                .subscriptions
                .is_subscribed(tg_id, || is_channel_member(&bot, &settings.channel, tg_id))
                .await;
            let reply = if subscribed {
                views::SUBSCRIPTION_CONFIRMED
            } else {
                views::SUBSCRIPTION_STILL_MISSING
            };
            bot.send_message(msg.chat.id, reply).await?;
        }
        Some(views::BTN_HELP) => {
            if services.help_guard.allow(tg_id).await {
                bot.send_message(msg.chat.id, views::HELP).await?;
            }
        }
        Some(views::BTN_CONTACT) => {
            bot.send_message(msg.chat.id, views::contact(&settings.admin_contact))
                .await?;
        }
        Some(views::BTN_ADMIN) => {
            handle_admin(bot, msg, dialogue, settings, services).await?;
        }
        Some(views::BTN_ADMIN_STATS) => {
            handle_stats(bot, msg, repo, settings, services).await?;
        }
        Some(views::BTN_ADMIN_USERS) => {
            match users_summary_reply(repo.as_ref(), &settings, tg_id).await? {
                Some(text) => bot.send_message(msg.chat.id, text).await?,
                None => bot.send_message(msg.chat.id, views::ADMIN_ONLY).await?,
            };
        }
        Some(views::BTN_ADMIN_BROADCAST) => {
            handle_broadcast_command(bot, msg, dialogue, repo, settings).await?;
        }
        Some(views::BTN_ADMIN_RESET_LIMITS) => {
            if !settings.is_admin(tg_id) {
                bot.send_message(msg.chat.id, views::ADMIN_ONLY).await?;
                return Ok(());
            }
            services.limiter.reset().await;
            services.subscriptions.clear();
            repo.log_admin_action(tg_id, "reset_limits", None).await?;
            info!("🧹 Admin reset rate limits and subscription cache");
            bot.send_message(msg.chat.id, views::LIMITS_RESET).await?;
        }
        Some(views::BTN_ADMIN_BACK) => {
            dialogue.update(State::Idle).await?;
            bot.send_message(msg.chat.id, "👌")
                .reply_markup(views::main_menu(settings.is_admin(tg_id)))
                .await?;
        }
        _ => {}
    }
    Ok(())
}

async fn handle_admin(
    bot: Bot,
    msg: Message,
    dialogue: BotDialogue,
    settings: Arc<Settings>,
    services: Arc<Services>,
) -> HandlerResult {
    let Some(tg_id) = sender_id(&msg) else {
        return Ok(());
    };
    if !settings.is_admin(tg_id) {
        warn!("⛔ Unauthorized /admin attempt from {}", tg_id);
        bot.send_message(msg.chat.id, views::ADMIN_ONLY).await?;
        return Ok(());
    }
    dialogue.update(State::AdminMenu).await?;
    let blocked = services.limiter.blocked_count().await;
    bot.send_message(
        msg.chat.id,
        format!("🔧 Адмін-панель\n🚫 Заблоковано лімітером: {blocked}"),
    )
    .reply_markup(views::admin_menu())
    .await?;
    Ok(())
}

/// Builds the stats screen, or `None` for anyone but the administrator.
/// A rejected caller reads nothing and leaves no audit row.
async fn admin_stats_reply(
    repo: &dyn Repository,
    settings: &Settings,
    tg_id: i64,
) -> anyhow::Result<Option<String>> {
    if !settings.is_admin(tg_id) {
        return Ok(None);
    }
    let stats = repo.get_admin_stats().await?;
    repo.log_admin_action(tg_id, "stats", None).await?;
    Ok(Some(views::admin_stats(&stats)))
}

/// Builds the user-count screen, or `None` for anyone but the
/// administrator.
async fn users_summary_reply(
    repo: &dyn Repository,
    settings: &Settings,
    tg_id: i64,
) -> anyhow::Result<Option<String>> {
    if !settings.is_admin(tg_id) {
        return Ok(None);
    }
    let total = repo.count_users(false).await?;
    let active = repo.count_users(true).await?;
    repo.log_admin_action(tg_id, "users", None).await?;
    Ok(Some(views::users_summary(total, active)))
}

/// Counts the broadcast recipients, or `None` for anyone but the
/// administrator. A rejected caller touches no storage at all.
async fn begin_broadcast(
    repo: &dyn Repository,
    settings: &Settings,
    tg_id: i64,
) -> anyhow::Result<Option<usize>> {
    if !settings.is_admin(tg_id) {
        return Ok(None);
    }
    Ok(Some(repo.list_active_users().await?.len()))
}

async fn handle_stats(
    bot: Bot,
    msg: Message,
    repo: Arc<dyn Repository>,
    settings: Arc<Settings>,
    services: Arc<Services>,
) -> HandlerResult {
    let Some(tg_id) = sender_id(&msg) else {
        return Ok(());
    };
    let Some(stats) = admin_stats_reply(repo.as_ref(), &settings, tg_id).await? else {
        bot.send_message(msg.chat.id, views::ADMIN_ONLY).await?;
        return Ok(());
    };
    let runtime = views::runtime_stats(
        services.limiter.blocked_count().await,
        services.limiter.tracked_count().await,
        services.subscriptions.entry_count(),
    );
    bot.send_message(msg.chat.id, format!("{stats}\n{runtime}")).await?;
    Ok(())
}

async fn handle_broadcast_command(
    bot: Bot,
    msg: Message,
    dialogue: BotDialogue,
    repo: Arc<dyn Repository>,
    settings: Arc<Settings>,
) -> HandlerResult {
    let Some(tg_id) = sender_id(&msg) else {
        return Ok(());
    };
    let Some(recipients) = begin_broadcast(repo.as_ref(), &settings, tg_id).await? else {
        bot.send_message(msg.chat.id, views::ADMIN_ONLY).await?;
        return Ok(());
    };
    dialogue.update(State::AwaitingBroadcast).await?;
    bot.send_message(msg.chat.id, views::ask_broadcast(recipients))
        .await?;
    Ok(())
}

/// The admin's next message becomes the broadcast payload and the run
/// starts immediately, with progress edited into a status message.
///
/// A photo message broadcasts that photo (by file ID) with its caption;
/// anything else broadcasts the message text.
async fn handle_broadcast_input(
    bot: Bot,
    msg: Message,
    dialogue: BotDialogue,
    repo: Arc<dyn Repository>,
    settings: Arc<Settings>,
) -> HandlerResult {
    let Some(tg_id) = sender_id(&msg) else {
        return Ok(());
    };
    // The state is only reachable through the admin check, but the guard
    // is cheap and the consequences of a miss are not
    if !settings.is_admin(tg_id) {
        return Ok(());
    }

    let payload = if let Some(photo) = msg.photo().and_then(|sizes| sizes.last()) {
        BroadcastPayload::Photo {
            file_id: photo.file.id.0.clone(),
            caption: msg.caption().unwrap_or("").trim().to_string(),
        }
    } else {
        match msg.text().map(str::trim).filter(|t| !t.is_empty()) {
            Some(body) => BroadcastPayload::Text(body.to_string()),
            None => {
                bot.send_message(msg.chat.id, views::BROADCAST_EMPTY).await?;
                return Ok(());
            }
        }
    };
    dialogue.update(State::AdminMenu).await?;

    let title: String = payload
        .text()
        .lines()
        .next()
        .unwrap_or("")
        .chars()
        .take(64)
        .collect();
    repo.log_admin_action(
        tg_id,
        "broadcast",
        Some(&json!({ "title": title }).to_string()),
    )
    .await?;

    let progress = StatusMessageProgress::start(bot.clone(), msg.chat.id).await?;
    let transport = TelegramTransport::new(bot.clone());
    let broadcaster = Broadcaster::new(repo.clone());
    let report = broadcaster
        .run(&title, &payload, tg_id, &transport, &progress)
        .await?;

    bot.send_message(msg.chat.id, views::broadcast_report(&report))
        .reply_markup(views::admin_menu())
        .await?;
    Ok(())
}

async fn handle_city_input(
    bot: Bot,
    msg: Message,
    dialogue: BotDialogue,
    repo: Arc<dyn Repository>,
    settings: Arc<Settings>,
    services: Arc<Services>,
) -> HandlerResult {
    if !admitted(&bot, &msg, &settings, &services).await? {
        return Ok(());
    }
    let Some(tg_id) = sender_id(&msg) else {
        return Ok(());
    };
    let Some(text) = msg.text() else {
        bot.send_message(msg.chat.id, views::ASK_CITY).await?;
        return Ok(());
    };
    match resolve_city(repo.as_ref(), text).await? {
        Resolution::Found(city) => {
            offer_city(&bot, msg.chat.id, tg_id, &dialogue, &repo, &settings, &services, city)
                .await?;
        }
        Resolution::NotFound => {
            bot.send_message(msg.chat.id, views::city_unknown(text)).await?;
        }
    }
    Ok(())
}

/// Free text outside any flow is treated as a city guess first; only
/// input that resolves to nothing gets the "don't understand" reply.
async fn handle_fallback(
    bot: Bot,
    msg: Message,
    dialogue: BotDialogue,
    repo: Arc<dyn Repository>,
    settings: Arc<Settings>,
    services: Arc<Services>,
) -> HandlerResult {
    if !admitted(&bot, &msg, &settings, &services).await? {
        return Ok(());
    }
    let Some(tg_id) = sender_id(&msg) else {
        return Ok(());
    };
    let Some(text) = msg.text() else {
        return Ok(());
    };
    // One resolution per message; the hit is carried into the flow
    match resolve_city(repo.as_ref(), text).await? {
        Resolution::Found(city) => {
            offer_city(&bot, msg.chat.id, tg_id, &dialogue, &repo, &settings, &services, city)
                .await?;
        }
        Resolution::NotFound => {
            bot.send_message(msg.chat.id, views::UNKNOWN_COMMAND).await?;
        }
    }
    Ok(())
}

/// Shared tail of the city flow: deliver the channel link, park the user
/// at the subscription gate, or note that the channel is still coming.
#[allow(clippy::too_many_arguments)]
async fn offer_city(
    bot: &Bot,
    chat_id: ChatId,
    tg_id: i64,
    dialogue: &BotDialogue,
    repo: &Arc<dyn Repository>,
    settings: &Settings,
    services: &Services,
    city: City,
) -> HandlerResult {
    if !city.has_channel() {
        repo.update_user_city(tg_id, &city.code, &city.name_uk).await?;
        dialogue.update(State::Idle).await?;
        bot.send_message(chat_id, views::city_no_channel(&city.name_uk))
            .await?;
        return Ok(());
    }

    let subscribed = services
        .subscriptions
        .is_subscribed(tg_id, || is_channel_member(bot, &settings.channel, tg_id))
        .await;

    if subscribed {
        deliver_city(bot, chat_id, repo, tg_id, &city).await?;
        dialogue.update(State::Idle).await?;
    } else {
        info!("🔒 User {} gated on subscription for {}", tg_id, city.code);
        dialogue
            .update(State::SubscriptionGate {
                city_code: city.code.clone(),
                city_name: city.name_uk.clone(),
            })
            .await?;
        bot.send_message(chat_id, views::not_subscribed(&settings.channel))
            .reply_markup(views::subscription_gate(&settings.channel_link))
            .await?;
    }
    Ok(())
}

/// Records the choice and sends the channel link.
async fn deliver_city(
    bot: &Bot,
    chat_id: ChatId,
    repo: &Arc<dyn Repository>,
    tg_id: i64,
    city: &City,
) -> HandlerResult {
    repo.update_user_city(tg_id, &city.code, &city.name_uk).await?;
    let mut request = bot.send_message(chat_id, views::city_found(&city.name_uk));
    if let Some(markup) = city
        .channel_url
        .as_deref()
        .and_then(|url| views::city_channel(&city.name_uk, url))
    {
        request = request.reply_markup(markup);
    }
    request.await?;
    info!("🏙 User {} got channel for {}", tg_id, city.code);
    Ok(())
}

/// Inline button presses: a city-picker choice enters the city flow, the
/// "I subscribed" button re-checks membership with a fresh API call and
/// finishes the parked flow on success.
async fn handle_callback(
    bot: Bot,
    q: CallbackQuery,
    dialogue: BotDialogue,
    repo: Arc<dyn Repository>,
    settings: Arc<Settings>,
    services: Arc<Services>,
) -> HandlerResult {
    let _ = bot.answer_callback_query(q.id.clone()).await;

    let Some(data) = q.data.as_deref() else {
        return Ok(());
    };
    let Some(chat_id) = q.message.as_ref().map(|message| message.chat().id) else {
        return Ok(());
    };
    let tg_id = q.from.id.0.cast_signed();

    if !settings.is_admin(tg_id) {
        if let Verdict::Rejected { just_blocked } = services.limiter.admit(tg_id).await {
            if just_blocked {
                bot.send_message(chat_id, views::RATE_LIMITED).await?;
            }
            return Ok(());
        }
    }

    if let Some(code) = views::parse_city_callback(data) {
        // A stale button for a removed city is silently ignored
        if let Some(city) = repo.find_city_by_alias(code).await? {
            offer_city(&bot, chat_id, tg_id, &dialogue, &repo, &settings, &services, city)
                .await?;
        }
        return Ok(());
    }
    if data != views::CALLBACK_CHECK_SUB {
        return Ok(());
    }

    // Bypass the cached negative result, the user claims it just changed
    services.subscriptions.invalidate(tg_id).await;
    let subscribed = services
        .subscriptions
        .is_subscribed(tg_id, || is_channel_member(&bot, &settings.channel, tg_id))
        .await;

    if !subscribed {
        bot.send_message(chat_id, views::SUBSCRIPTION_STILL_MISSING)
            .await?;
        return Ok(());
    }

    bot.send_message(chat_id, views::SUBSCRIPTION_CONFIRMED).await?;
    if let Some(State::SubscriptionGate { city_code, city_name }) = dialogue.get().await? {
        let city = repo
            .find_city_by_alias(&city_code)
            .await?
            .unwrap_or(City {
                code: city_code,
                name_uk: city_name,
                channel_url: None,
            });
        deliver_city(&bot, chat_id, &repo, tg_id, &city).await?;
        dialogue.update(State::Idle).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::models::AdminStats;
    use crate::storage::MockRepository;
    use mockall::predicate::eq;

    fn settings_with_admin(admin_id: i64) -> Settings {
        Settings {
            telegram_token: "123456:TEST".to_string(),
            admin_id,
            channel: "@test_channel".to_string(),
            channel_link: "https://t.me/test_channel".to_string(),
            admin_contact: "test_admin".to_string(),
            database_url: None,
            sqlite_path: ":memory:".to_string(),
        }
    }

    #[tokio::test]
    async fn test_stats_rejected_for_non_admin_without_touching_storage() {
        let mut repo = MockRepository::new();
        repo.expect_get_admin_stats().times(0);
        repo.expect_log_admin_action().times(0);
        let settings = settings_with_admin(1);

        let reply = admin_stats_reply(&repo, &settings, 2).await.unwrap();
        assert!(reply.is_none());
    }

    #[tokio::test]
    async fn test_stats_served_and_audited_for_admin() {
        let mut repo = MockRepository::new();
        repo.expect_get_admin_stats().times(1).returning(|| {
            Ok(AdminStats {
                total_users: 3,
                ..AdminStats::default()
            })
        });
        repo.expect_log_admin_action()
            .withf(|tg_id, action, payload| *tg_id == 1 && action == "stats" && payload.is_none())
            .times(1)
            .returning(|_, _, _| Ok(()));
        let settings = settings_with_admin(1);

        let reply = admin_stats_reply(&repo, &settings, 1).await.unwrap();
        assert!(reply.unwrap().contains("👥 Користувачів: 3"));
    }

    #[tokio::test]
    async fn test_broadcast_not_opened_for_non_admin() {
        let mut repo = MockRepository::new();
        repo.expect_list_active_users().times(0);
        repo.expect_create_broadcast().times(0);
        repo.expect_log_admin_action().times(0);
        let settings = settings_with_admin(1);

        let opened = begin_broadcast(&repo, &settings, 42).await.unwrap();
        assert!(opened.is_none());
    }

    #[tokio::test]
    async fn test_users_summary_admin_only() {
        let mut repo = MockRepository::new();
        repo.expect_count_users().times(0);
        repo.expect_log_admin_action().times(0);
        let settings = settings_with_admin(1);

        let reply = users_summary_reply(&repo, &settings, 2).await.unwrap();
        assert!(reply.is_none());
    }

    #[tokio::test]
    async fn test_free_text_resolves_with_a_single_lookup() {
        let mut repo = MockRepository::new();
        repo.expect_find_city_by_alias()
            .with(eq("київ"))
            .times(1)
            .returning(|_| {
                Ok(Some(City {
                    code: "kyiv".to_string(),
                    name_uk: "Київ".to_string(),
                    channel_url: Some("https://t.me/orenda_kyiv".to_string()),
                }))
            });
        repo.expect_find_cities_by_prefix().times(0);

        // The resolved city is what flows into the rest of the handler
        let Resolution::Found(city) = resolve_city(&repo, "київ").await.unwrap() else {
            panic!("expected a match");
        };
        assert_eq!(city.code, "kyiv");
    }
}
