//! Keyboards and user-facing texts.
//!
//! All copy lives here so handlers stay about control flow. The interface
//! language is Ukrainian.

use crate::models::City;
use teloxide::types::{
    InlineKeyboardButton, InlineKeyboardMarkup, KeyboardButton, KeyboardMarkup,
};
use url::Url;

// Main menu buttons; handlers match on these exact strings
pub const BTN_PICK_CITY: &str = "🏙 Обрати місто";
pub const BTN_SUBSCRIBE: &str = "📢 Підписатися на канал";
pub const BTN_CHECK_SUB: &str = "✅ Перевірити підписку";
pub const BTN_HELP: &str = "ℹ️ Допомога";
pub const BTN_CONTACT: &str = "📞 Зв'язок з нами";
pub const BTN_ADMIN: &str = "🔧 Адмін-панель";

// Admin menu buttons
pub const BTN_ADMIN_STATS: &str = "📊 Статистика";
pub const BTN_ADMIN_USERS: &str = "👥 Користувачі";
pub const BTN_ADMIN_BROADCAST: &str = "📢 Розсилка";
pub const BTN_ADMIN_RESET_LIMITS: &str = "🧹 Скинути ліміти";
pub const BTN_ADMIN_BACK: &str = "⬅️ Назад";

/// Callback payload of the "I subscribed" gate button.
pub const CALLBACK_CHECK_SUB: &str = "check_subscription";

/// Callback prefix of the city-picker buttons.
const CITY_CALLBACK_PREFIX: &str = "city:";

/// Callback payload for one picker button.
#[must_use]
pub fn city_callback_data(code: &str) -> String {
    format!("{CITY_CALLBACK_PREFIX}{code}")
}

/// Extracts the city code from a picker callback payload.
#[must_use]
pub fn parse_city_callback(data: &str) -> Option<&str> {
    data.strip_prefix(CITY_CALLBACK_PREFIX)
}

/// Reply keyboard shown in the idle state.
#[must_use]
pub fn main_menu(is_admin: bool) -> KeyboardMarkup {
    let mut rows = vec![
        vec![KeyboardButton::new(BTN_PICK_CITY)],
        vec![
            KeyboardButton::new(BTN_SUBSCRIBE),
            KeyboardButton::new(BTN_CHECK_SUB),
        ],
        vec![
            KeyboardButton::new(BTN_HELP),
            KeyboardButton::new(BTN_CONTACT),
        ],
    ];
    if is_admin {
        rows.push(vec![KeyboardButton::new(BTN_ADMIN)]);
    }
    KeyboardMarkup::new(rows).resize_keyboard()
}

/// Reply keyboard of the admin panel.
#[must_use]
pub fn admin_menu() -> KeyboardMarkup {
    KeyboardMarkup::new([
        vec![
            KeyboardButton::new(BTN_ADMIN_STATS),
            KeyboardButton::new(BTN_ADMIN_USERS),
        ],
        vec![
            KeyboardButton::new(BTN_ADMIN_BROADCAST),
            KeyboardButton::new(BTN_ADMIN_RESET_LIMITS),
        ],
        vec![KeyboardButton::new(BTN_ADMIN_BACK)],
    ])
    .resize_keyboard()
}

/// Inline picker over the cities that already have a channel, two per
/// row. Typed input stays available alongside it.
#[must_use]
pub fn city_picker(cities: &[City]) -> InlineKeyboardMarkup {
    let rows: Vec<Vec<InlineKeyboardButton>> = cities
        .chunks(2)
        .map(|pair| {
            pair.iter()
                .map(|city| {
                    InlineKeyboardButton::callback(
                        city.name_uk.clone(),
                        city_callback_data(&city.code),
                    )
                })
                .collect()
        })
        .collect();
    InlineKeyboardMarkup::new(rows)
}

/// Inline keyboard of the subscription gate: join link plus a re-check
/// button. The join button is dropped if the configured link is not a
/// valid URL.
#[must_use]
pub fn subscription_gate(channel_link: &str) -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = Vec::new();
    if let Ok(link) = Url::parse(channel_link) {
        rows.push(vec![InlineKeyboardButton::url("➡️ Підписатися", link)]);
    }
    rows.push(vec![InlineKeyboardButton::callback(
        "✅ Я підписався",
        CALLBACK_CHECK_SUB,
    )]);
    InlineKeyboardMarkup::new(rows)
}

/// Inline button leading to a city's rental channel.
#[must_use]
pub fn city_channel(city_name: &str, channel_url: &str) -> Option<InlineKeyboardMarkup> {
    let link = Url::parse(channel_url).ok()?;
    Some(InlineKeyboardMarkup::new([[InlineKeyboardButton::url(
        format!("🏠 Оренда: {city_name}"),
        link,
    )]]))
}

pub fn welcome(first_name: Option<&str>) -> String {
    let name = first_name.unwrap_or("друже");
    format!(
        "Привіт, {name}! 👋\n\n\
         Я допоможу знайти канал з орендою житла у твоєму місті.\n\
         Натисни «{BTN_PICK_CITY}» або просто напиши назву міста."
    )
}

pub const HELP: &str = "ℹ️ Як це працює:\n\n\
    1. Обери місто або напиши його назву.\n\
    2. Підпишись на наш основний канал.\n\
    3. Отримай посилання на канал з орендою у своєму місті.\n\n\
    Команди:\n\
    /start — головне меню\n\
    /help — ця довідка\n\
    /cancel — скасувати поточну дію";

pub const ASK_CITY: &str =
    "🏙 Обери місто з кнопок нижче або напиши його назву.\n\
     Наприклад: Київ, Львів, Одеса...";

pub fn subscribe_prompt(channel: &str) -> String {
    format!(
        "📢 Наш основний канал: {channel}\n\
         Підписуйся, щоб нічого не пропустити!"
    )
}

pub fn contact(admin_contact: &str) -> String {
    format!(
        "📞 З питань співпраці та реклами пишіть: @{admin_contact}"
    )
}

pub fn city_unknown(input: &str) -> String {
    format!(
        "🤷 Не знайшов міста «{}».\n\
         Спробуй ще раз або напиши першi лiтери назви.",
        input.trim()
    )
}

pub fn city_no_channel(city_name: &str) -> String {
    format!(
        "🏗 {city_name} — канал для цього міста ще готується.\n\
         Ми повідомимо, щойно він з'явиться!"
    )
}

pub fn city_found(city_name: &str) -> String {
    format!("✅ Тримай канал з орендою у місті {city_name}:")
}

pub fn not_subscribed(channel: &str) -> String {
    format!(
        "🔒 Щоб отримати посилання, підпишись на наш основний канал {channel} \
         і натисни «✅ Я підписався»."
    )
}

pub const SUBSCRIPTION_CONFIRMED: &str = "🎉 Дякую за підписку!";
pub const SUBSCRIPTION_STILL_MISSING: &str =
    "😕 Підписки поки не бачу. Підпишись і спробуй ще раз.";

pub const RATE_LIMITED: &str =
    "🚫 Забагато повідомлень. Зроби паузу, будь ласка.";
pub const CANCELLED: &str = "❌ Дію скасовано.";
pub const NOTHING_TO_CANCEL: &str = "🤔 Нема чого скасовувати.";
pub const UNKNOWN_COMMAND: &str =
    "🤖 Не розумію. Скористайся кнопками меню або командою /help.";

// Admin copy
pub const ADMIN_ONLY: &str = "⛔ Ця команда доступна лише адміністратору.";
pub fn ask_broadcast(recipients: usize) -> String {
    format!(
        "📢 Отримувачів: {recipients}.\n\
         Надішли текст розсилки одним повідомленням.\n/cancel — скасувати."
    )
}
pub const BROADCAST_EMPTY: &str = "⚠️ Текст розсилки порожній. Спробуй ще раз.";
pub const LIMITS_RESET: &str = "🧹 Ліміти та кеш підписок скинуто.";

pub fn users_summary(total: i64, active: i64) -> String {
    format!(
        "👥 Користувачів усього: {total}\n\
         ✅ Активних (отримають розсилку): {active}"
    )
}

/// In-memory counters appended to the stats screen.
pub fn runtime_stats(blocked: usize, tracked: usize, subscription_entries: u64) -> String {
    format!(
        "⚙️ У пам'яті:\n\
         🚫 Заблоковано лімітером: {blocked}\n\
         ⏱ Відстежується лімітером: {tracked}\n\
         📋 Кеш підписок: {subscription_entries}"
    )
}

pub fn admin_stats(stats: &crate::models::AdminStats) -> String {
    let mut text = format!(
        "📊 Статистика\n\n\
         👥 Користувачів: {}\n\
         ✅ Активних: {}\n\
         🚷 Заблокували бота: {}\n\
         📉 Відписок: {}\n\n\
         За 7 днів:\n\
         ➕ Нових: {}\n\
         ➖ Відписалось: {}\n",
        stats.total_users,
        stats.active_users,
        stats.blocked_users,
        stats.total_unsubscriptions,
        stats.new_users_7d,
        stats.unsubscribed_7d,
    );
    if !stats.top_cities.is_empty() {
        text.push_str("\n🏙 Топ міст (30 днів):\n");
        for city in &stats.top_cities {
            text.push_str(&format!("  {} — {}\n", city.city_name_uk, city.count));
        }
    }
    text
}

pub fn broadcast_report(report: &crate::bot::broadcast::DeliveryReport) -> String {
    format!(
        "✅ Розсилку завершено\n\n\
         📨 Надіслано: {}\n\
         🚷 Заблокували: {}\n\
         ⚠️ Помилок: {}\n\
         📈 Успішність: {:.0}%",
        report.sent,
        report.blocked,
        report.failed,
        report.success_ratio() * 100.0
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::broadcast::DeliveryReport;
    use crate::models::{AdminStats, CityCount};

    #[test]
    fn test_main_menu_admin_row() {
        let user_menu = main_menu(false);
        let admin_menu = main_menu(true);
        assert_eq!(user_menu.keyboard.len(), 3);
        assert_eq!(user_menu.keyboard[1][0].text, BTN_SUBSCRIBE);
        assert_eq!(user_menu.keyboard[1][1].text, BTN_CHECK_SUB);
        assert_eq!(admin_menu.keyboard.len(), 4);
        assert_eq!(admin_menu.keyboard[3][0].text, BTN_ADMIN);
    }

    #[test]
    fn test_city_picker_two_per_row() {
        let city = |code: &str, name: &str| City {
            code: code.to_string(),
            name_uk: name.to_string(),
            channel_url: Some(format!("https://t.me/orenda_{code}")),
        };
        let cities = vec![
            city("kyiv", "Київ"),
            city("lviv", "Львів"),
            city("odesa", "Одеса"),
        ];

        let picker = city_picker(&cities);
        assert_eq!(picker.inline_keyboard.len(), 2);
        assert_eq!(picker.inline_keyboard[0].len(), 2);
        assert_eq!(picker.inline_keyboard[1].len(), 1);
        assert_eq!(picker.inline_keyboard[0][0].text, "Київ");
        assert_eq!(
            picker.inline_keyboard[0][0].kind,
            teloxide::types::InlineKeyboardButtonKind::CallbackData(
                "city:kyiv".to_string()
            )
        );
    }

    #[test]
    fn test_city_callback_round_trip() {
        assert_eq!(parse_city_callback(&city_callback_data("dnipro")), Some("dnipro"));
        assert_eq!(parse_city_callback(CALLBACK_CHECK_SUB), None);
        assert_eq!(parse_city_callback("cities"), None);
    }

    #[test]
    fn test_gate_keyboard_drops_bad_link() {
        let good = subscription_gate("https://t.me/orenda_ukraine");
        assert_eq!(good.inline_keyboard.len(), 2);

        // A broken link still leaves the re-check button usable
        let bad = subscription_gate("not a url");
        assert_eq!(bad.inline_keyboard.len(), 1);
        assert_eq!(bad.inline_keyboard[0][0].text, "✅ Я підписався");
    }

    #[test]
    fn test_city_channel_keyboard() {
        assert!(city_channel("Київ", "https://t.me/orenda_kyiv").is_some());
        assert!(city_channel("Київ", "").is_none());
    }

    #[test]
    fn test_admin_stats_includes_top_cities() {
        let stats = AdminStats {
            total_users: 10,
            active_users: 8,
            top_cities: vec![CityCount {
                city_name_uk: "Київ".to_string(),
                count: 5,
            }],
            ..AdminStats::default()
        };
        let text = admin_stats(&stats);
        assert!(text.contains("👥 Користувачів: 10"));
        assert!(text.contains("Київ — 5"));
    }

    #[test]
    fn test_runtime_stats_counters() {
        let text = runtime_stats(2, 7, 13);
        assert!(text.contains("🚫 Заблоковано лімітером: 2"));
        assert!(text.contains("⏱ Відстежується лімітером: 7"));
        assert!(text.contains("📋 Кеш підписок: 13"));
    }

    #[test]
    fn test_broadcast_report_text() {
        let report = DeliveryReport {
            total: 4,
            sent: 3,
            blocked: 1,
            failed: 0,
        };
        let text = broadcast_report(&report);
        assert!(text.contains("📨 Надіслано: 3"));
        assert!(text.contains("75%"));
    }
}
