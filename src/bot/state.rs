//! Dialogue state machine.
//!
//! One state per user chat, kept in teloxide's in-memory dialogue storage.
//! Every state is reachable from [`State::Idle`] and every flow can be
//! abandoned with /cancel or by pressing a main-menu button.

/// Conversation state of a single chat.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum State {
    /// No flow in progress; commands and menu buttons are served directly.
    #[default]
    Idle,
    /// The bot asked for a city name and waits for free-text input.
    AwaitingCity,
    /// A city was resolved but the user is not subscribed to the main
    /// channel yet. The chosen city is carried so the "I subscribed"
    /// button can finish the flow without re-asking.
    SubscriptionGate {
        city_code: String,
        city_name: String,
    },
    /// The administrator is composing a broadcast; the next message
    /// (text, or photo with caption) becomes its payload.
    AwaitingBroadcast,
    /// The administrator is inside the admin panel keyboard.
    AdminMenu,
}

impl State {
    /// Whether the chat is inside a multi-step flow.
    #[must_use]
    pub fn in_flow(&self) -> bool {
        !matches!(self, Self::Idle)
    }
}
