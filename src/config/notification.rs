//! Notification configuration.

use serde::Deserialize;

/// Alert channels. Secrets never come from the YAML file.
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationConfig {
    /// Telegram alerts; absent means disabled.
    pub telegram: Option<TelegramConfig>,
}

/// Telegram channel and the event groups it forwards.
#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Read from TELEGRAM_BOT_TOKEN.
    #[serde(skip)]
    pub bot_token: String,
    /// Read from TELEGRAM_CHAT_ID.
    #[serde(skip)]
    pub chat_id: String,
    /// Read from TELEGRAM_ERROR_CHAT_ID; errors go to the main chat when empty.
    #[serde(skip)]
    pub error_chat_id: String,
    /// Send alerts when positions open and close.
    #[serde(default)]
    pub notify_positions: bool,
    /// Send alerts when a trailing stop moves.
    #[serde(default)]
    pub notify_trailing: bool,
    /// Errors and defensive closes.
    #[serde(default)]
    pub notify_errors: bool,
    /// Periodic overview with engine statistics.
    #[serde(default)]
    pub notify_overview: bool,
}
