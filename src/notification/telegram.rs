use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::config::TelegramConfig;
use crate::notification::{Event, EventType, NotificationError, Notifier, format_event};

const TELEGRAM_API_URL: &str = "https://api.telegram.org/bot";
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_MESSAGE_LENGTH: usize = 4096;
const ASYNC_QUEUE_SIZE: usize = 100;

/// Which event types reach Telegram.
#[derive(Debug, Clone, Copy)]
struct EventFilter {
    positions: bool,
    trailing: bool,
    errors: bool,
    overview: bool,
}

impl EventFilter {
    fn allows(&self, event_type: EventType) -> bool {
        match event_type {
            EventType::Startup | EventType::Shutdown => true,
            EventType::PositionCreated
            | EventType::StopLossHit
            | EventType::TakeProfitHit
            | EventType::PositionClosed => self.positions,
            EventType::TrailingUpdated => self.trailing,
            EventType::Error => self.errors,
            EventType::Overview => self.overview,
        }
    }
}

/// TelegramNotifier sends events through the Telegram Bot API.
///
/// `send_async` enqueues onto a bounded channel drained by a background
/// worker; a full queue drops the event.
pub struct TelegramNotifier {
    chat_id: String,
    error_chat_id: Option<String>,
    filter: EventFilter,
    http_client: reqwest::Client,
    api_url: String,
    sender: mpsc::Sender<Event>,
}

impl TelegramNotifier {
    pub fn new(config: &TelegramConfig) -> Result<Self, NotificationError> {
        if config.bot_token.is_empty() {
            return Err(NotificationError::new("bot_token is required"));
        }
        if config.chat_id.is_empty() {
            return Err(NotificationError::new("chat_id is required"));
        }

        let http_client = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| NotificationError::new(format!("Failed to create HTTP client: {}", e)))?;

        let api_url = format!("{}{}", TELEGRAM_API_URL, config.bot_token);
        let error_chat_id = Some(config.error_chat_id.clone()).filter(|id| !id.is_empty());
        let filter = EventFilter {
            positions: config.notify_positions,
            trailing: config.notify_trailing,
            errors: config.notify_errors,
            overview: config.notify_overview,
        };

        let (sender, receiver) = mpsc::channel(ASYNC_QUEUE_SIZE);

        Self::spawn_worker(
            receiver,
            config.chat_id.clone(),
            error_chat_id.clone(),
            http_client.clone(),
            api_url.clone(),
        );

        Ok(Self {
            chat_id: config.chat_id.clone(),
            error_chat_id,
            filter,
            http_client,
            api_url,
            sender,
        })
    }

    fn chat_for<'a>(
        chat_id: &'a str,
        error_chat_id: Option<&'a str>,
        event_type: EventType,
    ) -> &'a str {
        match (event_type, error_chat_id) {
            (EventType::Error, Some(id)) => id,
            _ => chat_id,
        }
    }

    fn spawn_worker(
        mut receiver: mpsc::Receiver<Event>,
        chat_id: String,
        error_chat_id: Option<String>,
        http_client: reqwest::Client,
        api_url: String,
    ) {
        tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                let chat = Self::chat_for(&chat_id, error_chat_id.as_deref(), event.event_type);
                let text = format_event(&event);
                if let Err(e) = Self::send_message(&http_client, &api_url, chat, &text).await {
                    error!(error = %e, event = %event.event_type, "Failed to send Telegram message");
                }
            }
            debug!("Telegram worker stopped");
        });
    }

    async fn send_message(
        http_client: &reqwest::Client,
        api_url: &str,
        chat_id: &str,
        text: &str,
    ) -> Result<(), NotificationError> {
        let text = truncate(text, MAX_MESSAGE_LENGTH);
        let url = format!("{}/sendMessage", api_url);

        let payload = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "Markdown"
        });

        let response = http_client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| NotificationError::new(format!("HTTP request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(NotificationError::new(format!(
                "Telegram API error: {} - {}",
                status, body
            )));
        }

        Ok(())
    }
}

/// Cuts `text` to at most `max` bytes on a char boundary.
fn truncate(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[async_trait::async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, event: &Event) -> Result<(), NotificationError> {
        if !self.is_enabled(event.event_type) {
            return Ok(());
        }
        let chat = Self::chat_for(&self.chat_id, self.error_chat_id.as_deref(), event.event_type);
        let text = format_event(event);
        Self::send_message(&self.http_client, &self.api_url, chat, &text).await
    }

    fn send_async(&self, event: Event) {
        if !self.is_enabled(event.event_type) {
            return;
        }

        if let Err(e) = self.sender.try_send(event) {
            error!(error = %e, "Failed to queue Telegram message");
        }
    }

    fn is_enabled(&self, event_type: EventType) -> bool {
        self.filter.allows(event_type)
    }

    async fn close(&self) -> Result<(), NotificationError> {
        // Give the worker a moment to drain the queue
        tokio::time::sleep(Duration::from_millis(100)).await;
        Ok(())
    }
}
