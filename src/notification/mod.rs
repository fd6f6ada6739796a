//! Alert channels for position lifecycle events.

mod notifier;
mod telegram;

pub use notifier::{
    ErrorData, Event, EventData, EventType, MultiNotifier, NoopNotifier, NotificationError,
    Notifier, OverviewData, PositionClosedData, PositionCreatedData, ProtectionHitData,
    ShutdownData, StartupData, TrailingUpdatedData, format_event,
};
pub use telegram::TelegramNotifier;

use crate::config::NotificationConfig;
use std::sync::Arc;
use tracing::{info, warn};

/// Builds the notifier described by the configuration, falling back to a
/// no-op notifier when nothing is enabled.
pub fn create_notifier(config: Option<&NotificationConfig>) -> Arc<dyn Notifier> {
    let mut notifiers: Vec<Arc<dyn Notifier>> = Vec::new();

    if let Some(telegram) = config.and_then(|c| c.telegram.as_ref()) {
        if telegram.enabled {
            match TelegramNotifier::new(telegram) {
                Ok(notifier) => {
                    info!("Telegram notifications enabled");
                    notifiers.push(Arc::new(notifier));
                }
                Err(e) => warn!(error = %e, "Telegram notifier disabled"),
            }
        }
    }

    if notifiers.is_empty() {
        Arc::new(NoopNotifier::new())
    } else {
        Arc::new(MultiNotifier::new(notifiers))
    }
}
