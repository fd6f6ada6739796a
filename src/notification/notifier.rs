use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::domain::{ExitReason, Position, Side, TradeResult};

/// Kind of notification event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    /// A position was opened and protected.
    PositionCreated,
    /// The stop-loss (fixed or trailing) executed.
    StopLossHit,
    /// The take-profit executed.
    TakeProfitHit,
    /// The trailing stop moved.
    TrailingUpdated,
    /// A position was closed for any reason.
    PositionClosed,
    Error,
    Startup,
    Shutdown,
    /// Periodic statistics overview.
    Overview,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventType::PositionCreated => write!(f, "position_created"),
            EventType::StopLossHit => write!(f, "sl_hit"),
            EventType::TakeProfitHit => write!(f, "tp_hit"),
            EventType::TrailingUpdated => write!(f, "trailing_updated"),
            EventType::PositionClosed => write!(f, "position_closed"),
            EventType::Error => write!(f, "error"),
            EventType::Startup => write!(f, "startup"),
            EventType::Shutdown => write!(f, "shutdown"),
            EventType::Overview => write!(f, "overview"),
        }
    }
}

/// A freshly opened position.
#[derive(Debug, Clone)]
pub struct PositionCreatedData {
    pub position_id: String,
    pub symbol: String,
    pub side: Side,
    pub entry_price: Decimal,
    pub quantity: Decimal,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
    pub confidence: f64,
    pub strategy_tag: String,
}

impl From<&Position> for PositionCreatedData {
    fn from(position: &Position) -> Self {
        Self {
            position_id: position.id.clone(),
            symbol: position.symbol.clone(),
            side: position.side,
            entry_price: position.entry_price,
            quantity: position.quantity,
            stop_loss: position.stop_loss,
            take_profit: position.take_profit,
            confidence: position.confidence,
            strategy_tag: position.strategy_tag.clone(),
        }
    }
}

/// A protective order executed on the exchange.
#[derive(Debug, Clone)]
pub struct ProtectionHitData {
    pub position_id: String,
    pub symbol: String,
    pub side: Side,
    pub level: Decimal,
    pub exit_price: Decimal,
    pub pnl: Decimal,
    pub pnl_pct: Decimal,
    /// True when the stop that executed was a trailing one.
    pub trailing: bool,
}

/// A trailing stop that moved.
#[derive(Debug, Clone)]
pub struct TrailingUpdatedData {
    pub position_id: String,
    pub symbol: String,
    pub side: Side,
    pub old_stop: Decimal,
    pub new_stop: Decimal,
    pub price: Decimal,
    /// Profit in percent of entry secured by the new stop.
    pub locked_pnl_pct: Decimal,
}

/// A closed position.
#[derive(Debug, Clone)]
pub struct PositionClosedData {
    pub position_id: String,
    pub symbol: String,
    pub side: Side,
    pub entry_price: Decimal,
    pub exit_price: Decimal,
    pub pnl: Decimal,
    pub pnl_pct: Decimal,
    pub exit_reason: ExitReason,
    pub hold_duration: Duration,
}

impl From<&TradeResult> for PositionClosedData {
    fn from(result: &TradeResult) -> Self {
        Self {
            position_id: result.position_id.clone(),
            symbol: result.symbol.clone(),
            side: result.side,
            entry_price: result.entry_price,
            exit_price: result.exit_price,
            pnl: result.pnl,
            pnl_pct: result.pnl_pct,
            exit_reason: result.exit_reason,
            hold_duration: Duration::from_secs(result.hold_duration_secs.max(0) as u64),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ErrorData {
    pub component: String,
    pub message: String,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StartupData {
    pub version: String,
    pub exchange: String,
    pub symbols: Vec<String>,
    pub dry_run: bool,
    /// Positions resumed by startup recovery.
    pub recovered_positions: usize,
}

#[derive(Debug, Clone)]
pub struct ShutdownData {
    pub reason: String,
    pub uptime: Duration,
    pub graceful: bool,
}

/// Periodic overview.
#[derive(Debug, Clone)]
pub struct OverviewData {
    pub uptime: Duration,
    pub analysis_cycles: u64,
    pub signals: u64,
    pub rejections: u64,
    pub positions_opened: u64,
    pub positions_closed: u64,
    pub wins: u64,
    pub losses: u64,
    pub realized_pnl: Decimal,
    pub open_positions: usize,
    pub exposure_pct: Decimal,
    pub regime: String,
    pub dry_run: bool,
}

#[derive(Debug, Clone)]
pub enum EventData {
    PositionCreated(PositionCreatedData),
    ProtectionHit(ProtectionHitData),
    TrailingUpdated(TrailingUpdatedData),
    PositionClosed(PositionClosedData),
    Error(ErrorData),
    Startup(StartupData),
    Shutdown(ShutdownData),
    Overview(OverviewData),
}

/// Notification event.
#[derive(Debug, Clone)]
pub struct Event {
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub data: EventData,
}

impl Event {
    pub fn new(event_type: EventType, data: EventData) -> Self {
        Self {
            event_type,
            timestamp: Utc::now(),
            data,
        }
    }

    pub fn position_created(data: PositionCreatedData) -> Self {
        Self::new(EventType::PositionCreated, EventData::PositionCreated(data))
    }

    pub fn sl_hit(data: ProtectionHitData) -> Self {
        Self::new(EventType::StopLossHit, EventData::ProtectionHit(data))
    }

    pub fn tp_hit(data: ProtectionHitData) -> Self {
        Self::new(EventType::TakeProfitHit, EventData::ProtectionHit(data))
    }

    pub fn trailing_updated(data: TrailingUpdatedData) -> Self {
        Self::new(EventType::TrailingUpdated, EventData::TrailingUpdated(data))
    }

    pub fn position_closed(data: PositionClosedData) -> Self {
        Self::new(EventType::PositionClosed, EventData::PositionClosed(data))
    }

    pub fn error(data: ErrorData) -> Self {
        Self::new(EventType::Error, EventData::Error(data))
    }

    pub fn startup(data: StartupData) -> Self {
        Self::new(EventType::Startup, EventData::Startup(data))
    }

    pub fn shutdown(data: ShutdownData) -> Self {
        Self::new(EventType::Shutdown, EventData::Shutdown(data))
    }

    pub fn overview(data: OverviewData) -> Self {
        Self::new(EventType::Overview, EventData::Overview(data))
    }
}

/// Notifier delivers events to an alert channel.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    /// Sends an event and waits for delivery.
    async fn send(&self, event: &Event) -> Result<(), NotificationError>;

    /// Queues an event without blocking the caller.
    fn send_async(&self, event: Event);

    /// Returns true if events of this type are delivered.
    fn is_enabled(&self, event_type: EventType) -> bool;

    /// Flushes pending events.
    async fn close(&self) -> Result<(), NotificationError>;
}

/// Notification error.
#[derive(Debug, Clone, thiserror::Error)]
#[error("notification error: {message}")]
pub struct NotificationError {
    pub message: String,
}

impl NotificationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// MultiNotifier fans events out to several notifiers.
pub struct MultiNotifier {
    notifiers: Vec<Arc<dyn Notifier>>,
}

impl MultiNotifier {
    pub fn new(notifiers: Vec<Arc<dyn Notifier>>) -> Self {
        Self { notifiers }
    }
}

#[async_trait::async_trait]
impl Notifier for MultiNotifier {
    async fn send(&self, event: &Event) -> Result<(), NotificationError> {
        let mut errors = Vec::new();
        for notifier in &self.notifiers {
            if notifier.is_enabled(event.event_type) {
                if let Err(e) = notifier.send(event).await {
                    errors.push(e.message);
                }
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(NotificationError::new(errors.join("; ")))
        }
    }

    fn send_async(&self, event: Event) {
        for notifier in &self.notifiers {
            if notifier.is_enabled(event.event_type) {
                notifier.send_async(event.clone());
            }
        }
    }

    fn is_enabled(&self, event_type: EventType) -> bool {
        self.notifiers.iter().any(|n| n.is_enabled(event_type))
    }

    async fn close(&self) -> Result<(), NotificationError> {
        let mut errors = Vec::new();
        for notifier in &self.notifiers {
            if let Err(e) = notifier.close().await {
                errors.push(e.message);
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(NotificationError::new(errors.join("; ")))
        }
    }
}

/// NoopNotifier drops every event.
#[derive(Default)]
pub struct NoopNotifier;

impl NoopNotifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl Notifier for NoopNotifier {
    async fn send(&self, _event: &Event) -> Result<(), NotificationError> {
        Ok(())
    }

    fn send_async(&self, _event: Event) {}

    fn is_enabled(&self, _event_type: EventType) -> bool {
        false
    }

    async fn close(&self) -> Result<(), NotificationError> {
        Ok(())
    }
}

// === Formatting ===

fn side_label(side: Side) -> &'static str {
    match side {
        Side::Long => "🟢 LONG",
        Side::Short => "🔴 SHORT",
    }
}

fn pnl_icon(pnl: Decimal) -> &'static str {
    if pnl.is_sign_negative() && !pnl.is_zero() {
        "📉"
    } else {
        "📈"
    }
}

pub fn format_position_created(data: &PositionCreatedData) -> String {
    let base = parse_pair_base(&data.symbol);
    format!(
        "🆕 *Position opened* {}\n\n\
         Pair: {} #{}\n\
         Entry: ${:.4}\n\
         Quantity: {:.6} {}\n\
         Stop-loss: ${:.4}\n\
         Take-profit: ${:.4}\n\
         Confidence: {:.0}% ({})\n\n\
         ⏰ {}",
        side_label(data.side),
        data.symbol,
        format_pair_tag(&data.symbol),
        data.entry_price,
        data.quantity,
        base,
        data.stop_loss,
        data.take_profit,
        data.confidence * 100.0,
        data.strategy_tag,
        Utc::now().format("%H:%M:%S UTC")
    )
}

pub fn format_protection_hit(data: &ProtectionHitData, event_type: EventType) -> String {
    let title = match (event_type, data.trailing) {
        (EventType::TakeProfitHit, _) => "🎯 *Take-profit hit*",
        (_, true) => "🛡 *Trailing stop hit*",
        _ => "⛔ *Stop-loss hit*",
    };
    format!(
        "{} {}\n\n\
         Pair: {} #{}\n\
         Level: ${:.4}\n\
         Exit: ${:.4}\n\
         {} PnL: *${:.2}* ({:.2}%)\n\n\
         ⏰ {}",
        title,
        side_label(data.side),
        data.symbol,
        format_pair_tag(&data.symbol),
        data.level,
        data.exit_price,
        pnl_icon(data.pnl),
        data.pnl,
        data.pnl_pct,
        Utc::now().format("%H:%M:%S UTC")
    )
}

pub fn format_trailing_updated(data: &TrailingUpdatedData) -> String {
    format!(
        "🔒 *Trailing stop moved* {}\n\n\
         Pair: {} #{}\n\
         Stop: ${:.4} → ${:.4}\n\
         Price: ${:.4}\n\
         Locked profit: {:.2}%\n\n\
         ⏰ {}",
        side_label(data.side),
        data.symbol,
        format_pair_tag(&data.symbol),
        data.old_stop,
        data.new_stop,
        data.price,
        data.locked_pnl_pct,
        Utc::now().format("%H:%M:%S UTC")
    )
}

pub fn format_position_closed(data: &PositionClosedData) -> String {
    format!(
        "🏁 *Position closed* {}\n\n\
         Pair: {} #{}\n\
         Entry: ${:.4}\n\
         Exit: ${:.4}\n\
         Reason: {}\n\
         {} PnL: *${:.2}* ({:.2}%)\n\
         Held: {}\n\n\
         ⏰ {}",
        side_label(data.side),
        data.symbol,
        format_pair_tag(&data.symbol),
        data.entry_price,
        data.exit_price,
        data.exit_reason,
        pnl_icon(data.pnl),
        data.pnl,
        data.pnl_pct,
        format_duration(data.hold_duration),
        Utc::now().format("%H:%M:%S UTC")
    )
}

pub fn format_error(data: &ErrorData) -> String {
    let error_str = data
        .error
        .as_ref()
        .map(|e| format!("\nError: {}", e))
        .unwrap_or_default();

    format!(
        "⚠️ *Error*\n\n\
         Component: {}\n\
         Message: {}{}\n\n\
         ⏰ {}",
        data.component,
        data.message,
        error_str,
        Utc::now().format("%H:%M:%S UTC")
    )
}

pub fn format_startup(data: &StartupData) -> String {
    let mode = if data.dry_run { "🧪 DRY RUN" } else { "🚀 LIVE" };

    format!(
        "🤖 *Engine started*\n\n\
         Version: {}\n\
         Mode: {}\n\
         Exchange: {}\n\
         Symbols: {}\n\
         Recovered positions: {}\n\n\
         ⏰ {}",
        data.version,
        mode,
        data.exchange,
        data.symbols.join(", "),
        data.recovered_positions,
        Utc::now().format("%H:%M:%S UTC")
    )
}

pub fn format_shutdown(data: &ShutdownData) -> String {
    let status = if data.graceful {
        "✅ Graceful"
    } else {
        "⚠️ Forced"
    };

    format!(
        "🛑 *Engine stopped*\n\n\
         Reason: {}\n\
         Status: {}\n\
         Uptime: {}\n\n\
         ⏰ {}",
        data.reason,
        status,
        format_duration(data.uptime),
        Utc::now().format("%H:%M:%S UTC")
    )
}

pub fn format_overview(data: &OverviewData) -> String {
    let mode = if data.dry_run { "🧪 DRY RUN" } else { "🚀 LIVE" };
    let decided = data.wins + data.losses;
    let win_rate = if decided > 0 {
        data.wins as f64 / decided as f64 * 100.0
    } else {
        0.0
    };

    format!(
        "📊 *Trading overview* {}\n\n\
         ⏱ Uptime: {}\n\
         🔄 Analysis cycles: {}\n\
         📡 Signals: {} (rejected {})\n\n\
         📂 Opened: {} | Closed: {} | Open now: {}\n\
         ✅ Wins: {} | ❌ Losses: {} ({:.0}%)\n\
         💼 Exposure: {:.1}% | Regime: {}\n\n\
         💰 Realized PnL: *${:.2}*\n\n\
         ⏰ {}",
        mode,
        format_duration(data.uptime),
        add_thousand_separators(data.analysis_cycles),
        add_thousand_separators(data.signals),
        data.rejections,
        data.positions_opened,
        data.positions_closed,
        data.open_positions,
        data.wins,
        data.losses,
        win_rate,
        data.exposure_pct,
        data.regime,
        data.realized_pnl,
        Utc::now().format("%H:%M:%S UTC")
    )
}

/// Formats an event as a Telegram Markdown message.
pub fn format_event(event: &Event) -> String {
    match &event.data {
        EventData::PositionCreated(data) => format_position_created(data),
        EventData::ProtectionHit(data) => format_protection_hit(data, event.event_type),
        EventData::TrailingUpdated(data) => format_trailing_updated(data),
        EventData::PositionClosed(data) => format_position_closed(data),
        EventData::Error(data) => format_error(data),
        EventData::Startup(data) => format_startup(data),
        EventData::Shutdown(data) => format_shutdown(data),
        EventData::Overview(data) => format_overview(data),
    }
}

// === Helpers ===

/// Base asset of a pair (e.g., "BTC" from "BTC/USDT").
fn parse_pair_base(pair: &str) -> &str {
    pair.split('/').next().unwrap_or(pair)
}

/// Turns a pair into a hashtag ("BTC/USDT" -> "BTC\_USDT").
/// Underscore escaped for Telegram Markdown compatibility
fn format_pair_tag(pair: &str) -> String {
    pair.replace('/', "\\_")
}

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs < 86400 {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    } else {
        format!("{}d {}h", secs / 86400, (secs % 86400) / 3600)
    }
}

fn add_thousand_separators(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::new();
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

#[cfg(test)]
#[path = "tests.rs"]
mod tests;
