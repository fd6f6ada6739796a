//! Tests for notification formatting functions.

use super::*;
use rust_decimal_macros::dec;
use std::time::Duration;

// ==================== Helper function tests ====================

#[test]
fn test_parse_pair_base_btc_usdt() {
    assert_eq!(parse_pair_base("BTC/USDT"), "BTC");
}

#[test]
fn test_parse_pair_base_no_slash() {
    assert_eq!(parse_pair_base("BTCUSDT"), "BTCUSDT");
}

#[test]
fn test_parse_pair_base_empty() {
    assert_eq!(parse_pair_base(""), "");
}

#[test]
fn test_format_pair_tag_escapes_underscore() {
    // Underscore must be escaped for Telegram Markdown
    assert_eq!(format_pair_tag("BTC/USDT"), "BTC\\_USDT");
}

#[test]
fn test_format_pair_tag_no_slash() {
    assert_eq!(format_pair_tag("BTCUSDT"), "BTCUSDT");
}

#[test]
fn test_format_duration_seconds() {
    assert_eq!(format_duration(Duration::from_secs(45)), "45s");
}

#[test]
fn test_format_duration_minutes() {
    assert_eq!(format_duration(Duration::from_secs(125)), "2m 5s");
}

#[test]
fn test_format_duration_hours() {
    assert_eq!(format_duration(Duration::from_secs(3725)), "1h 2m");
}

#[test]
fn test_format_duration_days() {
    assert_eq!(format_duration(Duration::from_secs(90000)), "1d 1h");
}

#[test]
fn test_format_duration_zero() {
    assert_eq!(format_duration(Duration::ZERO), "0s");
}

#[test]
fn test_add_thousand_separators() {
    assert_eq!(add_thousand_separators(0), "0");
    assert_eq!(add_thousand_separators(42), "42");
    assert_eq!(add_thousand_separators(1234), "1,234");
    assert_eq!(add_thousand_separators(1234567), "1,234,567");
}

// ==================== Event formatting tests ====================

fn created() -> PositionCreatedData {
    PositionCreatedData {
        position_id: "p-1".to_string(),
        symbol: "BTC/USDT".to_string(),
        side: Side::Long,
        entry_price: dec!(100000),
        quantity: dec!(0.0666),
        stop_loss: dec!(97000),
        take_profit: dec!(106000),
        confidence: 0.72,
        strategy_tag: "trend".to_string(),
    }
}

fn hit(trailing: bool) -> ProtectionHitData {
    ProtectionHitData {
        position_id: "p-1".to_string(),
        symbol: "ETH/USDT".to_string(),
        side: Side::Short,
        level: dec!(3090),
        exit_price: dec!(3091.5),
        pnl: dec!(-9.15),
        pnl_pct: dec!(-3.05),
        trailing,
    }
}

#[test]
fn test_format_position_created() {
    let msg = format_position_created(&created());

    assert!(msg.contains("#BTC\\_USDT"));
    assert!(msg.contains("LONG"));
    assert!(msg.contains("$97000.0000"));
    assert!(msg.contains("0.066600 BTC"));
    assert!(msg.contains("72% (trend)"));
}

#[test]
fn test_format_stop_loss_hit() {
    let msg = format_protection_hit(&hit(false), EventType::StopLossHit);

    assert!(msg.contains("Stop-loss hit"));
    assert!(msg.contains("SHORT"));
    assert!(msg.contains("$-9.15"));
    assert!(msg.contains("📉"));
}

#[test]
fn test_format_trailing_stop_hit() {
    let msg = format_protection_hit(&hit(true), EventType::StopLossHit);
    assert!(msg.contains("Trailing stop hit"));

    let msg = format_protection_hit(&hit(true), EventType::TakeProfitHit);
    assert!(msg.contains("Take-profit hit"));
}

#[test]
fn test_format_trailing_updated() {
    let data = TrailingUpdatedData {
        position_id: "p-1".to_string(),
        symbol: "BTC/USDT".to_string(),
        side: Side::Long,
        old_stop: dec!(97000),
        new_stop: dec!(100980),
        price: dec!(102000),
        locked_pnl_pct: dec!(0.98),
    };

    let msg = format_trailing_updated(&data);

    assert!(msg.contains("$97000.0000 → $100980.0000"));
    assert!(msg.contains("0.98%"));
}

#[test]
fn test_format_position_closed() {
    let data = PositionClosedData {
        position_id: "p-1".to_string(),
        symbol: "BTC/USDT".to_string(),
        side: Side::Long,
        entry_price: dec!(100000),
        exit_price: dec!(106000),
        pnl: dec!(399.6),
        pnl_pct: dec!(6),
        exit_reason: ExitReason::TakeProfit,
        hold_duration: Duration::from_secs(5400),
    };

    let msg = format_position_closed(&data);

    assert!(msg.contains("take_profit"));
    assert!(msg.contains("$399.60"));
    assert!(msg.contains("6.00%"));
    assert!(msg.contains("1h 30m"));
}

#[test]
fn test_format_error() {
    let data = ErrorData {
        component: "PositionEngine".to_string(),
        message: "Position left unprotected".to_string(),
        error: Some("Connection timeout".to_string()),
    };

    let msg = format_error(&data);

    assert!(msg.contains("PositionEngine"));
    assert!(msg.contains("Position left unprotected"));
    assert!(msg.contains("Connection timeout"));
}

#[test]
fn test_format_startup_dry_run() {
    let data = StartupData {
        version: "1.0.0".to_string(),
        exchange: "paper".to_string(),
        symbols: vec!["BTC/USDT".to_string(), "ETH/USDT".to_string()],
        dry_run: true,
        recovered_positions: 2,
    };

    let msg = format_startup(&data);

    assert!(msg.contains("DRY RUN"));
    assert!(msg.contains("1.0.0"));
    assert!(msg.contains("BTC/USDT, ETH/USDT"));
    assert!(msg.contains("Recovered positions: 2"));
}

#[test]
fn test_format_shutdown() {
    let data = ShutdownData {
        reason: "User requested".to_string(),
        uptime: Duration::from_secs(3600),
        graceful: true,
    };

    let msg = format_shutdown(&data);

    assert!(msg.contains("Graceful"));
    assert!(msg.contains("User requested"));
    assert!(msg.contains("1h 0m"));

    let forced = format_shutdown(&ShutdownData {
        graceful: false,
        ..data
    });
    assert!(forced.contains("Forced"));
}

#[test]
fn test_format_overview() {
    let data = OverviewData {
        uptime: Duration::from_secs(7200),
        analysis_cycles: 1500,
        signals: 25,
        rejections: 18,
        positions_opened: 7,
        positions_closed: 5,
        wins: 3,
        losses: 1,
        realized_pnl: dec!(150.75),
        open_positions: 2,
        exposure_pct: dec!(12.5),
        regime: "normal".to_string(),
        dry_run: false,
    };

    let msg = format_overview(&data);

    assert!(msg.contains("LIVE"));
    assert!(msg.contains("2h 0m"));
    assert!(msg.contains("1,500"));
    assert!(msg.contains("(75%)"));
    assert!(msg.contains("$150.75"));
}

// ==================== Event constructor tests ====================

#[test]
fn test_event_constructors() {
    assert_eq!(
        Event::position_created(created()).event_type,
        EventType::PositionCreated
    );
    assert_eq!(Event::sl_hit(hit(false)).event_type, EventType::StopLossHit);
    assert_eq!(Event::tp_hit(hit(false)).event_type, EventType::TakeProfitHit);
}

#[test]
fn test_event_type_display() {
    assert_eq!(EventType::PositionCreated.to_string(), "position_created");
    assert_eq!(EventType::StopLossHit.to_string(), "sl_hit");
    assert_eq!(EventType::TakeProfitHit.to_string(), "tp_hit");
    assert_eq!(EventType::TrailingUpdated.to_string(), "trailing_updated");
    assert_eq!(EventType::PositionClosed.to_string(), "position_closed");
    assert_eq!(EventType::Overview.to_string(), "overview");
}

#[test]
fn test_format_event_dispatches_by_type() {
    let event = Event::tp_hit(hit(false));
    assert!(format_event(&event).contains("Take-profit hit"));
}
