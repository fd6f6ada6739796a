//! Tests for config module.

use super::*;
use rust_decimal_macros::dec;
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;

// ==================== Duration parsing tests ====================

#[test]
fn test_parse_duration_seconds() {
    let d = duration::parse_duration("30s").unwrap();
    assert_eq!(d, Duration::from_secs(30));
}

#[test]
fn test_parse_duration_minutes() {
    let d = duration::parse_duration("5m").unwrap();
    assert_eq!(d, Duration::from_secs(300));
}

#[test]
fn test_parse_duration_hours() {
    let d = duration::parse_duration("24h").unwrap();
    assert_eq!(d, Duration::from_secs(86400));
}

#[test]
fn test_parse_duration_milliseconds() {
    let d = duration::parse_duration("500ms").unwrap();
    assert_eq!(d, Duration::from_millis(500));
}

#[test]
fn test_parse_duration_empty() {
    let d = duration::parse_duration("").unwrap();
    assert_eq!(d, Duration::ZERO);
}

#[test]
fn test_parse_duration_invalid_unit() {
    let result = duration::parse_duration("10x");
    assert!(result.is_err());
    assert!(result.unwrap_err().contains("unknown duration unit"));
}

#[test]
fn test_parse_duration_fractional() {
    let d = duration::parse_duration("1.5s").unwrap();
    assert_eq!(d, Duration::from_millis(1500));
}

#[test]
fn test_parse_duration_compound_and_days() {
    assert_eq!(
        duration::parse_duration("1h30m").unwrap(),
        Duration::from_secs(5400)
    );
    assert_eq!(
        duration::parse_duration("2d").unwrap(),
        Duration::from_secs(172_800)
    );
    assert!(duration::parse_duration("h").is_err());
}

// ==================== YAML field loading tests ====================

/// Parse config from YAML string (for testing).
fn from_yaml(yaml: &str) -> Result<Config, ConfigError> {
    let config: Config = serde_yaml::from_str(yaml)?;
    Ok(config)
}

fn minimal_valid_yaml() -> String {
    r#"
app:
  name: testbot
  env: development

exchange:
  name: paper
  fee_taker: "0.001"

symbols:
  - BTC/USDT
"#
    .to_string()
}

#[test]
fn test_minimal_config_uses_defaults() {
    let cfg = from_yaml(&minimal_valid_yaml()).unwrap();

    assert_eq!(cfg.app.name, "testbot");
    assert!(cfg.app.dry_run);
    assert_eq!(cfg.exchange.name, "paper");
    assert_eq!(cfg.exchange.fee_taker, dec!(0.001));
    assert!(!cfg.exchange.supports_oco);
    assert_eq!(cfg.exchange.timeout, Duration::from_secs(10));
    assert_eq!(cfg.exchange.retry.max_attempts, 3);

    assert_eq!(cfg.risk.sl_atr_multiplier, dec!(2.0));
    assert_eq!(cfg.risk.min_reward_risk, dec!(2.0));
    assert_eq!(cfg.risk.kill_switch_cooldown, Duration::from_secs(86400));
    assert_eq!(cfg.trailing.activation_profit_pct, dec!(2.0));
    assert_eq!(cfg.portfolio.max_concurrent_positions, 3);
    assert!(!cfg.portfolio.allow_multiple_per_symbol);
    assert_eq!(cfg.timeframes.timeframes.len(), 3);
    assert_eq!(cfg.monitor.poll_interval, Duration::from_millis(500));
    assert_eq!(cfg.analysis.workers, 4);
    assert_eq!(cfg.decision.source, "rules");
    assert_eq!(cfg.storage.path, "sentinel.db");
    assert!(cfg.notification.is_none());
    assert!(cfg.validate().is_ok());
}

#[test]
fn test_load_exchange_fields() {
    let yaml = r#"
app:
  name: test
  env: development

exchange:
  name: paper
  fee_taker: "0.0010"
  fee_maker: "0.0008"
  supports_oco: true
  min_order_quantity: "0.0001"
  min_notional: "10"
  quantity_step: "0.0001"
  timeout: 3s
  retry:
    max_attempts: 5
    initial_delay: 100ms
    max_delay: 2s
    multiplier: 1.5
  circuit_breaker:
    failure_threshold: 3
    open_timeout: 30s
  paper:
    balances:
      USDT: "5000"
    prices:
      BTC/USDT: "100000"

symbols:
  - BTC/USDT
"#;
    let cfg = from_yaml(yaml).unwrap();

    let ex = &cfg.exchange;
    assert_eq!(ex.fee_maker, Some(dec!(0.0008)));
    assert!(ex.supports_oco);
    assert_eq!(ex.min_notional, dec!(10));
    assert_eq!(ex.quantity_step, dec!(0.0001));
    assert_eq!(ex.timeout, Duration::from_secs(3));
    assert_eq!(ex.retry.max_attempts, 5);
    assert_eq!(ex.retry.initial_delay, Duration::from_millis(100));
    assert_eq!(ex.retry.multiplier, 1.5);
    assert_eq!(ex.circuit_breaker.failure_threshold, 3);
    assert_eq!(ex.circuit_breaker.success_threshold, 2);
    assert_eq!(ex.circuit_breaker.open_timeout, Duration::from_secs(30));
    assert_eq!(ex.paper.balances.get("USDT"), Some(&dec!(5000)));
    assert_eq!(ex.paper.prices.get("BTC/USDT"), Some(&dec!(100000)));
}

#[test]
fn test_load_risk_and_trailing_fields() {
    let yaml = r#"
app:
  name: test
  env: development

exchange:
  name: paper
  fee_taker: "0.001"

symbols:
  - BTC/USDT

risk:
  sl_atr_multiplier: "1.5"
  min_reward_risk: "1.5"
  max_risk_cap: "0.01"
  kill_switch_cooldown: 12h

trailing:
  activation_profit_pct: "3.0"
  trail_distance_pct: "1.5"
  min_profit_to_lock_pct: "1.0"
  cooldown: 10s
"#;
    let cfg = from_yaml(yaml).unwrap();

    assert_eq!(cfg.risk.sl_atr_multiplier, dec!(1.5));
    assert_eq!(cfg.risk.tp_atr_multiplier, dec!(4.0));
    assert_eq!(cfg.risk.min_reward_risk, dec!(1.5));
    assert_eq!(cfg.risk.max_risk_cap, dec!(0.01));
    assert_eq!(cfg.risk.kill_switch_cooldown, Duration::from_secs(43200));
    assert_eq!(cfg.trailing.activation_profit_pct, dec!(3.0));
    assert_eq!(cfg.trailing.trail_distance_pct, dec!(1.5));
    assert_eq!(cfg.trailing.cooldown, Duration::from_secs(10));
    assert!(cfg.trailing.enabled);
}

#[test]
fn test_load_portfolio_and_timeframes() {
    let yaml = r#"
app:
  name: test
  env: development

exchange:
  name: paper
  fee_taker: "0.001"

symbols:
  - BTC/USDT
  - ETH/USDT

portfolio:
  max_concurrent_positions: 2
  max_correlation: 0.7
  correlations:
    - { a: BTC/USDT, b: ETH/USDT, value: 0.85 }

timeframes:
  min_alignment: 0.5
  primary: 1h
  timeframes:
    - { name: 4h, weight: 0.6 }
    - { name: 1h, weight: 0.4 }
"#;
    let cfg = from_yaml(yaml).unwrap();

    assert_eq!(cfg.portfolio.max_concurrent_positions, 2);
    assert_eq!(cfg.portfolio.correlations.len(), 1);
    assert_eq!(cfg.portfolio.correlations[0].value, 0.85);
    assert_eq!(cfg.timeframes.timeframes.len(), 2);
    assert_eq!(cfg.timeframes.max_confidence_boost, 0.15);
    assert!(cfg.validate().is_ok());
}

#[test]
fn test_load_notification_fields() {
    let yaml = r#"
app:
  name: test
  env: development

exchange:
  name: paper
  fee_taker: "0.001"

symbols:
  - BTC/USDT

notification:
  telegram:
    enabled: true
    notify_positions: true
    notify_trailing: false
    notify_errors: true
"#;
    let cfg = from_yaml(yaml).unwrap();

    let tg = cfg.notification.unwrap().telegram.unwrap();
    assert!(tg.enabled);
    assert!(tg.notify_positions);
    assert!(!tg.notify_trailing);
    assert!(tg.notify_errors);
    assert!(!tg.notify_overview);
    // Secrets never come from YAML
    assert!(tg.bot_token.is_empty());
}

// ==================== Validation tests ====================

fn validation_error(yaml_tail: &str) -> String {
    let yaml = format!("{}{}", minimal_valid_yaml(), yaml_tail);
    let cfg = from_yaml(&yaml).unwrap();
    cfg.validate().unwrap_err().to_string()
}

#[test]
fn test_validate_missing_app_name() {
    let yaml = minimal_valid_yaml().replace("name: testbot", "name: \"\"");
    let cfg = from_yaml(&yaml).unwrap();
    let err = cfg.validate().unwrap_err().to_string();
    assert!(err.contains("app.name is required"));
}

#[test]
fn test_validate_empty_symbols() {
    let yaml = r#"
app:
  name: test
  env: development

exchange:
  name: paper
  fee_taker: "0.001"

symbols: []
"#;
    let cfg = from_yaml(yaml).unwrap();
    let err = cfg.validate().unwrap_err().to_string();
    assert!(err.contains("at least one symbol is required"));
}

#[test]
fn test_validate_stop_distance_bounds() {
    let err = validation_error(
        r#"
risk:
  min_sl_distance_pct: "3.0"
  max_sl_distance_pct: "2.0"
"#,
    );
    assert!(err.contains("min_sl_distance_pct <= max_sl_distance_pct"));
}

#[test]
fn test_validate_risk_cap_range() {
    let err = validation_error(
        r#"
risk:
  max_risk_cap: "1.5"
"#,
    );
    assert!(err.contains("max_risk_cap must be in (0, 1]"));
}

#[test]
fn test_validate_trailing_activation_above_lock() {
    let err = validation_error(
        r#"
trailing:
  activation_profit_pct: "0.5"
  min_profit_to_lock_pct: "0.8"
"#,
    );
    assert!(err.contains("activation_profit_pct must exceed"));
}

#[test]
fn test_validate_timeframe_weights_sum() {
    let err = validation_error(
        r#"
timeframes:
  timeframes:
    - { name: 4h, weight: 0.5 }
    - { name: 1h, weight: 0.2 }
"#,
    );
    assert!(err.contains("weights must sum to 1"));
}

#[test]
fn test_validate_zero_capacity() {
    let err = validation_error(
        r#"
portfolio:
  max_concurrent_positions: 0
"#,
    );
    assert!(err.contains("max_concurrent_positions must be positive"));
}

#[test]
fn test_validate_correlation_value_range() {
    let err = validation_error(
        r#"
portfolio:
  correlations:
    - { a: BTC/USDT, b: ETH/USDT, value: 1.4 }
"#,
    );
    assert!(err.contains("outside [-1, 1]"));
}

#[test]
fn test_validate_http_decision_requires_endpoint() {
    let err = validation_error(
        r#"
decision:
  source: http
"#,
    );
    assert!(err.contains("decision.endpoint is required"));
}

#[test]
fn test_validate_unknown_decision_source() {
    let err = validation_error(
        r#"
decision:
  source: oracle
"#,
    );
    assert!(err.contains("decision.source oracle is not supported"));
}

// ==================== File loading tests ====================

#[test]
fn test_load_from_file() {
    let yaml = minimal_valid_yaml();

    let mut file = NamedTempFile::new().unwrap();
    file.write_all(yaml.as_bytes()).unwrap();

    let cfg = Config::load(file.path().to_str().unwrap()).unwrap();

    assert_eq!(cfg.app.name, "testbot");
    assert_eq!(cfg.symbols, vec!["BTC/USDT"]);
}

#[test]
fn test_load_telegram_credentials_from_env() {
    let yaml = format!(
        "{}{}",
        minimal_valid_yaml(),
        r#"
notification:
  telegram:
    enabled: true
"#
    );

    let mut file = NamedTempFile::new().unwrap();
    file.write_all(yaml.as_bytes()).unwrap();

    unsafe {
        env::set_var("TELEGRAM_BOT_TOKEN", "token");
        env::set_var("TELEGRAM_CHAT_ID", "chat");
    }

    let cfg = Config::load(file.path().to_str().unwrap()).unwrap();
    let tg = cfg.notification.unwrap().telegram.unwrap();
    assert_eq!(tg.bot_token, "token");
    assert_eq!(tg.chat_id, "chat");

    unsafe {
        env::remove_var("TELEGRAM_BOT_TOKEN");
        env::remove_var("TELEGRAM_CHAT_ID");
    }
}

#[test]
fn test_load_file_not_found() {
    let result = Config::load("nonexistent_config.yaml");
    assert!(result.is_err());
    assert!(result
        .unwrap_err()
        .to_string()
        .contains("failed to read config file"));
}

#[test]
fn test_load_invalid_yaml() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(b"app: [unclosed").unwrap();

    let result = Config::load(file.path().to_str().unwrap());
    assert!(result.is_err());
    assert!(result
        .unwrap_err()
        .to_string()
        .contains("failed to parse config"));
}
