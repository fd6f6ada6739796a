//! Circuit breaker and timeout around a decision source.

use super::{DecisionError, DecisionSource};
use crate::config::DecisionConfig;
use crate::domain::{Decision, MarketSnapshot};
use crate::resilience::{CircuitBreaker, CircuitState};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::warn;

/// An open breaker turns every call into `CircuitOpen`, which the bot
/// treats as "skip this cycle".
pub struct GuardedSource {
    inner: Arc<dyn DecisionSource>,
    breaker: CircuitBreaker,
    timeout: Duration,
}

impl GuardedSource {
    pub fn new(inner: Arc<dyn DecisionSource>, config: &DecisionConfig) -> Self {
        let breaker = CircuitBreaker::new(
            format!("decision:{}", inner.name()),
            config.circuit_breaker.clone(),
        );
        Self {
            inner,
            breaker,
            timeout: config.timeout,
        }
    }

    pub async fn circuit_state(&self) -> CircuitState {
        self.breaker.state().await
    }
}

#[async_trait]
impl DecisionSource for GuardedSource {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn decide(&self, snapshot: &MarketSnapshot) -> Result<Decision, DecisionError> {
        if !self.breaker.is_call_permitted().await {
            return Err(DecisionError::CircuitOpen(self.breaker.name().to_string()));
        }

        let outcome = match timeout(self.timeout, self.inner.decide(snapshot)).await {
            Ok(result) => result,
            Err(_) => Err(DecisionError::Timeout),
        };

        match &outcome {
            Ok(_) => self.breaker.on_success().await,
            Err(e) if e.counts_as_failure() => {
                warn!(
                    source = %self.inner.name(),
                    symbol = %snapshot.symbol,
                    error = %e,
                    "Decision source call failed"
                );
                self.breaker.on_failure().await
            }
            Err(_) => {}
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BreakerConfig;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FailingSource {
        calls: AtomicU32,
    }

    #[async_trait]
    impl DecisionSource for FailingSource {
        fn name(&self) -> &str {
            "failing"
        }

        async fn decide(&self, _snapshot: &MarketSnapshot) -> Result<Decision, DecisionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(DecisionError::Timeout)
        }
    }

    fn snapshot() -> MarketSnapshot {
        MarketSnapshot {
            symbol: "BTC/USDT".into(),
            timestamp: Utc::now(),
            price: dec!(100000),
            atr_pct: dec!(1.5),
            timeframes: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn test_breaker_short_circuits_after_failures() {
        let inner = Arc::new(FailingSource {
            calls: AtomicU32::new(0),
        });
        let config = DecisionConfig {
            circuit_breaker: BreakerConfig {
                failure_threshold: 2,
                ..BreakerConfig::default()
            },
            ..DecisionConfig::default()
        };
        let guarded = GuardedSource::new(inner.clone(), &config);

        for _ in 0..2 {
            assert!(matches!(
                guarded.decide(&snapshot()).await,
                Err(DecisionError::Timeout)
            ));
        }
        assert_eq!(guarded.circuit_state().await, CircuitState::Open);
        assert!(matches!(
            guarded.decide(&snapshot()).await,
            Err(DecisionError::CircuitOpen(_))
        ));
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }
}
