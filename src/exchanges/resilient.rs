//! Gateway decorator adding timeouts, retries and a circuit breaker.

use super::{
    ExchangeError, ExchangeGateway, OcoRequest, OrderAck, OrderRequest, OrderUpdate, Result,
};
use crate::config::ExchangeConfig;
use crate::domain::Fees;
use crate::resilience::{CircuitBreaker, CircuitState, RetryPolicy};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

/// Order placement is not idempotent: a timed-out request may have reached
/// the exchange, so only errors that prove it did not are retried.
fn is_connection_error(e: &ExchangeError) -> bool {
    matches!(e, ExchangeError::Connection(_))
}

/// ResilientGateway wraps another gateway.
pub struct ResilientGateway {
    inner: Arc<dyn ExchangeGateway>,
    retry: RetryPolicy,
    breaker: CircuitBreaker,
    timeout: Duration,
}

impl ResilientGateway {
    pub fn new(inner: Arc<dyn ExchangeGateway>, config: &ExchangeConfig) -> Self {
        let breaker = CircuitBreaker::new(
            format!("exchange:{}", inner.name()),
            config.circuit_breaker.clone(),
        );
        Self {
            inner,
            retry: RetryPolicy::new(config.retry.clone()),
            breaker,
            timeout: config.timeout,
        }
    }

    pub async fn circuit_state(&self) -> CircuitState {
        self.breaker.state().await
    }

    async fn call<T, F, Fut>(
        &self,
        label: &str,
        retryable: fn(&ExchangeError) -> bool,
        op: F,
    ) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let op = &op;
        let breaker = &self.breaker;
        let limit = self.timeout;

        self.retry
            .run(label, retryable, move || async move {
                if !breaker.is_call_permitted().await {
                    return Err(ExchangeError::CircuitOpen(breaker.name().to_string()));
                }

                let outcome = match timeout(limit, op()).await {
                    Ok(result) => result,
                    Err(_) => Err(ExchangeError::Timeout(format!(
                        "{} after {}ms",
                        label,
                        limit.as_millis()
                    ))),
                };

                match &outcome {
                    Ok(_) => breaker.on_success().await,
                    Err(e) if e.counts_as_failure() => breaker.on_failure().await,
                    Err(_) => {}
                }
                outcome
            })
            .await
    }
}

#[async_trait]
impl ExchangeGateway for ResilientGateway {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn get_current_price(&self, symbol: &str) -> Result<Decimal> {
        self.call("get_current_price", ExchangeError::is_transient, || {
            self.inner.get_current_price(symbol)
        })
        .await
    }

    async fn place_order(&self, request: OrderRequest) -> Result<OrderAck> {
        self.call("place_order", is_connection_error, || {
            self.inner.place_order(request.clone())
        })
        .await
    }

    fn supports_oco(&self) -> bool {
        self.inner.supports_oco()
    }

    async fn place_oco_order(&self, request: OcoRequest) -> Result<OrderAck> {
        self.call("place_oco_order", is_connection_error, || {
            self.inner.place_oco_order(request.clone())
        })
        .await
    }

    async fn cancel_order(&self, symbol: &str, order_id: &str) -> Result<()> {
        self.call("cancel_order", ExchangeError::is_transient, || {
            self.inner.cancel_order(symbol, order_id)
        })
        .await
    }

    async fn get_order_status(&self, symbol: &str, order_id: &str) -> Result<OrderUpdate> {
        self.call("get_order_status", ExchangeError::is_transient, || {
            self.inner.get_order_status(symbol, order_id)
        })
        .await
    }

    async fn get_balance(&self, asset: &str) -> Result<Decimal> {
        self.call("get_balance", ExchangeError::is_transient, || {
            self.inner.get_balance(asset)
        })
        .await
    }

    fn get_fees(&self, symbol: &str) -> Fees {
        self.inner.get_fees(symbol)
    }
}
