//! Circuit breaker that fails fast while a dependency keeps erroring.

use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::BreakerConfig;

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Requests flow normally.
    Closed,
    /// The dependency is failing; requests are rejected immediately.
    Open,
    /// A probe is allowed through to test whether the dependency recovered.
    HalfOpen,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    opened_at: Option<Instant>,
    window_start: Instant,
}

impl BreakerState {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            opened_at: None,
            window_start: Instant::now(),
        }
    }

    fn reset_window_if_expired(&mut self, window: Duration) {
        if self.window_start.elapsed() > window {
            self.failure_count = 0;
            self.window_start = Instant::now();
        }
    }

    fn open(&mut self) {
        self.state = CircuitState::Open;
        self.success_count = 0;
        self.opened_at = Some(Instant::now());
    }
}

/// CircuitBreaker guards one external dependency (exchange or decision source).
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            state: Mutex::new(BreakerState::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn state(&self) -> CircuitState {
        self.state.lock().await.state
    }

    /// Returns true if a call may proceed. Moves an expired open circuit to
    /// half-open.
    pub async fn is_call_permitted(&self) -> bool {
        let mut state = self.state.lock().await;
        state.reset_window_if_expired(self.config.window);

        match state.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let expired = state
                    .opened_at
                    .map(|t| t.elapsed() >= self.config.open_timeout)
                    .unwrap_or(true);
                if expired {
                    state.state = CircuitState::HalfOpen;
                    state.success_count = 0;
                    info!(breaker = %self.name, "Circuit half-open, probing");
                }
                expired
            }
        }
    }

    pub async fn on_success(&self) {
        let mut state = self.state.lock().await;

        match state.state {
            CircuitState::HalfOpen => {
                state.success_count += 1;
                if state.success_count >= self.config.success_threshold {
                    state.state = CircuitState::Closed;
                    state.failure_count = 0;
                    state.success_count = 0;
                    state.opened_at = None;
                    state.window_start = Instant::now();
                    info!(breaker = %self.name, "Circuit closed");
                }
            }
            CircuitState::Closed => {
                state.failure_count = 0;
                state.window_start = Instant::now();
            }
            CircuitState::Open => {}
        }
    }

    pub async fn on_failure(&self) {
        let mut state = self.state.lock().await;
        state.reset_window_if_expired(self.config.window);

        match state.state {
            CircuitState::Closed => {
                state.failure_count += 1;
                if state.failure_count >= self.config.failure_threshold {
                    state.open();
                    warn!(
                        breaker = %self.name,
                        failures = state.failure_count,
                        "Circuit opened"
                    );
                }
            }
            CircuitState::HalfOpen => {
                state.open();
                state.failure_count = 1;
                warn!(breaker = %self.name, "Probe failed, circuit re-opened");
            }
            CircuitState::Open => {
                state.opened_at = Some(Instant::now());
            }
        }
    }

    /// Forces the circuit closed.
    pub async fn reset(&self) {
        *self.state.lock().await = BreakerState::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    fn breaker(failure_threshold: u32, open_timeout: Duration) -> CircuitBreaker {
        CircuitBreaker::new(
            "test",
            BreakerConfig {
                failure_threshold,
                success_threshold: 2,
                open_timeout,
                window: Duration::from_secs(60),
            },
        )
    }

    #[tokio::test]
    async fn test_starts_closed() {
        let cb = breaker(3, Duration::from_secs(60));
        assert_eq!(cb.state().await, CircuitState::Closed);
        assert!(cb.is_call_permitted().await);
    }

    #[tokio::test]
    async fn test_opens_after_threshold() {
        let cb = breaker(3, Duration::from_secs(60));
        for _ in 0..3 {
            cb.on_failure().await;
        }
        assert_eq!(cb.state().await, CircuitState::Open);
        assert!(!cb.is_call_permitted().await);
    }

    #[tokio::test]
    async fn test_success_resets_failure_count() {
        let cb = breaker(3, Duration::from_secs(60));
        cb.on_failure().await;
        cb.on_failure().await;
        cb.on_success().await;
        cb.on_failure().await;
        assert_eq!(cb.state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_half_open_then_closed() {
        let cb = breaker(2, Duration::from_millis(50));
        cb.on_failure().await;
        cb.on_failure().await;
        assert_eq!(cb.state().await, CircuitState::Open);

        sleep(Duration::from_millis(80)).await;
        assert!(cb.is_call_permitted().await);
        assert_eq!(cb.state().await, CircuitState::HalfOpen);

        cb.on_success().await;
        assert_eq!(cb.state().await, CircuitState::HalfOpen);
        cb.on_success().await;
        assert_eq!(cb.state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_half_open_failure_reopens() {
        let cb = breaker(1, Duration::from_millis(20));
        cb.on_failure().await;
        sleep(Duration::from_millis(40)).await;
        assert!(cb.is_call_permitted().await);

        cb.on_failure().await;
        assert_eq!(cb.state().await, CircuitState::Open);
        assert!(!cb.is_call_permitted().await);
    }

    #[tokio::test]
    async fn test_reset() {
        let cb = breaker(1, Duration::from_secs(60));
        cb.on_failure().await;
        cb.reset().await;
        assert_eq!(cb.state().await, CircuitState::Closed);
    }
}
