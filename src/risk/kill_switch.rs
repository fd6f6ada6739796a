//! Drawdown kill switch.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// KillSwitch tracks realized equity against its running peak.
///
/// Equity is the reference capital plus cumulative realized pnl. Once the
/// drawdown from peak reaches the threshold, trading halts until the
/// cooldown elapses; the peak is then re-based to current equity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KillSwitch {
    pub reference_capital: Option<Decimal>,
    pub realized_pnl: Decimal,
    pub peak_equity: Decimal,
    pub tripped_until: Option<DateTime<Utc>>,
}

impl KillSwitch {
    pub fn equity(&self) -> Decimal {
        self.reference_capital.unwrap_or_default() + self.realized_pnl
    }

    /// Sets the reference capital the first time it becomes known.
    pub fn ensure_reference(&mut self, capital: Decimal) {
        if self.reference_capital.is_none() {
            self.reference_capital = Some(capital);
            self.peak_equity = self.peak_equity.max(self.equity());
        }
    }

    /// Current drawdown from peak, in percent.
    pub fn drawdown_pct(&self) -> Decimal {
        if self.peak_equity <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        ((self.peak_equity - self.equity()) / self.peak_equity * Decimal::ONE_HUNDRED)
            .max(Decimal::ZERO)
    }

    /// Returns the halt deadline if trading is currently halted. An expired
    /// halt is cleared and the peak re-based.
    pub fn active_until(&mut self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self.tripped_until {
            Some(until) if until > now => Some(until),
            Some(_) => {
                self.tripped_until = None;
                self.peak_equity = self.equity();
                None
            }
            None => None,
        }
    }

    /// Adds a realized pnl. Returns true if this trade tripped the switch.
    pub fn record(
        &mut self,
        pnl: Decimal,
        threshold_pct: Decimal,
        cooldown: Duration,
        now: DateTime<Utc>,
    ) -> bool {
        self.realized_pnl += pnl;
        let equity = self.equity();
        if equity > self.peak_equity {
            self.peak_equity = equity;
        }

        if self.tripped_until.is_none()
            && self.reference_capital.is_some()
            && self.drawdown_pct() >= threshold_pct
        {
            self.tripped_until = Some(now + cooldown);
            return true;
        }
        false
    }
}
