//! Runtime statistics for the analysis loop.

use std::collections::BTreeMap;

use crate::domain::Rejection;

/// Runtime statistics for the bot.
#[derive(Debug, Clone, Default)]
pub struct Stats {
    pub analysis_cycles: u64,
    /// Actionable decisions (long or short) received.
    pub signals: u64,
    pub skipped: u64,
    pub positions_opened: u64,
    pub errors: u64,
    /// Rejections keyed by their stable code.
    pub rejections: BTreeMap<&'static str, u64>,
}

impl Stats {
    pub fn record_rejection(&mut self, rejection: &Rejection) {
        *self.rejections.entry(rejection.code()).or_default() += 1;
    }

    pub fn total_rejections(&self) -> u64 {
        self.rejections.values().sum()
    }
}
