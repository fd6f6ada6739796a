//! Bot configuration.

use crate::config::Config;

/// Bot configuration options.
pub struct BotConfig {
    /// Application configuration.
    pub app_config: Config,
    /// Application version.
    pub version: String,
}

impl BotConfig {
    pub fn new(app_config: Config) -> Self {
        Self {
            app_config,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Paper trading mode, taken from `app.dry_run`.
    pub fn dry_run(&self) -> bool {
        self.app_config.app.dry_run
    }
}
