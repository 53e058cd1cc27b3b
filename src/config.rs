//! Configuration loading and validation

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub exchange: ExchangeConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub trading: TradingConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeConfig {
    #[serde(default = "default_rest_url")]
    pub rest_url: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Quote currency the notional is denominated in
    #[serde(default = "default_quote_currency")]
    pub quote_currency: String,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            rest_url: default_rest_url(),
            timeout_ms: default_timeout_ms(),
            quote_currency: default_quote_currency(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Long-poll timeout for getUpdates
    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u64,
    #[serde(default = "default_api_url")]
    pub api_url: String,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_timeout_secs: default_poll_timeout_secs(),
            api_url: default_api_url(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TradingConfig {
    /// Fixed quote-currency amount allocated to a buy
    #[serde(default = "default_notional")]
    pub quote_notional: f64,
    /// Fraction of the free balance the sizing step may consume
    #[serde(default = "default_balance_fraction")]
    pub balance_fraction: f64,
    /// Headroom multiplier for fees and price drift between sizing and fill
    #[serde(default = "default_fee_buffer")]
    pub fee_buffer: f64,
    /// Trailing-stop trigger as a fraction of the high-water mark
    /// (0.99 = sell on a 1% retrace from the peak)
    #[serde(default = "default_trail_ratio")]
    pub trail_ratio: f64,
    /// Control-loop tick interval
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Consecutive price-feed misses before a warning notification
    #[serde(default = "default_max_feed_failures")]
    pub max_feed_failures: u32,
    /// Simulated quote balance when running with --dry-run
    #[serde(default = "default_paper_balance")]
    pub paper_balance: f64,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            quote_notional: default_notional(),
            balance_fraction: default_balance_fraction(),
            fee_buffer: default_fee_buffer(),
            trail_ratio: default_trail_ratio(),
            tick_interval_ms: default_tick_interval_ms(),
            max_feed_failures: default_max_feed_failures(),
            paper_balance: default_paper_balance(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Directory holding open_position.json, traded_pairs.json, symbols.json
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

fn default_rest_url() -> String {
    "https://api.kucoin.com".to_string()
}
fn default_timeout_ms() -> u64 {
    10_000
}
fn default_quote_currency() -> String {
    "USDT".to_string()
}
fn default_true() -> bool {
    true
}
fn default_poll_timeout_secs() -> u64 {
    20
}
fn default_api_url() -> String {
    "https://api.telegram.org".to_string()
}
fn default_notional() -> f64 {
    12.0
}
fn default_balance_fraction() -> f64 {
    0.95
}
fn default_fee_buffer() -> f64 {
    1.30
}
fn default_trail_ratio() -> f64 {
    0.99
}
fn default_tick_interval_ms() -> u64 {
    1_000
}
fn default_max_feed_failures() -> u32 {
    10
}
fn default_paper_balance() -> f64 {
    100.0
}
fn default_data_dir() -> String {
    "./data".to_string()
}
fn default_max_attempts() -> u32 {
    5
}
fn default_initial_delay_ms() -> u64 {
    500
}
fn default_backoff_multiplier() -> f64 {
    2.0
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let settings = config::Config::builder()
            // Load from file if exists
            .add_source(config::File::from(path).required(false))
            // Override with environment variables (prefix SNIPER_)
            .add_source(
                config::Environment::with_prefix("SNIPER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: Config = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        if self.trading.quote_notional <= 0.0 {
            anyhow::bail!("quote_notional must be positive");
        }

        if !(0.0..=1.0).contains(&self.trading.balance_fraction) {
            anyhow::bail!("balance_fraction must be within (0, 1]");
        }

        if self.trading.fee_buffer < 1.0 {
            anyhow::bail!("fee_buffer must be >= 1.0");
        }

        if !(0.0 < self.trading.trail_ratio && self.trading.trail_ratio < 1.0) {
            anyhow::bail!(
                "trail_ratio must be within (0, 1), got {}",
                self.trading.trail_ratio
            );
        }

        if self.trading.tick_interval_ms == 0 {
            anyhow::bail!("tick_interval_ms must be positive");
        }

        if self.retry.max_attempts == 0 {
            anyhow::bail!("retry.max_attempts must be at least 1");
        }

        if self.retry.backoff_multiplier < 1.0 {
            anyhow::bail!("retry.backoff_multiplier must be >= 1.0");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config {
            exchange: ExchangeConfig::default(),
            telegram: TelegramConfig::default(),
            trading: TradingConfig::default(),
            storage: StorageConfig::default(),
            retry: RetryConfig::default(),
        };

        assert!(config.validate().is_ok());
        assert_eq!(config.trading.quote_notional, 12.0);
        assert_eq!(config.trading.trail_ratio, 0.99);
    }

    #[test]
    fn test_invalid_trail_ratio_rejected() {
        let mut config = Config {
            exchange: ExchangeConfig::default(),
            telegram: TelegramConfig::default(),
            trading: TradingConfig::default(),
            storage: StorageConfig::default(),
            retry: RetryConfig::default(),
        };
        config.trading.trail_ratio = 1.5;

        assert!(config.validate().is_err());
    }
}
