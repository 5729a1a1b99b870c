// Configuration management for the grid bot

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use tracing::info;

use crate::types::{LevelPolicy, OccupancyRule};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    #[serde(default = "default_rest_url")]
    pub rest_url: String,
    #[serde(default = "default_product_code")]
    pub product_code: String,
    #[serde(default = "default_quote_currency")]
    pub quote_currency: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_minute_to_expire")]
    pub minute_to_expire: u32,
    /// Usually left empty in the file and supplied via API_KEY
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridConfig {
    pub min_price: i64,
    pub max_price: i64,
    pub price_interval: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderConfig {
    pub buy_size: Decimal,
    pub sell_size: Decimal,
    #[serde(default = "default_fee_rate")]
    pub fee_rate: Decimal,
    #[serde(default = "default_min_order_size")]
    pub min_order_size: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Real submission when true, logged decisions only when false
    #[serde(default)]
    pub live: bool,
    #[serde(default)]
    pub level_policy: LevelPolicy,
    #[serde(default)]
    pub occupancy_rule: OccupancyRule,
    #[serde(default = "default_stale_lookback")]
    pub stale_lookback_steps: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub exchange: ExchangeConfig,
    pub grid: GridConfig,
    pub orders: OrderConfig,
    pub policy: PolicyConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
}

// Default value functions
fn default_rest_url() -> String { "https://api.bitflyer.com".to_string() }
fn default_product_code() -> String { "BTC_JPY".to_string() }
fn default_quote_currency() -> String { "JPY".to_string() }
fn default_request_timeout() -> u64 { 10 }
fn default_minute_to_expire() -> u32 { 43_200 }
fn default_fee_rate() -> Decimal { dec!(0.001) }
fn default_min_order_size() -> Decimal { dec!(0.001) }
fn default_stale_lookback() -> u32 { 1 }
fn default_db_path() -> String { "data/grid_bot.db".to_string() }
fn default_history_limit() -> usize { 10 }

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            rest_url: default_rest_url(),
            product_code: default_product_code(),
            quote_currency: default_quote_currency(),
            request_timeout_secs: default_request_timeout(),
            minute_to_expire: default_minute_to_expire(),
            api_key: String::new(),
            api_secret: String::new(),
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            history_limit: default_history_limit(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            exchange: ExchangeConfig::default(),
            grid: GridConfig {
                min_price: 7_500_000,
                max_price: 10_700_000,
                price_interval: 200_000,
            },
            orders: OrderConfig {
                buy_size: dec!(0.001),
                sell_size: dec!(0.001),
                fee_rate: default_fee_rate(),
                min_order_size: default_min_order_size(),
            },
            policy: PolicyConfig {
                live: false,
                level_policy: LevelPolicy::Nearest,
                occupancy_rule: OccupancyRule::Either,
                stale_lookback_steps: default_stale_lookback(),
            },
            ledger: LedgerConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::parse_file(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Load the file if present, apply environment overrides, validate.
    ///
    /// A missing file falls back to defaults so that a deployment can be
    /// configured from the environment alone.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = if path.as_ref().exists() {
            Self::parse_file(path)?
        } else {
            Self::default()
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::Serialize(e.to_string()))?;

        fs::write(path, content)
            .map_err(|e| ConfigError::FileWrite(e.to_string()))?;

        Ok(())
    }

    /// Load configuration from file, or create default if file doesn't exist
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            Self::from_file(path)
        } else {
            let config = Self::default();
            config.to_file(&path)?;
            info!("📁 Created default config file: {}", path.as_ref().display());
            Ok(config)
        }
    }

    fn parse_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)
            .map_err(|e| ConfigError::FileRead(e.to_string()))?;

        toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Environment variables win over file values.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(v) = env_parse("MIN_PRICE")? {
            self.grid.min_price = v;
        }
        if let Some(v) = env_parse("MAX_PRICE")? {
            self.grid.max_price = v;
        }
        if let Some(v) = env_parse("PRICE_INTERVAL")? {
            self.grid.price_interval = v;
        }
        if let Some(v) = env_parse("BUY_SIZE")? {
            self.orders.buy_size = v;
        }
        if let Some(v) = env_parse("SELL_SIZE")? {
            self.orders.sell_size = v;
        }
        if let Some(v) = env_parse("FEE_RATE")? {
            self.orders.fee_rate = v;
        }
        if let Some(v) = env_parse("STALE_LOOKBACK_STEPS")? {
            self.policy.stale_lookback_steps = v;
        }
        if let Ok(v) = env::var("LIVE") {
            self.policy.live = parse_bool("LIVE", &v)?;
        }
        if let Ok(key) = env::var("API_KEY") {
            self.exchange.api_key = key;
        }
        if let Ok(secret) = env::var("API_SECRET") {
            self.exchange.api_secret = secret;
        }
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.grid.price_interval <= 0 {
            return Err(ConfigError::Validation("price_interval must be positive".to_string()));
        }

        if self.grid.min_price >= self.grid.max_price {
            return Err(ConfigError::Validation(format!(
                "min_price ({}) must be below max_price ({})",
                self.grid.min_price, self.grid.max_price
            )));
        }

        if self.orders.buy_size <= Decimal::ZERO || self.orders.sell_size <= Decimal::ZERO {
            return Err(ConfigError::Validation("order sizes must be positive".to_string()));
        }

        if self.orders.buy_size < self.orders.min_order_size {
            return Err(ConfigError::Validation(format!(
                "buy_size {} is below the exchange minimum {}",
                self.orders.buy_size, self.orders.min_order_size
            )));
        }

        if self.orders.fee_rate < Decimal::ZERO || self.orders.fee_rate >= Decimal::ONE {
            return Err(ConfigError::Validation("fee_rate must be in [0, 1)".to_string()));
        }

        if self.policy.stale_lookback_steps == 0 {
            return Err(ConfigError::Validation(
                "stale_lookback_steps must be at least 1".to_string(),
            ));
        }

        if self.exchange.request_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "request_timeout_secs must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Check if API keys are configured
    pub fn has_api_keys(&self) -> bool {
        !self.exchange.api_key.is_empty() && !self.exchange.api_secret.is_empty()
    }
}

fn env_parse<T: FromStr>(key: &str) -> Result<Option<T>, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::Env(key.to_string(), e.to_string())),
        Err(_) => Ok(None),
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::Env(key.to_string(), format!("not a boolean: {}", other))),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(String),

    #[error("Failed to write config file: {0}")]
    FileWrite(String),

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Failed to serialize config: {0}")]
    Serialize(String),

    #[error("Invalid environment variable {0}: {1}")]
    Env(String, String),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_inverted_bounds() {
        let mut config = Config::default();
        config.grid.min_price = config.grid.max_price;
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_rejects_non_positive_interval() {
        let mut config = Config::default();
        config.grid.price_interval = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_buy_size_below_minimum() {
        let mut config = Config::default();
        config.orders.buy_size = dec!(0.0005);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("LIVE", "True").unwrap());
        assert!(!parse_bool("LIVE", "0").unwrap());
        assert!(parse_bool("LIVE", "maybe").is_err());
    }
}
