//! Pre-flight validation module for the grid bot
//!
//! Runs before a tick touches the exchange. Critical failures abort the
//! tick; warnings are logged and the tick proceeds.

use rust_decimal::Decimal;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::core::funds::reservation_cost;
use crate::core::Grid;
use crate::db::{Database, Ledger, SqliteLedger};

/// Validation result with detailed findings
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub passed: bool,
    pub checks: Vec<ValidationCheck>,
}

#[derive(Debug, Clone)]
pub struct ValidationCheck {
    pub name: String,
    pub passed: bool,
    pub message: String,
    pub level: ValidationLevel,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ValidationLevel {
    Critical,  // Must pass for the tick to run
    Warning,   // Logged, tick continues
    Info,
}

impl ValidationCheck {
    fn new(name: &str, passed: bool, message: String, level: ValidationLevel) -> Self {
        Self { name: name.to_string(), passed, message, level }
    }
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::new()
    }
}

impl ValidationResult {
    pub fn new() -> Self {
        ValidationResult {
            passed: true,
            checks: Vec::new(),
        }
    }

    pub fn add_check(&mut self, check: ValidationCheck) {
        if !check.passed && check.level == ValidationLevel::Critical {
            self.passed = false;
        }
        self.checks.push(check);
    }

    pub fn critical_failures(&self) -> Vec<&ValidationCheck> {
        self.checks
            .iter()
            .filter(|c| !c.passed && c.level == ValidationLevel::Critical)
            .collect()
    }

    pub fn warnings(&self) -> Vec<&ValidationCheck> {
        self.checks
            .iter()
            .filter(|c| !c.passed && c.level == ValidationLevel::Warning)
            .collect()
    }

    pub fn display(&self) {
        info!("🔍 Pre-flight Validation");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

        for check in &self.checks {
            let icon = if check.passed {
                "✅"
            } else {
                match check.level {
                    ValidationLevel::Critical => "❌",
                    ValidationLevel::Warning => "⚠️",
                    ValidationLevel::Info => "ℹ️",
                }
            };

            info!("{} {} - {}", icon, check.name, check.message);
        }

        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

        if !self.passed {
            let failures = self.critical_failures();
            error!("❌ Validation failed: {} critical issue(s)", failures.len());
            for failure in failures {
                error!("   • {}: {}", failure.name, failure.message);
            }
        } else {
            let warnings = self.warnings();
            if !warnings.is_empty() {
                warn!("⚠️  {} warning(s) detected", warnings.len());
                for warning in warnings {
                    warn!("   • {}: {}", warning.name, warning.message);
                }
            }
            info!("✅ All critical checks passed");
        }
    }
}

/// Pre-flight validator for a reconciliation tick
pub struct PreFlightValidator {
    config: Config,
}

impl PreFlightValidator {
    pub fn new(config: Config) -> Self {
        PreFlightValidator { config }
    }

    /// Checks that gate `grid-bot tick`. API keys and the ledger file are
    /// critical only when submitting for real.
    pub fn validate_for_tick(&self, live: bool) -> ValidationResult {
        let mut result = ValidationResult::new();

        result.add_check(self.check_config());
        result.add_check(self.check_grid());
        result.add_check(self.check_bracket_margin());
        result.add_check(self.check_sizes());
        result.add_check(self.check_api_keys(live));
        result.add_check(self.check_ledger(live));

        result
    }

    fn check_config(&self) -> ValidationCheck {
        match self.config.validate() {
            Ok(()) => ValidationCheck::new("Configuration", true, "Valid".to_string(), ValidationLevel::Critical),
            Err(e) => ValidationCheck::new("Configuration", false, e.to_string(), ValidationLevel::Critical),
        }
    }

    fn check_grid(&self) -> ValidationCheck {
        match Grid::from_config(&self.config.grid) {
            Ok(grid) if grid.levels().len() < 2 => ValidationCheck::new(
                "Grid",
                false,
                format!("only {} level(s), the grid cannot move", grid.levels().len()),
                ValidationLevel::Warning,
            ),
            Ok(grid) => ValidationCheck::new(
                "Grid",
                true,
                format!(
                    "{} levels ¥{} - ¥{} step ¥{}",
                    grid.levels().len(),
                    grid.min(),
                    grid.levels().last().copied().unwrap_or_default(),
                    grid.interval()
                ),
                ValidationLevel::Info,
            ),
            Err(e) => ValidationCheck::new("Grid", false, e.to_string(), ValidationLevel::Critical),
        }
    }

    /// The SELL leg should earn more than the fees paid on both legs.
    fn check_bracket_margin(&self) -> ValidationCheck {
        let grid = &self.config.grid;
        let orders = &self.config.orders;
        let level = grid.min_price;
        let cost = reservation_cost(orders.buy_size, level, orders.fee_rate);
        let proceeds = orders.sell_size * Decimal::from(level + grid.price_interval)
            * (Decimal::ONE - orders.fee_rate);
        let margin = proceeds - cost;

        ValidationCheck::new(
            "Bracket Margin",
            margin > Decimal::ZERO,
            format!("¥{} per round trip at the lowest level", margin.round_dp(0)),
            ValidationLevel::Warning,
        )
    }

    fn check_sizes(&self) -> ValidationCheck {
        let orders = &self.config.orders;
        if orders.sell_size > orders.buy_size {
            ValidationCheck::new(
                "Order Sizes",
                false,
                format!("sell size {} exceeds buy size {}", orders.sell_size, orders.buy_size),
                ValidationLevel::Warning,
            )
        } else {
            ValidationCheck::new(
                "Order Sizes",
                true,
                format!("BUY {} / SELL {}", orders.buy_size, orders.sell_size),
                ValidationLevel::Info,
            )
        }
    }

    fn check_api_keys(&self, live: bool) -> ValidationCheck {
        let has_keys = self.config.has_api_keys();
        ValidationCheck::new(
            "API Keys",
            has_keys,
            if has_keys {
                "Configured".to_string()
            } else {
                "Not configured (set API_KEY and API_SECRET)".to_string()
            },
            if live { ValidationLevel::Critical } else { ValidationLevel::Warning },
        )
    }

    fn check_ledger(&self, live: bool) -> ValidationCheck {
        let level = if live { ValidationLevel::Critical } else { ValidationLevel::Warning };
        let opened = Database::new(&self.config.ledger.db_path).and_then(SqliteLedger::new);

        match opened.and_then(|ledger| ledger.read_reserved()) {
            Ok(reserved) => ValidationCheck::new(
                "Ledger",
                true,
                format!("¥{} reserved", reserved),
                ValidationLevel::Info,
            ),
            Err(e) => ValidationCheck::new("Ledger", false, e.to_string(), level),
        }
    }

    /// Quick reachability check of the exchange's public API
    pub async fn check_exchange_health(&self) -> ValidationCheck {
        let client = match reqwest::Client::builder().timeout(Duration::from_secs(5)).build() {
            Ok(client) => client,
            Err(e) => {
                return ValidationCheck::new("Network", false, e.to_string(), ValidationLevel::Warning)
            }
        };

        let url = format!("{}/v1/gethealth", self.config.exchange.rest_url.trim_end_matches('/'));
        match client
            .get(url)
            .query(&[("product_code", self.config.exchange.product_code.as_str())])
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => {
                ValidationCheck::new("Network", true, "Exchange reachable".to_string(), ValidationLevel::Warning)
            }
            Ok(response) => ValidationCheck::new(
                "Network",
                false,
                format!("Exchange answered HTTP {}", response.status().as_u16()),
                ValidationLevel::Warning,
            ),
            Err(e) => ValidationCheck::new("Network", false, e.to_string(), ValidationLevel::Warning),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    fn config_in(dir: &TempDir) -> Config {
        let mut config = Config::default();
        config.ledger.db_path = dir.path().join("ledger.db").to_string_lossy().to_string();
        config
    }

    #[test]
    fn test_validation_result() {
        let mut result = ValidationResult::new();
        assert!(result.passed);

        result.add_check(ValidationCheck::new("Test", true, "OK".to_string(), ValidationLevel::Info));
        assert!(result.passed);

        result.add_check(ValidationCheck::new("Warn", false, "meh".to_string(), ValidationLevel::Warning));
        assert!(result.passed);
        assert_eq!(result.warnings().len(), 1);

        result.add_check(ValidationCheck::new("Fail", false, "Failed".to_string(), ValidationLevel::Critical));
        assert!(!result.passed);
        assert_eq!(result.critical_failures().len(), 1);
    }

    #[test]
    fn test_dry_run_passes_without_keys() {
        let dir = TempDir::new().unwrap();
        let validator = PreFlightValidator::new(config_in(&dir));
        let result = validator.validate_for_tick(false);
        assert!(result.passed);
        assert!(result.warnings().iter().any(|c| c.name == "API Keys"));
    }

    #[test]
    fn test_live_requires_keys() {
        let dir = TempDir::new().unwrap();
        let validator = PreFlightValidator::new(config_in(&dir));
        let result = validator.validate_for_tick(true);
        assert!(!result.passed);
        assert!(result.critical_failures().iter().any(|c| c.name == "API Keys"));
    }

    #[test]
    fn test_invalid_grid_is_critical() {
        let dir = TempDir::new().unwrap();
        let mut config = config_in(&dir);
        config.grid.price_interval = 0;
        let result = PreFlightValidator::new(config).validate_for_tick(false);
        assert!(!result.passed);
        assert!(result.critical_failures().iter().any(|c| c.name == "Grid"));
    }

    #[test]
    fn test_thin_margin_warns() {
        let dir = TempDir::new().unwrap();
        let mut config = config_in(&dir);
        config.grid.price_interval = 1_000;
        let result = PreFlightValidator::new(config).validate_for_tick(false);
        assert!(result.passed);
        assert!(result.warnings().iter().any(|c| c.name == "Bracket Margin"));
    }

    #[test]
    fn test_margin_is_measured_at_min_price() {
        let dir = TempDir::new().unwrap();
        let mut config = config_in(&dir);
        config.grid.min_price = 100_000;
        config.grid.max_price = 1_000_000;
        config.grid.price_interval = 200_000;
        config.orders.fee_rate = dec!(0.1);

        // BUY at 100000 costs 110, SELL at 300000 returns 270
        let check = PreFlightValidator::new(config).check_bracket_margin();
        assert!(check.passed);
        assert_eq!(check.message, "¥160 per round trip at the lowest level");
    }
}
