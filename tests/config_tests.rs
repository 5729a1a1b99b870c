// Integration tests for configuration loading and validation

mod common;

use common::create_test_config;
use ifd_grid_bot::{Config, ConfigError, LevelPolicy, OccupancyRule};
use rust_decimal_macros::dec;
use serial_test::serial;
use std::env;
use std::fs;
use tempfile::TempDir;

const ENV_KEYS: &[&str] = &[
    "MIN_PRICE",
    "MAX_PRICE",
    "PRICE_INTERVAL",
    "BUY_SIZE",
    "SELL_SIZE",
    "FEE_RATE",
    "STALE_LOOKBACK_STEPS",
    "LIVE",
    "API_KEY",
    "API_SECRET",
];

fn clear_env() {
    for key in ENV_KEYS {
        env::remove_var(key);
    }
}

#[test]
fn test_config_serialization_deserialization() {
    let config = create_test_config();

    let toml_string = toml::to_string(&config).expect("Failed to serialize config");
    assert!(toml_string.contains("price_interval"));
    assert!(toml_string.contains("BTC_JPY"));

    let deserialized: Config = toml::from_str(&toml_string).expect("Failed to deserialize config");
    assert_eq!(deserialized.grid.min_price, config.grid.min_price);
    assert_eq!(deserialized.orders.buy_size, config.orders.buy_size);
    assert_eq!(deserialized.policy.level_policy, config.policy.level_policy);
}

#[test]
fn test_example_config_parses() {
    let config: Config = toml::from_str(include_str!("../config.toml.example"))
        .expect("example config should parse");
    assert!(config.validate().is_ok());
    assert_eq!(config.grid.price_interval, 200_000);
    assert_eq!(config.policy.occupancy_rule, OccupancyRule::Either);
    assert!(!config.policy.live);
}

#[test]
fn test_minimal_file_uses_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");
    fs::write(
        &path,
        r#"
[exchange]

[grid]
min_price = 8000000
max_price = 10000000
price_interval = 100000

[orders]
buy_size = 0.002
sell_size = 0.002

[policy]
level_policy = "floor"
"#,
    )
    .unwrap();

    let config = Config::from_file(&path).expect("minimal config should load");
    assert_eq!(config.exchange.product_code, "BTC_JPY");
    assert_eq!(config.orders.fee_rate, dec!(0.001));
    assert_eq!(config.policy.level_policy, LevelPolicy::Floor);
    assert_eq!(config.policy.stale_lookback_steps, 1);
    assert_eq!(config.ledger.db_path, "data/grid_bot.db");
}

#[test]
fn test_invalid_file_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");

    fs::write(&path, "not = [valid").unwrap();
    assert!(matches!(Config::from_file(&path), Err(ConfigError::Parse(_))));

    let mut config = create_test_config();
    config.grid.max_price = config.grid.min_price - 1;
    let text = toml::to_string(&config).unwrap();
    fs::write(&path, text).unwrap();
    assert!(matches!(Config::from_file(&path), Err(ConfigError::Validation(_))));
}

#[test]
fn test_save_and_reload() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");

    let mut config = create_test_config();
    config.policy.occupancy_rule = OccupancyRule::SellLevel;
    config.to_file(&path).unwrap();

    let loaded = Config::from_file(&path).unwrap();
    assert_eq!(loaded.policy.occupancy_rule, OccupancyRule::SellLevel);
    assert_eq!(loaded.grid.max_price, config.grid.max_price);
}

#[test]
fn test_load_or_create_writes_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");
    assert!(!path.exists());

    let config = Config::load_or_create(&path).unwrap();
    assert!(path.exists());
    assert_eq!(config.grid.price_interval, Config::default().grid.price_interval);
}

#[test]
#[serial]
fn test_env_overrides_file_values() {
    clear_env();
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");
    create_test_config().to_file(&path).unwrap();

    env::set_var("PRICE_INTERVAL", "100000");
    env::set_var("BUY_SIZE", "0.002");
    env::set_var("LIVE", "false");
    env::set_var("API_KEY", "from-env");

    let config = Config::load(&path);
    clear_env();
    let config = config.unwrap();

    assert_eq!(config.grid.price_interval, 100_000);
    assert_eq!(config.orders.buy_size, dec!(0.002));
    assert!(!config.policy.live);
    assert_eq!(config.exchange.api_key, "from-env");
}

#[test]
#[serial]
fn test_env_only_configuration() {
    clear_env();
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("absent.toml");

    env::set_var("MIN_PRICE", "5000000");
    env::set_var("MAX_PRICE", "6000000");
    env::set_var("LIVE", "1");

    let config = Config::load(&missing);
    clear_env();
    let config = config.unwrap();

    assert_eq!(config.grid.min_price, 5_000_000);
    assert_eq!(config.grid.max_price, 6_000_000);
    assert!(config.policy.live);
}

#[test]
#[serial]
fn test_bad_env_value_is_an_error() {
    clear_env();
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("absent.toml");

    env::set_var("PRICE_INTERVAL", "two hundred");
    let result = Config::load(&missing);
    clear_env();
    assert!(matches!(result, Err(ConfigError::Env(key, _)) if key == "PRICE_INTERVAL"));

    env::set_var("LIVE", "sometimes");
    let result = Config::load(&missing);
    clear_env();
    assert!(matches!(result, Err(ConfigError::Env(_, _))));
}

#[test]
#[serial]
fn test_env_can_break_validation() {
    clear_env();
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("absent.toml");

    env::set_var("MIN_PRICE", "20000000");
    let result = Config::load(&missing);
    clear_env();
    assert!(matches!(result, Err(ConfigError::Validation(_))));
}
