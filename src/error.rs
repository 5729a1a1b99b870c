//! Unified error handling for the IFD grid bot
//!
//! Every fallible operation in the library returns `TradingResult<T>`. Skip
//! outcomes of a tick (out of range, level occupied, insufficient funds) are
//! not errors and never travel through this type.

use std::io;

use thiserror::Error;

use crate::config::ConfigError;

/// Main error type for the grid bot
#[derive(Debug, Clone, Error)]
pub enum TradingError {
    /// Invalid grid bounds, sizes or other settings. Fatal, raised before
    /// any exchange call.
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Grid has no price levels")]
    EmptyGrid,

    /// Balance, ticker or order listing failed or timed out.
    #[error("Exchange query failed: {0}")]
    ExchangeQuery(String),

    /// Placement or cancellation was rejected or could not be sent.
    #[error("Exchange submission failed: {0}")]
    ExchangeSubmit(String),

    #[error("API authentication failed: {0}")]
    ApiAuthentication(String),

    #[error("API timeout: {0}")]
    ApiTimeout(String),

    #[error("Ledger error: {0}")]
    Ledger(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("File error: {0}")]
    Io(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl TradingError {
    /// Get a user-friendly error message with helpful context
    pub fn user_message(&self) -> String {
        match self {
            TradingError::Config(msg) => {
                format!(
                    "Configuration error: {}\n\n\
                    💡 Check config.toml (or the MIN_PRICE / MAX_PRICE / PRICE_INTERVAL\n\
                    environment overrides):\n\
                    - PRICE_INTERVAL must be positive\n\
                    - MIN_PRICE must be below MAX_PRICE\n\
                    - Order sizes must be positive",
                    msg
                )
            }
            TradingError::ApiAuthentication(msg) => {
                format!(
                    "API authentication failed: {}\n\n\
                    💡 Check:\n\
                    - API_KEY and API_SECRET are set\n\
                    - The key has order and balance permissions",
                    msg
                )
            }
            TradingError::Ledger(msg) => {
                format!(
                    "Ledger error: {}\n\n\
                    💡 Try:\n\
                    1. Run: grid-bot init\n\
                    2. Check data/ directory permissions",
                    msg
                )
            }
            _ => self.to_string(),
        }
    }

    /// Errors that may clear up by the next scheduled tick
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TradingError::ApiTimeout(_) | TradingError::ExchangeQuery(_)
        )
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            TradingError::Config(_) | TradingError::EmptyGrid => "config",
            TradingError::ExchangeQuery(_)
            | TradingError::ApiAuthentication(_)
            | TradingError::ApiTimeout(_) => "exchange_query",
            TradingError::ExchangeSubmit(_) => "exchange_submit",
            TradingError::Ledger(_) => "ledger",
            TradingError::ValidationFailed(_) => "validation",
            TradingError::Io(_) => "io",
            TradingError::Internal(_) => "internal",
        }
    }
}

// Conversion implementations for common error types

impl From<io::Error> for TradingError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::TimedOut => TradingError::ApiTimeout(err.to_string()),
            _ => TradingError::Io(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for TradingError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(_, Some(msg)) => TradingError::Ledger(msg),
            rusqlite::Error::QueryReturnedNoRows => {
                TradingError::Ledger("Query returned no rows".to_string())
            }
            _ => TradingError::Ledger(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for TradingError {
    fn from(err: serde_json::Error) -> Self {
        TradingError::ExchangeQuery(format!("JSON parse error: {}", err))
    }
}

impl From<toml::de::Error> for TradingError {
    fn from(err: toml::de::Error) -> Self {
        TradingError::Config(format!("TOML parse error: {}", err))
    }
}

/// Network failures map to query errors; callers on the submit path
/// re-wrap them as `ExchangeSubmit`.
impl From<reqwest::Error> for TradingError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TradingError::ApiTimeout(err.to_string())
        } else {
            TradingError::ExchangeQuery(err.to_string())
        }
    }
}

impl From<ConfigError> for TradingError {
    fn from(err: ConfigError) -> Self {
        TradingError::Config(err.to_string())
    }
}

impl From<String> for TradingError {
    fn from(msg: String) -> Self {
        TradingError::Internal(msg)
    }
}

impl From<&str> for TradingError {
    fn from(msg: &str) -> Self {
        TradingError::Internal(msg.to_string())
    }
}

/// Result type alias using TradingError
pub type TradingResult<T> = Result<T, TradingError>;
