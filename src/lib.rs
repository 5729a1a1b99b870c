// IFD Grid Bot Library
//
// Periodic grid-trading controller: maps the last traded price onto a fixed
// grid, opens one IFD bracket per free level and cancels stale brackets.

pub mod core;
pub mod clients;
pub mod config;
pub mod db;          // SQLite ledger and tick history
pub mod error;       // Unified error handling
pub mod types;
pub mod validation;  // Pre-flight validation

// Re-export core trading types
pub use crate::core::{
    CancelOutcome, Controller, ControllerSettings, Grid, OrderSnapshot, PlacementOutcome,
    SkipReason, TickReport,
};

// Re-export error types
pub use error::{TradingError, TradingResult};

// Re-export validation types
pub use validation::{PreFlightValidator, ValidationCheck, ValidationLevel, ValidationResult};

// Re-export client types
pub use clients::{BitflyerClient, Exchange};

// Re-export configuration
pub use config::{Config, ConfigError, ExchangeConfig, GridConfig, LedgerConfig, OrderConfig, PolicyConfig};

// Re-export database types
pub use db::{Database, Ledger, Reservation, SqliteLedger, TickRecord};

pub use types::{Bracket, BracketRequest, LevelPolicy, OccupancyRule, PriceLevel, RestingOrder, Side};
