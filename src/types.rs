// Common types used across the application

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Whole-yen price on the grid
pub type PriceLevel = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

/// An ACTIVE IFD pair as reported by the exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct Bracket {
    pub id: String,
    pub buy_price: PriceLevel,
    pub buy_size: Decimal,
    pub sell_price: PriceLevel,
    pub sell_size: Decimal,
}

/// A resting LIMIT child order.
#[derive(Debug, Clone, PartialEq)]
pub struct RestingOrder {
    pub side: Side,
    pub price: PriceLevel,
    pub size: Decimal,
}

/// Parameters of a bracket about to be submitted.
#[derive(Debug, Clone, PartialEq)]
pub struct BracketRequest {
    pub buy_price: PriceLevel,
    pub buy_size: Decimal,
    pub sell_price: PriceLevel,
    pub sell_size: Decimal,
}

/// How the controller maps the market price onto the grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelPolicy {
    /// Closest level, ties to the lower one
    #[default]
    Nearest,
    /// Greatest level the price has reached
    Floor,
}

/// Which order representation marks a level as taken
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OccupancyRule {
    /// Active bracket whose BUY leg sits on the level
    BuyLevel,
    /// Resting SELL one interval above the level
    SellLevel,
    #[default]
    Either,
}
