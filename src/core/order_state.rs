//! Order state classification
//!
//! The exchange reports IFD brackets in two shapes: the parent order list
//! carries only the first leg's `price`/`size`, while the per-order detail
//! nests both legs under `parameters`. Both are normalized here into a
//! single [`Bracket`] so the controller never sees the raw records.

use std::collections::{BTreeMap, BTreeSet};

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::error::{TradingError, TradingResult};
use crate::types::{Bracket, OccupancyRule, PriceLevel, RestingOrder, Side};

/// One leg inside a parent order detail
#[derive(Debug, Clone, Deserialize)]
pub struct RawLeg {
    pub side: Side,
    pub price: Decimal,
    pub size: Decimal,
    #[serde(default)]
    pub condition_type: Option<String>,
}

/// Parent order record in either of the exchange's shapes.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawParentOrder {
    Nested {
        parent_order_acceptance_id: String,
        parameters: Vec<RawLeg>,
    },
    Flat {
        parent_order_acceptance_id: String,
        price: Decimal,
        size: Decimal,
    },
}

impl RawParentOrder {
    pub fn acceptance_id(&self) -> &str {
        match self {
            RawParentOrder::Nested { parent_order_acceptance_id, .. }
            | RawParentOrder::Flat { parent_order_acceptance_id, .. } => parent_order_acceptance_id,
        }
    }
}

/// Resting child order as listed by the exchange
#[derive(Debug, Clone, Deserialize)]
pub struct RawChildOrder {
    pub side: Side,
    #[serde(default)]
    pub child_order_type: Option<String>,
    pub price: Decimal,
    pub size: Decimal,
}

fn to_level(price: Decimal) -> TradingResult<PriceLevel> {
    price
        .round()
        .to_i64()
        .ok_or_else(|| TradingError::ExchangeQuery(format!("price {} out of range", price)))
}

/// Normalize a parent order into a bracket.
///
/// A flat record only knows its BUY leg; the SELL leg is assumed one
/// `interval` above with the same size, which is how this bot submits them.
pub fn normalize_bracket(raw: &RawParentOrder, interval: PriceLevel) -> TradingResult<Bracket> {
    match raw {
        RawParentOrder::Nested { parent_order_acceptance_id, parameters } => {
            let buy = parameters.iter().find(|leg| leg.side == Side::Buy);
            let sell = parameters.iter().find(|leg| leg.side == Side::Sell);
            match (buy, sell) {
                (Some(buy), Some(sell)) => Ok(Bracket {
                    id: parent_order_acceptance_id.clone(),
                    buy_price: to_level(buy.price)?,
                    buy_size: buy.size,
                    sell_price: to_level(sell.price)?,
                    sell_size: sell.size,
                }),
                _ => Err(TradingError::ExchangeQuery(format!(
                    "parent order {} is not a BUY/SELL pair",
                    parent_order_acceptance_id
                ))),
            }
        }
        RawParentOrder::Flat { parent_order_acceptance_id, price, size } => {
            let buy_price = to_level(*price)?;
            Ok(Bracket {
                id: parent_order_acceptance_id.clone(),
                buy_price,
                buy_size: *size,
                sell_price: buy_price + interval,
                sell_size: *size,
            })
        }
    }
}

pub fn normalize_resting(raw: &RawChildOrder) -> TradingResult<RestingOrder> {
    Ok(RestingOrder {
        side: raw.side,
        price: to_level(raw.price)?,
        size: raw.size,
    })
}

/// Live order state for one tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderSnapshot {
    pub brackets: Vec<Bracket>,
    pub resting_sells: Vec<RestingOrder>,
}

impl OrderSnapshot {
    pub fn new(brackets: Vec<Bracket>, resting_sells: Vec<RestingOrder>) -> Self {
        Self { brackets, resting_sells }
    }

    /// Every grid level currently taken under `rule`.
    pub fn occupied_levels(&self, interval: PriceLevel, rule: OccupancyRule) -> BTreeSet<PriceLevel> {
        let mut levels = BTreeSet::new();
        if rule != OccupancyRule::SellLevel {
            levels.extend(self.brackets.iter().map(|b| b.buy_price));
        }
        if rule != OccupancyRule::BuyLevel {
            levels.extend(
                self.resting_sells
                    .iter()
                    .filter(|o| o.side == Side::Sell)
                    .map(|o| o.price - interval),
            );
        }
        levels
    }

    /// Levels holding more than one active bracket.
    pub fn duplicate_levels(&self) -> Vec<PriceLevel> {
        let mut counts: BTreeMap<PriceLevel, usize> = BTreeMap::new();
        for bracket in &self.brackets {
            *counts.entry(bracket.buy_price).or_default() += 1;
        }
        counts
            .into_iter()
            .filter(|&(_, count)| count > 1)
            .map(|(level, _)| level)
            .collect()
    }
}

/// True if the level already carries an order under `rule`: an active
/// bracket buying at `level`, or a resting SELL at `level + interval`.
pub fn is_level_occupied(
    level: PriceLevel,
    interval: PriceLevel,
    snapshot: &OrderSnapshot,
    rule: OccupancyRule,
) -> bool {
    let by_bracket = || snapshot.brackets.iter().any(|b| b.buy_price == level);
    let by_sell = || {
        snapshot
            .resting_sells
            .iter()
            .any(|o| o.side == Side::Sell && o.price == level + interval)
    };

    match rule {
        OccupancyRule::BuyLevel => by_bracket(),
        OccupancyRule::SellLevel => by_sell(),
        OccupancyRule::Either => by_bracket() || by_sell(),
    }
}

/// Brackets at least `lookback` steps below `current_level`.
pub fn stale_orders(
    brackets: &[Bracket],
    current_level: PriceLevel,
    interval: PriceLevel,
    lookback: u32,
) -> Vec<&Bracket> {
    let threshold = current_level - i64::from(lookback) * interval;
    brackets.iter().filter(|b| b.buy_price <= threshold).collect()
}
