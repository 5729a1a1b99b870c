//! Reconciliation controller
//!
//! One call to [`Controller::tick`] is one reconciliation pass:
//!
//! 1. fetch the last traded price and map it onto the grid
//! 2. bounds check, occupancy check, funds check
//! 3. submit a bracket at the target level (or log it in dry-run mode)
//! 4. cancel brackets that fell `lookback` steps below the target level
//!
//! The exchange's order listing is re-read on every tick, so a restarted
//! process derives the same decisions. The ledger total is advisory.
//! Nothing is retried inside a tick; the next scheduled tick is the retry.

use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::funds::{has_sufficient_funds, required_funds, reservation_cost};
use super::grid::Grid;
use super::order_state::{is_level_occupied, stale_orders, OrderSnapshot};
use crate::clients::Exchange;
use crate::config::Config;
use crate::db::Ledger;
use crate::error::{TradingError, TradingResult};
use crate::types::{Bracket, BracketRequest, LevelPolicy, OccupancyRule, PriceLevel, Side};

/// Normal no-action outcomes of the placement path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    OutOfRange,
    LevelOccupied,
    InsufficientFunds,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::OutOfRange => "out_of_range",
            SkipReason::LevelOccupied => "level_occupied",
            SkipReason::InsufficientFunds => "insufficient_funds",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SkipReason::OutOfRange => "out of range",
            SkipReason::LevelOccupied => "level occupied",
            SkipReason::InsufficientFunds => "insufficient funds",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone)]
pub enum PlacementOutcome {
    Placed {
        bracket_id: String,
        level: PriceLevel,
        reserved: Decimal,
    },
    /// Would have placed, but the controller is not live
    DryRun { level: PriceLevel },
    Skipped(SkipReason),
    Failed(TradingError),
}

impl PlacementOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, PlacementOutcome::Failed(_))
    }

    pub fn skip_reason(&self) -> Option<SkipReason> {
        match self {
            PlacementOutcome::Skipped(reason) => Some(*reason),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum CancelOutcome {
    Canceled {
        bracket_id: String,
        level: PriceLevel,
        released: Option<Decimal>,
    },
    DryRun {
        bracket_id: String,
        level: PriceLevel,
    },
    Failed {
        bracket_id: String,
        level: PriceLevel,
        error: TradingError,
    },
}

impl CancelOutcome {
    pub fn bracket_id(&self) -> &str {
        match self {
            CancelOutcome::Canceled { bracket_id, .. }
            | CancelOutcome::DryRun { bracket_id, .. }
            | CancelOutcome::Failed { bracket_id, .. } => bracket_id,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, CancelOutcome::Failed { .. })
    }
}

/// Everything one tick decided and did.
#[derive(Debug, Clone)]
pub struct TickReport {
    pub tick_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub live: bool,
    pub market_price: Option<Decimal>,
    pub target_level: Option<PriceLevel>,
    pub placement: PlacementOutcome,
    pub cancellations: Vec<CancelOutcome>,
    /// Reservations released because their bracket is no longer active
    pub pruned: Vec<String>,
    /// Failures outside the placement outcome (sweep listing, ledger writes)
    pub errors: Vec<TradingError>,
}

impl TickReport {
    fn new(live: bool) -> Self {
        Self {
            tick_id: Uuid::new_v4(),
            started_at: Utc::now(),
            live,
            market_price: None,
            target_level: None,
            placement: PlacementOutcome::Skipped(SkipReason::OutOfRange),
            cancellations: Vec::new(),
            pruned: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn failure_count(&self) -> usize {
        usize::from(self.placement.is_failure())
            + self.cancellations.iter().filter(|c| c.is_failure()).count()
            + self.errors.len()
    }

    pub fn is_success(&self) -> bool {
        self.failure_count() == 0
    }

    pub fn canceled_count(&self) -> usize {
        self.cancellations
            .iter()
            .filter(|c| matches!(c, CancelOutcome::Canceled { .. }))
            .count()
    }
}

/// Order sizing and policy knobs used by the controller
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub buy_size: Decimal,
    pub sell_size: Decimal,
    pub fee_rate: Decimal,
    pub quote_currency: String,
    pub live: bool,
    pub level_policy: LevelPolicy,
    pub occupancy_rule: OccupancyRule,
    pub stale_lookback: u32,
}

impl ControllerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            buy_size: config.orders.buy_size,
            sell_size: config.orders.sell_size,
            fee_rate: config.orders.fee_rate,
            quote_currency: config.exchange.quote_currency.clone(),
            live: config.policy.live,
            level_policy: config.policy.level_policy,
            occupancy_rule: config.policy.occupancy_rule,
            stale_lookback: config.policy.stale_lookback_steps,
        }
    }
}

pub struct Controller<E, L> {
    exchange: E,
    ledger: L,
    grid: Grid,
    settings: ControllerSettings,
}

impl<E: Exchange, L: Ledger> Controller<E, L> {
    pub fn new(exchange: E, ledger: L, grid: Grid, settings: ControllerSettings) -> Self {
        Self { exchange, ledger, grid, settings }
    }

    /// Build from configuration. Fails with `TradingError::Config` on bad
    /// grid bounds before anything touches the exchange.
    pub fn from_config(config: &Config, exchange: E, ledger: L) -> TradingResult<Self> {
        let grid = Grid::from_config(&config.grid)?;
        Ok(Self::new(exchange, ledger, grid, ControllerSettings::from_config(config)))
    }

    pub fn exchange(&self) -> &E {
        &self.exchange
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn settings(&self) -> &ControllerSettings {
        &self.settings
    }

    /// Run one reconciliation pass.
    pub async fn tick(&self) -> TickReport {
        let report = TickReport::new(self.settings.live);
        let span = info_span!("tick", tick_id = %report.tick_id, live = report.live);
        self.run_tick(report).instrument(span).await
    }

    async fn run_tick(&self, mut report: TickReport) -> TickReport {
        let price = match self.exchange.get_ltp().await {
            Ok(price) => price,
            Err(e) => {
                error!(category = e.category(), "❌ Ticker query failed: {}", e);
                warn!("⚠️  No market price, cancellation sweep skipped");
                report.placement = PlacementOutcome::Failed(e);
                return report;
            }
        };
        report.market_price = Some(price);

        let target = match self.grid.select(price, self.settings.level_policy) {
            Ok(target) => target,
            Err(e) => {
                error!(category = e.category(), "❌ {}", e);
                report.placement = PlacementOutcome::Failed(e);
                return report;
            }
        };
        report.target_level = target;
        info!("💰 Market price: ¥{} | Target level: {:?}", price, target);

        let brackets = self.exchange.list_active_brackets().await;
        match &brackets {
            Ok(list) => debug!("📋 {} active brackets", list.len()),
            Err(e) => error!(category = e.category(), "❌ Bracket listing failed: {}", e),
        }

        report.placement = self
            .placement_path(price, target, &brackets, &mut report.errors)
            .await;

        match &brackets {
            Ok(list) => {
                if let Some(level) = target {
                    report.cancellations = self.sweep(list, level, &mut report.errors).await;
                }
                if report.live {
                    let placed = match &report.placement {
                        PlacementOutcome::Placed { bracket_id, .. } => Some(bracket_id.as_str()),
                        _ => None,
                    };
                    report.pruned = self.prune_reservations(list, placed, &mut report.errors);
                }
            }
            Err(_) => warn!("⚠️  Cancellation sweep skipped: active brackets unknown"),
        }

        self.log_summary(&report);
        report
    }

    async fn placement_path(
        &self,
        price: Decimal,
        target: Option<PriceLevel>,
        brackets: &TradingResult<Vec<Bracket>>,
        errors: &mut Vec<TradingError>,
    ) -> PlacementOutcome {
        if !self.grid.contains_price(price) {
            info!("↔️  Price ¥{} is out of range", price);
            return PlacementOutcome::Skipped(SkipReason::OutOfRange);
        }
        let Some(level) = target else {
            info!("↔️  Price ¥{} has not reached the grid", price);
            return PlacementOutcome::Skipped(SkipReason::OutOfRange);
        };

        let brackets = match brackets {
            Ok(list) => list.clone(),
            Err(e) => return PlacementOutcome::Failed(e.clone()),
        };

        let resting_sells = if self.settings.occupancy_rule == OccupancyRule::BuyLevel {
            Vec::new()
        } else {
            match self.exchange.list_resting_limit_orders(Side::Sell).await {
                Ok(orders) => orders,
                Err(e) => {
                    error!(category = e.category(), "❌ Resting order listing failed: {}", e);
                    return PlacementOutcome::Failed(e);
                }
            }
        };

        let snapshot = OrderSnapshot::new(brackets, resting_sells);
        let duplicates = snapshot.duplicate_levels();
        if !duplicates.is_empty() {
            warn!("⚠️  Multiple brackets share levels: {:?}", duplicates);
        }

        let interval = self.grid.interval();
        if is_level_occupied(level, interval, &snapshot, self.settings.occupancy_rule) {
            info!("📌 Order at ¥{} already exists", level);
            return PlacementOutcome::Skipped(SkipReason::LevelOccupied);
        }

        let balance = match self.exchange.get_balance(&self.settings.quote_currency).await {
            Ok(balance) => balance,
            Err(e) => {
                error!(category = e.category(), "❌ Balance query failed: {}", e);
                return PlacementOutcome::Failed(e);
            }
        };
        match self.ledger.read_reserved() {
            Ok(reserved) => debug!("🧾 Ledger reserved: ¥{}", reserved),
            Err(e) => warn!("⚠️  Ledger unreadable: {}", e),
        }

        let (buy_size, fee_rate) = (self.settings.buy_size, self.settings.fee_rate);
        if !has_sufficient_funds(price, balance, buy_size, fee_rate) {
            info!(
                "🪫 Insufficient funds: required ¥{}, available ¥{}",
                required_funds(price, buy_size, fee_rate).round_dp(0),
                balance
            );
            return PlacementOutcome::Skipped(SkipReason::InsufficientFunds);
        }

        let request = BracketRequest {
            buy_price: level,
            buy_size,
            sell_price: level + interval,
            sell_size: self.settings.sell_size,
        };

        if !self.settings.live {
            info!(
                "🧪 DRY RUN: would place BUY {} @ ¥{} / SELL {} @ ¥{}",
                request.buy_size, request.buy_price, request.sell_size, request.sell_price
            );
            return PlacementOutcome::DryRun { level };
        }

        let bracket_id = match self.exchange.submit_bracket(&request).await {
            Ok(id) => id,
            Err(e) => {
                error!(category = e.category(), "❌ Bracket submission failed: {}", e);
                return PlacementOutcome::Failed(e);
            }
        };

        let reserved = reservation_cost(buy_size, level, fee_rate);
        match self.ledger.record_reservation(&bracket_id, level, reserved) {
            Ok(total) => info!(
                "🟢 Placed bracket {}: BUY @ ¥{} / SELL @ ¥{} | reserved ¥{} (total ¥{})",
                bracket_id, request.buy_price, request.sell_price, reserved, total
            ),
            Err(e) => {
                error!(category = e.category(), "❌ Placed {} but ledger update failed: {}", bracket_id, e);
                errors.push(e);
            }
        }

        PlacementOutcome::Placed { bracket_id, level, reserved }
    }

    async fn sweep(
        &self,
        brackets: &[Bracket],
        level: PriceLevel,
        errors: &mut Vec<TradingError>,
    ) -> Vec<CancelOutcome> {
        let stale = stale_orders(brackets, level, self.grid.interval(), self.settings.stale_lookback);
        let mut outcomes = Vec::with_capacity(stale.len());

        for bracket in stale {
            let bracket_id = bracket.id.clone();
            let level = bracket.buy_price;

            if !self.settings.live {
                info!("🧪 DRY RUN: would cancel {} @ ¥{}", bracket_id, level);
                outcomes.push(CancelOutcome::DryRun { bracket_id, level });
                continue;
            }

            match self.exchange.cancel_bracket(&bracket_id).await {
                Ok(()) => {
                    let released = match self.ledger.release_reservation(&bracket_id) {
                        Ok(released) => released,
                        Err(e) => {
                            error!(category = e.category(), "❌ Ledger release for {} failed: {}", bracket_id, e);
                            errors.push(e);
                            None
                        }
                    };
                    info!("🔴 Canceled stale bracket {} @ ¥{} (released {:?})", bracket_id, level, released);
                    outcomes.push(CancelOutcome::Canceled { bracket_id, level, released });
                }
                Err(e) => {
                    error!(category = e.category(), "❌ Cancel of {} failed: {}", bracket_id, e);
                    outcomes.push(CancelOutcome::Failed { bracket_id, level, error: e });
                }
            }
        }

        outcomes
    }

    /// Release reservations whose bracket is no longer listed as active,
    /// i.e. it completed or was canceled elsewhere.
    fn prune_reservations(
        &self,
        active: &[Bracket],
        placed: Option<&str>,
        errors: &mut Vec<TradingError>,
    ) -> Vec<String> {
        let reservations = match self.ledger.reservations() {
            Ok(reservations) => reservations,
            Err(e) => {
                errors.push(e);
                return Vec::new();
            }
        };

        let active_ids: HashSet<&str> = active.iter().map(|b| b.id.as_str()).collect();
        let mut pruned = Vec::new();
        for reservation in reservations {
            let id = reservation.bracket_id.as_str();
            if active_ids.contains(id) || placed == Some(id) {
                continue;
            }
            match self.ledger.release_reservation(id) {
                Ok(Some(amount)) => {
                    info!("🧾 Released ¥{} for finished bracket {}", amount, id);
                    pruned.push(reservation.bracket_id.clone());
                }
                Ok(None) => {}
                Err(e) => errors.push(e),
            }
        }
        pruned
    }

    fn log_summary(&self, report: &TickReport) {
        match &report.placement {
            PlacementOutcome::Skipped(reason) => info!("⏭️  Placement skipped: {}", reason),
            PlacementOutcome::Failed(e) => error!(category = e.category(), "❌ Placement failed: {}", e),
            PlacementOutcome::Placed { bracket_id, .. } => debug!("placement: {}", bracket_id),
            PlacementOutcome::DryRun { level } => debug!("placement (dry run): {}", level),
        }
        if report.is_success() {
            info!("✅ Tick done: {} canceled", report.canceled_count());
        } else {
            warn!("⚠️  Tick done with {} failure(s)", report.failure_count());
        }
    }
}
