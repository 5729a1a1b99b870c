// Grid model: discrete price levels and price -> level mapping

use rust_decimal::Decimal;

use crate::config::GridConfig;
use crate::error::{TradingError, TradingResult};
use crate::types::{LevelPolicy, PriceLevel};

/// Upper bound on the number of levels a grid may hold
pub const MAX_GRID_LEVELS: i128 = 100_000;

/// Levels `min, min+interval, ...` strictly below `max`.
pub fn build_grid(min: PriceLevel, max: PriceLevel, interval: PriceLevel) -> TradingResult<Vec<PriceLevel>> {
    if interval <= 0 {
        return Err(TradingError::Config(format!("grid interval must be positive, got {}", interval)));
    }
    if min >= max {
        return Err(TradingError::Config(format!("grid min {} must be below max {}", min, max)));
    }

    // Widened so that spans across the whole i64 range cannot overflow
    let span = i128::from(max) - i128::from(min);
    let count = (span + i128::from(interval) - 1) / i128::from(interval);
    if count > MAX_GRID_LEVELS {
        return Err(TradingError::Config(format!(
            "grid {}..{} step {} has {} levels, limit is {}",
            min, max, interval, count, MAX_GRID_LEVELS
        )));
    }

    let mut levels = Vec::with_capacity(count as usize);
    let mut level = Some(min);
    while let Some(current) = level.filter(|&l| l < max) {
        levels.push(current);
        level = current.checked_add(interval);
    }
    Ok(levels)
}

/// Closest level to `price`. On a tie the lower level wins, which is the
/// first minimum met when scanning the ascending grid.
pub fn nearest_level(price: Decimal, grid: &[PriceLevel]) -> TradingResult<PriceLevel> {
    let mut best: Option<(PriceLevel, Decimal)> = None;
    for &level in grid {
        let distance = (Decimal::from(level) - price).abs();
        match best {
            Some((_, best_distance)) if distance >= best_distance => {}
            _ => best = Some((level, distance)),
        }
    }
    best.map(|(level, _)| level).ok_or(TradingError::EmptyGrid)
}

/// Greatest level `<= price`, `None` when the price sits below the grid.
pub fn floor_level(price: Decimal, grid: &[PriceLevel]) -> Option<PriceLevel> {
    grid.iter()
        .copied()
        .take_while(|&level| Decimal::from(level) <= price)
        .last()
}

/// A validated grid together with the bounds it was built from.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    min: PriceLevel,
    max: PriceLevel,
    interval: PriceLevel,
    levels: Vec<PriceLevel>,
}

impl Grid {
    pub fn new(min: PriceLevel, max: PriceLevel, interval: PriceLevel) -> TradingResult<Self> {
        let levels = build_grid(min, max, interval)?;
        Ok(Self { min, max, interval, levels })
    }

    pub fn from_config(config: &GridConfig) -> TradingResult<Self> {
        Self::new(config.min_price, config.max_price, config.price_interval)
    }

    pub fn levels(&self) -> &[PriceLevel] {
        &self.levels
    }

    pub fn interval(&self) -> PriceLevel {
        self.interval
    }

    pub fn min(&self) -> PriceLevel {
        self.min
    }

    pub fn max(&self) -> PriceLevel {
        self.max
    }

    /// Whether a new bracket may be opened at this price: `[min - interval, max]`.
    pub fn contains_price(&self, price: Decimal) -> bool {
        let lower = Decimal::from(self.min.saturating_sub(self.interval));
        let upper = Decimal::from(self.max);
        lower <= price && price <= upper
    }

    pub fn nearest(&self, price: Decimal) -> TradingResult<PriceLevel> {
        nearest_level(price, &self.levels)
    }

    pub fn floor(&self, price: Decimal) -> Option<PriceLevel> {
        floor_level(price, &self.levels)
    }

    /// Target level under the configured policy.
    pub fn select(&self, price: Decimal, policy: LevelPolicy) -> TradingResult<Option<PriceLevel>> {
        match policy {
            LevelPolicy::Nearest => self.nearest(price).map(Some),
            LevelPolicy::Floor => Ok(self.floor(price)),
        }
    }
}
