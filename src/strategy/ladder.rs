//! Symmetric ladder quoting strategy.
//!
//! Quotes a configurable number of levels on each side of a reference price,
//! with optional size progression away from the touch and inventory-based
//! size skew: the closer the position sits to its cap, the smaller the
//! quotes on the side that would grow it further.

use std::sync::{Arc, RwLock};

use crate::Decimal;
use crate::book::level::{Level, LevelPlan};
use crate::position::inventory::InventoryPosition;
use crate::strategy::StrategyProvider;
use crate::types::error::{EngineError, EngineResult};
use crate::venue::Side;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// How level offsets grow with depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SpacingMode {
    /// Offset grows as a fraction of the reference price.
    #[default]
    Proportional,
    /// Offset grows in fixed price units.
    Absolute,
}

/// Configuration for the ladder strategy.
///
/// # Example
///
/// ```rust
/// use maker_engine_rs::strategy::LadderConfig;
/// use maker_engine_rs::dec;
///
/// let config = LadderConfig::new(
///     3,              // 3 levels per side
///     dec!(0.002),    // 0.2% spacing per level
///     dec!(1.0),      // 1 unit base size
///     dec!(20.0),     // inventory cap
/// ).unwrap();
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LadderConfig {
    /// Number of levels quoted on each side.
    pub levels_per_side: u32,
    /// Spacing per level, interpreted per [`SpacingMode`].
    pub level_spacing: Decimal,
    /// Base quote size per level.
    pub base_size: Decimal,
    /// Size multiplier for deeper levels (optional).
    ///
    /// With progression p, the level at depth N quotes
    /// base_size * (1 + (N - 1) * p).
    pub size_progression: Option<Decimal>,
    /// Absolute inventory at which the risk-growing side stops quoting.
    pub max_position: Decimal,
    /// Spacing interpretation.
    pub spacing: SpacingMode,
}

impl LadderConfig {
    /// Creates a new `LadderConfig` with validation.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConfiguration`] if any parameter is
    /// not positive.
    pub fn new(
        levels_per_side: u32,
        level_spacing: Decimal,
        base_size: Decimal,
        max_position: Decimal,
    ) -> EngineResult<Self> {
        if levels_per_side == 0 {
            return Err(EngineError::InvalidConfiguration(
                "levels_per_side must be greater than 0".to_string(),
            ));
        }
        if level_spacing <= Decimal::ZERO {
            return Err(EngineError::InvalidConfiguration(
                "level_spacing must be positive".to_string(),
            ));
        }
        if base_size <= Decimal::ZERO {
            return Err(EngineError::InvalidConfiguration(
                "base_size must be positive".to_string(),
            ));
        }
        if max_position <= Decimal::ZERO {
            return Err(EngineError::InvalidConfiguration(
                "max_position must be positive".to_string(),
            ));
        }

        Ok(Self {
            levels_per_side,
            level_spacing,
            base_size,
            size_progression: None,
            max_position,
            spacing: SpacingMode::default(),
        })
    }

    /// Sets the size progression factor.
    #[must_use]
    pub fn with_size_progression(mut self, progression: Decimal) -> Self {
        self.size_progression = Some(progression);
        self
    }

    /// Sets the spacing interpretation.
    #[must_use]
    pub fn with_spacing(mut self, spacing: SpacingMode) -> Self {
        self.spacing = spacing;
        self
    }
}

/// Shared reference-price cell, written by a market-data feed and read by
/// the strategy.
///
/// # Panics
///
/// Accessors panic if the lock is poisoned.
#[derive(Debug, Clone, Default)]
pub struct SharedPrice(Arc<RwLock<Option<Decimal>>>);

impl SharedPrice {
    /// Creates an unset price cell.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes a new reference price.
    pub fn set(&self, price: Decimal) {
        *self.0.write().unwrap() = Some(price);
    }

    /// Returns the last published price, if any.
    #[must_use]
    pub fn get(&self) -> Option<Decimal> {
        *self.0.read().unwrap()
    }
}

/// Symmetric ladder strategy.
///
/// # Example
///
/// ```rust
/// use maker_engine_rs::position::InventoryPosition;
/// use maker_engine_rs::strategy::{LadderConfig, LadderStrategy, SharedPrice, StrategyProvider};
/// use maker_engine_rs::dec;
///
/// let price = SharedPrice::new();
/// price.set(dec!(100.0));
///
/// let config = LadderConfig::new(2, dec!(0.01), dec!(1.0), dec!(10.0)).unwrap();
/// let mut strategy = LadderStrategy::new(config, price);
///
/// let plan = strategy.compute_levels(&InventoryPosition::new()).unwrap();
/// assert_eq!(plan.ask_count(), 2);
/// assert_eq!(plan.bid_count(), 2);
/// assert_eq!(plan.asks[&0].price, dec!(101.0));
/// assert_eq!(plan.bids[&0].price, dec!(99.0));
/// ```
#[derive(Debug, Clone)]
pub struct LadderStrategy {
    config: LadderConfig,
    reference_price: SharedPrice,
}

impl LadderStrategy {
    /// Creates a ladder strategy reading its reference price from `price`.
    #[must_use]
    pub fn new(config: LadderConfig, price: SharedPrice) -> Self {
        Self {
            config,
            reference_price: price,
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &LadderConfig {
        &self.config
    }

    /// Price quoted `depth` steps away from the reference (depth starts at 1).
    fn price_at(&self, reference: Decimal, side: Side, depth: u32) -> Decimal {
        let steps = Decimal::from(depth);
        let offset = match self.config.spacing {
            SpacingMode::Proportional => reference * self.config.level_spacing * steps,
            SpacingMode::Absolute => self.config.level_spacing * steps,
        };
        match side {
            Side::Sell => reference + offset,
            Side::Buy => reference - offset,
        }
    }

    /// Size quoted at `depth`, before inventory scaling.
    fn size_at(&self, depth: u32) -> Decimal {
        match self.config.size_progression {
            Some(progression) => {
                let multiplier =
                    Decimal::ONE + Decimal::from(depth.saturating_sub(1)) * progression;
                self.config.base_size * multiplier
            }
            None => self.config.base_size,
        }
    }

    fn build_side(&self, plan: &mut LevelPlan, side: Side, reference: Decimal, scale: Decimal) {
        let mut index = 0;
        for depth in 1..=self.config.levels_per_side {
            let price = self.price_at(reference, side, depth);
            if price <= Decimal::ZERO {
                break;
            }
            let size = self.size_at(depth) * scale;
            if size <= Decimal::new(1, 8) {
                // Dust; skip without leaving a hole in the index sequence.
                continue;
            }
            let level = match side {
                Side::Sell => Level::ask(index, price, size),
                Side::Buy => Level::bid(index, price, size),
            };
            plan.insert(level);
            index += 1;
        }
    }
}

impl StrategyProvider for LadderStrategy {
    fn compute_levels(&mut self, position: &InventoryPosition) -> EngineResult<LevelPlan> {
        let Some(reference) = self.reference_price.get() else {
            return Err(EngineError::InvalidMarketState(
                "no reference price published yet".to_string(),
            ));
        };
        if reference <= Decimal::ZERO {
            return Err(EngineError::InvalidMarketState(format!(
                "reference price {reference} is not positive"
            )));
        }

        let ratio = (position.quantity.abs() / self.config.max_position).min(Decimal::ONE);
        let scale = Decimal::ONE - ratio;
        let (ask_scale, bid_scale) = if position.quantity > Decimal::ZERO {
            (Decimal::ONE, scale)
        } else if position.quantity < Decimal::ZERO {
            (scale, Decimal::ONE)
        } else {
            (Decimal::ONE, Decimal::ONE)
        };

        let mut plan = LevelPlan::new();
        self.build_side(&mut plan, Side::Sell, reference, ask_scale);
        self.build_side(&mut plan, Side::Buy, reference, bid_scale);
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dec;

    fn strategy(levels: u32, price: Decimal) -> LadderStrategy {
        let shared = SharedPrice::new();
        shared.set(price);
        let config = LadderConfig::new(levels, dec!(0.01), dec!(1.0), dec!(10.0)).unwrap();
        LadderStrategy::new(config, shared)
    }

    #[test]
    fn test_config_validation() {
        assert!(LadderConfig::new(3, dec!(0.01), dec!(1.0), dec!(10.0)).is_ok());
        assert!(LadderConfig::new(0, dec!(0.01), dec!(1.0), dec!(10.0)).is_err());
        assert!(LadderConfig::new(3, dec!(0.0), dec!(1.0), dec!(10.0)).is_err());
        assert!(LadderConfig::new(3, dec!(0.01), dec!(-1.0), dec!(10.0)).is_err());
        assert!(LadderConfig::new(3, dec!(0.01), dec!(1.0), dec!(0.0)).is_err());
    }

    #[test]
    fn test_symmetric_plan() {
        let mut strategy = strategy(3, dec!(100.0));
        let plan = strategy.compute_levels(&InventoryPosition::new()).unwrap();

        assert_eq!(plan.ask_count(), 3);
        assert_eq!(plan.bid_count(), 3);
        assert!(plan.validate().is_ok());

        let ask_prices: Vec<Decimal> = plan.asks.values().map(|l| l.price).collect();
        let bid_prices: Vec<Decimal> = plan.bids.values().map(|l| l.price).collect();
        assert_eq!(ask_prices, vec![dec!(101.0), dec!(102.0), dec!(103.0)]);
        assert_eq!(bid_prices, vec![dec!(99.0), dec!(98.0), dec!(97.0)]);
    }

    #[test]
    fn test_absolute_spacing() {
        let shared = SharedPrice::new();
        shared.set(dec!(100.0));
        let config = LadderConfig::new(2, dec!(0.25), dec!(1.0), dec!(10.0))
            .unwrap()
            .with_spacing(SpacingMode::Absolute);
        let mut strategy = LadderStrategy::new(config, shared);

        let plan = strategy.compute_levels(&InventoryPosition::new()).unwrap();
        assert_eq!(plan.asks[&0].price, dec!(100.25));
        assert_eq!(plan.asks[&1].price, dec!(100.50));
        assert_eq!(plan.bids[&1].price, dec!(99.50));
    }

    #[test]
    fn test_size_progression() {
        let shared = SharedPrice::new();
        shared.set(dec!(100.0));
        let config = LadderConfig::new(3, dec!(0.01), dec!(2.0), dec!(50.0))
            .unwrap()
            .with_size_progression(dec!(0.5));
        let mut strategy = LadderStrategy::new(config, shared);

        let plan = strategy.compute_levels(&InventoryPosition::new()).unwrap();
        let sizes: Vec<Decimal> = plan.asks.values().map(|l| l.quantity).collect();
        assert_eq!(sizes, vec![dec!(2.0), dec!(3.0), dec!(4.0)]);
    }

    #[test]
    fn test_long_inventory_shrinks_bids() {
        let mut strategy = strategy(2, dec!(100.0));
        let mut position = InventoryPosition::new();
        position.apply_fill(Side::Buy, dec!(5.0), dec!(100.0));

        let plan = strategy.compute_levels(&position).unwrap();
        // Half of max_position long: bid sizes halved, asks untouched.
        assert!(plan.bids.values().all(|l| l.quantity == dec!(0.5)));
        assert!(plan.asks.values().all(|l| l.quantity == dec!(1.0)));
    }

    #[test]
    fn test_capped_inventory_empties_risk_side() {
        let mut strategy = strategy(2, dec!(100.0));
        let mut position = InventoryPosition::new();
        position.apply_fill(Side::Sell, dec!(10.0), dec!(100.0));

        let plan = strategy.compute_levels(&position).unwrap();
        assert_eq!(plan.ask_count(), 0);
        assert_eq!(plan.bid_count(), 2);
        assert!(plan.validate().is_ok());
    }

    #[test]
    fn test_no_reference_price_is_an_error() {
        let config = LadderConfig::new(2, dec!(0.01), dec!(1.0), dec!(10.0)).unwrap();
        let mut strategy = LadderStrategy::new(config, SharedPrice::new());

        let err = strategy
            .compute_levels(&InventoryPosition::new())
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidMarketState(_)));
    }

    #[test]
    fn test_deep_bid_ladder_stops_at_zero() {
        let shared = SharedPrice::new();
        shared.set(dec!(1.0));
        let config = LadderConfig::new(5, dec!(0.4), dec!(1.0), dec!(10.0))
            .unwrap()
            .with_spacing(SpacingMode::Absolute);
        let mut strategy = LadderStrategy::new(config, shared);

        let plan = strategy.compute_levels(&InventoryPosition::new()).unwrap();
        // Bids at 0.6 and 0.2; the third step would be negative.
        assert_eq!(plan.bid_count(), 2);
        assert_eq!(plan.ask_count(), 5);
        assert!(plan.validate().is_ok());
    }
}
