//! Quote levels and per-side level plans.
//!
//! A [`Level`] is one planned quote; a [`LevelPlan`] is the full two-sided
//! ladder a strategy wants resting. Plans are adopted wholesale on a bulk
//! refresh or merged per index on an incremental one; a [`RefreshSet`] names
//! the indices an incremental refresh touches.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::Decimal;
use crate::types::error::{EngineError, EngineResult};
use crate::venue::{ClientOrderId, LimitOrder, Side, TimeInForce};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// One planned quote in the ladder.
///
/// Levels are indexed from the touch outward: index 0 is the quote closest
/// to mid. Construction mints a fresh [`ClientOrderId`], so re-planning a
/// level always produces a new order identity.
///
/// # Example
///
/// ```rust
/// use maker_engine_rs::book::Level;
/// use maker_engine_rs::dec;
///
/// let ask = Level::ask(0, dec!(100.5), dec!(2.0));
/// let deeper = Level::ask(1, dec!(101.0), dec!(2.0));
/// assert_ne!(ask.client_order_id, deeper.client_order_id);
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Level {
    /// Position in the ladder, 0 = top of book.
    pub index: u32,
    /// Quote side.
    pub side: Side,
    /// Limit price.
    pub price: Decimal,
    /// Quote size.
    pub quantity: Decimal,
    /// Reject instead of crossing the spread when true.
    pub post_only: bool,
    /// Time-in-force for the submission.
    pub time_in_force: TimeInForce,
    /// Venue-specific parameters, passed through untouched.
    pub params: HashMap<String, String>,
    /// Identifier the order will carry at the venue.
    pub client_order_id: ClientOrderId,
}

impl Level {
    /// Creates a level with a freshly generated client order ID.
    ///
    /// Defaults to post-only GTC, the resting-maker profile.
    #[must_use]
    pub fn new(index: u32, side: Side, price: Decimal, quantity: Decimal) -> Self {
        Self {
            index,
            side,
            price,
            quantity,
            post_only: true,
            time_in_force: TimeInForce::default(),
            params: HashMap::new(),
            client_order_id: ClientOrderId::generate(),
        }
    }

    /// Creates an ask level.
    #[must_use]
    pub fn ask(index: u32, price: Decimal, quantity: Decimal) -> Self {
        Self::new(index, Side::Sell, price, quantity)
    }

    /// Creates a bid level.
    #[must_use]
    pub fn bid(index: u32, price: Decimal, quantity: Decimal) -> Self {
        Self::new(index, Side::Buy, price, quantity)
    }

    /// Allows the order to cross the spread.
    #[must_use]
    pub fn with_post_only(mut self, post_only: bool) -> Self {
        self.post_only = post_only;
        self
    }

    /// Sets the time-in-force.
    #[must_use]
    pub fn with_time_in_force(mut self, time_in_force: TimeInForce) -> Self {
        self.time_in_force = time_in_force;
        self
    }

    /// Adds a venue-specific parameter.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Builds the venue submission request for this level.
    #[must_use]
    pub fn to_limit_order(&self, symbol: &str) -> LimitOrder {
        LimitOrder {
            client_order_id: self.client_order_id.clone(),
            side: self.side,
            price: self.price,
            quantity: self.quantity,
            symbol: symbol.to_string(),
            post_only: self.post_only,
            time_in_force: self.time_in_force,
            params: self.params.clone(),
        }
    }

    /// Returns the notional value of the level.
    #[must_use]
    pub fn notional(&self) -> Decimal {
        self.price * self.quantity
    }
}

/// Desired quotes for both sides of the book, keyed by ladder index.
///
/// An empty side means "quote nothing on that side"; that is a valid plan,
/// not an error.
///
/// # Example
///
/// ```rust
/// use maker_engine_rs::book::{Level, LevelPlan};
/// use maker_engine_rs::dec;
///
/// let mut plan = LevelPlan::new();
/// plan.insert(Level::ask(0, dec!(100.5), dec!(1.0)));
/// plan.insert(Level::ask(1, dec!(101.0), dec!(1.5)));
/// plan.insert(Level::bid(0, dec!(99.5), dec!(1.0)));
///
/// assert!(plan.validate().is_ok());
/// assert_eq!(plan.ask_count(), 2);
/// assert_eq!(plan.bid_count(), 1);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LevelPlan {
    /// Ask levels keyed by ladder index.
    pub asks: BTreeMap<u32, Level>,
    /// Bid levels keyed by ladder index.
    pub bids: BTreeMap<u32, Level>,
}

impl LevelPlan {
    /// Creates an empty plan.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a level on its own side, replacing any previous level at the
    /// same index.
    pub fn insert(&mut self, level: Level) {
        match level.side {
            Side::Sell => self.asks.insert(level.index, level),
            Side::Buy => self.bids.insert(level.index, level),
        };
    }

    /// Number of ask levels.
    #[must_use]
    pub fn ask_count(&self) -> usize {
        self.asks.len()
    }

    /// Number of bid levels.
    #[must_use]
    pub fn bid_count(&self) -> usize {
        self.bids.len()
    }

    /// Returns true when neither side has levels.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.asks.is_empty() && self.bids.is_empty()
    }

    /// Checks the plan is fit for adoption.
    ///
    /// Each side's indices must run contiguously from 0, every level must
    /// sit on the side it claims, and prices and sizes must be positive.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidLevelPlan`] naming the first violation.
    pub fn validate(&self) -> EngineResult<()> {
        Self::validate_side(&self.asks, Side::Sell)?;
        Self::validate_side(&self.bids, Side::Buy)
    }

    fn validate_side(levels: &BTreeMap<u32, Level>, side: Side) -> EngineResult<()> {
        for (position, (index, level)) in levels.iter().enumerate() {
            if *index != position as u32 {
                return Err(EngineError::InvalidLevelPlan(format!(
                    "{side} indices must be contiguous from 0, found {index}"
                )));
            }
            if level.side != side || level.index != *index {
                return Err(EngineError::InvalidLevelPlan(format!(
                    "level at {side} index {index} declares {} index {}",
                    level.side, level.index
                )));
            }
            if level.price <= Decimal::ZERO {
                return Err(EngineError::InvalidLevelPlan(format!(
                    "{side} level {index} price {} is not positive",
                    level.price
                )));
            }
            if level.quantity <= Decimal::ZERO {
                return Err(EngineError::InvalidLevelPlan(format!(
                    "{side} level {index} quantity {} is not positive",
                    level.quantity
                )));
            }
        }
        Ok(())
    }

    /// Extracts only the levels named by `set`.
    #[must_use]
    pub fn select(&self, set: &RefreshSet) -> LevelPlan {
        LevelPlan {
            asks: self
                .asks
                .iter()
                .filter(|(index, _)| set.asks.contains(index))
                .map(|(index, level)| (*index, level.clone()))
                .collect(),
            bids: self
                .bids
                .iter()
                .filter(|(index, _)| set.bids.contains(index))
                .map(|(index, level)| (*index, level.clone()))
                .collect(),
        }
    }
}

/// Per-side sets of ladder indices selected for an incremental refresh.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RefreshSet {
    /// Ask indices to refresh.
    pub asks: BTreeSet<u32>,
    /// Bid indices to refresh.
    pub bids: BTreeSet<u32>,
}

impl RefreshSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one level to the set.
    pub fn insert(&mut self, side: Side, index: u32) {
        match side {
            Side::Sell => self.asks.insert(index),
            Side::Buy => self.bids.insert(index),
        };
    }

    /// Returns true when the set names this (side, index) slot.
    #[must_use]
    pub fn contains(&self, side: Side, index: u32) -> bool {
        match side {
            Side::Sell => self.asks.contains(&index),
            Side::Buy => self.bids.contains(&index),
        }
    }

    /// Returns true when no levels are selected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.asks.is_empty() && self.bids.is_empty()
    }

    /// Total number of selected levels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.asks.len() + self.bids.len()
    }
}
