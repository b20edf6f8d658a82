//! Local view of orders believed live at the venue.
//!
//! [`BookState`] holds the planned levels for both sides plus one
//! [`ActiveOrder`] handle per (side, level) slot. The engine's control task
//! is the sole mutator. Two rules are enforced here rather than by
//! convention: a slot never silently swaps one live order for another
//! (that would orphan the first at the venue), and handles leave the book
//! only when the venue confirms the order is done or disowns it.

use std::collections::BTreeMap;

use crate::Decimal;
use crate::book::level::{Level, LevelPlan, RefreshSet};
use crate::types::error::{EngineError, EngineResult};
use crate::venue::{ClientOrderId, Side};

/// Lifecycle stage of a tracked order, as last observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleStatus {
    /// Sent to the venue; acknowledgement not yet observed.
    Submitted,
    /// Venue confirmed the order exists.
    Acknowledged,
    /// At least one partial execution observed.
    PartiallyFilled,
    /// Status queries are failing; assumed live until proven otherwise.
    Unknown,
}

/// Handle for one order the engine believes is live.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveOrder {
    /// Correlation key; doubles as the venue order ID.
    pub client_order_id: ClientOrderId,
    /// Ladder index the order is quoting.
    pub level: u32,
    /// Order side.
    pub side: Side,
    /// Submitted limit price.
    pub price: Decimal,
    /// Last known remaining quantity.
    pub quantity: Decimal,
    /// Lifecycle stage.
    pub status: HandleStatus,
    /// Submission wall-clock time, milliseconds.
    pub submitted_at: u64,
}

impl ActiveOrder {
    /// Creates a handle for a just-submitted level.
    #[must_use]
    pub fn from_level(level: &Level, submitted_at: u64) -> Self {
        Self {
            client_order_id: level.client_order_id.clone(),
            level: level.index,
            side: level.side,
            price: level.price,
            quantity: level.quantity,
            status: HandleStatus::Submitted,
            submitted_at,
        }
    }

    /// Age of the handle relative to `now`, in milliseconds.
    #[must_use]
    pub fn age_ms(&self, now: u64) -> u64 {
        now.saturating_sub(self.submitted_at)
    }
}

/// Planned levels plus active-order handles for one symbol.
#[derive(Debug, Default)]
pub struct BookState {
    ask_levels: BTreeMap<u32, Level>,
    bid_levels: BTreeMap<u32, Level>,
    active_asks: BTreeMap<u32, ActiveOrder>,
    active_bids: BTreeMap<u32, ActiveOrder>,
}

impl BookState {
    /// Creates an empty book.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces both sides' planned levels wholesale.
    ///
    /// Active handles are untouched; the bulk-refresh path clears them
    /// separately once cancellation is confirmed.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidLevelPlan`] and leaves the book
    /// unchanged when the plan fails validation.
    pub fn adopt_plan(&mut self, plan: LevelPlan) -> EngineResult<()> {
        plan.validate()?;
        self.ask_levels = plan.asks;
        self.bid_levels = plan.bids;
        Ok(())
    }

    /// Applies an incremental refresh to the plan.
    ///
    /// Indices named by `set` are overwritten from `subset`, or dropped when
    /// `subset` omits them (the strategy no longer wants that level). Levels
    /// outside the set are not disturbed.
    pub fn merge_levels(&mut self, set: &RefreshSet, mut subset: LevelPlan) {
        for index in &set.asks {
            match subset.asks.remove(index) {
                Some(level) => {
                    self.ask_levels.insert(*index, level);
                }
                None => {
                    self.ask_levels.remove(index);
                }
            }
        }
        for index in &set.bids {
            match subset.bids.remove(index) {
                Some(level) => {
                    self.bid_levels.insert(*index, level);
                }
                None => {
                    self.bid_levels.remove(index);
                }
            }
        }
    }

    /// Records a live handle in its (side, level) slot.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::DuplicateHandle`] when the slot already holds
    /// a live order.
    pub fn track(&mut self, order: ActiveOrder) -> EngineResult<()> {
        let slot = self.active_side_mut(order.side);
        if slot.contains_key(&order.level) {
            return Err(EngineError::DuplicateHandle {
                side: order.side,
                level: order.level,
            });
        }
        slot.insert(order.level, order);
        Ok(())
    }

    /// Removes and returns the handle for an order ID, if tracked.
    pub fn untrack(&mut self, order_id: &ClientOrderId) -> Option<ActiveOrder> {
        if let Some(index) = Self::slot_of(&self.active_asks, order_id) {
            return self.active_asks.remove(&index);
        }
        if let Some(index) = Self::slot_of(&self.active_bids, order_id) {
            return self.active_bids.remove(&index);
        }
        None
    }

    /// Looks up a handle by client order ID.
    #[must_use]
    pub fn find(&self, order_id: &ClientOrderId) -> Option<&ActiveOrder> {
        self.active_asks
            .values()
            .chain(self.active_bids.values())
            .find(|order| &order.client_order_id == order_id)
    }

    /// Shrinks a handle's remaining quantity after a partial fill.
    ///
    /// Returns false when the order is not tracked.
    pub fn reduce(&mut self, order_id: &ClientOrderId, remaining: Decimal) -> bool {
        match self.find_mut(order_id) {
            Some(order) => {
                order.quantity = remaining;
                order.status = HandleStatus::PartiallyFilled;
                true
            }
            None => false,
        }
    }

    /// Upgrades a handle to acknowledged after the venue confirmed it.
    ///
    /// Partially filled handles keep their status; that is already stronger
    /// knowledge than an acknowledgement.
    pub fn confirm(&mut self, order_id: &ClientOrderId) -> bool {
        match self.find_mut(order_id) {
            Some(order) => {
                if matches!(order.status, HandleStatus::Submitted | HandleStatus::Unknown) {
                    order.status = HandleStatus::Acknowledged;
                }
                true
            }
            None => false,
        }
    }

    /// Flags a handle whose status could not be queried this sweep.
    pub fn mark_unknown(&mut self, order_id: &ClientOrderId) -> bool {
        match self.find_mut(order_id) {
            Some(order) => {
                if matches!(
                    order.status,
                    HandleStatus::Submitted | HandleStatus::Acknowledged
                ) {
                    order.status = HandleStatus::Unknown;
                }
                true
            }
            None => false,
        }
    }

    /// Active handles on one side, keyed by ladder index.
    #[must_use]
    pub fn active_side(&self, side: Side) -> &BTreeMap<u32, ActiveOrder> {
        match side {
            Side::Sell => &self.active_asks,
            Side::Buy => &self.active_bids,
        }
    }

    /// Planned levels on one side, keyed by ladder index.
    #[must_use]
    pub fn levels(&self, side: Side) -> &BTreeMap<u32, Level> {
        match side {
            Side::Sell => &self.ask_levels,
            Side::Buy => &self.bid_levels,
        }
    }

    /// Number of live handles across both sides.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active_asks.len() + self.active_bids.len()
    }

    /// IDs of every tracked order, asks first.
    #[must_use]
    pub fn tracked_ids(&self) -> Vec<ClientOrderId> {
        self.active_asks
            .values()
            .chain(self.active_bids.values())
            .map(|order| order.client_order_id.clone())
            .collect()
    }

    /// IDs of tracked orders in the slots named by `set`.
    #[must_use]
    pub fn tracked_ids_in(&self, set: &RefreshSet) -> Vec<ClientOrderId> {
        let asks = self
            .active_asks
            .iter()
            .filter(|(index, _)| set.asks.contains(index));
        let bids = self
            .active_bids
            .iter()
            .filter(|(index, _)| set.bids.contains(index));
        asks.chain(bids)
            .map(|(_, order)| order.client_order_id.clone())
            .collect()
    }

    /// Drops every handle. Valid only after a confirmed cancel-all.
    pub fn clear_active(&mut self) {
        self.active_asks.clear();
        self.active_bids.clear();
    }

    /// Drops the handles named by `set`. Valid only after confirmed cancels.
    pub fn clear_active_in(&mut self, set: &RefreshSet) {
        self.active_asks.retain(|index, _| !set.asks.contains(index));
        self.active_bids.retain(|index, _| !set.bids.contains(index));
    }

    /// Planned levels without a live handle, in venue submission order.
    ///
    /// Sides are interleaved per index, ask before bid, so neither side
    /// waits for the other to finish submitting.
    #[must_use]
    pub fn pending_submissions(&self) -> Vec<Level> {
        let depth = |levels: &BTreeMap<u32, Level>| {
            levels.keys().next_back().map_or(0, |index| index + 1)
        };
        let rounds = depth(&self.ask_levels).max(depth(&self.bid_levels));

        let mut out = Vec::new();
        for index in 0..rounds {
            if let Some(level) = self.ask_levels.get(&index) {
                if !self.active_asks.contains_key(&index) {
                    out.push(level.clone());
                }
            }
            if let Some(level) = self.bid_levels.get(&index) {
                if !self.active_bids.contains_key(&index) {
                    out.push(level.clone());
                }
            }
        }
        out
    }

    fn active_side_mut(&mut self, side: Side) -> &mut BTreeMap<u32, ActiveOrder> {
        match side {
            Side::Sell => &mut self.active_asks,
            Side::Buy => &mut self.active_bids,
        }
    }

    fn find_mut(&mut self, order_id: &ClientOrderId) -> Option<&mut ActiveOrder> {
        self.active_asks
            .values_mut()
            .chain(self.active_bids.values_mut())
            .find(|order| &order.client_order_id == order_id)
    }

    fn slot_of(
        side: &BTreeMap<u32, ActiveOrder>,
        order_id: &ClientOrderId,
    ) -> Option<u32> {
        side.iter()
            .find(|(_, order)| &order.client_order_id == order_id)
            .map(|(index, _)| *index)
    }
}
