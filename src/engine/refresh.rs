//! Refresh policies.
//!
//! A policy decides at the top of each engine iteration whether quotes should
//! be left alone, rebuilt wholesale, or rebuilt at specific ladder levels.
//! The engine consults the policy before detecting fills, so a policy sees
//! the book as of the previous iteration.

use crate::book::level::RefreshSet;
use crate::book::state::BookState;
use crate::venue::Side;

/// What the engine should do with its resting orders this iteration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshDecision {
    /// Cancel and re-quote every level.
    pub refresh_all: bool,
    /// Specific levels to cancel and re-quote. Ignored when `refresh_all`
    /// is set.
    pub levels: RefreshSet,
}

impl RefreshDecision {
    /// Leave all resting orders in place.
    #[must_use]
    pub fn hold() -> Self {
        Self::default()
    }

    /// Rebuild the entire ladder.
    #[must_use]
    pub fn all() -> Self {
        Self {
            refresh_all: true,
            levels: RefreshSet::new(),
        }
    }

    /// Returns true when nothing is to be refreshed.
    #[must_use]
    pub fn is_hold(&self) -> bool {
        !self.refresh_all && self.levels.is_empty()
    }
}

/// Decides when resting quotes are stale.
///
/// Implementations are consulted once per engine iteration and may keep
/// internal clocks; `check` takes `&mut self` for that reason.
pub trait RefreshPolicy: Send {
    /// Returns the refresh decision for this iteration.
    ///
    /// `now_ms` is the engine's current wall clock in milliseconds.
    fn check(&mut self, book: &BookState, now_ms: u64) -> RefreshDecision;
}

/// Never refreshes. Quotes rest until filled or cancelled externally.
#[derive(Debug, Clone, Copy, Default)]
pub struct HoldPolicy;

impl RefreshPolicy for HoldPolicy {
    fn check(&mut self, _book: &BookState, _now_ms: u64) -> RefreshDecision {
        RefreshDecision::hold()
    }
}

/// Time-based refresh schedule.
///
/// Requests a full rebuild every `refresh_interval_ms`. Between full
/// rebuilds it can optionally flag individual orders older than
/// `max_order_age_ms` for incremental replacement.
///
/// # Example
///
/// ```
/// use maker_engine_rs::book::state::BookState;
/// use maker_engine_rs::engine::{IntervalPolicy, RefreshPolicy};
///
/// let mut policy = IntervalPolicy::new(30_000);
/// let book = BookState::new();
///
/// // The first check arms the clock without refreshing.
/// assert!(policy.check(&book, 1_000).is_hold());
/// assert!(policy.check(&book, 31_000).refresh_all);
/// ```
#[derive(Debug, Clone)]
pub struct IntervalPolicy {
    refresh_interval_ms: u64,
    max_order_age_ms: Option<u64>,
    last_full_refresh: Option<u64>,
}

impl IntervalPolicy {
    /// Creates a policy that rebuilds the full ladder on a fixed interval.
    #[must_use]
    pub fn new(refresh_interval_ms: u64) -> Self {
        Self {
            refresh_interval_ms,
            max_order_age_ms: None,
            last_full_refresh: None,
        }
    }

    /// Additionally replaces individual orders older than `max_order_age_ms`.
    #[must_use]
    pub fn with_max_order_age(mut self, max_order_age_ms: u64) -> Self {
        self.max_order_age_ms = Some(max_order_age_ms);
        self
    }
}

impl RefreshPolicy for IntervalPolicy {
    fn check(&mut self, book: &BookState, now_ms: u64) -> RefreshDecision {
        let Some(last) = self.last_full_refresh else {
            // First call after startup; the initial quotes are fresh.
            self.last_full_refresh = Some(now_ms);
            return RefreshDecision::hold();
        };

        if now_ms.saturating_sub(last) >= self.refresh_interval_ms {
            self.last_full_refresh = Some(now_ms);
            return RefreshDecision::all();
        }

        let mut decision = RefreshDecision::hold();
        if let Some(max_age) = self.max_order_age_ms {
            for side in [Side::Sell, Side::Buy] {
                for (index, order) in book.active_side(side) {
                    if order.age_ms(now_ms) >= max_age {
                        decision.levels.insert(side, *index);
                    }
                }
            }
        }
        decision
    }
}
