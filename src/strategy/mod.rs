//! Quoting strategies.
//!
//! The engine consumes strategies through [`StrategyProvider`]; this module
//! also ships [`ladder::LadderStrategy`], a symmetric-ladder implementation
//! usable as-is or as a template.

pub mod ladder;

pub use ladder::{LadderConfig, LadderStrategy, SharedPrice, SpacingMode};

use crate::book::level::LevelPlan;
use crate::position::inventory::InventoryPosition;
use crate::types::error::EngineResult;

/// Source of desired quote levels.
///
/// Called by the engine whenever a refresh needs a fresh plan. The strategy
/// sees the engine-maintained inventory read-only and must not touch venue
/// state; order placement belongs to the engine alone.
pub trait StrategyProvider: Send {
    /// Computes the full desired ladder for the next quoting cycle.
    ///
    /// # Errors
    ///
    /// Implementations should fail rather than guess when they cannot price
    /// (no reference data yet, for example). The engine logs the failure,
    /// quotes nothing, and asks again on the next cycle.
    fn compute_levels(&mut self, position: &InventoryPosition) -> EngineResult<LevelPlan>;
}
