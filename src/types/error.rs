//! Error types for the reconciliation engine.
//!
//! Failures fall into three classes. Transient errors (venue unreachable,
//! timeouts) are retried at the call site up to a configured budget and then
//! degraded. Inconsistencies (the venue disowns an order we track) are
//! resolved in favor of venue truth and logged. Fatal errors (a cancellation
//! that cannot be confirmed, a would-be duplicate handle) stop the engine,
//! because continuing would quote over orders in an unknown state.

use thiserror::Error;

use crate::venue::{ClientOrderId, Side};

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors produced by the engine and its venue adapters.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The venue could not be reached or did not answer in time.
    #[error("Venue unavailable: {0}")]
    VenueUnavailable(String),

    /// The venue refused a submission outright.
    #[error("Order {order_id} rejected by venue: {reason}")]
    OrderRejected {
        /// Client order ID of the refused submission.
        order_id: ClientOrderId,
        /// Venue-supplied rejection reason.
        reason: String,
    },

    /// The venue has no record of an order the engine tracks.
    #[error("Venue has no record of order {0}")]
    UnknownOrder(ClientOrderId),

    /// A cancellation could not be confirmed within the retry budget.
    #[error("Cancellation unconfirmed for {scope} after {attempts} attempts")]
    CancelFailed {
        /// Symbol or order ID the cancellation covered.
        scope: String,
        /// Total attempts made, initial try included.
        attempts: u32,
    },

    /// Two live orders claimed the same (side, level) slot.
    #[error("Duplicate live order at {side} level {level}")]
    DuplicateHandle {
        /// Side of the contested slot.
        side: Side,
        /// Ladder index of the contested slot.
        level: u32,
    },

    /// A level plan failed validation before adoption.
    #[error("Invalid level plan: {0}")]
    InvalidLevelPlan(String),

    /// Market state required for quoting is missing or unusable.
    #[error("Invalid market state: {0}")]
    InvalidMarketState(String),

    /// Invalid configuration parameters.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl EngineError {
    /// Returns true for failures worth retrying as-is.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::VenueUnavailable(_))
    }

    /// Returns true for failures that must stop the engine.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::CancelFailed { .. } | Self::DuplicateHandle { .. })
    }
}
