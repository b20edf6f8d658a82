//! Venue connectivity contract and order vocabulary.
//!
//! The engine talks to a trading venue through [`VenueAdapter`]: five async
//! calls covering submission, cancellation, and status queries. Transport,
//! authentication, and rate limiting live behind the trait; the engine never
//! sees them.
//!
//! Orders are correlated by [`ClientOrderId`] alone. The engine assigns the
//! ID before submission and treats it as the venue order ID as well; adapters
//! for venues that mint their own IDs must translate at their boundary.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::Decimal;
use crate::types::current_timestamp;
use crate::types::error::{EngineError, EngineResult};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Client-assigned order identifier.
///
/// Generated once per planned level and never reused, so a level re-quoted
/// across refreshes is a brand-new order as far as the venue is concerned.
///
/// # Example
///
/// ```rust
/// use maker_engine_rs::venue::ClientOrderId;
///
/// let a = ClientOrderId::generate();
/// let b = ClientOrderId::generate();
/// assert_ne!(a, b);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ClientOrderId(String);

impl ClientOrderId {
    /// Generates a new process-unique identifier.
    #[must_use]
    pub fn generate() -> Self {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let count = COUNTER.fetch_add(1, Ordering::SeqCst);
        Self(format!("{}-{}", current_timestamp(), count))
    }

    /// Wraps an existing identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ClientOrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Side {
    /// Buy order (bid).
    Buy,
    /// Sell order (ask).
    Sell,
}

impl Side {
    /// Returns the opposite side.
    #[must_use]
    pub fn opposite(&self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "Buy"),
            Self::Sell => write!(f, "Sell"),
        }
    }
}

/// Time-in-force for a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum TimeInForce {
    /// Good till cancelled.
    #[default]
    Gtc,
    /// Immediate or cancel.
    Ioc,
    /// Fill or kill.
    Fok,
}

/// Venue-reported order lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum VenueOrderState {
    /// Accepted by the venue, not yet resting on the book.
    Received,
    /// Resting on the book, unfilled.
    Open,
    /// Resting with partial executions.
    PartiallyFilled,
    /// Completely executed.
    Filled,
    /// Cancelled before complete execution.
    Cancelled,
    /// Refused by the venue.
    Rejected,
}

impl VenueOrderState {
    /// Returns true once the order can no longer trade.
    ///
    /// # Example
    ///
    /// ```rust
    /// use maker_engine_rs::venue::VenueOrderState;
    ///
    /// assert!(VenueOrderState::Filled.is_terminal());
    /// assert!(!VenueOrderState::PartiallyFilled.is_terminal());
    /// ```
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Filled | Self::Cancelled | Self::Rejected)
    }

    /// Returns true while the order may still execute.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }
}

/// Point-in-time order status returned by [`VenueAdapter::query_order_status`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OrderSnapshot {
    /// Venue-reported lifecycle state.
    pub state: VenueOrderState,
    /// Cumulative filled quantity.
    pub filled_quantity: Decimal,
    /// Quantity still resting.
    pub remaining_quantity: Decimal,
    /// Average execution price across fills, if any.
    pub avg_fill_price: Option<Decimal>,
    /// Venue timestamp of the last update, milliseconds.
    pub updated_at: u64,
}

/// Limit order submission request.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LimitOrder {
    /// Client-assigned identifier, echoed back on success.
    pub client_order_id: ClientOrderId,
    /// Order side.
    pub side: Side,
    /// Limit price.
    pub price: Decimal,
    /// Order quantity.
    pub quantity: Decimal,
    /// Traded symbol.
    pub symbol: String,
    /// Reject instead of crossing the spread when true.
    pub post_only: bool,
    /// Time-in-force.
    pub time_in_force: TimeInForce,
    /// Venue-specific parameters, passed through untouched.
    pub params: HashMap<String, String>,
}

/// Market order submission request.
///
/// The reconciliation loop never sends these itself; they are part of the
/// adapter contract so embedders can hedge through the same connection.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MarketOrder {
    /// Client-assigned identifier, echoed back on success.
    pub client_order_id: ClientOrderId,
    /// Order side.
    pub side: Side,
    /// Order quantity.
    pub quantity: Decimal,
    /// Traded symbol.
    pub symbol: String,
    /// Venue-specific parameters, passed through untouched.
    pub params: HashMap<String, String>,
}

/// Connectivity contract between the engine and a trading venue.
///
/// All methods take `&self` so one adapter can serve several engines; any
/// internal state needs interior mutability. Implementations decide what
/// `verify` costs: with it set, the call must not return success until the
/// venue has confirmed the effect.
#[async_trait]
pub trait VenueAdapter: Send + Sync {
    /// Submits a limit order and returns its client order ID.
    ///
    /// With `verify` unset this is fire-and-forget: a returned ID means the
    /// request was handed to the venue, not that it was acknowledged.
    ///
    /// # Errors
    ///
    /// [`EngineError::VenueUnavailable`] for transport failures,
    /// [`EngineError::OrderRejected`] when the venue refuses the order.
    async fn submit_limit_order(
        &self,
        order: &LimitOrder,
        verify: bool,
    ) -> EngineResult<ClientOrderId>;

    /// Submits a market order and returns its client order ID.
    ///
    /// # Errors
    ///
    /// Same contract as [`VenueAdapter::submit_limit_order`].
    async fn submit_market_order(
        &self,
        order: &MarketOrder,
        verify: bool,
    ) -> EngineResult<ClientOrderId>;

    /// Cancels a single order.
    ///
    /// # Errors
    ///
    /// [`EngineError::UnknownOrder`] when the venue has no record of the ID,
    /// [`EngineError::VenueUnavailable`] for transport failures.
    async fn cancel_order(&self, order_id: &ClientOrderId, verify: bool) -> EngineResult<()>;

    /// Cancels every live order for `symbol`.
    ///
    /// With `verify` set the adapter confirms the venue reports no live
    /// orders before returning; `retries` bounds re-attempts after a failed
    /// confirmation.
    ///
    /// # Errors
    ///
    /// Returns an error only once the whole attempt budget is spent. The
    /// engine treats that as fatal.
    async fn cancel_all_orders(
        &self,
        symbol: &str,
        verify: bool,
        retries: u32,
    ) -> EngineResult<()>;

    /// Queries the current status of an order.
    ///
    /// # Errors
    ///
    /// [`EngineError::UnknownOrder`] when the venue has no record of the ID.
    async fn query_order_status(&self, order_id: &ClientOrderId) -> EngineResult<OrderSnapshot>;

    /// Confirms an order is no longer live.
    ///
    /// An order the venue has no record of counts as inactive; that is what
    /// a completed cancel looks like on venues that purge terminal orders.
    ///
    /// # Errors
    ///
    /// Propagates any failure other than [`EngineError::UnknownOrder`].
    async fn verify_order_inactive(&self, order_id: &ClientOrderId) -> EngineResult<bool> {
        match self.query_order_status(order_id).await {
            Ok(snapshot) => Ok(snapshot.state.is_terminal()),
            Err(EngineError::UnknownOrder(_)) => Ok(true),
            Err(e) => Err(e),
        }
    }

    /// Confirms the venue has a record of an order.
    ///
    /// # Errors
    ///
    /// Propagates any failure other than [`EngineError::UnknownOrder`].
    async fn verify_order_received(&self, order_id: &ClientOrderId) -> EngineResult<bool> {
        match self.query_order_status(order_id).await {
            Ok(_) => Ok(true),
            Err(EngineError::UnknownOrder(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_order_id_generate_unique() {
        let ids: Vec<ClientOrderId> = (0..100).map(|_| ClientOrderId::generate()).collect();
        let mut deduped = ids.clone();
        deduped.sort();
        deduped.dedup();
        assert_eq!(deduped.len(), ids.len());
    }

    #[test]
    fn test_client_order_id_display() {
        let id = ClientOrderId::new("1700000000000-42");
        assert_eq!(id.to_string(), "1700000000000-42");
        assert_eq!(id.as_str(), "1700000000000-42");
    }

    #[test]
    fn test_side_opposite() {
        assert_eq!(Side::Buy.opposite(), Side::Sell);
        assert_eq!(Side::Sell.opposite(), Side::Buy);
    }

    #[test]
    fn test_state_terminal() {
        assert!(VenueOrderState::Filled.is_terminal());
        assert!(VenueOrderState::Cancelled.is_terminal());
        assert!(VenueOrderState::Rejected.is_terminal());
        assert!(VenueOrderState::Received.is_active());
        assert!(VenueOrderState::Open.is_active());
        assert!(VenueOrderState::PartiallyFilled.is_active());
    }
}
