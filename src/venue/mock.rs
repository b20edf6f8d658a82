//! Deterministic in-memory venue for tests and demos.
//!
//! `MockVenue` keeps every submitted order in memory and lets tests script
//! the failure modes the engine has to survive: dropped submissions, cancel
//! attempts that never confirm, fills that land while a cancel is in flight,
//! and orders the venue suddenly has no record of.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::Decimal;
use crate::types::current_timestamp;
use crate::types::error::{EngineError, EngineResult};
use crate::venue::adapter::{
    ClientOrderId, LimitOrder, MarketOrder, OrderSnapshot, Side, VenueAdapter, VenueOrderState,
};

#[derive(Debug, Clone)]
struct MockOrder {
    side: Side,
    symbol: String,
    price: Decimal,
    quantity: Decimal,
    filled_quantity: Decimal,
    filled_notional: Decimal,
    state: VenueOrderState,
    updated_at: u64,
}

impl MockOrder {
    fn resting(side: Side, symbol: &str, price: Decimal, quantity: Decimal) -> Self {
        Self {
            side,
            symbol: symbol.to_string(),
            price,
            quantity,
            filled_quantity: Decimal::ZERO,
            filled_notional: Decimal::ZERO,
            state: VenueOrderState::Open,
            updated_at: current_timestamp(),
        }
    }

    /// Executes up to `quantity` against the order at its limit price.
    fn execute(&mut self, quantity: Decimal) {
        if self.state.is_terminal() {
            return;
        }
        let open = self.quantity - self.filled_quantity;
        let executed = quantity.min(open);
        if executed <= Decimal::ZERO {
            return;
        }
        self.filled_quantity += executed;
        self.filled_notional += executed * self.price;
        self.state = if self.filled_quantity >= self.quantity {
            VenueOrderState::Filled
        } else {
            VenueOrderState::PartiallyFilled
        };
        self.updated_at = current_timestamp();
    }

    fn snapshot(&self) -> OrderSnapshot {
        let avg_fill_price = if self.filled_quantity > Decimal::ZERO {
            Some(self.filled_notional / self.filled_quantity)
        } else {
            None
        };
        OrderSnapshot {
            state: self.state,
            filled_quantity: self.filled_quantity,
            remaining_quantity: self.quantity - self.filled_quantity,
            avg_fill_price,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, Default)]
struct MockVenueState {
    orders: HashMap<ClientOrderId, MockOrder>,
    submission_log: Vec<ClientOrderId>,
    fail_submits: u32,
    reject_submits: u32,
    fail_cancels: u32,
    fail_cancel_all: u32,
    cancel_all_attempts: u32,
    race_fills: Vec<(ClientOrderId, Decimal)>,
    mark_price: Option<Decimal>,
}

impl MockVenueState {
    /// Fills scripted to land "while the cancel was in flight".
    fn apply_race_fills(&mut self) {
        let pending = std::mem::take(&mut self.race_fills);
        for (id, quantity) in pending {
            if let Some(order) = self.orders.get_mut(&id) {
                order.execute(quantity);
            }
        }
    }
}

/// Scripted in-memory venue.
///
/// # Example
///
/// ```rust
/// use maker_engine_rs::dec;
/// use maker_engine_rs::venue::{
///     ClientOrderId, LimitOrder, MockVenue, Side, TimeInForce, VenueAdapter, VenueOrderState,
/// };
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let venue = MockVenue::new();
/// let order = LimitOrder {
///     client_order_id: ClientOrderId::generate(),
///     side: Side::Buy,
///     price: dec!(99.5),
///     quantity: dec!(2.0),
///     symbol: "BTC-USD".to_string(),
///     post_only: true,
///     time_in_force: TimeInForce::Gtc,
///     params: Default::default(),
/// };
///
/// let id = venue.submit_limit_order(&order, false).await.unwrap();
/// venue.fill_order(&id, dec!(0.5)).await.unwrap();
///
/// let snapshot = venue.query_order_status(&id).await.unwrap();
/// assert_eq!(snapshot.state, VenueOrderState::PartiallyFilled);
/// assert_eq!(snapshot.filled_quantity, dec!(0.5));
/// # }
/// ```
#[derive(Debug, Default)]
pub struct MockVenue {
    inner: RwLock<MockVenueState>,
}

impl MockVenue {
    /// Creates an empty venue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` submissions fail with a transport error.
    pub async fn fail_next_submits(&self, count: u32) {
        self.inner.write().await.fail_submits = count;
    }

    /// Makes the next `count` submissions come back rejected.
    pub async fn reject_next_submits(&self, count: u32) {
        self.inner.write().await.reject_submits = count;
    }

    /// Makes the next `count` single-order cancels fail with a transport error.
    pub async fn fail_next_cancels(&self, count: u32) {
        self.inner.write().await.fail_cancels = count;
    }

    /// Makes the next `count` cancel-all attempts fail.
    ///
    /// Attempts are counted per try, so a call with one retry consumes two.
    pub async fn fail_cancel_all_attempts(&self, count: u32) {
        self.inner.write().await.fail_cancel_all = count;
    }

    /// Schedules a fill that lands just before the next cancel takes effect.
    pub async fn fill_during_next_cancel(&self, order_id: &ClientOrderId, quantity: Decimal) {
        self.inner
            .write()
            .await
            .race_fills
            .push((order_id.clone(), quantity));
    }

    /// Executes `quantity` against a resting order at its limit price.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnknownOrder`] for an unknown ID.
    pub async fn fill_order(&self, order_id: &ClientOrderId, quantity: Decimal) -> EngineResult<()> {
        let mut state = self.inner.write().await;
        let order = state
            .orders
            .get_mut(order_id)
            .ok_or_else(|| EngineError::UnknownOrder(order_id.clone()))?;
        order.execute(quantity);
        Ok(())
    }

    /// Erases all trace of an order, as if the venue lost it.
    pub async fn forget_order(&self, order_id: &ClientOrderId) {
        self.inner.write().await.orders.remove(order_id);
    }

    /// Sets the price market orders execute at.
    pub async fn set_mark_price(&self, price: Decimal) {
        self.inner.write().await.mark_price = Some(price);
    }

    /// Status of an order without going through the adapter contract.
    pub async fn snapshot(&self, order_id: &ClientOrderId) -> Option<OrderSnapshot> {
        self.inner
            .read()
            .await
            .orders
            .get(order_id)
            .map(MockOrder::snapshot)
    }

    /// IDs of all orders still live for `symbol`, sorted.
    pub async fn live_order_ids(&self, symbol: &str) -> Vec<ClientOrderId> {
        let state = self.inner.read().await;
        let mut ids: Vec<ClientOrderId> = state
            .orders
            .iter()
            .filter(|(_, o)| o.symbol == symbol && o.state.is_active())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Every accepted submission in arrival order.
    pub async fn submission_log(&self) -> Vec<ClientOrderId> {
        self.inner.read().await.submission_log.clone()
    }

    /// Total cancel-all attempts seen, failed ones included.
    pub async fn cancel_all_attempts(&self) -> u32 {
        self.inner.read().await.cancel_all_attempts
    }
}

#[async_trait]
impl VenueAdapter for MockVenue {
    async fn submit_limit_order(
        &self,
        order: &LimitOrder,
        _verify: bool,
    ) -> EngineResult<ClientOrderId> {
        let mut state = self.inner.write().await;
        if state.fail_submits > 0 {
            state.fail_submits -= 1;
            return Err(EngineError::VenueUnavailable(
                "scripted submit failure".to_string(),
            ));
        }
        if state.reject_submits > 0 {
            state.reject_submits -= 1;
            return Err(EngineError::OrderRejected {
                order_id: order.client_order_id.clone(),
                reason: "scripted reject".to_string(),
            });
        }
        let id = order.client_order_id.clone();
        state.orders.insert(
            id.clone(),
            MockOrder::resting(order.side, &order.symbol, order.price, order.quantity),
        );
        state.submission_log.push(id.clone());
        Ok(id)
    }

    async fn submit_market_order(
        &self,
        order: &MarketOrder,
        _verify: bool,
    ) -> EngineResult<ClientOrderId> {
        let mut state = self.inner.write().await;
        if state.fail_submits > 0 {
            state.fail_submits -= 1;
            return Err(EngineError::VenueUnavailable(
                "scripted submit failure".to_string(),
            ));
        }
        let Some(mark) = state.mark_price else {
            return Err(EngineError::OrderRejected {
                order_id: order.client_order_id.clone(),
                reason: "no mark price set".to_string(),
            });
        };
        let id = order.client_order_id.clone();
        let mut filled = MockOrder::resting(order.side, &order.symbol, mark, order.quantity);
        filled.execute(order.quantity);
        state.orders.insert(id.clone(), filled);
        state.submission_log.push(id.clone());
        Ok(id)
    }

    async fn cancel_order(&self, order_id: &ClientOrderId, _verify: bool) -> EngineResult<()> {
        let mut state = self.inner.write().await;
        state.apply_race_fills();
        if state.fail_cancels > 0 {
            state.fail_cancels -= 1;
            return Err(EngineError::VenueUnavailable(
                "scripted cancel failure".to_string(),
            ));
        }
        let order = state
            .orders
            .get_mut(order_id)
            .ok_or_else(|| EngineError::UnknownOrder(order_id.clone()))?;
        if order.state.is_active() {
            order.state = VenueOrderState::Cancelled;
            order.updated_at = current_timestamp();
        }
        Ok(())
    }

    async fn cancel_all_orders(
        &self,
        symbol: &str,
        _verify: bool,
        retries: u32,
    ) -> EngineResult<()> {
        let mut state = self.inner.write().await;
        state.apply_race_fills();
        for _ in 0..=retries {
            state.cancel_all_attempts += 1;
            if state.fail_cancel_all > 0 {
                state.fail_cancel_all -= 1;
                continue;
            }
            let now = current_timestamp();
            for order in state
                .orders
                .values_mut()
                .filter(|o| o.symbol == symbol && o.state.is_active())
            {
                order.state = VenueOrderState::Cancelled;
                order.updated_at = now;
            }
            return Ok(());
        }
        Err(EngineError::VenueUnavailable(format!(
            "cancel-all for {symbol} failed {} times",
            retries + 1
        )))
    }

    async fn query_order_status(&self, order_id: &ClientOrderId) -> EngineResult<OrderSnapshot> {
        let state = self.inner.read().await;
        state
            .orders
            .get(order_id)
            .map(MockOrder::snapshot)
            .ok_or_else(|| EngineError::UnknownOrder(order_id.clone()))
    }
}
