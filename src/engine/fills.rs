//! Fill detection and idempotent fill accounting.
//!
//! The detector polls venue truth: it queries the status of every tracked
//! order, compares the reported cumulative filled quantity with the last
//! value it saw, and emits the delta as a [`FillEvent`]. Polling the venue
//! rather than trusting local bookkeeping means a fill that lands between
//! two sweeps is never missed, only observed late.
//!
//! Application is guarded twice. The detector's last-seen map stops the same
//! delta being emitted twice across sweeps; the [`FillLedger`] makes
//! processing idempotent even when the same batch of events is fed in again.

use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};

use crate::Decimal;
use crate::book::state::BookState;
use crate::types::error::EngineError;
use crate::venue::{ClientOrderId, OrderSnapshot, Side, VenueAdapter};

/// One observed execution against a tracked order.
#[derive(Debug, Clone, PartialEq)]
pub struct FillEvent {
    /// Order the execution belongs to.
    pub order_id: ClientOrderId,
    /// Side of the filled order.
    pub side: Side,
    /// Ladder index the order was quoting, when known.
    pub level: Option<u32>,
    /// Quantity filled by this event.
    pub quantity: Decimal,
    /// Venue-reported cumulative filled quantity after this event.
    ///
    /// Together with `order_id` this is the idempotency key.
    pub cumulative: Decimal,
    /// Venue-reported quantity still resting after this event.
    pub remaining: Decimal,
    /// Execution price attributed to the event.
    pub price: Decimal,
    /// Venue timestamp, milliseconds.
    pub timestamp: u64,
}

/// Outcome of one detector pass.
#[derive(Debug, Default)]
pub struct FillSweep {
    /// Newly observed executions.
    pub fills: Vec<FillEvent>,
    /// Tracked orders the venue reports terminal or has no record of.
    pub defunct: Vec<ClientOrderId>,
    /// Orders the venue confirmed as existing this pass.
    pub acknowledged: Vec<ClientOrderId>,
    /// Orders whose status query failed transiently this pass.
    pub unreachable: Vec<ClientOrderId>,
}

impl FillSweep {
    /// Returns true when the pass found nothing that changes the book.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fills.is_empty() && self.defunct.is_empty()
    }
}

/// Poll-based fill detector.
///
/// Holds no opinion about what the caller does with events; safe to invoke
/// at any frequency.
#[derive(Debug, Default)]
pub struct FillDetector {
    last_seen: HashMap<ClientOrderId, Decimal>,
}

impl FillDetector {
    /// Creates a detector with no history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sweeps every order tracked by the book.
    pub async fn sweep<V: VenueAdapter>(&mut self, venue: &V, book: &BookState) -> FillSweep {
        let ids = book.tracked_ids();
        self.sweep_orders(venue, book, &ids).await
    }

    /// Sweeps only the given order IDs.
    ///
    /// Used by the refresh paths to re-check exactly the orders they just
    /// cancelled.
    pub async fn sweep_orders<V: VenueAdapter>(
        &mut self,
        venue: &V,
        book: &BookState,
        ids: &[ClientOrderId],
    ) -> FillSweep {
        let mut sweep = FillSweep::default();
        for id in ids {
            match venue.query_order_status(id).await {
                Ok(snapshot) => self.observe(id, &snapshot, book, &mut sweep),
                Err(EngineError::UnknownOrder(_)) => {
                    warn!(order_id = %id, "venue has no record of tracked order");
                    sweep.defunct.push(id.clone());
                }
                Err(e) => {
                    debug!(order_id = %id, error = %e, "status query failed, will retry next sweep");
                    sweep.unreachable.push(id.clone());
                }
            }
        }
        sweep
    }

    /// Drops last-seen entries for orders the book no longer tracks.
    pub fn retain_tracked(&mut self, book: &BookState) {
        let live: HashSet<ClientOrderId> = book.tracked_ids().into_iter().collect();
        self.last_seen.retain(|id, _| live.contains(id));
    }

    fn observe(
        &mut self,
        id: &ClientOrderId,
        snapshot: &OrderSnapshot,
        book: &BookState,
        sweep: &mut FillSweep,
    ) {
        if snapshot.state.is_active() {
            sweep.acknowledged.push(id.clone());
        }

        let seen = self.last_seen.get(id).copied().unwrap_or(Decimal::ZERO);
        if snapshot.filled_quantity > seen {
            if let Some(handle) = book.find(id) {
                sweep.fills.push(FillEvent {
                    order_id: id.clone(),
                    side: handle.side,
                    level: Some(handle.level),
                    quantity: snapshot.filled_quantity - seen,
                    cumulative: snapshot.filled_quantity,
                    remaining: snapshot.remaining_quantity,
                    price: snapshot.avg_fill_price.unwrap_or(handle.price),
                    timestamp: snapshot.updated_at,
                });
                self.last_seen.insert(id.clone(), snapshot.filled_quantity);
            } else {
                debug!(order_id = %id, "fill on untracked order ignored");
            }
        }

        if snapshot.state.is_terminal() {
            sweep.defunct.push(id.clone());
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct LedgerEntry {
    cumulative: Decimal,
    last_update: u64,
}

/// Idempotency ledger for fill application.
///
/// Records the cumulative filled quantity already applied per order; an event
/// that does not advance it is a duplicate and must not be applied again.
/// Entries linger for a retention window after their last update so late
/// duplicate reports stay recognizable.
#[derive(Debug, Default)]
pub struct FillLedger {
    applied: HashMap<ClientOrderId, LedgerEntry>,
}

impl FillLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an event if it advances the order's cumulative fill.
    ///
    /// Returns false for duplicates and stale reports; the caller must not
    /// apply those.
    pub fn admit(&mut self, event: &FillEvent) -> bool {
        let entry = self
            .applied
            .entry(event.order_id.clone())
            .or_insert(LedgerEntry {
                cumulative: Decimal::ZERO,
                last_update: event.timestamp,
            });
        if event.cumulative <= entry.cumulative {
            return false;
        }
        entry.cumulative = event.cumulative;
        entry.last_update = event.timestamp;
        true
    }

    /// Cumulative quantity already applied for an order.
    #[must_use]
    pub fn applied(&self, order_id: &ClientOrderId) -> Decimal {
        self.applied
            .get(order_id)
            .map_or(Decimal::ZERO, |entry| entry.cumulative)
    }

    /// Number of orders with ledger entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.applied.len()
    }

    /// Returns true when no entries exist.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.applied.is_empty()
    }

    /// Drops entries untouched for longer than `retention_ms`.
    pub fn prune(&mut self, now: u64, retention_ms: u64) {
        self.applied
            .retain(|_, entry| now.saturating_sub(entry.last_update) < retention_ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book::level::{Level, LevelPlan};
    use crate::book::state::ActiveOrder;
    use crate::dec;
    use crate::venue::{MockVenue, VenueAdapter};

    /// Submits the book's plan to the venue and tracks the handles.
    async fn quote(venue: &MockVenue, book: &mut BookState, plan: LevelPlan) {
        book.adopt_plan(plan).unwrap();
        for level in book.pending_submissions() {
            let order = level.to_limit_order("BTC-USD");
            venue.submit_limit_order(&order, false).await.unwrap();
            book.track(ActiveOrder::from_level(&level, 1_000)).unwrap();
        }
    }

    fn one_ask() -> LevelPlan {
        let mut plan = LevelPlan::new();
        plan.insert(Level::ask(0, dec!(101.0), dec!(2.0)));
        plan
    }

    #[tokio::test]
    async fn test_sweep_emits_fill_delta() {
        let venue = MockVenue::new();
        let mut book = BookState::new();
        let mut detector = FillDetector::new();
        quote(&venue, &mut book, one_ask()).await;
        let id = book.tracked_ids()[0].clone();

        venue.fill_order(&id, dec!(0.5)).await.unwrap();
        let sweep = detector.sweep(&venue, &book).await;

        assert_eq!(sweep.fills.len(), 1);
        let event = &sweep.fills[0];
        assert_eq!(event.order_id, id);
        assert_eq!(event.side, Side::Sell);
        assert_eq!(event.level, Some(0));
        assert_eq!(event.quantity, dec!(0.5));
        assert_eq!(event.cumulative, dec!(0.5));
        assert_eq!(event.remaining, dec!(1.5));
        assert_eq!(event.price, dec!(101.0));
        assert!(sweep.defunct.is_empty());
        assert_eq!(sweep.acknowledged, vec![id]);
    }

    #[tokio::test]
    async fn test_sweep_does_not_repeat_old_fills() {
        let venue = MockVenue::new();
        let mut book = BookState::new();
        let mut detector = FillDetector::new();
        quote(&venue, &mut book, one_ask()).await;
        let id = book.tracked_ids()[0].clone();

        venue.fill_order(&id, dec!(0.5)).await.unwrap();
        assert_eq!(detector.sweep(&venue, &book).await.fills.len(), 1);
        assert!(detector.sweep(&venue, &book).await.fills.is_empty());

        // A further fill produces only the new delta.
        venue.fill_order(&id, dec!(0.25)).await.unwrap();
        let sweep = detector.sweep(&venue, &book).await;
        assert_eq!(sweep.fills.len(), 1);
        assert_eq!(sweep.fills[0].quantity, dec!(0.25));
        assert_eq!(sweep.fills[0].cumulative, dec!(0.75));
    }

    #[tokio::test]
    async fn test_terminal_orders_reported_defunct() {
        let venue = MockVenue::new();
        let mut book = BookState::new();
        let mut detector = FillDetector::new();
        quote(&venue, &mut book, one_ask()).await;
        let id = book.tracked_ids()[0].clone();

        venue.cancel_order(&id, false).await.unwrap();
        let sweep = detector.sweep(&venue, &book).await;
        assert_eq!(sweep.defunct, vec![id.clone()]);
        assert!(sweep.fills.is_empty());
        assert!(sweep.acknowledged.is_empty());

        // An order the venue forgot entirely is defunct too.
        venue.forget_order(&id).await;
        let sweep = detector.sweep(&venue, &book).await;
        assert_eq!(sweep.defunct, vec![id]);
    }

    #[tokio::test]
    async fn test_fill_and_cancel_both_reported() {
        let venue = MockVenue::new();
        let mut book = BookState::new();
        let mut detector = FillDetector::new();
        quote(&venue, &mut book, one_ask()).await;
        let id = book.tracked_ids()[0].clone();

        // Partial fill lands, then the order is cancelled externally.
        venue.fill_order(&id, dec!(0.5)).await.unwrap();
        venue.cancel_order(&id, false).await.unwrap();

        let sweep = detector.sweep(&venue, &book).await;
        assert_eq!(sweep.fills.len(), 1);
        assert_eq!(sweep.fills[0].quantity, dec!(0.5));
        assert_eq!(sweep.defunct, vec![id]);
    }

    #[tokio::test]
    async fn test_scoped_sweep_only_queries_given_ids() {
        let venue = MockVenue::new();
        let mut book = BookState::new();
        let mut detector = FillDetector::new();
        let mut plan = one_ask();
        plan.insert(Level::bid(0, dec!(99.0), dec!(2.0)));
        quote(&venue, &mut book, plan).await;

        let ask_id = book.active_side(Side::Sell)[&0].client_order_id.clone();
        let bid_id = book.active_side(Side::Buy)[&0].client_order_id.clone();
        venue.fill_order(&ask_id, dec!(1.0)).await.unwrap();
        venue.fill_order(&bid_id, dec!(1.0)).await.unwrap();

        let sweep = detector
            .sweep_orders(&venue, &book, std::slice::from_ref(&ask_id))
            .await;
        assert_eq!(sweep.fills.len(), 1);
        assert_eq!(sweep.fills[0].order_id, ask_id);

        // The bid fill is still waiting for a full sweep.
        let sweep = detector.sweep(&venue, &book).await;
        assert_eq!(sweep.fills.len(), 1);
        assert_eq!(sweep.fills[0].order_id, bid_id);
    }

    #[tokio::test]
    async fn test_retain_tracked_drops_stale_entries() {
        let venue = MockVenue::new();
        let mut book = BookState::new();
        let mut detector = FillDetector::new();
        quote(&venue, &mut book, one_ask()).await;
        let id = book.tracked_ids()[0].clone();

        venue.fill_order(&id, dec!(0.5)).await.unwrap();
        detector.sweep(&venue, &book).await;
        assert_eq!(detector.last_seen.len(), 1);

        book.untrack(&id).unwrap();
        detector.retain_tracked(&book);
        assert!(detector.last_seen.is_empty());
    }

    fn event(id: &ClientOrderId, quantity: Decimal, cumulative: Decimal, ts: u64) -> FillEvent {
        FillEvent {
            order_id: id.clone(),
            side: Side::Sell,
            level: Some(0),
            quantity,
            cumulative,
            remaining: dec!(0.0),
            price: dec!(101.0),
            timestamp: ts,
        }
    }

    #[test]
    fn test_ledger_admits_once() {
        let mut ledger = FillLedger::new();
        let id = ClientOrderId::new("order-1");

        assert!(ledger.admit(&event(&id, dec!(0.5), dec!(0.5), 100)));
        assert!(!ledger.admit(&event(&id, dec!(0.5), dec!(0.5), 100)));
        assert_eq!(ledger.applied(&id), dec!(0.5));

        // Progress admits, regression does not.
        assert!(ledger.admit(&event(&id, dec!(0.5), dec!(1.0), 200)));
        assert!(!ledger.admit(&event(&id, dec!(0.3), dec!(0.8), 300)));
        assert_eq!(ledger.applied(&id), dec!(1.0));
    }

    #[test]
    fn test_ledger_prune_respects_retention() {
        let mut ledger = FillLedger::new();
        let old = ClientOrderId::new("order-old");
        let fresh = ClientOrderId::new("order-fresh");
        ledger.admit(&event(&old, dec!(1.0), dec!(1.0), 1_000));
        ledger.admit(&event(&fresh, dec!(1.0), dec!(1.0), 9_500));

        ledger.prune(10_000, 1_000);
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.applied(&old), dec!(0.0));
        assert_eq!(ledger.applied(&fresh), dec!(1.0));
    }
}
