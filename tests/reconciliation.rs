//! End-to-end reconciliation scenarios against the scripted venue.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use maker_engine_rs::book::HandleStatus;
use maker_engine_rs::engine::{
    EngineConfig, FillEvent, HoldPolicy, MakerEngine, RefreshDecision, RefreshPolicy,
};
use maker_engine_rs::strategy::StrategyProvider;
use maker_engine_rs::venue::{MockVenue, VenueOrderState};
use maker_engine_rs::{
    BookState, ClientOrderId, Decimal, EngineError, EngineResult, InventoryPosition, Level,
    LevelPlan, RefreshSet, Side, VenueAdapter, dec,
};

const SYMBOL: &str = "BTC-USD";

/// Strategy that re-quotes the same ladder every time it is asked, minting
/// fresh client order IDs per call like a real strategy would.
struct FixedLadder {
    asks: Vec<(Decimal, Decimal)>,
    bids: Vec<(Decimal, Decimal)>,
    calls: Arc<AtomicU32>,
}

impl FixedLadder {
    fn new(asks: Vec<(Decimal, Decimal)>, bids: Vec<(Decimal, Decimal)>) -> Self {
        Self {
            asks,
            bids,
            calls: Arc::new(AtomicU32::new(0)),
        }
    }

    fn call_counter(&self) -> Arc<AtomicU32> {
        Arc::clone(&self.calls)
    }
}

impl StrategyProvider for FixedLadder {
    fn compute_levels(&mut self, _position: &InventoryPosition) -> EngineResult<LevelPlan> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let mut plan = LevelPlan::new();
        for (index, (price, quantity)) in self.asks.iter().enumerate() {
            plan.insert(Level::ask(index as u32, *price, *quantity));
        }
        for (index, (price, quantity)) in self.bids.iter().enumerate() {
            plan.insert(Level::bid(index as u32, *price, *quantity));
        }
        Ok(plan)
    }
}

/// Strategy that fails for a window of calls, then recovers.
struct FlakyStrategy {
    inner: FixedLadder,
    calls: u32,
    fail_from: u32,
    fail_until: u32,
}

impl FlakyStrategy {
    fn new(inner: FixedLadder, fail_from: u32, fail_until: u32) -> Self {
        Self {
            inner,
            calls: 0,
            fail_from,
            fail_until,
        }
    }
}

impl StrategyProvider for FlakyStrategy {
    fn compute_levels(&mut self, position: &InventoryPosition) -> EngineResult<LevelPlan> {
        let call = self.calls;
        self.calls += 1;
        if call >= self.fail_from && call < self.fail_until {
            return Err(EngineError::InvalidMarketState(
                "no market data".to_string(),
            ));
        }
        self.inner.compute_levels(position)
    }
}

/// Policy that replays a scripted sequence of decisions, then holds forever.
struct ScriptedPolicy {
    script: VecDeque<RefreshDecision>,
}

impl ScriptedPolicy {
    fn of(decisions: Vec<RefreshDecision>) -> Self {
        Self {
            script: decisions.into(),
        }
    }
}

impl RefreshPolicy for ScriptedPolicy {
    fn check(&mut self, _book: &BookState, _now_ms: u64) -> RefreshDecision {
        self.script.pop_front().unwrap_or_default()
    }
}

fn two_by_two() -> FixedLadder {
    FixedLadder::new(
        vec![(dec!(101.0), dec!(1.0)), (dec!(102.0), dec!(1.0))],
        vec![(dec!(99.0), dec!(1.0)), (dec!(98.0), dec!(1.0))],
    )
}

fn engine_with<S, P>(
    venue: &Arc<MockVenue>,
    strategy: S,
    policy: P,
) -> MakerEngine<MockVenue, S, P>
where
    S: StrategyProvider,
    P: RefreshPolicy,
{
    let config = EngineConfig::new(SYMBOL).unwrap().with_poll_interval_ms(1);
    MakerEngine::new(Arc::clone(venue), strategy, policy, config)
}

fn handle_id<S, P>(engine: &MakerEngine<MockVenue, S, P>, side: Side, index: u32) -> ClientOrderId
where
    S: StrategyProvider,
    P: RefreshPolicy,
{
    engine.book().active_side(side)[&index].client_order_id.clone()
}

fn refresh_one(side: Side, index: u32) -> RefreshDecision {
    let mut levels = RefreshSet::new();
    levels.insert(side, index);
    RefreshDecision {
        refresh_all: false,
        levels,
    }
}

#[tokio::test]
async fn test_initial_submission_places_full_ladder() {
    let venue = Arc::new(MockVenue::new());
    let mut engine = engine_with(&venue, two_by_two(), HoldPolicy);

    engine.initialize().await.unwrap();

    assert_eq!(engine.book().active_count(), 4);
    assert_eq!(venue.live_order_ids(SYMBOL).await.len(), 4);
    assert_eq!(engine.stats().orders_submitted, 4);
    assert_eq!(engine.stats().submit_failures, 0);
}

#[tokio::test]
async fn test_submission_interleaves_sides_per_level() {
    let venue = Arc::new(MockVenue::new());
    let ladder = FixedLadder::new(
        vec![
            (dec!(101.0), dec!(1.0)),
            (dec!(102.0), dec!(1.0)),
            (dec!(103.0), dec!(1.0)),
        ],
        vec![(dec!(99.0), dec!(1.0))],
    );
    let mut engine = engine_with(&venue, ladder, HoldPolicy);

    engine.initialize().await.unwrap();

    // Ask then bid per level, deeper asks after the bids run out.
    let expected = vec![
        handle_id(&engine, Side::Sell, 0),
        handle_id(&engine, Side::Buy, 0),
        handle_id(&engine, Side::Sell, 1),
        handle_id(&engine, Side::Sell, 2),
    ];
    assert_eq!(venue.submission_log().await, expected);
}

#[tokio::test]
async fn test_partial_fill_updates_position_and_handle() {
    let venue = Arc::new(MockVenue::new());
    let mut engine = engine_with(&venue, two_by_two(), HoldPolicy);
    engine.initialize().await.unwrap();
    let ask0 = handle_id(&engine, Side::Sell, 0);

    venue.fill_order(&ask0, dec!(0.4)).await.unwrap();
    engine.run_once().await.unwrap();

    assert_eq!(engine.position().quantity, dec!(-0.4));
    assert_eq!(engine.stats().fills_processed, 1);

    // The handle shrank but stays tracked.
    let handle = &engine.book().active_side(Side::Sell)[&0];
    assert_eq!(handle.client_order_id, ask0);
    assert_eq!(handle.quantity, dec!(0.6));
    assert_eq!(handle.status, HandleStatus::PartiallyFilled);
    assert_eq!(engine.book().active_count(), 4);
}

#[tokio::test]
async fn test_full_fill_untracks_and_forces_refresh() {
    let venue = Arc::new(MockVenue::new());
    let mut engine = engine_with(&venue, two_by_two(), HoldPolicy);
    engine.initialize().await.unwrap();
    let ask0 = handle_id(&engine, Side::Sell, 0);
    let bid0 = handle_id(&engine, Side::Buy, 0);

    venue.fill_order(&ask0, dec!(1.0)).await.unwrap();
    engine.run_once().await.unwrap();

    assert_eq!(engine.position().quantity, dec!(-1.0));
    assert_eq!(engine.book().active_count(), 3);
    assert!(engine.book().find(&ask0).is_none());

    // The full fill forces a rebuild past the hold policy.
    engine.run_once().await.unwrap();
    assert_eq!(engine.stats().bulk_refreshes, 1);
    assert_eq!(engine.book().active_count(), 4);
    assert_ne!(handle_id(&engine, Side::Sell, 0), ask0);
    assert_ne!(handle_id(&engine, Side::Buy, 0), bid0);
    assert_eq!(venue.live_order_ids(SYMBOL).await.len(), 4);
}

#[tokio::test]
async fn test_duplicate_fill_events_apply_once() {
    let venue = Arc::new(MockVenue::new());
    let mut engine = engine_with(&venue, two_by_two(), HoldPolicy);
    engine.initialize().await.unwrap();
    let bid0 = handle_id(&engine, Side::Buy, 0);

    let event = FillEvent {
        order_id: bid0.clone(),
        side: Side::Buy,
        level: Some(0),
        quantity: dec!(0.25),
        cumulative: dec!(0.25),
        remaining: dec!(0.75),
        price: dec!(99.0),
        timestamp: 1_000,
    };

    // Duplicate inside one batch and across batches.
    engine.process_fills(vec![event.clone(), event.clone()]);
    engine.process_fills(vec![event.clone()]);
    assert_eq!(engine.position().quantity, dec!(0.25));
    assert_eq!(engine.stats().fills_processed, 1);

    // A report that advances the cumulative quantity still applies.
    let progressed = FillEvent {
        quantity: dec!(0.25),
        cumulative: dec!(0.5),
        remaining: dec!(0.5),
        timestamp: 2_000,
        ..event
    };
    engine.process_fills(vec![progressed]);
    assert_eq!(engine.position().quantity, dec!(0.5));
    assert_eq!(engine.stats().fills_processed, 2);
}

#[tokio::test]
async fn test_failed_submit_leaves_no_phantom_handle() {
    let venue = Arc::new(MockVenue::new());
    // Two transport failures eat the first submit and its one retry.
    venue.fail_next_submits(2).await;
    let mut engine = engine_with(
        &venue,
        two_by_two(),
        ScriptedPolicy::of(vec![RefreshDecision::all()]),
    );

    engine.initialize().await.unwrap();

    assert_eq!(engine.book().active_count(), 3);
    assert!(!engine.book().active_side(Side::Sell).contains_key(&0));
    assert_eq!(engine.stats().submit_failures, 1);
    assert_eq!(venue.live_order_ids(SYMBOL).await.len(), 3);

    // The next full refresh re-quotes the hole.
    engine.run_once().await.unwrap();
    assert_eq!(engine.book().active_count(), 4);
    assert_eq!(venue.live_order_ids(SYMBOL).await.len(), 4);
}

#[tokio::test]
async fn test_bulk_refresh_rotates_all_orders() {
    let venue = Arc::new(MockVenue::new());
    let mut engine = engine_with(
        &venue,
        two_by_two(),
        ScriptedPolicy::of(vec![RefreshDecision::all()]),
    );
    engine.initialize().await.unwrap();
    let before: Vec<ClientOrderId> = engine.book().tracked_ids();

    engine.run_once().await.unwrap();

    let after = engine.book().tracked_ids();
    assert_eq!(after.len(), 4);
    for id in &before {
        assert!(!after.contains(id));
        let snapshot = venue.snapshot(id).await.unwrap();
        assert_eq!(snapshot.state, VenueOrderState::Cancelled);
    }
    assert_eq!(engine.stats().bulk_refreshes, 1);
    assert_eq!(engine.stats().orders_cancelled, 4);
    assert_eq!(venue.live_order_ids(SYMBOL).await.len(), 4);
    assert_eq!(venue.submission_log().await.len(), 8);
}

#[tokio::test]
async fn test_incremental_refresh_leaves_other_levels_resting() {
    let venue = Arc::new(MockVenue::new());
    let mut engine = engine_with(
        &venue,
        two_by_two(),
        ScriptedPolicy::of(vec![refresh_one(Side::Sell, 0)]),
    );
    engine.initialize().await.unwrap();
    let ask0 = handle_id(&engine, Side::Sell, 0);
    let ask1 = handle_id(&engine, Side::Sell, 1);
    let bid0 = handle_id(&engine, Side::Buy, 0);
    let bid1 = handle_id(&engine, Side::Buy, 1);

    engine.run_once().await.unwrap();

    // Only the targeted level was replaced.
    assert_ne!(handle_id(&engine, Side::Sell, 0), ask0);
    assert_eq!(handle_id(&engine, Side::Sell, 1), ask1);
    assert_eq!(handle_id(&engine, Side::Buy, 0), bid0);
    assert_eq!(handle_id(&engine, Side::Buy, 1), bid1);

    let snapshot = venue.snapshot(&ask0).await.unwrap();
    assert_eq!(snapshot.state, VenueOrderState::Cancelled);
    assert_eq!(engine.stats().incremental_refreshes, 1);
    assert_eq!(engine.stats().orders_cancelled, 1);
    assert_eq!(venue.live_order_ids(SYMBOL).await.len(), 4);
}

#[tokio::test]
async fn test_fill_racing_cancel_is_processed_once() {
    let venue = Arc::new(MockVenue::new());
    let mut engine = engine_with(
        &venue,
        two_by_two(),
        ScriptedPolicy::of(vec![RefreshDecision::all()]),
    );
    engine.initialize().await.unwrap();
    let ask0 = handle_id(&engine, Side::Sell, 0);

    // The order fills completely in the window before the cancel lands.
    venue.fill_during_next_cancel(&ask0, dec!(1.0)).await;
    engine.run_once().await.unwrap();

    assert_eq!(engine.position().quantity, dec!(-1.0));
    assert_eq!(engine.stats().fills_processed, 1);
    assert_eq!(engine.book().active_count(), 4);

    // Nothing left to double-count on the following hold iterations.
    engine.run_once().await.unwrap();
    assert_eq!(engine.position().quantity, dec!(-1.0));
    assert_eq!(engine.stats().fills_processed, 1);
}

#[tokio::test]
async fn test_unconfirmed_cancel_all_is_fatal() {
    let venue = Arc::new(MockVenue::new());
    let ladder = two_by_two();
    let strategy_calls = ladder.call_counter();
    let mut engine = engine_with(&venue, ladder, ScriptedPolicy::of(vec![RefreshDecision::all()]));
    engine.initialize().await.unwrap();

    // Both the attempt and its single retry fail.
    venue.fail_cancel_all_attempts(2).await;
    let err = engine.run_once().await.unwrap_err();

    match err {
        EngineError::CancelFailed { scope, attempts } => {
            assert_eq!(scope, SYMBOL);
            assert_eq!(attempts, 2);
        }
        other => panic!("expected CancelFailed, got {other:?}"),
    }

    // No replan, no resubmission, handles kept as-is.
    assert_eq!(strategy_calls.load(Ordering::Relaxed), 1);
    assert_eq!(venue.submission_log().await.len(), 4);
    assert_eq!(engine.book().active_count(), 4);
}

#[tokio::test]
async fn test_unconfirmed_single_cancel_is_fatal() {
    let venue = Arc::new(MockVenue::new());
    let mut engine = engine_with(
        &venue,
        two_by_two(),
        ScriptedPolicy::of(vec![refresh_one(Side::Sell, 0)]),
    );
    engine.initialize().await.unwrap();
    let ask0 = handle_id(&engine, Side::Sell, 0);

    venue.fail_next_cancels(2).await;
    let err = engine.run_once().await.unwrap_err();

    match err {
        EngineError::CancelFailed { scope, attempts } => {
            assert_eq!(scope, ask0.to_string());
            assert_eq!(attempts, 2);
        }
        other => panic!("expected CancelFailed, got {other:?}"),
    }
    assert_eq!(engine.book().active_count(), 4);
    assert_eq!(engine.stats().incremental_refreshes, 0);
}

#[tokio::test]
async fn test_transient_cancel_failure_is_retried() {
    let venue = Arc::new(MockVenue::new());
    let mut engine = engine_with(
        &venue,
        two_by_two(),
        ScriptedPolicy::of(vec![refresh_one(Side::Buy, 1)]),
    );
    engine.initialize().await.unwrap();
    let bid1 = handle_id(&engine, Side::Buy, 1);

    // One failure, one retry available: the refresh completes.
    venue.fail_next_cancels(1).await;
    engine.run_once().await.unwrap();

    assert_ne!(handle_id(&engine, Side::Buy, 1), bid1);
    assert_eq!(engine.stats().incremental_refreshes, 1);
    assert_eq!(venue.live_order_ids(SYMBOL).await.len(), 4);
}

#[tokio::test]
async fn test_strategy_outage_empties_book_then_recovers() {
    let venue = Arc::new(MockVenue::new());
    // Call 0 (initialize) succeeds, call 1 fails, call 2 recovers.
    let strategy = FlakyStrategy::new(two_by_two(), 1, 2);
    let mut engine = engine_with(
        &venue,
        strategy,
        ScriptedPolicy::of(vec![RefreshDecision::all()]),
    );
    engine.initialize().await.unwrap();

    // Cancel succeeds, replan fails: quotes stay down rather than stale.
    engine.run_once().await.unwrap();
    assert_eq!(engine.book().active_count(), 0);
    assert!(venue.live_order_ids(SYMBOL).await.is_empty());
    assert_eq!(engine.stats().bulk_refreshes, 0);

    // The forced refresh retries on the next iteration and recovers.
    engine.run_once().await.unwrap();
    assert_eq!(engine.book().active_count(), 4);
    assert_eq!(engine.stats().bulk_refreshes, 1);
    assert_eq!(venue.live_order_ids(SYMBOL).await.len(), 4);
}

#[tokio::test]
async fn test_incremental_strategy_failure_keeps_quotes_resting() {
    let venue = Arc::new(MockVenue::new());
    // Call 0 (initialize) succeeds, call 1 fails, call 2 recovers.
    let strategy = FlakyStrategy::new(two_by_two(), 1, 2);
    let mut engine = engine_with(
        &venue,
        strategy,
        ScriptedPolicy::of(vec![refresh_one(Side::Sell, 0)]),
    );
    engine.initialize().await.unwrap();
    let before = engine.book().tracked_ids();

    // No plan means no cancels: every order keeps resting.
    engine.run_once().await.unwrap();
    assert_eq!(engine.book().tracked_ids(), before);
    assert_eq!(venue.live_order_ids(SYMBOL).await.len(), 4);
    assert_eq!(engine.stats().incremental_refreshes, 0);
    assert_eq!(engine.stats().orders_cancelled, 0);

    // The scheduled full refresh rebuilds once the strategy recovers.
    engine.run_once().await.unwrap();
    assert_eq!(engine.stats().bulk_refreshes, 1);
    for id in &before {
        assert!(engine.book().find(id).is_none());
    }
    assert_eq!(engine.book().active_count(), 4);
}

#[tokio::test]
async fn test_forgotten_order_heals_through_incremental_refresh() {
    let venue = Arc::new(MockVenue::new());
    let mut engine = engine_with(
        &venue,
        two_by_two(),
        ScriptedPolicy::of(vec![refresh_one(Side::Sell, 0)]),
    );
    engine.initialize().await.unwrap();
    let ask0 = handle_id(&engine, Side::Sell, 0);

    // The venue lost the order entirely; cancelling it must not be fatal.
    venue.forget_order(&ask0).await;
    engine.run_once().await.unwrap();

    assert_ne!(handle_id(&engine, Side::Sell, 0), ask0);
    assert_eq!(engine.book().active_count(), 4);
    assert_eq!(engine.stats().incremental_refreshes, 1);
    assert_eq!(engine.stats().anomalies, 0);
}

#[tokio::test]
async fn test_externally_cancelled_order_is_dropped_and_counted() {
    let venue = Arc::new(MockVenue::new());
    let mut engine = engine_with(&venue, two_by_two(), HoldPolicy);
    engine.initialize().await.unwrap();
    let bid0 = handle_id(&engine, Side::Buy, 0);

    venue.cancel_order(&bid0, false).await.unwrap();
    engine.run_once().await.unwrap();

    // Dropped from tracking, counted as an anomaly, not re-quoted on hold.
    assert!(engine.book().find(&bid0).is_none());
    assert_eq!(engine.book().active_count(), 3);
    assert_eq!(engine.stats().anomalies, 1);
    assert_eq!(engine.position().quantity, dec!(0.0));
}

#[tokio::test]
async fn test_empty_side_ladder_quotes_one_side() {
    let venue = Arc::new(MockVenue::new());
    let ladder = FixedLadder::new(
        vec![(dec!(101.0), dec!(1.0)), (dec!(102.0), dec!(1.0))],
        vec![],
    );
    let mut engine = engine_with(&venue, ladder, HoldPolicy);

    engine.initialize().await.unwrap();

    assert_eq!(engine.book().active_count(), 2);
    assert!(engine.book().active_side(Side::Buy).is_empty());
    assert_eq!(venue.live_order_ids(SYMBOL).await.len(), 2);
}

#[tokio::test]
async fn test_run_cancels_everything_on_shutdown() {
    let venue = Arc::new(MockVenue::new());
    let engine = engine_with(&venue, two_by_two(), HoldPolicy);
    let shutdown = engine.shutdown_handle();

    // Shutdown requested before the loop starts: place, then tear down.
    shutdown.store(true, Ordering::Relaxed);
    let stats = engine.run().await.unwrap();

    assert_eq!(stats.orders_submitted, 4);
    assert_eq!(stats.orders_cancelled, 4);
    assert_eq!(stats.iterations, 0);
    assert!(venue.live_order_ids(SYMBOL).await.is_empty());
}
