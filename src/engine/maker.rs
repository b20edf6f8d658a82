//! The reconciliation loop.
//!
//! [`MakerEngine`] owns the local picture of resting quotes and keeps it
//! consistent with venue truth. Each iteration it asks its
//! [`RefreshPolicy`] what to do, then takes exactly one of three paths:
//!
//! - **hold**: poll every tracked order for fills and apply them,
//! - **full refresh**: cancel everything with confirmation, sweep for fills
//!   that landed before the cancels took effect, rebuild the ladder from the
//!   strategy and resubmit,
//! - **incremental refresh**: the same cycle scoped to a subset of levels,
//!   leaving the rest of the book resting.
//!
//! Orders the venue reports terminal or unknown are dropped from the book;
//! a cancellation that cannot be confirmed is fatal and stops the engine,
//! because quotes may still be live on the venue.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::Decimal;
use crate::book::level::{Level, RefreshSet};
use crate::book::state::{ActiveOrder, BookState};
use crate::engine::fills::{FillDetector, FillEvent, FillLedger, FillSweep};
use crate::engine::refresh::RefreshPolicy;
use crate::position::inventory::InventoryPosition;
use crate::strategy::StrategyProvider;
use crate::types::current_timestamp;
use crate::types::error::{EngineError, EngineResult};
use crate::venue::{ClientOrderId, VenueAdapter};

/// Engine tuning parameters.
///
/// # Example
///
/// ```
/// use maker_engine_rs::engine::EngineConfig;
///
/// let config = EngineConfig::new("BTC-USD")
///     .unwrap()
///     .with_poll_interval_ms(100)
///     .with_cancel_retries(2);
/// assert_eq!(config.symbol, "BTC-USD");
/// assert_eq!(config.poll_interval_ms, 100);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EngineConfig {
    /// Instrument the engine quotes.
    pub symbol: String,
    /// Delay between loop iterations, milliseconds.
    pub poll_interval_ms: u64,
    /// Transient-failure retries per cancel before it is fatal.
    pub cancel_retries: u32,
    /// Transient-failure retries per submit before the level is skipped.
    pub submit_retries: u32,
    /// Schedule a full refresh after an order fills completely.
    pub refresh_after_full_fill: bool,
    /// How long fill ledger entries outlive their last update, milliseconds.
    pub ledger_retention_ms: u64,
}

impl EngineConfig {
    /// Creates a configuration with default tuning for `symbol`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConfiguration`] if the symbol is empty.
    pub fn new(symbol: impl Into<String>) -> EngineResult<Self> {
        let symbol = symbol.into();
        if symbol.trim().is_empty() {
            return Err(EngineError::InvalidConfiguration(
                "symbol must not be empty".to_string(),
            ));
        }

        Ok(Self {
            symbol,
            poll_interval_ms: 250,
            cancel_retries: 1,
            submit_retries: 1,
            refresh_after_full_fill: true,
            ledger_retention_ms: 600_000,
        })
    }

    /// Sets the delay between loop iterations.
    #[must_use]
    pub fn with_poll_interval_ms(mut self, poll_interval_ms: u64) -> Self {
        self.poll_interval_ms = poll_interval_ms;
        self
    }

    /// Sets the transient-failure retry budget per cancel.
    #[must_use]
    pub fn with_cancel_retries(mut self, cancel_retries: u32) -> Self {
        self.cancel_retries = cancel_retries;
        self
    }

    /// Sets the transient-failure retry budget per submit.
    #[must_use]
    pub fn with_submit_retries(mut self, submit_retries: u32) -> Self {
        self.submit_retries = submit_retries;
        self
    }

    /// Enables or disables the full refresh after a complete fill.
    #[must_use]
    pub fn with_refresh_after_full_fill(mut self, enabled: bool) -> Self {
        self.refresh_after_full_fill = enabled;
        self
    }

    /// Sets the fill ledger retention window.
    #[must_use]
    pub fn with_ledger_retention_ms(mut self, ledger_retention_ms: u64) -> Self {
        self.ledger_retention_ms = ledger_retention_ms;
        self
    }
}

/// Counters accumulated over the engine's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EngineStats {
    /// Loop iterations completed.
    pub iterations: u64,
    /// Fill events applied to the position.
    pub fills_processed: u64,
    /// Full ladder rebuilds.
    pub bulk_refreshes: u64,
    /// Scoped level rebuilds.
    pub incremental_refreshes: u64,
    /// Orders submitted to the venue.
    pub orders_submitted: u64,
    /// Submissions that failed after retries.
    pub submit_failures: u64,
    /// Orders removed by cancellation during refreshes and shutdown.
    pub orders_cancelled: u64,
    /// Orders that vanished from the venue outside a refresh.
    pub anomalies: u64,
}

/// Market-making engine generic over venue, strategy and refresh policy.
///
/// The venue is shared behind an [`Arc`] so callers can keep a handle to it
/// while the engine runs; strategy and policy are owned.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
///
/// use maker_engine_rs::dec;
/// use maker_engine_rs::engine::{EngineConfig, HoldPolicy, MakerEngine};
/// use maker_engine_rs::strategy::{LadderConfig, LadderStrategy, SharedPrice};
/// use maker_engine_rs::venue::MockVenue;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), maker_engine_rs::EngineError> {
/// let price = SharedPrice::new();
/// price.set(dec!(100.0));
/// let strategy = LadderStrategy::new(
///     LadderConfig::new(2, dec!(0.001), dec!(0.5), dec!(10.0))?,
///     price,
/// );
///
/// let venue = Arc::new(MockVenue::new());
/// let config = EngineConfig::new("BTC-USD")?;
/// let mut engine = MakerEngine::new(Arc::clone(&venue), strategy, HoldPolicy, config);
///
/// engine.initialize().await?;
/// assert_eq!(engine.book().active_count(), 4);
/// # Ok(())
/// # }
/// ```
pub struct MakerEngine<V, S, P> {
    venue: Arc<V>,
    strategy: S,
    policy: P,
    config: EngineConfig,
    book: BookState,
    position: InventoryPosition,
    detector: FillDetector,
    ledger: FillLedger,
    stats: EngineStats,
    force_refresh: bool,
    shutdown: Arc<AtomicBool>,
}

impl<V, S, P> MakerEngine<V, S, P>
where
    V: VenueAdapter,
    S: StrategyProvider,
    P: RefreshPolicy,
{
    /// Creates an engine with an empty book and flat position.
    #[must_use]
    pub fn new(venue: Arc<V>, strategy: S, policy: P, config: EngineConfig) -> Self {
        Self {
            venue,
            strategy,
            policy,
            config,
            book: BookState::new(),
            position: InventoryPosition::new(),
            detector: FillDetector::new(),
            ledger: FillLedger::new(),
            stats: EngineStats::default(),
            force_refresh: false,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag that stops [`run`](Self::run) at the next iteration boundary.
    #[must_use]
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Lifetime counters.
    #[must_use]
    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    /// Current inventory.
    #[must_use]
    pub fn position(&self) -> &InventoryPosition {
        &self.position
    }

    /// Local picture of planned and resting orders.
    #[must_use]
    pub fn book(&self) -> &BookState {
        &self.book
    }

    /// Engine configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Computes the first quote plan and submits it.
    ///
    /// A strategy that cannot produce a valid plan yet is not an error; the
    /// engine starts with an empty book and retries via a forced refresh on
    /// the first iteration.
    ///
    /// # Errors
    ///
    /// Returns a fatal error if a submitted order cannot be tracked.
    pub async fn initialize(&mut self) -> EngineResult<()> {
        let plan = self.strategy.compute_levels(&self.position);
        match plan.and_then(|p| self.book.adopt_plan(p)) {
            Ok(()) => {
                self.submit_pending().await?;
                info!(
                    symbol = %self.config.symbol,
                    orders = self.book.active_count(),
                    "initial quotes placed"
                );
            }
            Err(e) => {
                warn!(error = %e, "no valid quote plan at startup, deferring to first refresh");
                self.force_refresh = true;
            }
        }
        Ok(())
    }

    /// Runs the reconciliation loop until the shutdown flag is set, then
    /// cancels all resting orders.
    ///
    /// # Errors
    ///
    /// Returns the first fatal error; resting orders are left as they are
    /// in that case, since their state on the venue is unknown.
    pub async fn run(mut self) -> EngineResult<EngineStats> {
        info!(symbol = %self.config.symbol, "maker engine starting");
        self.initialize().await?;

        while !self.shutdown.load(Ordering::Relaxed) {
            self.run_once().await?;
            sleep(Duration::from_millis(self.config.poll_interval_ms)).await;
        }

        self.halt().await?;
        info!(
            symbol = %self.config.symbol,
            iterations = self.stats.iterations,
            fills = self.stats.fills_processed,
            "maker engine stopped"
        );
        Ok(self.stats)
    }

    /// Executes one iteration of the reconciliation loop.
    ///
    /// Exposed so callers can drive the engine from their own scheduler
    /// instead of [`run`](Self::run).
    ///
    /// # Errors
    ///
    /// Returns fatal errors only; transient venue failures are absorbed and
    /// retried on later iterations.
    pub async fn run_once(&mut self) -> EngineResult<()> {
        self.stats.iterations += 1;

        let mut decision = self.policy.check(&self.book, current_timestamp());
        if self.force_refresh {
            decision.refresh_all = true;
            self.force_refresh = false;
        }

        if decision.is_hold() {
            let sweep = self.detector.sweep(self.venue.as_ref(), &self.book).await;
            self.apply_sweep(sweep, true);
        } else if decision.refresh_all {
            self.refresh_all_orders().await?;
        } else {
            self.refresh_levels(&decision.levels).await?;
        }

        self.ledger
            .prune(current_timestamp(), self.config.ledger_retention_ms);
        self.detector.retain_tracked(&self.book);
        Ok(())
    }

    /// Applies a batch of fill events to position and book.
    ///
    /// Events are ordered by `(timestamp, order_id)` before application, and
    /// the ledger drops any event whose cumulative quantity was already
    /// applied, so feeding the same batch twice changes nothing.
    pub fn process_fills(&mut self, mut fills: Vec<FillEvent>) {
        fills.sort_by(|a, b| (a.timestamp, &a.order_id).cmp(&(b.timestamp, &b.order_id)));

        for event in fills {
            if !self.ledger.admit(&event) {
                debug!(
                    order_id = %event.order_id,
                    cumulative = %event.cumulative,
                    "duplicate fill ignored"
                );
                continue;
            }

            self.position
                .apply_fill(event.side, event.quantity, event.price);
            self.stats.fills_processed += 1;
            info!(
                order_id = %event.order_id,
                side = %event.side,
                quantity = %event.quantity,
                price = %event.price,
                remaining = %event.remaining,
                position = %self.position.quantity,
                "fill applied"
            );

            if event.remaining <= Decimal::ZERO {
                self.book.untrack(&event.order_id);
                if self.config.refresh_after_full_fill {
                    self.force_refresh = true;
                }
            } else {
                self.book.reduce(&event.order_id, event.remaining);
            }
        }
    }

    /// Cancels all resting orders and stops tracking them.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::CancelFailed`] if the venue cannot confirm the
    /// cancellation; tracked handles are kept in that case.
    pub async fn halt(&mut self) -> EngineResult<()> {
        self.cancel_all_checked().await?;
        self.stats.orders_cancelled += self.book.active_count() as u64;
        self.book.clear_active();
        Ok(())
    }

    /// Routes sweep results into the book. When `unexpected` is set, defunct
    /// orders count as anomalies; refresh paths clear it because they just
    /// cancelled those orders themselves.
    fn apply_sweep(&mut self, sweep: FillSweep, unexpected: bool) {
        for id in &sweep.unreachable {
            self.book.mark_unknown(id);
        }
        for id in &sweep.acknowledged {
            self.book.confirm(id);
        }

        self.process_fills(sweep.fills);

        for id in &sweep.defunct {
            if self.book.untrack(id).is_some() && unexpected {
                self.stats.anomalies += 1;
                warn!(order_id = %id, "order vanished from venue without a fill");
            }
        }
    }

    async fn refresh_all_orders(&mut self) -> EngineResult<()> {
        let cancelled = self.book.active_count() as u64;
        self.cancel_all_checked().await?;

        // Fills that landed before the cancels took effect.
        let sweep = self.detector.sweep(self.venue.as_ref(), &self.book).await;
        self.apply_sweep(sweep, false);

        self.stats.orders_cancelled += cancelled;
        self.book.clear_active();

        let plan = self.strategy.compute_levels(&self.position);
        match plan.and_then(|p| self.book.adopt_plan(p)) {
            Ok(()) => {
                self.submit_pending().await?;
                self.force_refresh = false;
                self.stats.bulk_refreshes += 1;
                debug!(
                    symbol = %self.config.symbol,
                    orders = self.book.active_count(),
                    "ladder rebuilt"
                );
            }
            Err(e) => {
                warn!(error = %e, "no valid quote plan, book stays empty until the next attempt");
                self.force_refresh = true;
            }
        }
        Ok(())
    }

    async fn refresh_levels(&mut self, set: &RefreshSet) -> EngineResult<()> {
        // Fresh plan before any cancels: if the strategy cannot price, the
        // old quotes stay up and a full refresh is scheduled instead.
        let plan = self.strategy.compute_levels(&self.position).and_then(|p| {
            p.validate()?;
            Ok(p)
        });
        let plan = match plan {
            Ok(plan) => plan,
            Err(e) => {
                warn!(error = %e, "no valid quote plan, keeping quotes and scheduling a full refresh");
                self.force_refresh = true;
                return Ok(());
            }
        };

        let targets = self.book.tracked_ids_in(set);
        for id in &targets {
            self.cancel_order_checked(id).await?;
        }

        let sweep = self
            .detector
            .sweep_orders(self.venue.as_ref(), &self.book, &targets)
            .await;
        self.apply_sweep(sweep, false);

        self.stats.orders_cancelled += targets.len() as u64;
        self.book.clear_active_in(set);

        self.book.merge_levels(set, plan.select(set));
        self.submit_pending_in(set).await?;
        self.stats.incremental_refreshes += 1;
        Ok(())
    }

    async fn submit_pending(&mut self) -> EngineResult<()> {
        let pending = self.book.pending_submissions();
        self.submit_levels(pending).await
    }

    async fn submit_pending_in(&mut self, set: &RefreshSet) -> EngineResult<()> {
        let pending = self
            .book
            .pending_submissions()
            .into_iter()
            .filter(|level| set.contains(level.side, level.index))
            .collect();
        self.submit_levels(pending).await
    }

    /// Submits levels one by one. A submit that fails after retries leaves
    /// its level unquoted and is not tracked; the next refresh re-quotes it.
    async fn submit_levels(&mut self, levels: Vec<Level>) -> EngineResult<()> {
        for level in levels {
            match self.submit_level(&level).await {
                Ok(order) => self.book.track(order)?,
                Err(e) => {
                    self.stats.submit_failures += 1;
                    warn!(
                        side = %level.side,
                        level = level.index,
                        error = %e,
                        "submit failed, level left unquoted"
                    );
                }
            }
        }
        Ok(())
    }

    async fn submit_level(&mut self, level: &Level) -> EngineResult<ActiveOrder> {
        let order = level.to_limit_order(&self.config.symbol);
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.venue.submit_limit_order(&order, false).await {
                Ok(order_id) => {
                    self.stats.orders_submitted += 1;
                    debug!(
                        order_id = %order_id,
                        side = %level.side,
                        level = level.index,
                        price = %level.price,
                        quantity = %level.quantity,
                        "order submitted"
                    );
                    let mut active = ActiveOrder::from_level(level, current_timestamp());
                    active.client_order_id = order_id;
                    return Ok(active);
                }
                Err(e) if e.is_transient() && attempts <= self.config.submit_retries => {
                    debug!(
                        side = %level.side,
                        level = level.index,
                        attempt = attempts,
                        error = %e,
                        "submit failed, retrying"
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Cancels one order, treating "unknown order" as already cancelled.
    /// Transient failures are retried up to the configured budget; anything
    /// past that is fatal because the order may still be live.
    async fn cancel_order_checked(&mut self, id: &ClientOrderId) -> EngineResult<()> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.venue.cancel_order(id, true).await {
                Ok(()) => return Ok(()),
                Err(EngineError::UnknownOrder(_)) => {
                    // Already gone; the sweep that follows settles how.
                    return Ok(());
                }
                Err(e) if e.is_transient() && attempts <= self.config.cancel_retries => {
                    warn!(order_id = %id, attempt = attempts, error = %e, "cancel failed, retrying");
                }
                Err(e) => {
                    error!(order_id = %id, error = %e, "cancel could not be confirmed");
                    return Err(EngineError::CancelFailed {
                        scope: id.to_string(),
                        attempts,
                    });
                }
            }
        }
    }

    async fn cancel_all_checked(&mut self) -> EngineResult<()> {
        if let Err(e) = self
            .venue
            .cancel_all_orders(&self.config.symbol, true, self.config.cancel_retries)
            .await
        {
            error!(symbol = %self.config.symbol, error = %e, "cancel-all could not be confirmed");
            return Err(EngineError::CancelFailed {
                scope: self.config.symbol.clone(),
                attempts: self.config.cancel_retries + 1,
            });
        }
        Ok(())
    }
}
