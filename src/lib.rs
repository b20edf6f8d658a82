//! Order-lifecycle reconciliation engine for automated market making.
//!
//! This crate keeps a ladder of resting limit orders consistent with venue
//! truth. A strategy decides *where* to quote; the engine owns *everything
//! else* about order lifecycle: submission, fill detection by polling,
//! idempotent fill accounting, scheduled full and per-level refreshes, and
//! verified cancellation on teardown.
//!
//! # Overview
//!
//! - **[`venue`]**: the [`VenueAdapter`] contract plus [`venue::MockVenue`],
//!   a scripted in-memory venue for tests.
//! - **[`book`]**: planned quote levels ([`LevelPlan`]) and handles to live
//!   orders ([`BookState`]).
//! - **[`strategy`]**: the [`StrategyProvider`] seam and a symmetric ladder
//!   implementation.
//! - **[`engine`]**: fill detection, refresh policies and [`MakerEngine`],
//!   the reconciliation loop.
//! - **[`position`]**: inventory and P&L bookkeeping driven by fills.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use maker_engine_rs::dec;
//! use maker_engine_rs::engine::{EngineConfig, IntervalPolicy, MakerEngine};
//! use maker_engine_rs::strategy::{LadderConfig, LadderStrategy, SharedPrice};
//! use maker_engine_rs::venue::MockVenue;
//! use maker_engine_rs::Side;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), maker_engine_rs::EngineError> {
//! // The strategy reads its reference price from a shared cell.
//! let price = SharedPrice::new();
//! price.set(dec!(30000.0));
//! let strategy = LadderStrategy::new(
//!     LadderConfig::new(3, dec!(0.001), dec!(0.1), dec!(5.0))?,
//!     price.clone(),
//! );
//!
//! let venue = Arc::new(MockVenue::new());
//! let config = EngineConfig::new("BTC-USD")?.with_poll_interval_ms(100);
//! let mut engine = MakerEngine::new(
//!     Arc::clone(&venue),
//!     strategy,
//!     IntervalPolicy::new(30_000),
//!     config,
//! );
//!
//! // Quote three levels per side.
//! engine.initialize().await?;
//! assert_eq!(engine.book().active_count(), 6);
//!
//! // A fill lands on the venue; the next iteration picks it up.
//! let best_bid = engine.book().active_side(Side::Buy)[&0]
//!     .client_order_id
//!     .clone();
//! venue.fill_order(&best_bid, dec!(0.1)).await?;
//! engine.run_once().await?;
//! assert_eq!(engine.position().quantity, dec!(0.1));
//! # Ok(())
//! # }
//! ```

/// Order book state: quote plans and live-order handles.
pub mod book;

/// Fill detection, refresh policies and the reconciliation loop.
pub mod engine;

/// Inventory and P&L bookkeeping.
pub mod position;

/// Strategy seam and bundled quoting strategies.
pub mod strategy;

/// Error taxonomy and shared primitives.
pub mod types;

/// Venue connectivity.
pub mod venue;

pub use rust_decimal::Decimal;
pub use rust_decimal_macros::dec;

pub use book::{ActiveOrder, BookState, Level, LevelPlan, RefreshSet};
pub use engine::{EngineConfig, EngineStats, MakerEngine};
pub use position::InventoryPosition;
pub use strategy::StrategyProvider;
pub use types::error::{EngineError, EngineResult};
pub use venue::{ClientOrderId, Side, VenueAdapter};
