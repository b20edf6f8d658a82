//! Reconciliation engine: fill detection, refresh scheduling and the
//! order-lifecycle loop that ties them together.

pub mod fills;
pub mod maker;
pub mod refresh;

pub use fills::{FillDetector, FillEvent, FillLedger, FillSweep};
pub use maker::{EngineConfig, EngineStats, MakerEngine};
pub use refresh::{HoldPolicy, IntervalPolicy, RefreshDecision, RefreshPolicy};
