//! Order book state: planned quote levels and live-order handles.

pub mod level;
pub mod state;

pub use level::{Level, LevelPlan, RefreshSet};
pub use state::{ActiveOrder, BookState, HandleStatus};
