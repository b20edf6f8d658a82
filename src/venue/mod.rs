//! Venue connectivity: the adapter contract and a scripted test venue.

pub mod adapter;
pub mod mock;

pub use adapter::{
    ClientOrderId, LimitOrder, MarketOrder, OrderSnapshot, Side, TimeInForce, VenueAdapter,
    VenueOrderState,
};
pub use mock::MockVenue;
