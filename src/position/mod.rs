//! Inventory accounting fed by processed fills.

pub mod inventory;

pub use inventory::InventoryPosition;
