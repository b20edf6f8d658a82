//! Average-cost inventory tracking.

use rust_decimal::prelude::Signed;

use crate::Decimal;
use crate::venue::Side;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Net position accumulated from fills.
///
/// Positive quantity is long, negative is short. Fills that extend the
/// position blend into the average entry price; fills that reduce it realize
/// PnL against that average.
///
/// # Example
///
/// ```rust
/// use maker_engine_rs::position::InventoryPosition;
/// use maker_engine_rs::venue::Side;
/// use maker_engine_rs::dec;
///
/// let mut position = InventoryPosition::new();
/// position.apply_fill(Side::Buy, dec!(2.0), dec!(100.0));
/// position.apply_fill(Side::Sell, dec!(1.0), dec!(110.0));
///
/// assert_eq!(position.quantity, dec!(1.0));
/// assert_eq!(position.realized_pnl, dec!(10.0));
/// assert_eq!(position.unrealized_pnl(dec!(105.0)), dec!(5.0));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct InventoryPosition {
    /// Signed net quantity.
    pub quantity: Decimal,
    /// Average entry price of the open quantity.
    pub avg_entry_price: Decimal,
    /// PnL locked in by position-reducing fills.
    pub realized_pnl: Decimal,
}

impl InventoryPosition {
    /// Creates a flat position.
    #[must_use]
    pub fn new() -> Self {
        Self {
            quantity: Decimal::ZERO,
            avg_entry_price: Decimal::ZERO,
            realized_pnl: Decimal::ZERO,
        }
    }

    /// Applies one fill to the position.
    pub fn apply_fill(&mut self, side: Side, quantity: Decimal, price: Decimal) {
        let signed = match side {
            Side::Buy => quantity,
            Side::Sell => -quantity,
        };
        let new_quantity = self.quantity + signed;

        if self.quantity.is_zero() || self.quantity.signum() == signed.signum() {
            // Extending: blend the average entry price.
            let total = self.quantity.abs() + quantity;
            if !total.is_zero() {
                self.avg_entry_price =
                    (self.avg_entry_price * self.quantity.abs() + price * quantity) / total;
            }
        } else if new_quantity.is_zero() || new_quantity.signum() == self.quantity.signum() {
            // Reducing: realize against the average entry.
            let closed = quantity.min(self.quantity.abs());
            self.realized_pnl += closed * (price - self.avg_entry_price) * self.quantity.signum();
            if new_quantity.is_zero() {
                self.avg_entry_price = Decimal::ZERO;
            }
        } else {
            // Crossing through flat: close everything, restart the average
            // on the other side.
            let closed = self.quantity.abs();
            self.realized_pnl += closed * (price - self.avg_entry_price) * self.quantity.signum();
            self.avg_entry_price = price;
        }
        self.quantity = new_quantity;
    }

    /// Mark-to-market PnL of the open quantity at `price`.
    #[must_use]
    pub fn unrealized_pnl(&self, price: Decimal) -> Decimal {
        self.quantity * (price - self.avg_entry_price)
    }

    /// Realized plus unrealized PnL at `price`.
    #[must_use]
    pub fn total_pnl(&self, price: Decimal) -> Decimal {
        self.realized_pnl + self.unrealized_pnl(price)
    }

    /// Notional value of the open quantity at `price`.
    #[must_use]
    pub fn notional(&self, price: Decimal) -> Decimal {
        self.quantity.abs() * price
    }

    /// Returns true when no quantity is open.
    #[must_use]
    pub fn is_flat(&self) -> bool {
        self.quantity.is_zero()
    }
}

impl Default for InventoryPosition {
    fn default() -> Self {
        Self::new()
    }
}
