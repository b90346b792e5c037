//! Open position records

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// An open exposure in one instrument. Owned exclusively by the lifecycle
/// manager: created on fill, marked on every price tick, destroyed on exit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub ticker: String,
    /// Signed quantity: positive long, negative short. The sign never flips
    /// without an intervening zero-crossing close.
    pub quantity: Decimal,
    pub average_entry_price: Decimal,
    pub current_price: Decimal,
    pub unrealized_pnl: Decimal,
    pub stop_loss: Decimal,
    pub target_price: Decimal,
    pub opened_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Position {
    pub fn new(
        ticker: &str,
        quantity: Decimal,
        entry_price: Decimal,
        stop_loss: Decimal,
        target_price: Decimal,
    ) -> Self {
        let now = Utc::now();
        Self {
            ticker: ticker.to_string(),
            quantity,
            average_entry_price: entry_price,
            current_price: entry_price,
            unrealized_pnl: Decimal::ZERO,
            stop_loss,
            target_price,
            opened_at: now,
            updated_at: now,
        }
    }

    pub fn is_long(&self) -> bool {
        self.quantity > Decimal::ZERO
    }

    /// Absolute market value at the current mark
    pub fn market_value(&self) -> Decimal {
        (self.quantity * self.current_price).abs()
    }

    /// Refresh the mark and recompute unrealized P&L
    pub fn update_mark(&mut self, price: Decimal) {
        self.current_price = price;
        self.unrealized_pnl = (price - self.average_entry_price) * self.quantity;
        self.updated_at = Utc::now();
    }

    /// True when the current mark has breached the stop for this side
    pub fn stop_breached(&self) -> bool {
        if self.is_long() {
            self.current_price <= self.stop_loss
        } else {
            self.current_price >= self.stop_loss
        }
    }

    /// True when the current mark has reached the target for this side
    pub fn target_reached(&self) -> bool {
        if self.is_long() {
            self.current_price >= self.target_price
        } else {
            self.current_price <= self.target_price
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_long_pnl_and_exits() {
        let mut pos = Position::new("AAPL", dec!(10), dec!(100), dec!(95), dec!(110));

        pos.update_mark(dec!(105));
        assert_eq!(pos.unrealized_pnl, dec!(50));
        assert!(!pos.stop_breached());
        assert!(!pos.target_reached());

        pos.update_mark(dec!(94));
        assert!(pos.stop_breached());

        pos.update_mark(dec!(111));
        assert!(pos.target_reached());
    }

    #[test]
    fn test_short_pnl_and_exits() {
        let mut pos = Position::new("TSLA", dec!(-5), dec!(200), dec!(210), dec!(180));

        pos.update_mark(dec!(190));
        assert_eq!(pos.unrealized_pnl, dec!(50));
        assert!(!pos.stop_breached());

        pos.update_mark(dec!(211));
        assert!(pos.stop_breached());

        pos.update_mark(dec!(179));
        assert!(pos.target_reached());
    }
}
