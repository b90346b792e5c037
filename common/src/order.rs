//! Pipeline order records and their status transitions

use crate::error::PipelineError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Order side
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrderSide {
    Buy,
    Sell,
}

/// Order type
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    Market,
    Limit,
}

/// Asset class of the instrument, used by the router's venue eligibility
/// filter
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AssetClass {
    Equity,
    FractionalEquity,
    Crypto,
    Option,
}

/// Order lifecycle status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Routed,
    Filled,
    Rejected,
    Failed,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Rejected | OrderStatus::Failed
        )
    }
}

/// The unit handed to the order router. Created by the sizer; status is
/// mutated only by the router and lifecycle manager; retained until
/// settlement for audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineOrder {
    /// Client-assigned id, doubles as the idempotency token across retries
    pub id: Uuid,
    pub ticker: String,
    pub asset_class: AssetClass,
    pub side: OrderSide,
    pub quantity: Decimal,
    pub order_type: OrderType,
    pub limit_price: Option<Decimal>,
    /// Back-reference to the fused signal that produced this order
    pub signal_id: Uuid,
    /// Exactly one risk decision authorizes an order
    pub risk_decision_id: Uuid,
    pub status: OrderStatus,
    /// Reduce-only orders may shrink an existing position but never extend
    /// or open one
    pub reduce_only: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PipelineOrder {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ticker: &str,
        asset_class: AssetClass,
        side: OrderSide,
        quantity: Decimal,
        order_type: OrderType,
        signal_id: Uuid,
        risk_decision_id: Uuid,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            ticker: ticker.to_string(),
            asset_class,
            side,
            quantity,
            order_type,
            limit_price: None,
            signal_id,
            risk_decision_id,
            status: OrderStatus::Pending,
            reduce_only: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move the order to `next`, rejecting edges outside
    /// pending -> routed -> filled | rejected | failed.
    pub fn transition(&mut self, next: OrderStatus) -> Result<(), PipelineError> {
        let allowed = match (self.status, next) {
            (OrderStatus::Pending, OrderStatus::Routed)
            | (OrderStatus::Pending, OrderStatus::Rejected)
            | (OrderStatus::Pending, OrderStatus::Failed)
            | (OrderStatus::Routed, OrderStatus::Filled)
            | (OrderStatus::Routed, OrderStatus::Rejected)
            | (OrderStatus::Routed, OrderStatus::Failed) => true,
            _ => false,
        };

        if !allowed {
            return Err(PipelineError::Validation(format!(
                "invalid order transition {:?} -> {:?} for order {}",
                self.status, next, self.id
            )));
        }

        tracing::debug!(
            order_id = %self.id,
            ticker = %self.ticker,
            from = ?self.status,
            to = ?next,
            "Order status transition"
        );

        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn test_order() -> PipelineOrder {
        PipelineOrder::new(
            "AAPL",
            AssetClass::Equity,
            OrderSide::Buy,
            dec!(10),
            OrderType::Market,
            Uuid::new_v4(),
            Uuid::new_v4(),
        )
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut order = test_order();
        order.transition(OrderStatus::Routed).unwrap();
        order.transition(OrderStatus::Filled).unwrap();
        assert!(order.status.is_terminal());
    }

    #[test]
    fn test_illegal_transition_rejected() {
        let mut order = test_order();
        order.transition(OrderStatus::Routed).unwrap();
        order.transition(OrderStatus::Filled).unwrap();

        // Terminal states accept no further edges
        assert!(order.transition(OrderStatus::Routed).is_err());
        assert!(order.transition(OrderStatus::Failed).is_err());
    }

    #[test]
    fn test_pending_cannot_fill_directly() {
        let mut order = test_order();
        assert!(order.transition(OrderStatus::Filled).is_err());
    }
}
