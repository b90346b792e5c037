//! Position lifecycle management
//!
//! Owns the position book: creates positions on fills, marks them on price
//! ticks, emits exit orders on stop/target breaches, and generates the
//! emergency close-all set for the kill switch. The book lives behind one
//! async mutex, so the periodic sweep and an emergency close-all can never
//! interleave.

use crate::broker::FillReport;
use chrono::{DateTime, Utc};
use common::{
    AssetClass, OrderSide, OrderType, PipelineOrder, Position, SignalSource,
};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Why a position (or part of one) was closed
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    StopLoss,
    TargetHit,
    Emergency,
    Manual,
}

/// Realized result of a closed trade, fed to the feedback loop and the
/// circuit breaker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeOutcome {
    pub ticker: String,
    pub realized_pnl: f64,
    pub quantity_closed: f64,
    /// Sources whose signals opened the position, for weight attribution
    pub sources: Vec<SignalSource>,
    pub reason: ExitReason,
    pub closed_at: DateTime<Utc>,
}

impl TradeOutcome {
    pub fn is_win(&self) -> bool {
        self.realized_pnl > 0.0
    }
}

/// Entry context attached when a fill opens or extends a position
#[derive(Debug, Clone)]
pub struct OpenContext {
    pub stop_loss: Decimal,
    pub target_price: Decimal,
    pub sources: Vec<SignalSource>,
    pub asset_class: AssetClass,
}

#[derive(Debug, Clone)]
struct ManagedPosition {
    position: Position,
    sources: Vec<SignalSource>,
    asset_class: AssetClass,
}

pub struct LifecycleManager {
    book: Mutex<HashMap<String, ManagedPosition>>,
}

impl LifecycleManager {
    pub fn new() -> Self {
        Self {
            book: Mutex::new(HashMap::new()),
        }
    }

    /// Apply a fill to the book. Opening and extending fills need an
    /// `OpenContext`; reducing fills realize P&L and return the outcome.
    /// A fill larger than the open quantity closes through zero and opens
    /// the remainder on the other side, preserving the sign invariant.
    pub async fn apply_fill(
        &self,
        order: &PipelineOrder,
        fill: &FillReport,
        context: Option<OpenContext>,
        reason: ExitReason,
    ) -> anyhow::Result<Option<TradeOutcome>> {
        let mut book = self.book.lock().await;

        let signed_fill = match order.side {
            OrderSide::Buy => fill.filled_quantity,
            OrderSide::Sell => -fill.filled_quantity,
        };

        match book.get_mut(&order.ticker) {
            None => {
                let context = context.ok_or_else(|| {
                    anyhow::anyhow!(
                        "fill for {} opens a position but carries no entry context",
                        order.ticker
                    )
                })?;
                let position = Position::new(
                    &order.ticker,
                    signed_fill,
                    fill.fill_price,
                    context.stop_loss,
                    context.target_price,
                );
                tracing::info!(
                    ticker = %order.ticker,
                    quantity = %signed_fill,
                    price = %fill.fill_price,
                    "Position opened"
                );
                book.insert(
                    order.ticker.clone(),
                    ManagedPosition {
                        position,
                        sources: context.sources,
                        asset_class: context.asset_class,
                    },
                );
                Ok(None)
            }
            Some(managed) => {
                let current = managed.position.quantity;
                let same_direction = (current > Decimal::ZERO) == (signed_fill > Decimal::ZERO);

                if same_direction {
                    // Extend: new weighted average entry
                    let total = current + signed_fill;
                    let cost = managed.position.average_entry_price * current
                        + fill.fill_price * signed_fill;
                    managed.position.average_entry_price = cost / total;
                    managed.position.quantity = total;
                    managed.position.update_mark(fill.fill_price);
                    if let Some(context) = context {
                        managed.position.stop_loss = context.stop_loss;
                        managed.position.target_price = context.target_price;
                        for source in context.sources {
                            if !managed.sources.contains(&source) {
                                managed.sources.push(source);
                            }
                        }
                    }
                    return Ok(None);
                }

                // Reducing fill: realize P&L on the closed quantity
                let close_qty = fill.filled_quantity.min(current.abs());
                let direction = if current > Decimal::ZERO {
                    Decimal::ONE
                } else {
                    -Decimal::ONE
                };
                let realized = (fill.fill_price - managed.position.average_entry_price)
                    * close_qty
                    * direction;

                let outcome = TradeOutcome {
                    ticker: order.ticker.clone(),
                    realized_pnl: realized.to_f64().unwrap_or(0.0),
                    quantity_closed: close_qty.to_f64().unwrap_or(0.0),
                    sources: managed.sources.clone(),
                    reason,
                    closed_at: Utc::now(),
                };

                let remainder = current + signed_fill;
                if remainder == Decimal::ZERO {
                    tracing::info!(
                        ticker = %order.ticker,
                        realized_pnl = outcome.realized_pnl,
                        reason = ?reason,
                        "Position closed"
                    );
                    book.remove(&order.ticker);
                } else if (remainder > Decimal::ZERO) == (current > Decimal::ZERO) {
                    // Partial close, same side remains
                    managed.position.quantity = remainder;
                    managed.position.update_mark(fill.fill_price);
                    tracing::info!(
                        ticker = %order.ticker,
                        remaining = %remainder,
                        realized_pnl = outcome.realized_pnl,
                        "Position partially closed"
                    );
                } else {
                    // Zero-crossing: the old side is fully closed above;
                    // reopen the remainder on the other side
                    let context = context.ok_or_else(|| {
                        anyhow::anyhow!(
                            "zero-crossing fill for {} carries no entry context",
                            order.ticker
                        )
                    })?;
                    let reopened = Position::new(
                        &order.ticker,
                        remainder,
                        fill.fill_price,
                        context.stop_loss,
                        context.target_price,
                    );
                    tracing::info!(
                        ticker = %order.ticker,
                        quantity = %remainder,
                        "Position reversed through zero-crossing close"
                    );
                    managed.position = reopened;
                    managed.sources = context.sources;
                    managed.asset_class = context.asset_class;
                }

                Ok(Some(outcome))
            }
        }
    }

    /// Mark positions against fresh quotes and return reduce-only exit
    /// orders for any stop/target breach. Runs under the book mutex, so it
    /// cannot interleave with an emergency close-all.
    pub async fn sweep(&self, quotes: &HashMap<String, Decimal>) -> Vec<(PipelineOrder, ExitReason)> {
        let mut book = self.book.lock().await;
        let mut exits = Vec::new();

        for managed in book.values_mut() {
            let Some(price) = quotes.get(&managed.position.ticker) else {
                continue;
            };
            managed.position.update_mark(*price);

            let reason = if managed.position.stop_breached() {
                Some(ExitReason::StopLoss)
            } else if managed.position.target_reached() {
                Some(ExitReason::TargetHit)
            } else {
                None
            };

            if let Some(reason) = reason {
                tracing::info!(
                    ticker = %managed.position.ticker,
                    price = %price,
                    reason = ?reason,
                    "Exit triggered"
                );
                exits.push((Self::close_order(managed, managed.position.quantity.abs()), reason));
            }
        }

        exits
    }

    /// Reduce-only close orders for every open position. Invoked by the
    /// kill switch's emergency close-all.
    pub async fn emergency_close_orders(&self) -> Vec<PipelineOrder> {
        let book = self.book.lock().await;
        book.values()
            .map(|managed| Self::close_order(managed, managed.position.quantity.abs()))
            .collect()
    }

    /// Partial reduce-only close for one position
    pub async fn reduce_order(&self, ticker: &str, quantity: Decimal) -> Option<PipelineOrder> {
        let book = self.book.lock().await;
        let managed = book.get(ticker)?;
        let capped = quantity.min(managed.position.quantity.abs());
        if capped <= Decimal::ZERO {
            return None;
        }
        Some(Self::close_order(managed, capped))
    }

    fn close_order(managed: &ManagedPosition, quantity: Decimal) -> PipelineOrder {
        let side = if managed.position.is_long() {
            OrderSide::Sell
        } else {
            OrderSide::Buy
        };
        let mut order = PipelineOrder::new(
            &managed.position.ticker,
            managed.asset_class,
            side,
            quantity,
            OrderType::Market,
            Uuid::new_v4(),
            Uuid::new_v4(),
        );
        order.reduce_only = true;
        order
    }

    pub async fn open_positions(&self) -> Vec<Position> {
        let book = self.book.lock().await;
        book.values().map(|m| m.position.clone()).collect()
    }

    pub async fn position_count(&self) -> usize {
        self.book.lock().await.len()
    }

    pub async fn total_exposure(&self) -> f64 {
        let book = self.book.lock().await;
        book.values()
            .map(|m| m.position.market_value().to_f64().unwrap_or(0.0))
            .sum()
    }
}

impl Default for LifecycleManager {
    fn default() -> Self {
        Self::new()
    }
}
