//! Position sizing
//!
//! Converts an approved fused signal into a concrete order quantity:
//! conviction-scaled risk budget normalized by the stop distance, capped by
//! a fractional-Kelly estimate and a hard per-position limit.

use crate::config::{InstrumentInfo, SizerConfig};
use crate::gate::OrderCandidate;
use common::{FusedSignal, OrderSide, OrderType, PipelineOrder, SignalDirection};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use uuid::Uuid;

pub struct PositionSizer {
    config: SizerConfig,
}

impl PositionSizer {
    pub fn new(config: SizerConfig) -> Self {
        Self { config }
    }

    /// Propose a candidate order for the gate. Returns `None` when the
    /// signal cannot be sized: no stop distance, no Kelly edge, or a zero
    /// size multiplier (breaker open).
    pub fn propose(
        &self,
        fused: &FusedSignal,
        info: &InstrumentInfo,
        equity: f64,
        stop_multiplier: f64,
        size_multiplier: f64,
    ) -> Option<OrderCandidate> {
        if equity <= 0.0 || size_multiplier <= 0.0 {
            return None;
        }

        let entry = fused.entry_price.to_f64()?;
        let stop = fused.stop_loss.to_f64()?;
        let target = fused.target_price.to_f64()?;

        let raw_stop_distance = (entry - stop).abs();
        if raw_stop_distance <= 0.0 || entry <= 0.0 {
            return None;
        }
        // Regimes tighten stops via the multiplier; a tighter stop shrinks
        // the per-share risk and the quantity alike
        let stop_distance = raw_stop_distance * stop_multiplier.max(0.1);

        let conviction = (fused.composite_score.abs() / 100.0).clamp(0.0, 1.0);
        let risk_amount =
            equity * self.config.risk_per_trade_pct * conviction * size_multiplier;
        if risk_amount <= 0.0 {
            return None;
        }

        let mut quantity = risk_amount / stop_distance;

        // Fractional-Kelly cap from the signal's reward/risk geometry
        let b = (target - entry).abs() / raw_stop_distance;
        let p = 0.5 + conviction * 0.25;
        let q = 1.0 - p;
        if b <= 0.0 {
            return None;
        }
        let kelly = ((b * p - q) / b) * self.config.kelly_multiplier;
        if kelly <= 0.0 {
            tracing::debug!(
                ticker = %fused.ticker,
                reward_risk = b,
                "Signal has no Kelly edge, not sized"
            );
            return None;
        }
        let kelly_cap = kelly * equity / entry;
        quantity = quantity.min(kelly_cap);

        // Hard per-position cap
        let position_cap = self.config.max_position_pct * equity / entry;
        quantity = quantity.min(position_cap);

        let quantity = Decimal::from_f64(quantity)?.round_dp(4);
        if quantity <= Decimal::ZERO {
            return None;
        }

        let side = match fused.direction() {
            SignalDirection::Long => OrderSide::Buy,
            SignalDirection::Short => OrderSide::Sell,
        };

        Some(OrderCandidate {
            ticker: fused.ticker.clone(),
            sector: info.sector.clone(),
            side,
            quantity,
            price: fused.entry_price,
            reduce_only: false,
        })
    }

    /// Build the routable order once the gate has authorized a quantity
    pub fn build_order(
        &self,
        fused: &FusedSignal,
        info: &InstrumentInfo,
        candidate: &OrderCandidate,
        quantity: Decimal,
        risk_decision_id: Uuid,
    ) -> PipelineOrder {
        PipelineOrder::new(
            &candidate.ticker,
            info.asset_class,
            candidate.side,
            quantity,
            OrderType::Market,
            fused.id,
            risk_decision_id,
        )
    }
}

impl Default for PositionSizer {
    fn default() -> Self {
        Self::new(SizerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use common::{SignalSource, SignalType, SourceContribution};
    use rust_decimal_macros::dec;

    fn fused(composite: f64, entry: Decimal, stop: Decimal, target: Decimal) -> FusedSignal {
        FusedSignal {
            id: Uuid::new_v4(),
            ticker: "AAPL".to_string(),
            composite_score: composite,
            contributing_sources: vec![SourceContribution {
                source: SignalSource::EmaCloud,
                weight: 0.2,
                raw_score: composite,
            }],
            agreement_ratio: 1.0,
            decay_applied: false,
            dominant_type: SignalType::Momentum,
            dominant_direction: if composite >= 0.0 {
                SignalDirection::Long
            } else {
                SignalDirection::Short
            },
            entry_price: entry,
            stop_loss: stop,
            target_price: target,
            signal_ids: vec![Uuid::new_v4()],
            fused_at: Utc::now(),
        }
    }

    fn sizer() -> PositionSizer {
        PositionSizer::default()
    }

    #[test]
    fn test_sizes_long_signal() {
        let candidate = sizer()
            .propose(
                &fused(80.0, dec!(100), dec!(95), dec!(115)),
                &InstrumentInfo::unknown(),
                100_000.0,
                1.0,
                1.0,
            )
            .unwrap();

        assert_eq!(candidate.side, OrderSide::Buy);
        assert!(candidate.quantity > Decimal::ZERO);
        // Never past the 10% position cap
        assert!(candidate.notional() <= 10_000.0 + 1.0);
    }

    #[test]
    fn test_short_signal_sells() {
        let candidate = sizer()
            .propose(
                &fused(-70.0, dec!(100), dec!(105), dec!(85)),
                &InstrumentInfo::unknown(),
                100_000.0,
                1.0,
                1.0,
            )
            .unwrap();

        assert_eq!(candidate.side, OrderSide::Sell);
    }

    #[test]
    fn test_higher_conviction_sizes_larger() {
        let small = sizer()
            .propose(
                &fused(30.0, dec!(100), dec!(95), dec!(115)),
                &InstrumentInfo::unknown(),
                100_000.0,
                1.0,
                1.0,
            )
            .unwrap();
        let large = sizer()
            .propose(
                &fused(90.0, dec!(100), dec!(95), dec!(115)),
                &InstrumentInfo::unknown(),
                100_000.0,
                1.0,
                1.0,
            )
            .unwrap();

        assert!(large.quantity > small.quantity);
    }

    #[test]
    fn test_zero_size_multiplier_blocks_entry() {
        assert!(sizer()
            .propose(
                &fused(80.0, dec!(100), dec!(95), dec!(115)),
                &InstrumentInfo::unknown(),
                100_000.0,
                1.0,
                0.0,
            )
            .is_none());
    }

    #[test]
    fn test_half_open_multiplier_halves_risk() {
        let full = sizer()
            .propose(
                &fused(40.0, dec!(100), dec!(95), dec!(115)),
                &InstrumentInfo::unknown(),
                100_000.0,
                1.0,
                1.0,
            )
            .unwrap();
        let probation = sizer()
            .propose(
                &fused(40.0, dec!(100), dec!(95), dec!(115)),
                &InstrumentInfo::unknown(),
                100_000.0,
                1.0,
                0.5,
            )
            .unwrap();

        let ratio = probation.quantity.to_f64().unwrap() / full.quantity.to_f64().unwrap();
        assert!((ratio - 0.5).abs() < 0.05);
    }

    #[test]
    fn test_poor_reward_risk_not_sized() {
        // Target barely above entry with a wide stop: no Kelly edge
        assert!(sizer()
            .propose(
                &fused(40.0, dec!(100), dec!(90), dec!(101)),
                &InstrumentInfo::unknown(),
                100_000.0,
                1.0,
                1.0,
            )
            .is_none());
    }

    #[test]
    fn test_build_order_links_ids() {
        let sizer = sizer();
        let fused = fused(80.0, dec!(100), dec!(95), dec!(115));
        let candidate = sizer
            .propose(&fused, &InstrumentInfo::unknown(), 100_000.0, 1.0, 1.0)
            .unwrap();

        let decision_id = Uuid::new_v4();
        let order = sizer.build_order(
            &fused,
            &InstrumentInfo::unknown(),
            &candidate,
            candidate.quantity,
            decision_id,
        );

        assert_eq!(order.signal_id, fused.id);
        assert_eq!(order.risk_decision_id, decision_id);
        assert_eq!(order.status, common::OrderStatus::Pending);
    }
}
