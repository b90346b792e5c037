//! Unified risk gate with correlation guard
//!
//! Checks run in a fixed order and short-circuit on the first failure:
//! snapshot staleness, drawdown limit, single-instrument exposure cap,
//! sector concentration cap, portfolio correlation cap, order velocity.
//! Every decision carries the before/after correlation and the triggering
//! threshold so the audit trail can reconstruct it.

use crate::config::RiskLimits;
use crate::correlation::CorrelationView;
use chrono::{DateTime, Utc};
use common::{OrderSide, Published, RiskSnapshot};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// A candidate trade presented to the gate
#[derive(Debug, Clone)]
pub struct OrderCandidate {
    pub ticker: String,
    pub sector: String,
    pub side: OrderSide,
    pub quantity: Decimal,
    pub price: Decimal,
    pub reduce_only: bool,
}

impl OrderCandidate {
    pub fn notional(&self) -> f64 {
        use rust_decimal::prelude::ToPrimitive;
        (self.quantity * self.price).abs().to_f64().unwrap_or(0.0)
    }
}

/// Gate verdict
#[derive(Debug, Clone, PartialEq)]
pub enum GateDecision {
    Allow,
    Resize { new_quantity: Decimal },
    Deny { reason: String },
}

impl GateDecision {
    pub fn is_deny(&self) -> bool {
        matches!(self, GateDecision::Deny { .. })
    }

    pub fn outcome_str(&self) -> &'static str {
        match self {
            GateDecision::Allow => "allow",
            GateDecision::Resize { .. } => "resize",
            GateDecision::Deny { .. } => "deny",
        }
    }
}

/// One evaluated decision, including the audit context
#[derive(Debug, Clone)]
pub struct GateOutcome {
    pub decision_id: Uuid,
    pub decision: GateDecision,
    pub correlation_before: f64,
    pub correlation_after: Option<f64>,
    /// The threshold that produced a deny/resize, when one did
    pub triggering_threshold: Option<f64>,
    pub snapshot_age_secs: f64,
    pub decided_at: DateTime<Utc>,
}

impl GateOutcome {
    /// Structured payload for the audit ledger
    pub fn audit_payload(&self, candidate: &OrderCandidate) -> serde_json::Value {
        serde_json::json!({
            "decision_id": self.decision_id,
            "ticker": candidate.ticker,
            "sector": candidate.sector,
            "side": candidate.side,
            "quantity": candidate.quantity,
            "reduce_only": candidate.reduce_only,
            "outcome": self.decision.outcome_str(),
            "reason": match &self.decision {
                GateDecision::Deny { reason } => Some(reason.clone()),
                _ => None,
            },
            "correlation_before": self.correlation_before,
            "correlation_after": self.correlation_after,
            "triggering_threshold": self.triggering_threshold,
            "snapshot_age_secs": self.snapshot_age_secs,
            "decided_at": self.decided_at,
        })
    }
}

/// Portfolio-level trade gate. Thread-safe; limits are hot-swappable via
/// the published handle.
pub struct RiskGate {
    limits: Arc<Published<RiskLimits>>,
    correlations: Arc<dyn CorrelationView>,
    admitted: Mutex<VecDeque<Instant>>,
}

impl RiskGate {
    pub fn new(limits: Arc<Published<RiskLimits>>, correlations: Arc<dyn CorrelationView>) -> Self {
        Self {
            limits,
            correlations,
            admitted: Mutex::new(VecDeque::new()),
        }
    }

    /// Evaluate one candidate against the latest snapshot
    pub fn evaluate(&self, candidate: &OrderCandidate, snapshot: &RiskSnapshot) -> GateOutcome {
        let limits = self.limits.load();
        let now = Utc::now();
        let decision_id = Uuid::new_v4();
        let corr_before = snapshot.avg_pairwise_correlation;
        let snapshot_age = snapshot.age_secs(now);

        let mut outcome = GateOutcome {
            decision_id,
            decision: GateDecision::Allow,
            correlation_before: corr_before,
            correlation_after: None,
            triggering_threshold: None,
            snapshot_age_secs: snapshot_age,
            decided_at: now,
        };

        // Risk-reducing orders are always admissible: denying a close only
        // ever increases exposure
        if candidate.reduce_only {
            self.log_outcome(candidate, &outcome);
            return outcome;
        }

        if snapshot.is_stale(limits.snapshot_staleness_secs, now) {
            outcome.decision = GateDecision::Deny {
                reason: "stale_risk_snapshot".to_string(),
            };
            outcome.triggering_threshold = Some(limits.snapshot_staleness_secs as f64);
            self.log_outcome(candidate, &outcome);
            return outcome;
        }

        // (a) drawdown limit
        if snapshot.current_drawdown_pct >= limits.max_drawdown_pct {
            outcome.decision = GateDecision::Deny {
                reason: "drawdown_limit_exceeded".to_string(),
            };
            outcome.triggering_threshold = Some(limits.max_drawdown_pct);
            self.log_outcome(candidate, &outcome);
            return outcome;
        }

        // (b) single-instrument exposure cap, resizing when headroom remains
        let notional = candidate.notional();
        let existing = snapshot
            .instrument_exposure
            .get(&candidate.ticker)
            .copied()
            .unwrap_or(0.0);
        let instrument_cap = limits.max_instrument_exposure_pct * snapshot.equity;
        if existing + notional > instrument_cap {
            let headroom = instrument_cap - existing;
            let price = candidate.price;
            let resized = if headroom > 0.0 && price > Decimal::ZERO {
                Decimal::from_f64(headroom)
                    .map(|h| (h / price).round_dp(4))
                    .filter(|q| *q > Decimal::ZERO)
            } else {
                None
            };

            outcome.triggering_threshold = Some(limits.max_instrument_exposure_pct);
            outcome.decision = match resized {
                Some(new_quantity) => GateDecision::Resize { new_quantity },
                None => GateDecision::Deny {
                    reason: "instrument_exposure_cap_exceeded".to_string(),
                },
            };
            self.log_outcome(candidate, &outcome);
            if !outcome.decision.is_deny() {
                self.note_admission();
            }
            return outcome;
        }

        // (c) sector concentration cap
        let sector_pct = snapshot
            .sector_exposure_pct
            .get(&candidate.sector)
            .copied()
            .unwrap_or(0.0);
        let post_sector_pct = if snapshot.equity > 0.0 {
            sector_pct + notional / snapshot.equity
        } else {
            sector_pct
        };
        if post_sector_pct > limits.max_sector_exposure_pct {
            outcome.decision = GateDecision::Deny {
                reason: "sector_concentration_exceeded".to_string(),
            };
            outcome.triggering_threshold = Some(limits.max_sector_exposure_pct);
            self.log_outcome(candidate, &outcome);
            return outcome;
        }

        // (d) correlation guard: hypothetical post-trade average pairwise
        // correlation, denied on breach regardless of order size
        let hypothetical = self
            .correlations
            .hypothetical_average(&snapshot.held_tickers, &candidate.ticker);
        outcome.correlation_after = hypothetical;
        if let Some(after) = hypothetical {
            if after > limits.correlation_cap {
                outcome.decision = GateDecision::Deny {
                    reason: "correlation_cap_exceeded".to_string(),
                };
                outcome.triggering_threshold = Some(limits.correlation_cap);
                self.log_outcome(candidate, &outcome);
                return outcome;
            }
        }

        // (e) order velocity
        if !self.velocity_ok(limits.max_orders_per_minute) {
            outcome.decision = GateDecision::Deny {
                reason: "order_velocity_exceeded".to_string(),
            };
            outcome.triggering_threshold = Some(limits.max_orders_per_minute as f64);
            self.log_outcome(candidate, &outcome);
            return outcome;
        }

        self.note_admission();
        self.log_outcome(candidate, &outcome);
        outcome
    }

    fn velocity_ok(&self, max_per_minute: usize) -> bool {
        let mut admitted = self
            .admitted
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let cutoff = Duration::from_secs(60);
        while let Some(front) = admitted.front() {
            if front.elapsed() > cutoff {
                admitted.pop_front();
            } else {
                break;
            }
        }
        admitted.len() < max_per_minute
    }

    fn note_admission(&self) {
        self.admitted
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push_back(Instant::now());
    }

    fn log_outcome(&self, candidate: &OrderCandidate, outcome: &GateOutcome) {
        tracing::info!(
            decision_id = %outcome.decision_id,
            ticker = %candidate.ticker,
            outcome = outcome.decision.outcome_str(),
            reason = ?match &outcome.decision {
                GateDecision::Deny { reason } => Some(reason.as_str()),
                _ => None,
            },
            corr_before = outcome.correlation_before,
            corr_after = ?outcome.correlation_after,
            threshold = ?outcome.triggering_threshold,
            "Risk gate decision"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    /// Fixed correlation fixture for deterministic gate tests
    struct FixedCorrelation {
        before: f64,
        after: f64,
    }

    impl CorrelationView for FixedCorrelation {
        fn average_pairwise(&self, _tickers: &[String]) -> Option<f64> {
            Some(self.before)
        }

        fn hypothetical_average(&self, _tickers: &[String], _candidate: &str) -> Option<f64> {
            Some(self.after)
        }
    }

    fn gate_with(limits: RiskLimits, before: f64, after: f64) -> RiskGate {
        RiskGate::new(
            Arc::new(Published::new(limits)),
            Arc::new(FixedCorrelation { before, after }),
        )
    }

    fn candidate(ticker: &str, quantity: Decimal, price: Decimal) -> OrderCandidate {
        OrderCandidate {
            ticker: ticker.to_string(),
            sector: "technology".to_string(),
            side: OrderSide::Buy,
            quantity,
            price,
            reduce_only: false,
        }
    }

    fn snapshot(equity: f64) -> RiskSnapshot {
        let mut snapshot = RiskSnapshot::empty(equity);
        snapshot.avg_pairwise_correlation = 0.65;
        snapshot
    }

    #[test]
    fn test_correlation_cap_denies_regardless_of_size() {
        let gate = gate_with(RiskLimits::default(), 0.65, 0.72);
        let snap = snapshot(100_000.0);

        for quantity in [dec!(1), dec!(50)] {
            let outcome = gate.evaluate(&candidate("NVDA", quantity, dec!(100)), &snap);
            match outcome.decision {
                GateDecision::Deny { ref reason } => {
                    assert_eq!(reason, "correlation_cap_exceeded")
                }
                other => panic!("expected deny, got {other:?}"),
            }
            assert_eq!(outcome.correlation_before, 0.65);
            assert_eq!(outcome.correlation_after, Some(0.72));
            assert_eq!(outcome.triggering_threshold, Some(0.70));
        }
    }

    #[test]
    fn test_allows_under_all_caps() {
        let gate = gate_with(RiskLimits::default(), 0.40, 0.45);
        let outcome = gate.evaluate(&candidate("NVDA", dec!(10), dec!(100)), &snapshot(100_000.0));
        assert_eq!(outcome.decision, GateDecision::Allow);
    }

    #[test]
    fn test_stale_snapshot_denies() {
        let gate = gate_with(RiskLimits::default(), 0.40, 0.45);
        let mut snap = snapshot(100_000.0);
        snap.taken_at = Utc::now() - chrono::Duration::seconds(5);

        let outcome = gate.evaluate(&candidate("NVDA", dec!(10), dec!(100)), &snap);
        match outcome.decision {
            GateDecision::Deny { ref reason } => assert_eq!(reason, "stale_risk_snapshot"),
            other => panic!("expected deny, got {other:?}"),
        }
    }

    #[test]
    fn test_drawdown_checked_before_exposure() {
        let gate = gate_with(RiskLimits::default(), 0.40, 0.45);
        let mut snap = snapshot(100_000.0);
        snap.current_drawdown_pct = 0.12;

        let outcome = gate.evaluate(&candidate("NVDA", dec!(1000), dec!(100)), &snap);
        match outcome.decision {
            GateDecision::Deny { ref reason } => assert_eq!(reason, "drawdown_limit_exceeded"),
            other => panic!("expected deny, got {other:?}"),
        }
    }

    #[test]
    fn test_instrument_cap_resizes_when_headroom_remains() {
        let gate = gate_with(RiskLimits::default(), 0.40, 0.45);
        let mut snap = snapshot(100_000.0);
        snap.instrument_exposure.insert("NVDA".to_string(), 6_000.0);

        // Cap is 10% of 100k = 10k; 6k held leaves 4k headroom, order asks 8k
        let outcome = gate.evaluate(&candidate("NVDA", dec!(80), dec!(100)), &snap);
        match outcome.decision {
            GateDecision::Resize { new_quantity } => assert_eq!(new_quantity, dec!(40)),
            other => panic!("expected resize, got {other:?}"),
        }
    }

    #[test]
    fn test_instrument_cap_denies_without_headroom() {
        let gate = gate_with(RiskLimits::default(), 0.40, 0.45);
        let mut snap = snapshot(100_000.0);
        snap.instrument_exposure.insert("NVDA".to_string(), 10_000.0);

        let outcome = gate.evaluate(&candidate("NVDA", dec!(10), dec!(100)), &snap);
        match outcome.decision {
            GateDecision::Deny { ref reason } => {
                assert_eq!(reason, "instrument_exposure_cap_exceeded")
            }
            other => panic!("expected deny, got {other:?}"),
        }
    }

    #[test]
    fn test_sector_concentration_denies() {
        let gate = gate_with(RiskLimits::default(), 0.40, 0.45);
        let mut snap = snapshot(100_000.0);
        snap.sector_exposure_pct
            .insert("technology".to_string(), 0.29);

        // 2k notional pushes technology past the 30% cap
        let outcome = gate.evaluate(&candidate("NVDA", dec!(20), dec!(100)), &snap);
        match outcome.decision {
            GateDecision::Deny { ref reason } => {
                assert_eq!(reason, "sector_concentration_exceeded")
            }
            other => panic!("expected deny, got {other:?}"),
        }
    }

    #[test]
    fn test_reduce_only_bypasses_correlation_guard() {
        let gate = gate_with(RiskLimits::default(), 0.65, 0.90);
        let mut close = candidate("NVDA", dec!(10), dec!(100));
        close.reduce_only = true;
        close.side = OrderSide::Sell;

        let outcome = gate.evaluate(&close, &snapshot(100_000.0));
        assert_eq!(outcome.decision, GateDecision::Allow);
    }

    #[test]
    fn test_order_velocity_limit() {
        let gate = gate_with(
            RiskLimits {
                max_orders_per_minute: 2,
                ..Default::default()
            },
            0.10,
            0.10,
        );
        let snap = snapshot(100_000.0);

        for _ in 0..2 {
            let outcome = gate.evaluate(&candidate("NVDA", dec!(1), dec!(100)), &snap);
            assert_eq!(outcome.decision, GateDecision::Allow);
        }

        let outcome = gate.evaluate(&candidate("NVDA", dec!(1), dec!(100)), &snap);
        match outcome.decision {
            GateDecision::Deny { ref reason } => assert_eq!(reason, "order_velocity_exceeded"),
            other => panic!("expected deny, got {other:?}"),
        }
    }
}
