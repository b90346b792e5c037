//! Point-in-time portfolio risk snapshot

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Aggregate risk state owned exclusively by the risk gate's snapshot
/// publisher. Gate decisions always read the latest published snapshot and
/// deny rather than fall back to one older than the staleness bound.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskSnapshot {
    /// Total absolute exposure across open positions (account currency)
    pub total_exposure: f64,
    /// Beta-weighted net exposure
    pub net_beta: f64,
    /// Exposure share per sector, 0..=1
    pub sector_exposure_pct: HashMap<String, f64>,
    /// Absolute exposure per held instrument
    pub instrument_exposure: HashMap<String, f64>,
    /// Tickers currently held, for hypothetical correlation checks
    pub held_tickers: Vec<String>,
    /// Average pairwise correlation across held tickers
    pub avg_pairwise_correlation: f64,
    /// Current drawdown from the equity peak, 0..=1
    pub current_drawdown_pct: f64,
    /// Exposure committed to not-yet-filled orders
    pub open_order_exposure: f64,
    /// Account equity at snapshot time
    pub equity: f64,
    pub taken_at: DateTime<Utc>,
}

impl RiskSnapshot {
    /// An empty snapshot for a flat book
    pub fn empty(equity: f64) -> Self {
        Self {
            total_exposure: 0.0,
            net_beta: 0.0,
            sector_exposure_pct: HashMap::new(),
            instrument_exposure: HashMap::new(),
            held_tickers: Vec::new(),
            avg_pairwise_correlation: 0.0,
            current_drawdown_pct: 0.0,
            open_order_exposure: 0.0,
            equity,
            taken_at: Utc::now(),
        }
    }

    /// True when the snapshot is older than `bound_secs`
    pub fn is_stale(&self, bound_secs: u64, now: DateTime<Utc>) -> bool {
        now - self.taken_at > Duration::seconds(bound_secs as i64)
    }

    pub fn age_secs(&self, now: DateTime<Utc>) -> f64 {
        ((now - self.taken_at).num_milliseconds().max(0) as f64) / 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staleness_bound() {
        let mut snapshot = RiskSnapshot::empty(100_000.0);
        let now = Utc::now();

        assert!(!snapshot.is_stale(2, now));

        snapshot.taken_at = now - Duration::seconds(3);
        assert!(snapshot.is_stale(2, now));
    }
}
