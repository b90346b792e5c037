//! Risk snapshot publishing

use crate::config::InstrumentInfo;
use crate::correlation::{CorrelationTracker, CorrelationView};
use chrono::Utc;
use common::{Position, Published, RiskSnapshot};
use rust_decimal::prelude::ToPrimitive;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Shared read handle over the latest published risk snapshot
pub type SnapshotHandle = Arc<Published<RiskSnapshot>>;

/// Sole writer of the risk snapshot. Rebuilds the aggregate from the
/// position book, open-order exposure, and the correlation tracker, and
/// publishes it through the shared handle at least once per trading tick.
pub struct SnapshotPublisher {
    instruments: HashMap<String, InstrumentInfo>,
    tracker: Arc<RwLock<CorrelationTracker>>,
    handle: SnapshotHandle,
    equity_peak: f64,
}

impl SnapshotPublisher {
    pub fn new(
        instruments: HashMap<String, InstrumentInfo>,
        tracker: Arc<RwLock<CorrelationTracker>>,
        initial_equity: f64,
    ) -> Self {
        Self {
            instruments,
            tracker,
            handle: Arc::new(Published::new(RiskSnapshot::empty(initial_equity))),
            equity_peak: initial_equity,
        }
    }

    /// Read handle for gate and orchestrator consumers
    pub fn handle(&self) -> SnapshotHandle {
        self.handle.clone()
    }

    /// Feed a price tick into the correlation state
    pub fn record_price(&self, ticker: &str, price: f64) {
        let mut tracker = self
            .tracker
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        tracker.record_price(ticker, price);
    }

    fn info_for(&self, ticker: &str) -> InstrumentInfo {
        self.instruments
            .get(ticker)
            .cloned()
            .unwrap_or_else(InstrumentInfo::unknown)
    }

    /// Rebuild and publish the snapshot
    pub fn refresh(
        &mut self,
        positions: &[Position],
        open_order_exposure: f64,
        equity: f64,
    ) -> RiskSnapshot {
        if equity > self.equity_peak {
            self.equity_peak = equity;
        }
        let drawdown = if self.equity_peak > 0.0 {
            ((self.equity_peak - equity) / self.equity_peak).max(0.0)
        } else {
            0.0
        };

        let mut total_exposure = 0.0;
        let mut beta_weighted = 0.0;
        let mut sector_exposure: HashMap<String, f64> = HashMap::new();
        let mut instrument_exposure: HashMap<String, f64> = HashMap::new();
        let mut held_tickers = Vec::with_capacity(positions.len());

        for position in positions {
            let info = self.info_for(&position.ticker);
            let value = position.market_value().to_f64().unwrap_or(0.0);
            let signed = position
                .quantity
                .to_f64()
                .unwrap_or(0.0)
                * position.current_price.to_f64().unwrap_or(0.0);

            total_exposure += value;
            beta_weighted += signed * info.beta;
            *sector_exposure.entry(info.sector).or_insert(0.0) += value;
            *instrument_exposure
                .entry(position.ticker.clone())
                .or_insert(0.0) += value;
            held_tickers.push(position.ticker.clone());
        }

        let sector_exposure_pct = if equity > 0.0 {
            sector_exposure
                .into_iter()
                .map(|(sector, value)| (sector, value / equity))
                .collect()
        } else {
            HashMap::new()
        };

        let avg_corr = {
            let tracker = self
                .tracker
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            tracker.average_pairwise(&held_tickers).unwrap_or(0.0)
        };

        let snapshot = RiskSnapshot {
            total_exposure,
            net_beta: if equity > 0.0 {
                beta_weighted / equity
            } else {
                0.0
            },
            sector_exposure_pct,
            instrument_exposure,
            held_tickers,
            avg_pairwise_correlation: avg_corr,
            current_drawdown_pct: drawdown,
            open_order_exposure,
            equity,
            taken_at: Utc::now(),
        };

        self.handle.store(snapshot.clone());

        tracing::debug!(
            total_exposure = snapshot.total_exposure,
            drawdown = snapshot.current_drawdown_pct,
            avg_corr = snapshot.avg_pairwise_correlation,
            positions = snapshot.held_tickers.len(),
            "Risk snapshot refreshed"
        );

        snapshot
    }
}
