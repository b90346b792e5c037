//! Pairwise return correlation across held instruments

use statrs::statistics::Statistics;
use std::collections::{HashMap, VecDeque};

/// Read-side view over the correlation state, so the gate can be tested
/// against fixed correlation fixtures
pub trait CorrelationView: Send + Sync {
    /// Average pairwise correlation across the given tickers
    fn average_pairwise(&self, tickers: &[String]) -> Option<f64>;

    /// Average pairwise correlation if `candidate` were added to the book
    fn hypothetical_average(&self, tickers: &[String], candidate: &str) -> Option<f64>;
}

/// Rolling per-ticker return series feeding the pairwise Pearson
/// correlation used by the snapshot publisher and correlation guard
#[derive(Debug, Clone)]
pub struct CorrelationTracker {
    /// Returns per ticker, bounded to the window
    returns: HashMap<String, VecDeque<f64>>,
    last_price: HashMap<String, f64>,
    window: usize,
    min_samples: usize,
}

impl CorrelationTracker {
    pub fn new(window: usize, min_samples: usize) -> Self {
        Self {
            returns: HashMap::new(),
            last_price: HashMap::new(),
            window,
            min_samples,
        }
    }

    /// Record a price tick, deriving a simple return against the prior tick
    pub fn record_price(&mut self, ticker: &str, price: f64) {
        if price <= 0.0 {
            return;
        }

        if let Some(last) = self.last_price.get(ticker) {
            let ret = (price - last) / last;
            let series = self.returns.entry(ticker.to_string()).or_default();
            series.push_back(ret);
            if series.len() > self.window {
                series.pop_front();
            }
        }
        self.last_price.insert(ticker.to_string(), price);
    }

    /// Push a precomputed return sample (used when the caller already has a
    /// return series)
    pub fn record_return(&mut self, ticker: &str, ret: f64) {
        let series = self.returns.entry(ticker.to_string()).or_default();
        series.push_back(ret);
        if series.len() > self.window {
            series.pop_front();
        }
    }

    /// Pearson correlation between two tickers over their overlapping tail
    pub fn pairwise(&self, a: &str, b: &str) -> Option<f64> {
        let series_a = self.returns.get(a)?;
        let series_b = self.returns.get(b)?;

        let n = series_a.len().min(series_b.len());
        if n < self.min_samples {
            return None;
        }

        let tail_a: Vec<f64> = series_a.iter().rev().take(n).rev().copied().collect();
        let tail_b: Vec<f64> = series_b.iter().rev().take(n).rev().copied().collect();

        let mean_a = (&tail_a).mean();
        let mean_b = (&tail_b).mean();

        let mut covariance = 0.0;
        let mut var_a = 0.0;
        let mut var_b = 0.0;

        for i in 0..n {
            let da = tail_a[i] - mean_a;
            let db = tail_b[i] - mean_b;
            covariance += da * db;
            var_a += da * da;
            var_b += db * db;
        }

        let denominator = (var_a * var_b).sqrt();
        if denominator == 0.0 {
            return None;
        }

        Some(covariance / denominator)
    }

    fn average_over(&self, tickers: &[&str]) -> Option<f64> {
        let mut sum = 0.0;
        let mut pairs = 0usize;

        for i in 0..tickers.len() {
            for j in (i + 1)..tickers.len() {
                if let Some(corr) = self.pairwise(tickers[i], tickers[j]) {
                    sum += corr;
                    pairs += 1;
                }
            }
        }

        if pairs == 0 {
            None
        } else {
            Some(sum / pairs as f64)
        }
    }
}

impl CorrelationView for CorrelationTracker {
    fn average_pairwise(&self, tickers: &[String]) -> Option<f64> {
        let refs: Vec<&str> = tickers.iter().map(|t| t.as_str()).collect();
        self.average_over(&refs)
    }

    fn hypothetical_average(&self, tickers: &[String], candidate: &str) -> Option<f64> {
        let mut refs: Vec<&str> = tickers.iter().map(|t| t.as_str()).collect();
        if !refs.contains(&candidate) {
            refs.push(candidate);
        }
        self.average_over(&refs)
    }
}

impl Default for CorrelationTracker {
    fn default() -> Self {
        Self::new(100, 10)
    }
}

/// The snapshot publisher writes the tracker behind a lock; the gate reads
/// through the same lock via this impl.
impl CorrelationView for std::sync::RwLock<CorrelationTracker> {
    fn average_pairwise(&self, tickers: &[String]) -> Option<f64> {
        self.read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .average_pairwise(tickers)
    }

    fn hypothetical_average(&self, tickers: &[String], candidate: &str) -> Option<f64> {
        self.read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .hypothetical_average(tickers, candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed(tracker: &mut CorrelationTracker, ticker: &str, series: &[f64]) {
        for ret in series {
            tracker.record_return(ticker, *ret);
        }
    }

    #[test]
    fn test_perfect_correlation() {
        let mut tracker = CorrelationTracker::new(100, 5);
        let series: Vec<f64> = (0..20).map(|i| (i as f64 * 0.7).sin() * 0.01).collect();

        seed(&mut tracker, "A", &series);
        seed(&mut tracker, "B", &series);

        let corr = tracker.pairwise("A", "B").unwrap();
        assert!((corr - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_anti_correlation() {
        let mut tracker = CorrelationTracker::new(100, 5);
        let series: Vec<f64> = (0..20).map(|i| (i as f64 * 0.7).sin() * 0.01).collect();
        let inverted: Vec<f64> = series.iter().map(|r| -r).collect();

        seed(&mut tracker, "A", &series);
        seed(&mut tracker, "B", &inverted);

        let corr = tracker.pairwise("A", "B").unwrap();
        assert!((corr + 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_requires_min_samples() {
        let mut tracker = CorrelationTracker::new(100, 10);
        seed(&mut tracker, "A", &[0.01, -0.02, 0.01]);
        seed(&mut tracker, "B", &[0.01, -0.02, 0.01]);

        assert!(tracker.pairwise("A", "B").is_none());
    }

    #[test]
    fn test_hypothetical_includes_candidate() {
        let mut tracker = CorrelationTracker::new(100, 5);
        let trend: Vec<f64> = (0..20).map(|i| (i as f64 * 0.3).sin() * 0.01).collect();
        let noise: Vec<f64> = (0..20)
            .map(|i| if i % 2 == 0 { 0.01 } else { -0.012 })
            .collect();

        seed(&mut tracker, "A", &trend);
        seed(&mut tracker, "B", &noise);
        seed(&mut tracker, "C", &trend);

        let held = vec!["A".to_string(), "B".to_string()];
        let before = tracker.average_pairwise(&held).unwrap();
        let after = tracker.hypothetical_average(&held, "C").unwrap();

        // C moves exactly with A, so adding it raises the average
        assert!(after > before);
    }

    #[test]
    fn test_price_ticks_build_returns() {
        let mut tracker = CorrelationTracker::new(100, 2);
        for price in [100.0, 101.0, 102.0, 101.5, 103.0] {
            tracker.record_price("A", price);
            tracker.record_price("B", price);
        }

        let corr = tracker.pairwise("A", "B").unwrap();
        assert!((corr - 1.0).abs() < 1e-9);
    }
}
