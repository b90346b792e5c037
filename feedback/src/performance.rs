//! Rolling realized-performance tracking per signal source

use std::collections::VecDeque;

/// Bounded window of realized trade P&L for one source
#[derive(Debug, Clone)]
pub struct RollingSourceStats {
    outcomes: VecDeque<f64>,
    window: usize,
}

impl RollingSourceStats {
    pub fn new(window: usize) -> Self {
        Self {
            outcomes: VecDeque::with_capacity(window),
            window,
        }
    }

    pub fn record(&mut self, pnl: f64) {
        self.outcomes.push_back(pnl);
        if self.outcomes.len() > self.window {
            self.outcomes.pop_front();
        }
    }

    pub fn samples(&self) -> usize {
        self.outcomes.len()
    }

    pub fn total_pnl(&self) -> f64 {
        self.outcomes.iter().sum()
    }

    pub fn win_rate(&self) -> f64 {
        if self.outcomes.is_empty() {
            return 0.0;
        }
        let wins = self.outcomes.iter().filter(|pnl| **pnl > 0.0).count();
        wins as f64 / self.outcomes.len() as f64
    }

    /// Per-trade Sharpe: mean over standard deviation of trade P&L
    pub fn sharpe(&self) -> Option<f64> {
        if self.outcomes.len() < 2 {
            return None;
        }

        let n = self.outcomes.len() as f64;
        let mean = self.total_pnl() / n;
        let variance = self
            .outcomes
            .iter()
            .map(|pnl| (pnl - mean).powi(2))
            .sum::<f64>()
            / n;
        let std_dev = variance.sqrt();

        if std_dev == 0.0 {
            return Some(0.0);
        }
        Some(mean / std_dev)
    }

    /// Composite quality score in 0..=1 blending win rate and Sharpe
    pub fn score(&self) -> f64 {
        let sharpe_norm = self
            .sharpe()
            .map(|s| (s.clamp(-2.0, 2.0) + 2.0) / 4.0)
            .unwrap_or(0.5);
        0.5 * self.win_rate() + 0.5 * sharpe_norm
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_win_rate() {
        let mut stats = RollingSourceStats::new(10);
        for pnl in [100.0, -50.0, 80.0, -20.0] {
            stats.record(pnl);
        }
        assert_eq!(stats.win_rate(), 0.5);
        assert_eq!(stats.samples(), 4);
    }

    #[test]
    fn test_window_bounds_history() {
        let mut stats = RollingSourceStats::new(3);
        for pnl in [-1.0, -1.0, 1.0, 1.0, 1.0] {
            stats.record(pnl);
        }
        assert_eq!(stats.samples(), 3);
        assert_eq!(stats.win_rate(), 1.0);
    }

    #[test]
    fn test_winning_source_scores_higher() {
        let mut winner = RollingSourceStats::new(50);
        let mut loser = RollingSourceStats::new(50);

        for i in 0..20 {
            winner.record(if i % 5 == 0 { -20.0 } else { 60.0 });
            loser.record(if i % 5 == 0 { 60.0 } else { -20.0 });
        }

        assert!(winner.score() > loser.score());
    }
}
