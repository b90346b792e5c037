//! Feedback Loop (Layer 5)
//!
//! Recomputes per-source fusion weights from realized trade outcomes:
//! every N closed trades, sources with enough samples move toward their
//! performance score under a per-cycle delta clamp, weights are floored,
//! ceilinged, and renormalized, and the result is published as a new
//! versioned snapshot with a rollback pointer to its predecessor.

pub mod performance;

use chrono::Utc;
use common::{
    SignalSource, SourcePerformance, WeightContext, WeightHandle, WeightSnapshot, WeightTrigger,
};
use performance::RollingSourceStats;
use std::collections::HashMap;

/// Feedback loop configuration
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct FeedbackConfig {
    /// Recompute after this many closed trades
    pub adjust_every: usize,
    /// Rolling evaluation window (trades per source)
    pub window: usize,
    /// Minimum samples before a source's weight moves
    pub min_samples: usize,
    /// Per-cycle weight change clamp
    pub max_delta: f64,
    /// Weight floor after adjustment
    pub floor: f64,
    /// Weight ceiling after adjustment
    pub ceiling: f64,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            adjust_every: 25,
            window: 100,
            min_samples: 5,
            max_delta: 0.15,
            floor: 0.05,
            ceiling: 0.50,
        }
    }
}

pub struct FeedbackLoop {
    config: FeedbackConfig,
    weights: WeightHandle,
    stats: HashMap<SignalSource, RollingSourceStats>,
    trades_since_adjust: usize,
    trades_observed: usize,
    /// Append-only snapshot history backing rollback pointers
    history: Vec<WeightSnapshot>,
}

impl FeedbackLoop {
    pub fn new(config: FeedbackConfig, weights: WeightHandle) -> Self {
        let history = vec![(*weights.load()).clone()];
        Self {
            config,
            weights,
            stats: HashMap::new(),
            trades_since_adjust: 0,
            trades_observed: 0,
            history,
        }
    }

    /// Record one realized trade outcome attributed to the sources that
    /// opened it. Returns the new snapshot when this trade completed an
    /// adjustment cycle.
    pub fn record(&mut self, sources: &[SignalSource], pnl: f64) -> Option<WeightSnapshot> {
        for source in sources {
            self.stats
                .entry(*source)
                .or_insert_with(|| RollingSourceStats::new(self.config.window))
                .record(pnl);
        }

        self.trades_since_adjust += 1;
        self.trades_observed += 1;

        if self.trades_since_adjust < self.config.adjust_every {
            return None;
        }
        self.trades_since_adjust = 0;
        Some(self.adjust(WeightTrigger::Scheduled))
    }

    /// Recompute and publish weights immediately
    pub fn adjust_now(&mut self) -> WeightSnapshot {
        self.trades_since_adjust = 0;
        self.adjust(WeightTrigger::Manual)
    }

    /// Republish the snapshot the current one superseded
    pub fn rollback(&mut self) -> Option<WeightSnapshot> {
        let current = self.weights.load();
        let prior_version = current.prior_version?;
        let prior = self
            .history
            .iter()
            .find(|s| s.version == prior_version)?
            .clone();

        let snapshot = WeightSnapshot {
            version: current.version + 1,
            weights: prior.weights,
            trigger: WeightTrigger::Rollback,
            context: prior.context,
            prior_version: Some(current.version),
            created_at: Utc::now(),
        };

        tracing::warn!(
            restored_version = prior_version,
            new_version = snapshot.version,
            "Fusion weights rolled back"
        );

        self.publish(snapshot.clone());
        Some(snapshot)
    }

    pub fn trades_observed(&self) -> usize {
        self.trades_observed
    }

    pub fn history(&self) -> &[WeightSnapshot] {
        &self.history
    }

    fn adjust(&mut self, trigger: WeightTrigger) -> WeightSnapshot {
        let current = self.weights.load();
        let mut weights = current.weights.clone();

        // Move each sufficiently-sampled source toward its performance
        // score share, bounded by the per-cycle clamp
        let scored: HashMap<SignalSource, f64> = self
            .stats
            .iter()
            .filter(|(_, stats)| stats.samples() >= self.config.min_samples)
            .map(|(source, stats)| (*source, stats.score()))
            .collect();

        if !scored.is_empty() {
            let score_total: f64 = scored.values().sum();
            let adjustable_mass: f64 = scored
                .keys()
                .map(|source| current.weight_of(*source))
                .sum();

            if score_total > 0.0 && adjustable_mass > 0.0 {
                for (source, score) in &scored {
                    let target = score / score_total * adjustable_mass;
                    let existing = current.weight_of(*source);
                    let delta = (target - existing)
                        .clamp(-self.config.max_delta, self.config.max_delta);
                    weights.insert(*source, existing + delta);
                }
            }
        }

        self.renormalize_bounded(&mut weights);

        let context = WeightContext {
            per_source: self
                .stats
                .iter()
                .map(|(source, stats)| {
                    (
                        *source,
                        SourcePerformance {
                            samples: stats.samples(),
                            win_rate: stats.win_rate(),
                            sharpe: stats.sharpe(),
                            total_pnl: stats.total_pnl(),
                        },
                    )
                })
                .collect(),
            trades_observed: self.trades_observed,
        };

        let snapshot = WeightSnapshot {
            version: current.version + 1,
            weights,
            trigger,
            context,
            prior_version: Some(current.version),
            created_at: Utc::now(),
        };

        tracing::info!(
            version = snapshot.version,
            trigger = ?trigger,
            trades = self.trades_observed,
            "Fusion weights adjusted"
        );

        self.publish(snapshot.clone());
        snapshot
    }

    fn publish(&mut self, snapshot: WeightSnapshot) {
        self.history.push(snapshot.clone());
        self.weights.store(snapshot);
    }

    /// Clamp into [floor, ceiling] and redistribute the residual among
    /// sources that still have headroom, so the published weights always
    /// sum to one while respecting both bounds.
    fn renormalize_bounded(&self, weights: &mut HashMap<SignalSource, f64>) {
        let floor = self.config.floor;
        let ceiling = self.config.ceiling;

        for _ in 0..16 {
            for weight in weights.values_mut() {
                *weight = weight.clamp(floor, ceiling);
            }

            let sum: f64 = weights.values().sum();
            let residual = 1.0 - sum;
            if residual.abs() < 1e-12 {
                return;
            }

            let adjustable: Vec<SignalSource> = weights
                .iter()
                .filter(|(_, w)| {
                    if residual > 0.0 {
                        **w < ceiling - 1e-12
                    } else {
                        **w > floor + 1e-12
                    }
                })
                .map(|(s, _)| *s)
                .collect();

            if adjustable.is_empty() {
                return;
            }

            let share = residual / adjustable.len() as f64;
            for source in adjustable {
                if let Some(weight) = weights.get_mut(&source) {
                    *weight += share;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::weight_handle;

    fn feedback(config: FeedbackConfig) -> (FeedbackLoop, WeightHandle) {
        let handle = weight_handle(WeightSnapshot::default_weights());
        (FeedbackLoop::new(config, handle.clone()), handle)
    }

    fn assert_valid_weights(snapshot: &WeightSnapshot, floor: f64, ceiling: f64) {
        assert!(
            (snapshot.sum() - 1.0).abs() < 1e-9,
            "weights sum to {}",
            snapshot.sum()
        );
        for (source, weight) in &snapshot.weights {
            assert!(
                *weight >= floor - 1e-9 && *weight <= ceiling + 1e-9,
                "{source:?} weight {weight} outside bounds"
            );
        }
    }

    #[test]
    fn test_adjustment_fires_every_n_trades() {
        let (mut feedback, _) = feedback(FeedbackConfig {
            adjust_every: 5,
            ..Default::default()
        });

        let sources = [SignalSource::EmaCloud];
        for _ in 0..4 {
            assert!(feedback.record(&sources, 10.0).is_none());
        }
        assert!(feedback.record(&sources, 10.0).is_some());
    }

    #[test]
    fn test_weights_stay_normalized_and_bounded() {
        let config = FeedbackConfig {
            adjust_every: 10,
            min_samples: 3,
            ..Default::default()
        };
        let (mut feedback, _) = feedback(config.clone());

        // Heavily skewed outcomes over several cycles
        for cycle in 0..6 {
            for i in 0..10 {
                let winner_pnl = 100.0 + (cycle * 10 + i) as f64;
                feedback.record(&[SignalSource::EmaCloud], winner_pnl);
                if let Some(snapshot) = feedback.record(&[SignalSource::Sentiment], -80.0) {
                    assert_valid_weights(&snapshot, config.floor, config.ceiling);
                }
            }
        }

        let latest = feedback.history().last().unwrap().clone();
        assert_valid_weights(&latest, config.floor, config.ceiling);
        // The consistently winning source outweighs the consistently losing
        assert!(
            latest.weights[&SignalSource::EmaCloud] > latest.weights[&SignalSource::Sentiment]
        );
    }

    #[test]
    fn test_per_cycle_delta_is_clamped() {
        let config = FeedbackConfig {
            adjust_every: 20,
            min_samples: 3,
            max_delta: 0.15,
            ..Default::default()
        };
        let (mut feedback, handle) = feedback(config);
        let before = handle.load();

        for _ in 0..10 {
            feedback.record(&[SignalSource::EmaCloud], 100.0);
            feedback.record(&[SignalSource::Sentiment], -100.0);
        }

        let after = handle.load();
        assert_eq!(after.version, before.version + 1);
        for source in SignalSource::ALL {
            let delta = (after.weight_of(source) - before.weight_of(source)).abs();
            // Renormalization can nudge past the raw clamp only marginally
            assert!(delta <= 0.15 + 0.05, "{source:?} moved {delta}");
        }
    }

    #[test]
    fn test_sources_below_min_samples_hold_weight() {
        let config = FeedbackConfig {
            adjust_every: 6,
            min_samples: 50,
            ..Default::default()
        };
        let (mut feedback, handle) = feedback(config);
        let before = handle.load();

        for _ in 0..6 {
            feedback.record(&[SignalSource::EmaCloud], 100.0);
        }

        // No source reached min_samples, so only renormalization ran
        let after = handle.load();
        for source in SignalSource::ALL {
            assert!((after.weight_of(source) - before.weight_of(source)).abs() < 1e-9);
        }
    }

    #[test]
    fn test_rollback_restores_prior_weights() {
        let config = FeedbackConfig {
            adjust_every: 5,
            min_samples: 2,
            ..Default::default()
        };
        let (mut feedback, handle) = feedback(config);
        let original = handle.load();

        for _ in 0..3 {
            feedback.record(&[SignalSource::EmaCloud], 100.0);
        }
        for _ in 0..2 {
            feedback.record(&[SignalSource::Sentiment], -100.0);
        }
        let adjusted = handle.load();
        assert_ne!(
            adjusted.weights[&SignalSource::EmaCloud],
            original.weights[&SignalSource::EmaCloud]
        );

        let restored = feedback.rollback().unwrap();
        assert_eq!(restored.trigger, WeightTrigger::Rollback);
        assert_eq!(restored.prior_version, Some(adjusted.version));
        assert_eq!(
            restored.weights[&SignalSource::EmaCloud],
            original.weights[&SignalSource::EmaCloud]
        );
    }

    #[test]
    fn test_snapshot_history_is_append_only() {
        let (mut feedback, _) = feedback(FeedbackConfig {
            adjust_every: 2,
            min_samples: 1,
            ..Default::default()
        });

        for _ in 0..6 {
            feedback.record(&[SignalSource::MlRanking], 10.0);
        }

        let versions: Vec<u64> = feedback.history().iter().map(|s| s.version).collect();
        assert_eq!(versions, vec![0, 1, 2, 3]);
    }
}
