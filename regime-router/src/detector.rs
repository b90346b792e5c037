//! Regime classification and the rate-limited transition state machine

use crate::regime::{MarketRegime, RegimeProfile, RegimeProfileTable};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Instant;

/// Market observation fed to the detector once per evaluation cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSample {
    /// Trailing return over the lookback, as a fraction
    pub trailing_return: f64,
    /// Annualized realized volatility, as a fraction
    pub realized_vol: f64,
    /// Current drawdown from the equity peak, 0..=1
    pub drawdown: f64,
    pub taken_at: DateTime<Utc>,
}

/// Detector thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Minimum classification confidence required to transition
    pub confidence_threshold: f64,
    /// Transition rate cap (count per hour)
    pub max_transitions_per_hour: usize,
    /// Seconds over which profile parameters are interpolated after a
    /// transition
    pub interpolation_window_secs: u64,
    /// Volatility above this is crisis territory
    pub crisis_vol: f64,
    /// Drawdown above this is crisis territory
    pub crisis_drawdown: f64,
    /// Absolute trailing return below this is sideways
    pub sideways_return_band: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.60,
            max_transitions_per_hour: 5,
            interpolation_window_secs: 300,
            crisis_vol: 0.45,
            crisis_drawdown: 0.15,
            sideways_return_band: 0.02,
        }
    }
}

/// Classifies one market sample into a regime with a confidence score
#[derive(Debug, Clone)]
pub struct RegimeDetector {
    config: DetectorConfig,
}

impl RegimeDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self { config }
    }

    pub fn classify(&self, sample: &MarketSample) -> (MarketRegime, f64) {
        let cfg = &self.config;

        // Crisis dominates everything else
        if sample.realized_vol >= cfg.crisis_vol || sample.drawdown >= cfg.crisis_drawdown {
            let vol_excess = (sample.realized_vol / cfg.crisis_vol).min(2.0);
            let dd_excess = (sample.drawdown / cfg.crisis_drawdown).min(2.0);
            let confidence = (vol_excess.max(dd_excess) / 2.0).clamp(0.5, 1.0);
            return (MarketRegime::Crisis, confidence);
        }

        if sample.trailing_return.abs() < cfg.sideways_return_band {
            // Deep inside the band reads as clearly sideways
            let depth = 1.0 - sample.trailing_return.abs() / cfg.sideways_return_band;
            return (MarketRegime::Sideways, 0.5 + 0.5 * depth);
        }

        let regime = if sample.trailing_return > 0.0 {
            MarketRegime::Bull
        } else {
            MarketRegime::Bear
        };
        // Confidence grows with distance from the sideways band
        let distance = (sample.trailing_return.abs() - cfg.sideways_return_band)
            / cfg.sideways_return_band;
        (regime, (0.5 + 0.25 * distance).clamp(0.5, 1.0))
    }
}

/// A recorded regime transition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimeTransition {
    pub from: MarketRegime,
    pub to: MarketRegime,
    pub confidence: f64,
    pub at: DateTime<Utc>,
}

/// State machine over regimes. Transitions require confidence above the
/// threshold and are rate-limited to prevent whipsaw reconfiguration; on
/// transition the active profile interpolates from the old parameters over
/// the configured window.
pub struct RegimeRouter {
    detector: RegimeDetector,
    config: DetectorConfig,
    table: RegimeProfileTable,
    current: MarketRegime,
    /// Profile we are interpolating away from
    from_profile: RegimeProfile,
    transition_started: Instant,
    recent_transitions: VecDeque<Instant>,
    history: Vec<RegimeTransition>,
}

impl RegimeRouter {
    pub fn new(config: DetectorConfig, table: RegimeProfileTable) -> Self {
        let initial = MarketRegime::Sideways;
        let profile = table.profile(initial);
        Self {
            detector: RegimeDetector::new(config.clone()),
            config,
            table,
            current: initial,
            from_profile: profile,
            transition_started: Instant::now(),
            recent_transitions: VecDeque::new(),
            history: Vec::new(),
        }
    }

    pub fn current_regime(&self) -> MarketRegime {
        self.current
    }

    /// The currently effective parameter profile, blended while a
    /// transition is still interpolating
    pub fn active_profile(&self) -> RegimeProfile {
        let target = self.table.profile(self.current);
        let window = self.config.interpolation_window_secs as f64;
        if window <= 0.0 {
            return target;
        }
        let t = self.transition_started.elapsed().as_secs_f64() / window;
        self.from_profile.lerp(&target, t)
    }

    /// Feed one market sample; returns the transition if one occurred
    pub fn observe(&mut self, sample: &MarketSample) -> Option<RegimeTransition> {
        let (regime, confidence) = self.detector.classify(sample);
        if regime == self.current {
            return None;
        }

        if confidence < self.config.confidence_threshold {
            tracing::debug!(
                candidate = regime.as_str(),
                confidence = confidence,
                threshold = self.config.confidence_threshold,
                "Regime change candidate below confidence threshold"
            );
            return None;
        }

        self.prune_transitions();
        if self.recent_transitions.len() >= self.config.max_transitions_per_hour {
            tracing::warn!(
                candidate = regime.as_str(),
                cap = self.config.max_transitions_per_hour,
                "Regime transition suppressed by rate cap"
            );
            return None;
        }

        // Freeze the currently effective (possibly mid-blend) profile as
        // the new interpolation origin so parameters stay continuous
        self.from_profile = self.active_profile();
        let transition = RegimeTransition {
            from: self.current,
            to: regime,
            confidence,
            at: Utc::now(),
        };

        tracing::info!(
            from = transition.from.as_str(),
            to = transition.to.as_str(),
            confidence = confidence,
            "Market regime transition"
        );

        self.current = regime;
        self.transition_started = Instant::now();
        self.recent_transitions.push_back(Instant::now());
        self.history.push(transition.clone());

        Some(transition)
    }

    fn prune_transitions(&mut self) {
        while let Some(front) = self.recent_transitions.front() {
            if front.elapsed().as_secs() > 3600 {
                self.recent_transitions.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn transition_history(&self) -> &[RegimeTransition] {
        &self.history
    }

    /// Swap the externally supplied parameter table; the new profile
    /// applies from the next `active_profile` read
    pub fn set_table(&mut self, table: RegimeProfileTable) {
        tracing::info!("Regime parameter table reloaded");
        self.table = table;
    }
}
