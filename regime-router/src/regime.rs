//! Market regimes and their parameter profiles

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Classified market state driving parameter adaptation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MarketRegime {
    Bull,
    Bear,
    Sideways,
    Crisis,
}

impl MarketRegime {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarketRegime::Bull => "bull",
            MarketRegime::Bear => "bear",
            MarketRegime::Sideways => "sideways",
            MarketRegime::Crisis => "crisis",
        }
    }
}

/// Pipeline parameters carried by a regime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RegimeProfile {
    /// Maximum concurrently open positions
    pub max_positions: usize,
    /// Daily loss limit as a fraction of equity
    pub daily_loss_limit: f64,
    /// Minimum absolute composite score a fused signal needs to trade
    pub signal_threshold: f64,
    /// Multiplier applied to stop distances when sizing
    pub stop_multiplier: f64,
}

impl RegimeProfile {
    /// Linear blend between two profiles; `t` in 0..=1 moves from `self`
    /// toward `target`. Used to phase parameters in over the interpolation
    /// window instead of stepping them.
    pub fn lerp(&self, target: &RegimeProfile, t: f64) -> RegimeProfile {
        let t = t.clamp(0.0, 1.0);
        let blend = |a: f64, b: f64| a + (b - a) * t;
        RegimeProfile {
            max_positions: blend(self.max_positions as f64, target.max_positions as f64).round()
                as usize,
            daily_loss_limit: blend(self.daily_loss_limit, target.daily_loss_limit),
            signal_threshold: blend(self.signal_threshold, target.signal_threshold),
            stop_multiplier: blend(self.stop_multiplier, target.stop_multiplier),
        }
    }
}

/// Per-regime parameter table, externally supplied and hot-reloadable
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimeProfileTable {
    pub profiles: HashMap<MarketRegime, RegimeProfile>,
}

impl RegimeProfileTable {
    pub fn profile(&self, regime: MarketRegime) -> RegimeProfile {
        self.profiles
            .get(&regime)
            .copied()
            .unwrap_or_else(|| Self::default().profiles[&regime])
    }
}

impl Default for RegimeProfileTable {
    fn default() -> Self {
        let mut profiles = HashMap::new();
        profiles.insert(
            MarketRegime::Bull,
            RegimeProfile {
                max_positions: 12,
                daily_loss_limit: 0.03,
                signal_threshold: 35.0,
                stop_multiplier: 1.0,
            },
        );
        profiles.insert(
            MarketRegime::Bear,
            RegimeProfile {
                max_positions: 6,
                daily_loss_limit: 0.02,
                signal_threshold: 50.0,
                stop_multiplier: 0.8,
            },
        );
        profiles.insert(
            MarketRegime::Sideways,
            RegimeProfile {
                max_positions: 8,
                daily_loss_limit: 0.025,
                signal_threshold: 45.0,
                stop_multiplier: 0.9,
            },
        );
        profiles.insert(
            MarketRegime::Crisis,
            RegimeProfile {
                max_positions: 2,
                daily_loss_limit: 0.01,
                signal_threshold: 70.0,
                stop_multiplier: 0.5,
            },
        );
        Self { profiles }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lerp_endpoints() {
        let table = RegimeProfileTable::default();
        let bull = table.profile(MarketRegime::Bull);
        let crisis = table.profile(MarketRegime::Crisis);

        assert_eq!(bull.lerp(&crisis, 0.0), bull);
        assert_eq!(bull.lerp(&crisis, 1.0), crisis);

        let mid = bull.lerp(&crisis, 0.5);
        assert!(mid.signal_threshold > bull.signal_threshold);
        assert!(mid.signal_threshold < crisis.signal_threshold);
    }

    #[test]
    fn test_default_table_covers_all_regimes() {
        let table = RegimeProfileTable::default();
        for regime in [
            MarketRegime::Bull,
            MarketRegime::Bear,
            MarketRegime::Sideways,
            MarketRegime::Crisis,
        ] {
            assert!(table.profiles.contains_key(&regime));
        }
    }
}
