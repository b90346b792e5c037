//! Canonical signal records shared across the pipeline

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Enumerated signal producers feeding the pipeline
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SignalSource {
    EmaCloud,
    MeanReversion,
    MomentumBreakout,
    Sentiment,
    MlRanking,
}

impl SignalSource {
    /// All known sources, in a stable order
    pub const ALL: [SignalSource; 5] = [
        SignalSource::EmaCloud,
        SignalSource::MeanReversion,
        SignalSource::MomentumBreakout,
        SignalSource::Sentiment,
        SignalSource::MlRanking,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SignalSource::EmaCloud => "ema_cloud",
            SignalSource::MeanReversion => "mean_reversion",
            SignalSource::MomentumBreakout => "momentum_breakout",
            SignalSource::Sentiment => "sentiment",
            SignalSource::MlRanking => "ml_ranking",
        }
    }
}

/// Signal direction
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SignalDirection {
    Long,
    Short,
}

impl SignalDirection {
    /// Sign applied to conviction when computing raw scores
    pub fn sign(&self) -> f64 {
        match self {
            SignalDirection::Long => 1.0,
            SignalDirection::Short => -1.0,
        }
    }
}

/// Signal type, used to match signals against the active strategy family
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SignalType {
    Momentum,
    Breakout,
    MeanReversion,
    Reversal,
    Sentiment,
}

/// A normalized trade signal. Immutable after creation; downstream stages
/// consume it by reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub id: Uuid,
    pub ticker: String,
    pub source: SignalSource,
    pub direction: SignalDirection,
    /// Producer confidence, 0..=100
    pub conviction: f64,
    pub signal_type: SignalType,
    pub entry_price: Decimal,
    pub stop_loss: Decimal,
    pub target_price: Decimal,
    pub created_at: DateTime<Utc>,
    /// Opaque producer-specific fields
    pub metadata: serde_json::Value,
}

impl Signal {
    /// Age of the signal relative to `now`, in seconds (never negative)
    pub fn age_secs(&self, now: DateTime<Utc>) -> f64 {
        let millis = (now - self.created_at).num_milliseconds();
        (millis.max(0) as f64) / 1000.0
    }

    /// Signed raw score: conviction with direction applied
    pub fn raw_score(&self) -> f64 {
        self.conviction * self.direction.sign()
    }
}

/// One source's contribution to a fused signal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceContribution {
    pub source: SignalSource,
    pub weight: f64,
    pub raw_score: f64,
}

/// Weighted consensus signal for one ticker, derived from the signals that
/// arrived within the fusion window. Superseded, never mutated, by the next
/// fusion cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusedSignal {
    pub id: Uuid,
    pub ticker: String,
    /// Weighted composite, clamped to -100..=100
    pub composite_score: f64,
    pub contributing_sources: Vec<SourceContribution>,
    /// Fraction of contributors whose sign agrees with the composite
    pub agreement_ratio: f64,
    pub decay_applied: bool,
    /// Signal type of the highest-weighted contributor; drives strategy
    /// compatibility checks and sizing anchors downstream
    pub dominant_type: SignalType,
    pub dominant_direction: SignalDirection,
    pub entry_price: Decimal,
    pub stop_loss: Decimal,
    pub target_price: Decimal,
    /// Ids of the signals that produced this consensus
    pub signal_ids: Vec<Uuid>,
    pub fused_at: DateTime<Utc>,
}

impl FusedSignal {
    /// Direction implied by the composite sign
    pub fn direction(&self) -> SignalDirection {
        if self.composite_score >= 0.0 {
            SignalDirection::Long
        } else {
            SignalDirection::Short
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_raw_score_sign() {
        let mut signal = Signal {
            id: Uuid::new_v4(),
            ticker: "AAPL".to_string(),
            source: SignalSource::EmaCloud,
            direction: SignalDirection::Long,
            conviction: 80.0,
            signal_type: SignalType::Momentum,
            entry_price: dec!(190.0),
            stop_loss: dec!(185.0),
            target_price: dec!(200.0),
            created_at: Utc::now(),
            metadata: serde_json::json!({}),
        };

        assert_eq!(signal.raw_score(), 80.0);

        signal.direction = SignalDirection::Short;
        assert_eq!(signal.raw_score(), -80.0);
    }

    #[test]
    fn test_age_never_negative() {
        let signal = Signal {
            id: Uuid::new_v4(),
            ticker: "AAPL".to_string(),
            source: SignalSource::Sentiment,
            direction: SignalDirection::Long,
            conviction: 50.0,
            signal_type: SignalType::Sentiment,
            entry_price: dec!(10.0),
            stop_loss: dec!(9.0),
            target_price: dec!(12.0),
            created_at: Utc::now() + chrono::Duration::seconds(5),
            metadata: serde_json::json!({}),
        };

        assert_eq!(signal.age_secs(Utc::now()), 0.0);
    }
}
