//! Versioned per-source fusion weights

use crate::shared::Published;
use crate::signal::SignalSource;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// What caused a weight adjustment
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WeightTrigger {
    Scheduled,
    Manual,
    Rollback,
}

/// Realized performance of one source over the evaluation window
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourcePerformance {
    pub samples: usize,
    pub win_rate: f64,
    pub sharpe: Option<f64>,
    pub total_pnl: f64,
}

/// The performance context that produced a weight snapshot
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WeightContext {
    pub per_source: HashMap<SignalSource, SourcePerformance>,
    pub trades_observed: usize,
}

/// Versioned record of per-source fusion weights. Append-only history: the
/// feedback loop is the sole writer, fusion reads only the latest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightSnapshot {
    pub version: u64,
    pub weights: HashMap<SignalSource, f64>,
    pub trigger: WeightTrigger,
    pub context: WeightContext,
    /// Rollback pointer to the snapshot this one superseded
    pub prior_version: Option<u64>,
    pub created_at: DateTime<Utc>,
}

impl WeightSnapshot {
    /// Equal weights across all known sources, version 0
    pub fn default_weights() -> Self {
        let n = SignalSource::ALL.len() as f64;
        let weights = SignalSource::ALL
            .iter()
            .map(|s| (*s, 1.0 / n))
            .collect();

        Self {
            version: 0,
            weights,
            trigger: WeightTrigger::Manual,
            context: WeightContext::default(),
            prior_version: None,
            created_at: Utc::now(),
        }
    }

    /// Weight for a source; unknown sources weigh nothing
    pub fn weight_of(&self, source: SignalSource) -> f64 {
        self.weights.get(&source).copied().unwrap_or(0.0)
    }

    pub fn sum(&self) -> f64 {
        self.weights.values().sum()
    }
}

/// Shared handle over the latest published weight snapshot. Fusion reads
/// through this on every call; the feedback loop publishes through it.
pub type WeightHandle = Arc<Published<WeightSnapshot>>;

pub fn weight_handle(initial: WeightSnapshot) -> WeightHandle {
    Arc::new(Published::new(initial))
}
