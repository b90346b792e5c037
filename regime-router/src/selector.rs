//! Strategy family selection and fused-signal compatibility validation

use common::{FusedSignal, PipelineError, SignalType};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Closed set of strategy families the pipeline routes between
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StrategyFamily {
    Momentum,
    MeanReversion,
}

impl StrategyFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyFamily::Momentum => "momentum",
            StrategyFamily::MeanReversion => "mean_reversion",
        }
    }
}

/// Fixed lookup table mapping each family to the signal types it can trade
#[derive(Debug, Clone)]
pub struct StrategyRegistry {
    compatible: HashMap<StrategyFamily, Vec<SignalType>>,
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        let mut compatible = HashMap::new();
        compatible.insert(
            StrategyFamily::Momentum,
            vec![
                SignalType::Momentum,
                SignalType::Breakout,
                SignalType::Sentiment,
            ],
        );
        compatible.insert(
            StrategyFamily::MeanReversion,
            vec![
                SignalType::MeanReversion,
                SignalType::Reversal,
                SignalType::Sentiment,
            ],
        );
        Self { compatible }
    }
}

impl StrategyRegistry {
    pub fn is_compatible(&self, family: StrategyFamily, signal_type: SignalType) -> bool {
        self.compatible
            .get(&family)
            .map(|types| types.contains(&signal_type))
            .unwrap_or(false)
    }
}

/// Selector configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectorConfig {
    /// ADX reading at or above this routes to momentum-style strategies
    pub trending_threshold: f64,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            trending_threshold: 25.0,
        }
    }
}

/// Routes between strategy families on trend strength and validates fused
/// signals against the active family
pub struct StrategySelector {
    config: SelectorConfig,
    registry: StrategyRegistry,
}

impl StrategySelector {
    pub fn new(config: SelectorConfig) -> Self {
        Self {
            config,
            registry: StrategyRegistry::default(),
        }
    }

    /// Pick the family for the current trend strength. A missing reading
    /// (not enough bars yet) defaults to mean reversion, the lower-risk
    /// family.
    pub fn select(&self, trend_strength: Option<f64>) -> StrategyFamily {
        match trend_strength {
            Some(adx) if adx >= self.config.trending_threshold => StrategyFamily::Momentum,
            _ => StrategyFamily::MeanReversion,
        }
    }

    /// Reject fused signals whose dominant type the active family cannot
    /// trade
    pub fn validate(
        &self,
        fused: &FusedSignal,
        family: StrategyFamily,
    ) -> Result<(), PipelineError> {
        if self.registry.is_compatible(family, fused.dominant_type) {
            return Ok(());
        }

        let reason = format!(
            "signal_type {:?} incompatible with strategy family {}",
            fused.dominant_type,
            family.as_str()
        );
        tracing::info!(
            ticker = %fused.ticker,
            signal_type = ?fused.dominant_type,
            family = family.as_str(),
            "Fused signal rejected by strategy selector"
        );
        Err(PipelineError::Validation(reason))
    }
}

impl Default for StrategySelector {
    fn default() -> Self {
        Self::new(SelectorConfig::default())
    }
}
