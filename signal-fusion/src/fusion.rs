// Signal Fusion
// Merges admitted signals per ticker into one weighted consensus signal

use chrono::Utc;
use common::{FusedSignal, Signal, SourceContribution, WeightHandle};
use std::collections::HashMap;

/// Fusion configuration
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct FusionConfig {
    /// Exponential decay rate per second of signal age
    #[serde(default = "default_lambda")]
    pub lambda: f64,
    /// Signals older than this are excluded from fusion (seconds)
    #[serde(default = "default_window")]
    pub fusion_window_secs: u64,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            lambda: default_lambda(),
            fusion_window_secs: default_window(),
        }
    }
}

fn default_lambda() -> f64 {
    0.005
}

fn default_window() -> u64 {
    300
}

/// Weighted consensus fusion. Weights are read through the shared handle on
/// every call, so a published update takes effect on the next `fuse` and
/// never rewrites past fused records.
pub struct FusionEngine {
    config: FusionConfig,
    weights: WeightHandle,
}

impl FusionEngine {
    pub fn new(config: FusionConfig, weights: WeightHandle) -> Self {
        Self { config, weights }
    }

    /// Fuse a batch of admitted signals into per-ticker consensus signals.
    /// Tickers whose signals all fall outside the fusion window produce
    /// nothing.
    pub fn fuse(&self, signals: &[Signal]) -> Vec<FusedSignal> {
        let now = Utc::now();
        let weights = self.weights.load();
        let window = self.config.fusion_window_secs as f64;

        let mut groups: HashMap<&str, Vec<&Signal>> = HashMap::new();
        for signal in signals {
            if signal.age_secs(now) <= window {
                groups.entry(signal.ticker.as_str()).or_default().push(signal);
            }
        }

        let mut fused: Vec<FusedSignal> = Vec::with_capacity(groups.len());

        for (ticker, group) in groups {
            let mut weighted_sum = 0.0;
            let mut weight_norm = 0.0;
            let mut decay_applied = false;
            let mut contributions = Vec::with_capacity(group.len());

            // Anchor prices/type on the most influential contributor
            let mut dominant: Option<(&Signal, f64)> = None;

            for signal in &group {
                let weight = weights.weight_of(signal.source);
                if weight <= 0.0 {
                    continue;
                }

                let age = signal.age_secs(now);
                let decay = (-self.config.lambda * age).exp();
                if decay < 1.0 {
                    decay_applied = true;
                }

                let raw = signal.raw_score();
                let effective = weight * decay;

                weighted_sum += effective * raw;
                weight_norm += effective;

                contributions.push(SourceContribution {
                    source: signal.source,
                    weight,
                    raw_score: raw,
                });

                match dominant {
                    Some((_, best)) if best >= effective => {}
                    _ => dominant = Some((*signal, effective)),
                }
            }

            let Some((anchor, _)) = dominant else {
                continue;
            };
            if weight_norm <= 0.0 {
                continue;
            }

            let composite = (weighted_sum / weight_norm).clamp(-100.0, 100.0);
            let comp_sign = if composite >= 0.0 { 1.0 } else { -1.0 };
            let agreeing = contributions
                .iter()
                .filter(|c| c.raw_score * comp_sign > 0.0)
                .count();
            let agreement_ratio = agreeing as f64 / contributions.len() as f64;

            tracing::debug!(
                ticker = ticker,
                composite = composite,
                sources = contributions.len(),
                agreement = agreement_ratio,
                "Fused consensus signal"
            );

            fused.push(FusedSignal {
                id: uuid::Uuid::new_v4(),
                ticker: ticker.to_string(),
                composite_score: composite,
                agreement_ratio,
                decay_applied,
                dominant_type: anchor.signal_type,
                dominant_direction: anchor.direction,
                entry_price: anchor.entry_price,
                stop_loss: anchor.stop_loss,
                target_price: anchor.target_price,
                signal_ids: group.iter().map(|s| s.id).collect(),
                contributing_sources: contributions,
                fused_at: now,
            });
        }

        fused
    }
}
