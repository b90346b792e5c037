// Signal Normalizer
// Converts heterogeneous producer outputs into canonical signal records

use chrono::{DateTime, Utc};
use common::{PipelineError, Signal, SignalDirection, SignalSource, SignalType};
use rust_decimal::Decimal;
use uuid::Uuid;

/// Raw output emitted by an external signal producer. The pipeline does not
/// know producer internals; this is the single entry shape they all map to.
#[derive(Debug, Clone)]
pub struct RawProducerOutput {
    pub source: SignalSource,
    pub ticker: String,
    pub direction: SignalDirection,
    pub conviction: f64,
    pub signal_type: SignalType,
    pub entry_price: Decimal,
    pub stop_loss: Decimal,
    pub target_price: Decimal,
    /// Producer timestamp; defaults to now when absent
    pub generated_at: Option<DateTime<Utc>>,
    pub metadata: serde_json::Value,
}

/// Producer interface consumed by the pipeline. Each collaborator (momentum
/// engine, mean-reversion engine, sentiment engine, ML ranking, ...) emits
/// raw outputs through this trait.
#[async_trait::async_trait]
pub trait SignalProducer: Send + Sync {
    /// Drain whatever signals the producer has accumulated
    async fn poll(&self) -> anyhow::Result<Vec<RawProducerOutput>>;

    fn source(&self) -> SignalSource;
}

/// Validates and canonicalizes raw producer outputs
#[derive(Debug, Clone, Default)]
pub struct SignalNormalizer;

impl SignalNormalizer {
    pub fn new() -> Self {
        Self
    }

    /// The single normalization call. Malformed inputs are a
    /// `Validation` error: dropped, logged, never retried.
    pub fn normalize(&self, raw: RawProducerOutput) -> Result<Signal, PipelineError> {
        let ticker = raw.ticker.trim().to_uppercase();
        if ticker.is_empty() {
            return Err(PipelineError::Validation(
                "signal ticker is empty".to_string(),
            ));
        }

        if !(0.0..=100.0).contains(&raw.conviction) || !raw.conviction.is_finite() {
            return Err(PipelineError::Validation(format!(
                "conviction {} outside 0..=100",
                raw.conviction
            )));
        }

        if raw.entry_price <= Decimal::ZERO
            || raw.stop_loss <= Decimal::ZERO
            || raw.target_price <= Decimal::ZERO
        {
            return Err(PipelineError::Validation(format!(
                "non-positive price on {} signal for {}",
                raw.source.as_str(),
                ticker
            )));
        }

        // Stop and target must sit on the correct side of entry for the
        // stated direction
        let sides_ok = match raw.direction {
            SignalDirection::Long => {
                raw.stop_loss < raw.entry_price && raw.target_price > raw.entry_price
            }
            SignalDirection::Short => {
                raw.stop_loss > raw.entry_price && raw.target_price < raw.entry_price
            }
        };
        if !sides_ok {
            return Err(PipelineError::Validation(format!(
                "stop/target inverted for {:?} {} (entry {}, stop {}, target {})",
                raw.direction, ticker, raw.entry_price, raw.stop_loss, raw.target_price
            )));
        }

        let signal = Signal {
            id: Uuid::new_v4(),
            ticker,
            source: raw.source,
            direction: raw.direction,
            conviction: raw.conviction,
            signal_type: raw.signal_type,
            entry_price: raw.entry_price,
            stop_loss: raw.stop_loss,
            target_price: raw.target_price,
            created_at: raw.generated_at.unwrap_or_else(Utc::now),
            metadata: raw.metadata,
        };

        tracing::debug!(
            signal_id = %signal.id,
            ticker = %signal.ticker,
            source = signal.source.as_str(),
            conviction = signal.conviction,
            "Signal normalized"
        );

        Ok(signal)
    }
}
