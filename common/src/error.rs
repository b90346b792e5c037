//! Pipeline error taxonomy
//!
//! Every variant carries the human-readable reason string that is persisted
//! alongside the decision record, so operators can reconstruct "why" post
//! hoc. Only `BrokerTransient` is locally recoverable (bounded
//! retry/failover); everything else is dropped with an audit record or
//! escalated to an alert.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum PipelineError {
    /// Malformed signal or order: dropped, logged, never retried
    #[error("validation failed: {0}")]
    Validation(String),

    /// Guard rejection or stale risk snapshot: dropped, not retried
    #[error("stale data: {0}")]
    StaleData(String),

    /// Risk gate rejection: terminal for the signal
    #[error("risk denied: {0}")]
    RiskDenied(String),

    /// Timeout or rate-limit at a broker: eligible for failover retry
    #[error("transient broker error: {0}")]
    BrokerTransient(String),

    /// Terminal broker failure after exhausting failover
    #[error("broker failure: {0}")]
    BrokerFailure(String),

    /// Unhandled fault caught at the orchestration boundary; counts toward
    /// the kill switch's consecutive-error trigger
    #[error("operational fault: {0}")]
    Operational(String),
}

impl PipelineError {
    /// Only transient broker errors may be retried, and only at the
    /// routing layer
    pub fn is_transient(&self) -> bool {
        matches!(self, PipelineError::BrokerTransient(_))
    }

    /// Stable kind tag for audit records
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Validation(_) => "validation_error",
            PipelineError::StaleData(_) => "stale_data_error",
            PipelineError::RiskDenied(_) => "risk_denied",
            PipelineError::BrokerTransient(_) => "broker_transient",
            PipelineError::BrokerFailure(_) => "broker_failure",
            PipelineError::Operational(_) => "operational_fault",
        }
    }

    /// The reason string carried by every variant
    pub fn reason(&self) -> &str {
        match self {
            PipelineError::Validation(r)
            | PipelineError::StaleData(r)
            | PipelineError::RiskDenied(r)
            | PipelineError::BrokerTransient(r)
            | PipelineError::BrokerFailure(r)
            | PipelineError::Operational(r) => r,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_broker_transient_is_retryable() {
        assert!(PipelineError::BrokerTransient("timeout".into()).is_transient());
        assert!(!PipelineError::BrokerFailure("down".into()).is_transient());
        assert!(!PipelineError::RiskDenied("cap".into()).is_transient());
        assert!(!PipelineError::Validation("bad".into()).is_transient());
    }

    #[test]
    fn test_reason_is_preserved() {
        let err = PipelineError::RiskDenied("correlation_cap_exceeded".into());
        assert_eq!(err.reason(), "correlation_cap_exceeded");
        assert_eq!(err.kind(), "risk_denied");
    }
}
