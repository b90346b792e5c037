//! Circuit breaker and kill switch state enums

use serde::{Deserialize, Serialize};

/// Circuit breaker state. Transitions happen only inside the breaker's own
/// state machine; there is no external writer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal trading
    Closed,
    /// Halted, no new entries
    Open,
    /// Probationary reduced-size trading after cooldown
    HalfOpen,
}

impl CircuitState {
    /// Position size multiplier applied to new entries in this state
    pub fn size_multiplier(&self) -> f64 {
        match self {
            CircuitState::Closed => 1.0,
            CircuitState::HalfOpen => 0.5,
            CircuitState::Open => 0.0,
        }
    }
}

/// Kill switch state. Stricter than the circuit breaker: once triggered,
/// only a manual rearm resumes trading.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum KillState {
    Disarmed,
    Armed,
    Triggered,
}
