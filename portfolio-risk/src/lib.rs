//! Portfolio Risk Gate (Layer 3)
//!
//! Owns the point-in-time risk snapshot, the unified pre-trade gate with
//! its correlation guard, and position sizing for approved signals.

mod config;
mod correlation;
mod gate;
mod sizer;
mod snapshot;

pub use config::{
    load_config, save_config, InstrumentInfo, RiskConfig, RiskLimits, SizerConfig,
};
pub use correlation::{CorrelationTracker, CorrelationView};
pub use gate::{GateDecision, GateOutcome, OrderCandidate, RiskGate};
pub use sizer::PositionSizer;
pub use snapshot::{SnapshotHandle, SnapshotPublisher};
