//! Canonical data model for the signal-to-execution pipeline
//!
//! Every stage of the pipeline speaks in terms of these records: normalized
//! signals, fused consensus signals, risk snapshots, pipeline orders, open
//! positions, versioned fusion weights, and the circuit/kill state enums.

mod alert;
mod circuit;
mod error;
mod order;
mod position;
mod risk;
mod shared;
mod signal;
mod weights;

pub use alert::{AlertEvent, AlertSeverity};
pub use circuit::{CircuitState, KillState};
pub use error::PipelineError;
pub use order::{AssetClass, OrderSide, OrderStatus, OrderType, PipelineOrder};
pub use position::Position;
pub use risk::RiskSnapshot;
pub use shared::Published;
pub use signal::{
    FusedSignal, Signal, SignalDirection, SignalSource, SignalType, SourceContribution,
};
pub use weights::{
    weight_handle, SourcePerformance, WeightContext, WeightHandle, WeightSnapshot, WeightTrigger,
};

pub use uuid::Uuid;
