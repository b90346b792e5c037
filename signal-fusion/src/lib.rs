// Signal Normalization, Guarding & Fusion (Layer 1)
// Turns heterogeneous producer outputs into guarded, fused consensus signals

pub mod fusion;
pub mod guard;
pub mod normalize;

pub use fusion::{FusionConfig, FusionEngine};
pub use guard::{Admission, GuardConfig, GuardStats, RejectReason, SignalGuard};
pub use normalize::{RawProducerOutput, SignalNormalizer, SignalProducer};
