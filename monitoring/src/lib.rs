//! Monitoring & Compliance (Layer 6)
//!
//! Alert dispatch with incident dedup, and the hash-chained append-only
//! audit ledger backing tamper-evident compliance replay.

pub mod alerts;
pub mod audit;

pub use alerts::{AlertDispatcher, AlertManager, LogDispatcher};
pub use audit::{
    chain_hash, AuditLedger, AuditLog, AuditRecord, AuditStore, ChainBreak, PostgresAuditStore,
    GENESIS_HASH,
};
