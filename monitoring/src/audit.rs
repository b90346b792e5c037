//! Hash-chained append-only audit ledger
//!
//! Every pipeline decision record is chained to its predecessor: the
//! stored hash covers the canonical payload bytes plus the previous
//! record's hash. Verification is a pure linear scan recomputing the
//! chain, so tampering with any record breaks every hash after it.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::postgres::PgPool;
use std::sync::{Arc, Mutex};

/// Hash of the empty chain head
pub const GENESIS_HASH: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

/// One chained audit record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub seq: u64,
    /// Record kind: admitted_signal, fused_signal, gate_decision,
    /// order_transition, circuit_transition, kill_transition,
    /// weight_snapshot, ...
    pub kind: String,
    pub payload: serde_json::Value,
    pub prev_hash: String,
    pub hash: String,
    pub recorded_at: DateTime<Utc>,
}

/// sha256 over canonical payload bytes followed by the previous hash
pub fn chain_hash(payload: &serde_json::Value, prev_hash: &str) -> String {
    let mut hasher = Sha256::new();
    // serde_json orders object keys, so the byte form is canonical
    hasher.update(payload.to_string().as_bytes());
    hasher.update(prev_hash.as_bytes());
    hex::encode(hasher.finalize())
}

/// Where chain verification failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainBreak {
    pub seq: u64,
    pub expected: String,
    pub found: String,
}

/// In-memory append-only chain
#[derive(Debug, Default)]
pub struct AuditLog {
    records: Vec<AuditRecord>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
        }
    }

    /// Append a record, chaining it to the current head
    pub fn append(&mut self, kind: &str, payload: serde_json::Value) -> AuditRecord {
        let prev_hash = self
            .records
            .last()
            .map(|r| r.hash.clone())
            .unwrap_or_else(|| GENESIS_HASH.to_string());

        let record = AuditRecord {
            seq: self.records.len() as u64,
            kind: kind.to_string(),
            hash: chain_hash(&payload, &prev_hash),
            payload,
            prev_hash,
            recorded_at: Utc::now(),
        };

        self.records.push(record.clone());
        record
    }

    /// Linear scan recomputing every hash; returns the first break found
    pub fn verify(&self) -> Result<(), ChainBreak> {
        let mut prev_hash = GENESIS_HASH.to_string();

        for record in &self.records {
            if record.prev_hash != prev_hash {
                return Err(ChainBreak {
                    seq: record.seq,
                    expected: prev_hash,
                    found: record.prev_hash.clone(),
                });
            }

            let expected = chain_hash(&record.payload, &prev_hash);
            if record.hash != expected {
                return Err(ChainBreak {
                    seq: record.seq,
                    expected,
                    found: record.hash.clone(),
                });
            }

            prev_hash = record.hash.clone();
        }

        Ok(())
    }

    pub fn records(&self) -> &[AuditRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Thread-safe ledger handle shared across pipeline stages
#[derive(Clone, Default)]
pub struct AuditLedger {
    log: Arc<Mutex<AuditLog>>,
}

impl AuditLedger {
    pub fn new() -> Self {
        Self {
            log: Arc::new(Mutex::new(AuditLog::new())),
        }
    }

    pub fn append(&self, kind: &str, payload: serde_json::Value) -> AuditRecord {
        let mut log = self
            .log
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        log.append(kind, payload)
    }

    pub fn verify(&self) -> Result<(), ChainBreak> {
        self.log
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .verify()
    }

    pub fn snapshot(&self) -> Vec<AuditRecord> {
        self.log
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .records()
            .to_vec()
    }

    pub fn len(&self) -> usize {
        self.log
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Persistence sink for audit records
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn persist(&self, record: &AuditRecord) -> Result<()>;

    async fn load_all(&self) -> Result<Vec<AuditRecord>>;
}

/// Postgres-backed audit sink
pub struct PostgresAuditStore {
    pool: Arc<PgPool>,
}

impl PostgresAuditStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Create the audit table
    pub async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS audit_chain (
                seq BIGINT PRIMARY KEY,
                kind TEXT NOT NULL,
                payload JSONB NOT NULL,
                prev_hash TEXT NOT NULL,
                hash TEXT NOT NULL,
                recorded_at TIMESTAMPTZ NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_audit_kind ON audit_chain(kind);
            CREATE INDEX IF NOT EXISTS idx_audit_time ON audit_chain(recorded_at);
            "#,
        )
        .execute(self.pool.as_ref())
        .await
        .context("Failed to create audit chain table")?;

        tracing::info!("Audit chain table initialized");
        Ok(())
    }
}

#[async_trait]
impl AuditStore for PostgresAuditStore {
    async fn persist(&self, record: &AuditRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_chain (seq, kind, payload, prev_hash, hash, recorded_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (seq) DO NOTHING
            "#,
        )
        .bind(record.seq as i64)
        .bind(&record.kind)
        .bind(&record.payload)
        .bind(&record.prev_hash)
        .bind(&record.hash)
        .bind(record.recorded_at)
        .execute(self.pool.as_ref())
        .await
        .context("Failed to persist audit record")?;

        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<AuditRecord>> {
        let rows = sqlx::query_as::<
            _,
            (i64, String, serde_json::Value, String, String, DateTime<Utc>),
        >(
            r#"
            SELECT seq, kind, payload, prev_hash, hash, recorded_at
            FROM audit_chain
            ORDER BY seq
            "#,
        )
        .fetch_all(self.pool.as_ref())
        .await
        .context("Failed to load audit chain")?;

        Ok(rows
            .into_iter()
            .map(
                |(seq, kind, payload, prev_hash, hash, recorded_at)| AuditRecord {
                    seq: seq as u64,
                    kind,
                    payload,
                    prev_hash,
                    hash,
                    recorded_at,
                },
            )
            .collect())
    }
}
