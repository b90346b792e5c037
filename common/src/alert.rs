//! Structured alert events emitted to the external dispatcher

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

/// A structured alert. `dedup_key` identifies the logical incident so the
/// dispatcher can suppress repeat notifications within the same storm.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertEvent {
    pub name: String,
    pub severity: AlertSeverity,
    pub message: String,
    pub dedup_key: String,
    pub metadata: serde_json::Value,
}

impl AlertEvent {
    pub fn new(name: &str, severity: AlertSeverity, message: &str, dedup_key: &str) -> Self {
        Self {
            name: name.to_string(),
            severity,
            message: message.to_string(),
            dedup_key: dedup_key.to_string(),
            metadata: serde_json::json!({}),
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}
