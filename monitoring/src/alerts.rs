//! Alert dispatch with incident dedup
//!
//! The pipeline emits structured alerts (kill-switch activation, daily
//! loss warnings, guard-rejection spikes, emergency closes) through a
//! dispatcher; repeats sharing a dedup key within the suppression window
//! are dropped so one incident cannot storm the channel.

use anyhow::Result;
use async_trait::async_trait;
use common::{AlertEvent, AlertSeverity};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// External alert channel
#[async_trait]
pub trait AlertDispatcher: Send + Sync {
    async fn dispatch(&self, event: &AlertEvent) -> Result<()>;
}

/// Dispatcher that writes alerts to the structured log
#[derive(Debug, Default)]
pub struct LogDispatcher;

#[async_trait]
impl AlertDispatcher for LogDispatcher {
    async fn dispatch(&self, event: &AlertEvent) -> Result<()> {
        match event.severity {
            AlertSeverity::Critical => tracing::error!(
                name = %event.name,
                dedup_key = %event.dedup_key,
                "ALERT: {}",
                event.message
            ),
            AlertSeverity::Warning => tracing::warn!(
                name = %event.name,
                dedup_key = %event.dedup_key,
                "ALERT: {}",
                event.message
            ),
            AlertSeverity::Info => tracing::info!(
                name = %event.name,
                dedup_key = %event.dedup_key,
                "ALERT: {}",
                event.message
            ),
        }
        Ok(())
    }
}

/// Deduplicating front door for alert emission
pub struct AlertManager {
    dispatcher: Arc<dyn AlertDispatcher>,
    suppression_window: Duration,
    recent: Mutex<HashMap<String, Instant>>,
}

impl AlertManager {
    pub fn new(dispatcher: Arc<dyn AlertDispatcher>, suppression_window: Duration) -> Self {
        Self {
            dispatcher,
            suppression_window,
            recent: Mutex::new(HashMap::new()),
        }
    }

    /// Emit an alert; returns false when it was suppressed as a repeat of
    /// the same incident
    pub async fn emit(&self, event: AlertEvent) -> Result<bool> {
        {
            let mut recent = self
                .recent
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());

            if let Some(last) = recent.get(&event.dedup_key) {
                if last.elapsed() < self.suppression_window {
                    tracing::debug!(
                        dedup_key = %event.dedup_key,
                        "Alert suppressed within incident window"
                    );
                    return Ok(false);
                }
            }
            recent.insert(event.dedup_key.clone(), Instant::now());
            recent.retain(|_, at| at.elapsed() < self.suppression_window.saturating_mul(4));
        }

        self.dispatcher.dispatch(&event).await?;
        Ok(true)
    }
}
