//! Periodic background tasks owned by the orchestrator binary

use pipeline::{PipelineConfig, PipelineEngine};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Shared quote board the feed loop updates and the sweep task reads
pub type QuoteBoard = Arc<RwLock<HashMap<String, Decimal>>>;

/// Spawn the pipeline's periodic side channels: risk snapshot refresh (at
/// or under the staleness bound), the lifecycle sweep, and guard pruning.
pub fn spawn_background_tasks(
    engine: Arc<PipelineEngine>,
    config: &PipelineConfig,
    quotes: QuoteBoard,
) -> Vec<JoinHandle<()>> {
    let mut handles = Vec::new();

    {
        let engine = engine.clone();
        let secs = config.snapshot_refresh_secs.max(1);
        handles.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(secs));
            loop {
                interval.tick().await;
                engine.refresh_snapshot().await;
            }
        }));
    }

    {
        let engine = engine.clone();
        let quotes = quotes.clone();
        let secs = config.sweep_interval_secs.max(1);
        handles.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(secs));
            loop {
                interval.tick().await;
                let board = quotes
                    .read()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .clone();
                engine.sweep_positions(&board).await;
            }
        }));
    }

    {
        let engine = engine.clone();
        let secs = config.guard.dedup_window_secs.max(1);
        handles.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(secs));
            loop {
                interval.tick().await;
                engine.prune_guard();
            }
        }));
    }

    handles
}
