//! Multi-broker smart routing with bounded failover
//!
//! Brokers are scored on cost, speed, and fill quality; submission walks
//! the ranked eligible venues with a per-attempt timeout, retrying only
//! confirmed-unsubmitted orders. The client-assigned order id makes a
//! retried submission idempotent at the venue.

use crate::broker::{BrokerAdapter, BrokerError, FillReport};
use chrono::{DateTime, Utc};
use common::{OrderStatus, PipelineError, PipelineOrder};
use dashmap::DashMap;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Router scoring and retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    #[serde(default = "default_cost_weight")]
    pub cost_weight: f64,
    #[serde(default = "default_speed_weight")]
    pub speed_weight: f64,
    #[serde(default = "default_fill_weight")]
    pub fill_quality_weight: f64,
    /// Per-attempt submission timeout (milliseconds)
    #[serde(default = "default_attempt_timeout")]
    pub attempt_timeout_ms: u64,
    /// Total submission attempts across all venues
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,
    /// Base backoff between attempts (milliseconds, jittered)
    #[serde(default = "default_backoff")]
    pub retry_backoff_ms: u64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            cost_weight: default_cost_weight(),
            speed_weight: default_speed_weight(),
            fill_quality_weight: default_fill_weight(),
            attempt_timeout_ms: default_attempt_timeout(),
            max_attempts: default_max_attempts(),
            retry_backoff_ms: default_backoff(),
        }
    }
}

fn default_cost_weight() -> f64 {
    0.40
}

fn default_speed_weight() -> f64 {
    0.30
}

fn default_fill_weight() -> f64 {
    0.30
}

fn default_attempt_timeout() -> u64 {
    2_000
}

fn default_max_attempts() -> usize {
    3
}

fn default_backoff() -> u64 {
    100
}

/// Rolling per-broker execution statistics feeding the speed and
/// fill-quality scores
#[derive(Debug, Clone)]
struct BrokerStats {
    latency_ewma_ms: f64,
    fill_quality: f64,
    attempts: u64,
    failures: u64,
}

impl Default for BrokerStats {
    fn default() -> Self {
        Self {
            latency_ewma_ms: 50.0,
            fill_quality: 0.8,
            attempts: 0,
            failures: 0,
        }
    }
}

/// Chosen venue for an order
#[derive(Debug, Clone)]
pub struct RouteDecision {
    pub broker: String,
    pub expected_cost: f64,
    pub confidence: f64,
}

/// Result of one submission attempt, retained for routing-quality analysis
#[derive(Debug, Clone)]
pub struct RouteAttempt {
    pub broker: String,
    pub outcome: AttemptOutcome,
    pub latency_ms: f64,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    Filled,
    TimedOut,
    TransientError(String),
    TerminalError(String),
}

/// Final execution result including the attempt trail
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    pub fill: FillReport,
    pub route: RouteDecision,
    pub attempts: Vec<RouteAttempt>,
}

pub struct OrderRouter {
    brokers: Vec<Arc<dyn BrokerAdapter>>,
    stats: DashMap<String, BrokerStats>,
    config: std::sync::RwLock<RouterConfig>,
}

impl OrderRouter {
    pub fn new(config: RouterConfig) -> Self {
        Self {
            brokers: Vec::new(),
            stats: DashMap::new(),
            config: std::sync::RwLock::new(config),
        }
    }

    /// Swap scoring weights and retry bounds without restarting; applies
    /// from the next routing call
    pub fn set_config(&self, config: RouterConfig) {
        let mut slot = self
            .config
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = config;
    }

    fn config(&self) -> RouterConfig {
        self.config
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn register(&mut self, broker: Arc<dyn BrokerAdapter>) {
        tracing::info!(broker = broker.name(), "Broker registered with router");
        self.brokers.push(broker);
    }

    pub fn broker_count(&self) -> usize {
        self.brokers.len()
    }

    /// Venues that support the order's asset class, best score first
    fn ranked_eligible(&self, order: &PipelineOrder) -> Vec<(Arc<dyn BrokerAdapter>, f64)> {
        let mut eligible: Vec<(Arc<dyn BrokerAdapter>, f64)> = self
            .brokers
            .iter()
            .filter(|b| b.supported_assets().contains(&order.asset_class))
            .map(|b| (b.clone(), self.score(b.as_ref(), order)))
            .collect();

        eligible.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        eligible
    }

    fn score(&self, broker: &dyn BrokerAdapter, order: &PipelineOrder) -> f64 {
        let stats = self
            .stats
            .get(broker.name())
            .map(|s| s.value().clone())
            .unwrap_or_default();

        let notional = (order.quantity * order.limit_price.unwrap_or(rust_decimal::Decimal::ONE))
            .abs()
            .to_f64()
            .unwrap_or(0.0);
        let quantity = order.quantity.abs().to_f64().unwrap_or(0.0);
        let fee = broker.fee_schedule().cost(notional.max(1.0), quantity);

        let cost_score = 1.0 / (1.0 + fee);
        let speed_score = 1.0 / (1.0 + stats.latency_ewma_ms / 100.0);
        let fill_score = stats.fill_quality;

        let config = self.config();
        config.cost_weight * cost_score
            + config.speed_weight * speed_score
            + config.fill_quality_weight * fill_score
    }

    /// Pick the best venue without submitting
    pub fn route(&self, order: &PipelineOrder) -> Result<RouteDecision, PipelineError> {
        let ranked = self.ranked_eligible(order);
        let total: f64 = ranked.iter().map(|(_, s)| s).sum();

        let (best, best_score) = ranked.first().ok_or_else(|| {
            PipelineError::BrokerFailure(format!(
                "no eligible broker for asset class {:?}",
                order.asset_class
            ))
        })?;

        let quantity = order.quantity.abs().to_f64().unwrap_or(0.0);
        let notional = (order.quantity * order.limit_price.unwrap_or(rust_decimal::Decimal::ONE))
            .abs()
            .to_f64()
            .unwrap_or(0.0);
        Ok(RouteDecision {
            broker: best.name().to_string(),
            expected_cost: best.fee_schedule().cost(notional.max(1.0), quantity),
            confidence: if total > 0.0 { best_score / total } else { 0.0 },
        })
    }

    /// Submit with failover. Walks the ranked eligible venues, bounded by
    /// `max_attempts`; a timeout or transient error moves to the next
    /// venue. Terminal failure marks the order failed.
    pub async fn execute(
        &self,
        order: &mut PipelineOrder,
    ) -> Result<ExecutionReport, (PipelineError, Vec<RouteAttempt>)> {
        let ranked = self.ranked_eligible(order);
        if ranked.is_empty() {
            let err = PipelineError::BrokerFailure(format!(
                "no eligible broker for asset class {:?}",
                order.asset_class
            ));
            let _ = order.transition(OrderStatus::Failed);
            return Err((err, Vec::new()));
        }

        let route = match self.route(order) {
            Ok(route) => route,
            Err(err) => {
                let _ = order.transition(OrderStatus::Failed);
                return Err((err, Vec::new()));
            }
        };

        let config = self.config();
        let timeout = Duration::from_millis(config.attempt_timeout_ms);
        let mut attempts: Vec<RouteAttempt> = Vec::new();

        for (attempt_idx, (broker, _)) in ranked
            .iter()
            .cycle()
            .take(config.max_attempts)
            .enumerate()
        {
            if attempt_idx > 0 {
                let backoff = config.retry_backoff_ms * attempt_idx as u64
                    + fastrand::u64(0..config.retry_backoff_ms.max(1));
                tokio::time::sleep(Duration::from_millis(backoff)).await;
            }

            let started = Instant::now();
            let result = tokio::time::timeout(timeout, broker.place_order(order)).await;
            let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

            match result {
                Ok(Ok(fill)) => {
                    self.note_success(broker.name(), latency_ms);
                    attempts.push(RouteAttempt {
                        broker: broker.name().to_string(),
                        outcome: AttemptOutcome::Filled,
                        latency_ms,
                        at: Utc::now(),
                    });

                    order.transition(OrderStatus::Routed).map_err(|e| {
                        (e, attempts.clone())
                    })?;
                    order.transition(OrderStatus::Filled).map_err(|e| {
                        (e, attempts.clone())
                    })?;

                    tracing::info!(
                        order_id = %order.id,
                        broker = broker.name(),
                        attempts = attempts.len(),
                        latency_ms = latency_ms,
                        "Order executed"
                    );

                    return Ok(ExecutionReport {
                        fill,
                        route,
                        attempts,
                    });
                }
                Ok(Err(BrokerError::Transient(msg))) => {
                    self.note_failure(broker.name(), latency_ms);
                    tracing::warn!(
                        order_id = %order.id,
                        broker = broker.name(),
                        error = %msg,
                        "Transient submission failure, failing over"
                    );
                    attempts.push(RouteAttempt {
                        broker: broker.name().to_string(),
                        outcome: AttemptOutcome::TransientError(msg),
                        latency_ms,
                        at: Utc::now(),
                    });
                }
                Ok(Err(BrokerError::Terminal(msg))) => {
                    self.note_failure(broker.name(), latency_ms);
                    tracing::warn!(
                        order_id = %order.id,
                        broker = broker.name(),
                        error = %msg,
                        "Terminal venue error, failing over"
                    );
                    attempts.push(RouteAttempt {
                        broker: broker.name().to_string(),
                        outcome: AttemptOutcome::TerminalError(msg),
                        latency_ms,
                        at: Utc::now(),
                    });
                }
                Err(_) => {
                    self.note_failure(broker.name(), latency_ms);
                    tracing::warn!(
                        order_id = %order.id,
                        broker = broker.name(),
                        timeout_ms = config.attempt_timeout_ms,
                        "Submission attempt timed out, failing over"
                    );
                    attempts.push(RouteAttempt {
                        broker: broker.name().to_string(),
                        outcome: AttemptOutcome::TimedOut,
                        latency_ms,
                        at: Utc::now(),
                    });
                }
            }
        }

        let err = PipelineError::BrokerFailure(format!(
            "order {} failed after {} attempts",
            order.id,
            attempts.len()
        ));
        let _ = order.transition(OrderStatus::Failed);
        Err((err, attempts))
    }

    /// Best-effort cancellation across every registered venue, used when
    /// the kill switch preempts in-flight submissions
    pub async fn cancel_everywhere(&self, order_id: Uuid) -> bool {
        let mut cancelled = false;
        for broker in &self.brokers {
            if broker.cancel_order(order_id).await.is_ok() {
                tracing::warn!(
                    %order_id,
                    broker = broker.name(),
                    "In-flight order cancelled"
                );
                cancelled = true;
            }
        }
        cancelled
    }

    fn note_success(&self, broker: &str, latency_ms: f64) {
        let mut stats = self.stats.entry(broker.to_string()).or_default();
        stats.attempts += 1;
        stats.latency_ewma_ms = 0.7 * stats.latency_ewma_ms + 0.3 * latency_ms;
        stats.fill_quality = (stats.fill_quality + 0.05).min(1.0);
    }

    fn note_failure(&self, broker: &str, latency_ms: f64) {
        let mut stats = self.stats.entry(broker.to_string()).or_default();
        stats.attempts += 1;
        stats.failures += 1;
        stats.latency_ewma_ms = 0.7 * stats.latency_ewma_ms + 0.3 * latency_ms;
        stats.fill_quality = (stats.fill_quality - 0.10).max(0.1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{FeeSchedule, PaperBroker};
    use common::{AssetClass, OrderSide, OrderType};
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn order(asset_class: AssetClass) -> PipelineOrder {
        PipelineOrder::new(
            "AAPL",
            asset_class,
            OrderSide::Buy,
            dec!(10),
            OrderType::Market,
            Uuid::new_v4(),
            Uuid::new_v4(),
        )
    }

    fn router_with(brokers: Vec<Arc<PaperBroker>>) -> OrderRouter {
        let mut router = OrderRouter::new(RouterConfig {
            retry_backoff_ms: 1,
            ..Default::default()
        });
        for broker in brokers {
            router.register(broker);
        }
        router
    }

    #[tokio::test]
    async fn test_executes_on_best_broker() {
        let broker = Arc::new(PaperBroker::new(
            "equities",
            vec![AssetClass::Equity],
            FeeSchedule::default(),
        ));
        broker.set_quote("AAPL", dec!(190));
        let router = router_with(vec![broker]);

        let mut order = order(AssetClass::Equity);
        let report = router.execute(&mut order).await.unwrap();

        assert_eq!(report.fill.broker, "equities");
        assert_eq!(order.status, OrderStatus::Filled);
        assert_eq!(report.attempts.len(), 1);
    }

    #[tokio::test]
    async fn test_asset_class_filters_venues() {
        let equities = Arc::new(PaperBroker::new(
            "equities",
            vec![AssetClass::Equity],
            FeeSchedule::default(),
        ));
        let crypto = Arc::new(PaperBroker::new(
            "crypto",
            vec![AssetClass::Crypto],
            FeeSchedule::default(),
        ));
        crypto.set_quote("AAPL", dec!(190));
        let router = router_with(vec![equities, crypto]);

        let mut order = order(AssetClass::Crypto);
        let report = router.execute(&mut order).await.unwrap();
        assert_eq!(report.fill.broker, "crypto");
    }

    #[tokio::test]
    async fn test_failover_to_next_broker() {
        let flaky = Arc::new(PaperBroker::new(
            "flaky",
            vec![AssetClass::Equity],
            // Free venue ranks first
            FeeSchedule {
                per_order: 0.0,
                per_share: 0.0,
                bps_of_notional: 0.0,
            },
        ));
        flaky.set_quote("AAPL", dec!(190));
        flaky.fail_next_orders(5);

        let backup = Arc::new(PaperBroker::new(
            "backup",
            vec![AssetClass::Equity],
            FeeSchedule::default(),
        ));
        backup.set_quote("AAPL", dec!(191));

        let router = router_with(vec![flaky, backup]);

        let mut order = order(AssetClass::Equity);
        let report = router.execute(&mut order).await.unwrap();

        assert_eq!(report.fill.broker, "backup");
        assert!(report.attempts.len() >= 2);
        assert!(matches!(
            report.attempts[0].outcome,
            AttemptOutcome::TransientError(_)
        ));
    }

    #[tokio::test]
    async fn test_terminal_failure_after_bounded_attempts() {
        let flaky = Arc::new(PaperBroker::new(
            "flaky",
            vec![AssetClass::Equity],
            FeeSchedule::default(),
        ));
        flaky.set_quote("AAPL", dec!(190));
        flaky.fail_next_orders(10);

        let router = router_with(vec![flaky]);

        let mut order = order(AssetClass::Equity);
        let (err, attempts) = router.execute(&mut order).await.unwrap_err();

        assert_eq!(err.kind(), "broker_failure");
        assert_eq!(attempts.len(), RouterConfig::default().max_attempts);
        assert_eq!(order.status, OrderStatus::Failed);
    }

    #[tokio::test]
    async fn test_no_eligible_broker() {
        let router = router_with(vec![]);
        let mut order = order(AssetClass::Option);

        let (err, attempts) = router.execute(&mut order).await.unwrap_err();
        assert_eq!(err.kind(), "broker_failure");
        assert!(attempts.is_empty());
    }

    #[test]
    fn test_route_prefers_cheaper_venue() {
        let cheap = Arc::new(PaperBroker::new(
            "cheap",
            vec![AssetClass::Equity],
            FeeSchedule {
                per_order: 0.0,
                per_share: 0.0,
                bps_of_notional: 0.0,
            },
        ));
        let pricey = Arc::new(PaperBroker::new(
            "pricey",
            vec![AssetClass::Equity],
            FeeSchedule {
                per_order: 10.0,
                per_share: 0.05,
                bps_of_notional: 25.0,
            },
        ));
        let router = router_with(vec![pricey, cheap]);

        let decision = router.route(&order(AssetClass::Equity)).unwrap();
        assert_eq!(decision.broker, "cheap");
        assert!(decision.confidence > 0.0);
    }
}
