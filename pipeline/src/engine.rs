//! Pipeline orchestration
//!
//! Runs the full chain per signal event: normalize, guard, fuse, regime
//! threshold and strategy validation, kill-switch/breaker admission, size,
//! risk gate, route with failover, and lifecycle fill handling. Different
//! tickers process concurrently; events for the same ticker serialize on a
//! per-ticker lock. Typed denials are audited and dropped; unexpected
//! faults are caught here, audited, and counted toward the kill switch's
//! consecutive-error trigger.

use crate::config::PipelineConfig;
use chrono::Utc;
use common::{
    weight_handle, AlertEvent, AlertSeverity, PipelineError, Published, Signal, WeightSnapshot,
};
use dashmap::DashMap;
use execution::{
    ExitReason, KillSwitch, LifecycleManager, OpenContext, OrderRouter, TradeOutcome,
    TradingCircuitBreaker,
};
use feedback::FeedbackLoop;
use monitoring::{AlertManager, AuditLedger, LogDispatcher};
use portfolio_risk::{
    CorrelationTracker, GateDecision, InstrumentInfo, PositionSizer, RiskGate, RiskLimits,
    SnapshotHandle, SnapshotPublisher,
};
use regime_router::{adx, Bar, MarketSample, RegimeRouter, StrategySelector};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use signal_fusion::{Admission, FusionEngine, RawProducerOutput, SignalGuard, SignalNormalizer};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

/// What happened to one signal event end to end
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutcome {
    GuardRejected(String),
    Invalid(String),
    NoConsensus(String),
    StrategyRejected(String),
    KillSwitchBlocked,
    BreakerBlocked,
    NotSized,
    RiskDenied(String),
    Executed {
        ticker: String,
        broker: String,
        fill_price: Decimal,
    },
    ExecutionFailed(String),
}

pub struct PipelineEngine {
    config: PipelineConfig,
    normalizer: SignalNormalizer,
    guard: SignalGuard,
    fusion: FusionEngine,
    selector: StrategySelector,
    sizer: PositionSizer,
    gate: RiskGate,
    limits: Arc<Published<RiskLimits>>,
    router: OrderRouter,
    lifecycle: LifecycleManager,
    regime: Mutex<RegimeRouter>,
    breaker: tokio::sync::Mutex<TradingCircuitBreaker>,
    kill_switch: tokio::sync::Mutex<KillSwitch>,
    feedback: tokio::sync::Mutex<FeedbackLoop>,
    publisher: Mutex<SnapshotPublisher>,
    snapshots: SnapshotHandle,
    ledger: AuditLedger,
    alerts: AlertManager,
    bars: Mutex<VecDeque<Bar>>,
    fusion_buffer: Mutex<HashMap<String, Vec<Signal>>>,
    ticker_locks: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
    /// Client order ids currently mid-submission, cancellable by the kill
    /// switch
    in_flight: DashMap<uuid::Uuid, ()>,
    equity: RwLock<f64>,
    day_start_equity: RwLock<f64>,
    open_order_exposure: RwLock<f64>,
    last_guard_rejections: RwLock<u64>,
}

impl PipelineEngine {
    pub fn new(config: PipelineConfig, router: OrderRouter) -> Self {
        let weights = weight_handle(WeightSnapshot::default_weights());
        let limits = Arc::new(Published::new(config.risk.limits.clone()));
        let tracker = Arc::new(RwLock::new(CorrelationTracker::default()));
        let publisher = SnapshotPublisher::new(
            config.risk.instruments.clone(),
            tracker.clone(),
            config.initial_equity,
        );
        let snapshots = publisher.handle();

        let mut kill_switch = KillSwitch::new(config.kill_switch.clone(), config.initial_equity);
        let _ = kill_switch.arm(config.initial_equity);

        Self {
            normalizer: SignalNormalizer::new(),
            guard: SignalGuard::new(config.guard.clone()),
            fusion: FusionEngine::new(config.fusion.clone(), weights.clone()),
            selector: StrategySelector::new(config.selector.clone()),
            sizer: PositionSizer::new(config.risk.sizer.clone()),
            gate: RiskGate::new(limits.clone(), tracker),
            limits,
            router,
            lifecycle: LifecycleManager::new(),
            regime: Mutex::new(RegimeRouter::new(
                config.detector.clone(),
                config.regimes.clone(),
            )),
            breaker: tokio::sync::Mutex::new(TradingCircuitBreaker::new(
                config.breaker.clone(),
                config.initial_equity,
            )),
            kill_switch: tokio::sync::Mutex::new(kill_switch),
            feedback: tokio::sync::Mutex::new(FeedbackLoop::new(
                config.feedback.clone(),
                weights,
            )),
            publisher: Mutex::new(publisher),
            snapshots,
            ledger: AuditLedger::new(),
            alerts: AlertManager::new(
                Arc::new(LogDispatcher),
                Duration::from_secs(config.alert_suppression_secs),
            ),
            bars: Mutex::new(VecDeque::with_capacity(256)),
            fusion_buffer: Mutex::new(HashMap::new()),
            ticker_locks: DashMap::new(),
            in_flight: DashMap::new(),
            equity: RwLock::new(config.initial_equity),
            day_start_equity: RwLock::new(config.initial_equity),
            open_order_exposure: RwLock::new(0.0),
            last_guard_rejections: RwLock::new(0),
            config,
        }
    }

    /// Process one raw producer output through the whole chain. All faults
    /// are caught at this boundary.
    pub async fn process(&self, raw: RawProducerOutput) -> PipelineOutcome {
        match self.process_inner(raw).await {
            Ok(outcome) => outcome,
            Err(err) => self.handle_pipeline_error(err).await,
        }
    }

    async fn process_inner(
        &self,
        raw: RawProducerOutput,
    ) -> Result<PipelineOutcome, PipelineError> {
        let signal = match self.normalizer.normalize(raw) {
            Ok(signal) => signal,
            Err(err) => {
                self.ledger.append(
                    "validation_error",
                    serde_json::json!({ "reason": err.reason() }),
                );
                return Ok(PipelineOutcome::Invalid(err.reason().to_string()));
            }
        };

        // Per-ticker serialization; other tickers proceed concurrently
        let lock = self
            .ticker_locks
            .entry(signal.ticker.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        match self.guard.admit(&signal) {
            Admission::Rejected(reason) => {
                self.ledger.append(
                    "guard_rejection",
                    serde_json::json!({
                        "signal_id": signal.id,
                        "ticker": signal.ticker,
                        "reason": reason.as_str(),
                    }),
                );
                self.check_guard_spike().await;
                return Ok(PipelineOutcome::GuardRejected(reason.as_str().to_string()));
            }
            Admission::Accepted => {
                self.ledger.append(
                    "signal_admitted",
                    serde_json::to_value(&signal).unwrap_or_default(),
                );
            }
        }

        // Buffer per ticker and fuse the window's signals into consensus
        let fused = {
            let mut buffer = self
                .fusion_buffer
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let entry = buffer.entry(signal.ticker.clone()).or_default();
            let window = self.config.fusion.fusion_window_secs as f64;
            let now = Utc::now();
            entry.retain(|s| s.age_secs(now) <= window);
            entry.push(signal.clone());
            self.fusion.fuse(entry)
        };
        let Some(fused) = fused.into_iter().next() else {
            return Ok(PipelineOutcome::NoConsensus("no fusable signals".to_string()));
        };
        self.ledger.append(
            "fused_signal",
            serde_json::to_value(&fused).unwrap_or_default(),
        );

        // Regime-adapted signal threshold
        let profile = {
            let regime = self
                .regime
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            regime.active_profile()
        };
        if fused.composite_score.abs() < profile.signal_threshold {
            return Ok(PipelineOutcome::NoConsensus(format!(
                "composite {:.1} below threshold {:.1}",
                fused.composite_score, profile.signal_threshold
            )));
        }

        // Strategy family compatibility
        let trend = {
            let bars = self
                .bars
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let series: Vec<Bar> = bars.iter().copied().collect();
            adx(&series, 14)
        };
        let family = self.selector.select(trend);
        if let Err(err) = self.selector.validate(&fused, family) {
            self.ledger.append(
                "strategy_rejection",
                serde_json::json!({
                    "ticker": fused.ticker,
                    "family": family.as_str(),
                    "reason": err.reason(),
                }),
            );
            return Ok(PipelineOutcome::StrategyRejected(err.reason().to_string()));
        }

        // Admission controls: kill switch first, then breaker sizing
        {
            let kill_switch = self.kill_switch.lock().await;
            if let Some(reason) = kill_switch.admission_block_reason() {
                self.ledger.append(
                    "admission_blocked",
                    serde_json::json!({ "ticker": fused.ticker, "reason": reason }),
                );
                return Ok(PipelineOutcome::KillSwitchBlocked);
            }
        }
        let size_multiplier = {
            let mut breaker = self.breaker.lock().await;
            breaker.size_multiplier()
        };
        if size_multiplier <= 0.0 {
            self.ledger.append(
                "admission_blocked",
                serde_json::json!({ "ticker": fused.ticker, "reason": "circuit_open" }),
            );
            return Ok(PipelineOutcome::BreakerBlocked);
        }

        let info = self.instrument_info(&fused.ticker);
        let equity = *self
            .equity
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let Some(candidate) = self.sizer.propose(
            &fused,
            &info,
            equity,
            profile.stop_multiplier,
            size_multiplier,
        ) else {
            return Ok(PipelineOutcome::NotSized);
        };

        // Risk gate against the latest published snapshot
        let snapshot = self.snapshots.load();
        let outcome = self.gate.evaluate(&candidate, &snapshot);
        self.ledger
            .append("gate_decision", outcome.audit_payload(&candidate));

        let quantity = match &outcome.decision {
            GateDecision::Deny { reason } => {
                return Ok(PipelineOutcome::RiskDenied(reason.clone()));
            }
            GateDecision::Resize { new_quantity } => *new_quantity,
            GateDecision::Allow => candidate.quantity,
        };

        let mut order =
            self.sizer
                .build_order(&fused, &info, &candidate, quantity, outcome.decision_id);
        self.ledger.append(
            "order_transition",
            serde_json::json!({
                "order_id": order.id,
                "ticker": order.ticker,
                "status": order.status,
                "quantity": order.quantity,
                "risk_decision_id": order.risk_decision_id,
            }),
        );

        let notional = candidate.notional();
        self.add_open_exposure(notional);
        self.in_flight.insert(order.id, ());
        let result = self.router.execute(&mut order).await;
        self.in_flight.remove(&order.id);
        self.add_open_exposure(-notional);

        match result {
            Ok(report) => {
                self.ledger.append(
                    "order_transition",
                    serde_json::json!({
                        "order_id": order.id,
                        "status": order.status,
                        "broker": report.fill.broker,
                        "fill_price": report.fill.fill_price,
                        "attempts": report.attempts.len(),
                    }),
                );
                {
                    let mut kill_switch = self.kill_switch.lock().await;
                    kill_switch.record_broker_success();
                }

                let context = OpenContext {
                    stop_loss: fused.stop_loss,
                    target_price: fused.target_price,
                    sources: fused
                        .contributing_sources
                        .iter()
                        .map(|c| c.source)
                        .collect(),
                    asset_class: info.asset_class,
                };
                let closed = self
                    .lifecycle
                    .apply_fill(&order, &report.fill, Some(context), ExitReason::Manual)
                    .await
                    .map_err(|e| PipelineError::Operational(e.to_string()))?;
                if let Some(outcome) = closed {
                    self.handle_trade_outcome(outcome).await;
                }

                Ok(PipelineOutcome::Executed {
                    ticker: order.ticker.clone(),
                    broker: report.fill.broker.clone(),
                    fill_price: report.fill.fill_price,
                })
            }
            Err((err, attempts)) => {
                self.ledger.append(
                    "order_transition",
                    serde_json::json!({
                        "order_id": order.id,
                        "status": order.status,
                        "attempts": attempts.len(),
                        "error": err.reason(),
                    }),
                );
                self.note_broker_error().await;
                self.alerts
                    .emit(
                        AlertEvent::new(
                            "order_execution_failed",
                            AlertSeverity::Warning,
                            err.reason(),
                            &format!("exec-fail-{}", order.ticker),
                        )
                        .with_metadata(serde_json::json!({ "order_id": order.id })),
                    )
                    .await
                    .ok();
                Ok(PipelineOutcome::ExecutionFailed(err.reason().to_string()))
            }
        }
    }

    /// Periodic lifecycle sweep: mark positions, execute triggered exits
    pub async fn sweep_positions(&self, quotes: &HashMap<String, Decimal>) {
        for (ticker, price) in quotes {
            let publisher = self
                .publisher
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            publisher.record_price(ticker, price.to_f64().unwrap_or(0.0));
        }

        let exits = self.lifecycle.sweep(quotes).await;
        for (mut order, reason) in exits {
            self.ledger.append(
                "order_transition",
                serde_json::json!({
                    "order_id": order.id,
                    "ticker": order.ticker,
                    "status": order.status,
                    "reduce_only": true,
                    "exit_reason": reason,
                }),
            );

            match self.router.execute(&mut order).await {
                Ok(report) => {
                    if let Ok(Some(outcome)) = self
                        .lifecycle
                        .apply_fill(&order, &report.fill, None, reason)
                        .await
                    {
                        self.handle_trade_outcome(outcome).await;
                    }
                }
                Err((err, _)) => {
                    tracing::error!(
                        order_id = %order.id,
                        error = %err,
                        "Exit order failed"
                    );
                    self.note_broker_error().await;
                }
            }
        }
    }

    /// Periodic risk snapshot refresh; cadence must stay at or under the
    /// staleness bound
    pub async fn refresh_snapshot(&self) {
        let positions = self.lifecycle.open_positions().await;
        let equity = *self
            .equity
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let open_exposure = *self
            .open_order_exposure
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut publisher = self
            .publisher
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        publisher.refresh(&positions, open_exposure, equity);
    }

    /// Periodic market observation: regime transitions and trend bars
    pub fn observe_market(&self, sample: &MarketSample, bar: Option<Bar>) {
        if let Some(bar) = bar {
            let mut bars = self
                .bars
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            bars.push_back(bar);
            if bars.len() > 256 {
                bars.pop_front();
            }
        }

        let transition = {
            let mut regime = self
                .regime
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            regime.observe(sample)
        };

        if let Some(transition) = transition {
            self.ledger.append(
                "regime_transition",
                serde_json::to_value(&transition).unwrap_or_default(),
            );
        }
    }

    /// Trip the kill switch by operator request
    pub async fn trigger_kill_switch(&self, reason: &str) {
        let equity = *self
            .equity
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let transition = {
            let mut kill_switch = self.kill_switch.lock().await;
            kill_switch.trigger_manual(reason, equity)
        };
        if let Some(transition) = transition {
            self.ledger.append(
                "kill_transition",
                serde_json::to_value(&transition).unwrap_or_default(),
            );
            self.emergency_close_all(reason).await;
        }
    }

    /// Manual rearm after an incident
    pub async fn rearm_kill_switch(&self) {
        let equity = *self
            .equity
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut kill_switch = self.kill_switch.lock().await;
        if let Some(transition) = kill_switch.rearm(equity) {
            self.ledger.append(
                "kill_transition",
                serde_json::to_value(&transition).unwrap_or_default(),
            );
        }
    }

    /// Close every open position with reduce-only orders. Runs to
    /// completion even when some closes fail, so partial liquidation still
    /// shrinks the book.
    pub async fn emergency_close_all(&self, reason: &str) {
        self.alerts
            .emit(AlertEvent::new(
                "emergency_close_all",
                AlertSeverity::Critical,
                &format!("emergency close-all: {reason}"),
                "emergency-close",
            ))
            .await
            .ok();

        // Preempt whatever is still mid-submission before liquidating
        let pending: Vec<uuid::Uuid> = self.in_flight.iter().map(|e| *e.key()).collect();
        for order_id in pending {
            self.router.cancel_everywhere(order_id).await;
        }

        let closes = self.lifecycle.emergency_close_orders().await;
        tracing::error!(count = closes.len(), reason = reason, "Emergency close-all");

        // Submit every close concurrently; a failed close must not stall
        // the rest of the liquidation
        let submissions = closes.into_iter().map(|mut order| async move {
            match self.router.execute(&mut order).await {
                Ok(report) => {
                    self.ledger.append(
                        "order_transition",
                        serde_json::json!({
                            "order_id": order.id,
                            "ticker": order.ticker,
                            "status": order.status,
                            "exit_reason": "emergency",
                        }),
                    );
                    if let Ok(Some(outcome)) = self
                        .lifecycle
                        .apply_fill(&order, &report.fill, None, ExitReason::Emergency)
                        .await
                    {
                        // Emergency closes still update equity and weights
                        self.apply_outcome_accounting(&outcome).await;
                    }
                }
                Err((err, _)) => {
                    tracing::error!(
                        order_id = %order.id,
                        error = %err,
                        "Emergency close order failed"
                    );
                }
            }
        });
        futures::future::join_all(submissions).await;
    }

    /// Realized-outcome bookkeeping: equity, breaker, kill switch, and the
    /// feedback loop
    async fn handle_trade_outcome(&self, outcome: TradeOutcome) {
        self.apply_outcome_accounting(&outcome).await;

        let equity = *self
            .equity
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let breaker_transition = {
            let mut breaker = self.breaker.lock().await;
            breaker.record_outcome(outcome.realized_pnl, equity)
        };
        if let Some(transition) = breaker_transition {
            self.ledger.append(
                "circuit_transition",
                serde_json::to_value(&transition).unwrap_or_default(),
            );
            self.alerts
                .emit(AlertEvent::new(
                    "circuit_breaker",
                    AlertSeverity::Critical,
                    &format!("circuit breaker {:?} -> {:?}: {}", transition.from, transition.to, transition.reason),
                    "circuit-breaker",
                ))
                .await
                .ok();
        }

        let kill_transition = {
            let mut kill_switch = self.kill_switch.lock().await;
            kill_switch.check_equity(equity)
        };
        if let Some(transition) = kill_transition {
            self.ledger.append(
                "kill_transition",
                serde_json::to_value(&transition).unwrap_or_default(),
            );
            self.alerts
                .emit(AlertEvent::new(
                    "kill_switch_activated",
                    AlertSeverity::Critical,
                    &transition.reason,
                    "kill-switch",
                ))
                .await
                .ok();
            self.emergency_close_all(&transition.reason).await;
        }

        self.check_daily_loss_warning(equity).await;
    }

    /// Equity update plus feedback-loop attribution, shared by normal and
    /// emergency close paths
    async fn apply_outcome_accounting(&self, outcome: &TradeOutcome) {
        {
            let mut equity = self
                .equity
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            *equity += outcome.realized_pnl;
        }

        let snapshot = {
            let mut feedback = self.feedback.lock().await;
            feedback.record(&outcome.sources, outcome.realized_pnl)
        };
        if let Some(snapshot) = snapshot {
            self.ledger.append(
                "weight_snapshot",
                serde_json::to_value(&snapshot).unwrap_or_default(),
            );
        }
    }

    async fn check_daily_loss_warning(&self, equity: f64) {
        let day_start = *self
            .day_start_equity
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if day_start <= 0.0 {
            return;
        }

        let profile = {
            let regime = self
                .regime
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            regime.active_profile()
        };
        let daily_loss = (day_start - equity) / day_start;
        if daily_loss >= profile.daily_loss_limit * 0.8 {
            self.alerts
                .emit(AlertEvent::new(
                    "daily_loss_warning",
                    AlertSeverity::Warning,
                    &format!(
                        "daily loss {:.2}% approaching limit {:.2}%",
                        daily_loss * 100.0,
                        profile.daily_loss_limit * 100.0
                    ),
                    "daily-loss",
                ))
                .await
                .ok();
        }
    }

    async fn check_guard_spike(&self) {
        let rejected = self.guard.stats().rejected_total();
        let previous = {
            let mut last = self
                .last_guard_rejections
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let prev = *last;
            if rejected - prev >= self.config.guard_rejection_spike {
                *last = rejected;
            }
            prev
        };

        if rejected - previous >= self.config.guard_rejection_spike {
            self.alerts
                .emit(AlertEvent::new(
                    "guard_rejection_spike",
                    AlertSeverity::Warning,
                    &format!("{} guard rejections since last check", rejected - previous),
                    "guard-spike",
                ))
                .await
                .ok();
        }
    }

    async fn note_broker_error(&self) {
        let equity = *self
            .equity
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let transition = {
            let mut kill_switch = self.kill_switch.lock().await;
            kill_switch.record_broker_error(equity)
        };
        if let Some(transition) = transition {
            self.ledger.append(
                "kill_transition",
                serde_json::to_value(&transition).unwrap_or_default(),
            );
            self.emergency_close_all(&transition.reason).await;
        }
    }

    async fn handle_pipeline_error(&self, err: PipelineError) -> PipelineOutcome {
        self.ledger.append(
            err.kind(),
            serde_json::json!({ "reason": err.reason() }),
        );

        match &err {
            PipelineError::Operational(reason) => {
                tracing::error!(reason = %reason, "Operational fault at pipeline boundary");
                self.note_broker_error().await;
                PipelineOutcome::ExecutionFailed(reason.clone())
            }
            other => PipelineOutcome::ExecutionFailed(other.reason().to_string()),
        }
    }

    fn instrument_info(&self, ticker: &str) -> InstrumentInfo {
        self.config
            .risk
            .instruments
            .get(ticker)
            .cloned()
            .unwrap_or_else(InstrumentInfo::unknown)
    }

    fn add_open_exposure(&self, delta: f64) {
        let mut exposure = self
            .open_order_exposure
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *exposure = (*exposure + delta).max(0.0);
    }

    /// Expire old guard dedup entries; run periodically
    pub fn prune_guard(&self) {
        self.guard.prune();
    }

    /// Hot-reload the risk limits without restarting
    pub fn reload_risk_limits(&self, limits: RiskLimits) {
        tracing::info!("Risk limits reloaded");
        self.limits.store(limits);
    }

    /// Hot-reload the externally supplied configuration surfaces: risk
    /// thresholds, regime parameter table, breaker trip conditions, kill
    /// switch triggers, and router scoring weights. Each applies on the
    /// next read without a restart.
    pub async fn reload_config(&self, config: &PipelineConfig) {
        self.limits.store(config.risk.limits.clone());
        self.router.set_config(config.router.clone());
        {
            let mut regime = self
                .regime
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            regime.set_table(config.regimes.clone());
        }
        {
            let mut breaker = self.breaker.lock().await;
            breaker.set_config(config.breaker.clone());
        }
        {
            let mut kill_switch = self.kill_switch.lock().await;
            kill_switch.set_config(config.kill_switch.clone());
        }
        tracing::info!("Pipeline configuration reloaded");
    }

    pub fn audit_ledger(&self) -> &AuditLedger {
        &self.ledger
    }

    pub fn equity(&self) -> f64 {
        *self
            .equity
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub async fn open_position_count(&self) -> usize {
        self.lifecycle.position_count().await
    }

    pub async fn kill_state(&self) -> common::KillState {
        self.kill_switch.lock().await.state()
    }

    pub async fn circuit_state(&self) -> common::CircuitState {
        self.breaker.lock().await.state()
    }
}
