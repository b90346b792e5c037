//! End-to-end pipeline tests: signal in, broker fill out, with the safety
//! machinery engaged along the way.

use common::{AssetClass, CircuitState, KillState, SignalDirection, SignalSource, SignalType};
use execution::{FeeSchedule, OrderRouter, PaperBroker};
use pipeline::{PipelineConfig, PipelineEngine, PipelineOutcome};
use rust_decimal_macros::dec;
use signal_fusion::RawProducerOutput;
use std::collections::HashMap;
use std::sync::Arc;

fn paper_router(tickers: &[&str]) -> (OrderRouter, Arc<PaperBroker>) {
    let broker = Arc::new(PaperBroker::new(
        "paper",
        vec![AssetClass::Equity, AssetClass::FractionalEquity],
        FeeSchedule::default(),
    ));
    for ticker in tickers {
        broker.set_quote(ticker, dec!(100));
    }

    let mut router = OrderRouter::new(Default::default());
    router.register(broker.clone());
    (router, broker)
}

fn raw_signal(ticker: &str, source: SignalSource, conviction: f64) -> RawProducerOutput {
    RawProducerOutput {
        source,
        ticker: ticker.to_string(),
        direction: SignalDirection::Long,
        conviction,
        // Compatible with the default (non-trending) mean-reversion family
        signal_type: SignalType::MeanReversion,
        entry_price: dec!(100),
        stop_loss: dec!(96),
        target_price: dec!(112),
        generated_at: None,
        metadata: serde_json::json!({}),
    }
}

async fn engine_with(
    config: PipelineConfig,
    tickers: &[&str],
) -> (Arc<PipelineEngine>, Arc<PaperBroker>) {
    let (router, broker) = paper_router(tickers);
    let engine = Arc::new(PipelineEngine::new(config, router));
    engine.refresh_snapshot().await;
    (engine, broker)
}

#[tokio::test]
async fn test_signal_flows_to_fill() {
    let (engine, _broker) = engine_with(PipelineConfig::default(), &["AAPL"]).await;

    let outcome = engine
        .process(raw_signal("AAPL", SignalSource::EmaCloud, 85.0))
        .await;

    match outcome {
        PipelineOutcome::Executed { ticker, broker, .. } => {
            assert_eq!(ticker, "AAPL");
            assert_eq!(broker, "paper");
        }
        other => panic!("expected execution, got {other:?}"),
    }

    assert_eq!(engine.open_position_count().await, 1);
    assert!(engine.audit_ledger().verify().is_ok());

    // The chain recorded admission, fusion, the gate decision, and the
    // order transitions
    let kinds: Vec<String> = engine
        .audit_ledger()
        .snapshot()
        .iter()
        .map(|r| r.kind.clone())
        .collect();
    assert!(kinds.contains(&"signal_admitted".to_string()));
    assert!(kinds.contains(&"fused_signal".to_string()));
    assert!(kinds.contains(&"gate_decision".to_string()));
    assert!(kinds.contains(&"order_transition".to_string()));
}

#[tokio::test]
async fn test_duplicate_signal_rejected_by_guard() {
    let (engine, _broker) = engine_with(PipelineConfig::default(), &["AAPL"]).await;

    let first = engine
        .process(raw_signal("AAPL", SignalSource::EmaCloud, 85.0))
        .await;
    assert!(matches!(first, PipelineOutcome::Executed { .. }));

    let second = engine
        .process(raw_signal("AAPL", SignalSource::EmaCloud, 85.0))
        .await;
    assert_eq!(second, PipelineOutcome::GuardRejected("DUPLICATE".to_string()));
}

#[tokio::test]
async fn test_malformed_signal_dropped() {
    let (engine, _broker) = engine_with(PipelineConfig::default(), &["AAPL"]).await;

    let mut raw = raw_signal("AAPL", SignalSource::EmaCloud, 150.0);
    raw.conviction = 150.0;

    let outcome = engine.process(raw).await;
    assert!(matches!(outcome, PipelineOutcome::Invalid(_)));
    assert_eq!(engine.open_position_count().await, 0);
}

#[tokio::test]
async fn test_weak_consensus_does_not_trade() {
    let (engine, _broker) = engine_with(PipelineConfig::default(), &["AAPL"]).await;

    // Below the sideways regime's signal threshold
    let outcome = engine
        .process(raw_signal("AAPL", SignalSource::EmaCloud, 20.0))
        .await;
    assert!(matches!(outcome, PipelineOutcome::NoConsensus(_)));
}

#[tokio::test]
async fn test_order_velocity_denial_is_terminal() {
    let mut config = PipelineConfig::default();
    config.risk.limits.max_orders_per_minute = 0;
    let (engine, _broker) = engine_with(config, &["AAPL"]).await;

    let outcome = engine
        .process(raw_signal("AAPL", SignalSource::EmaCloud, 85.0))
        .await;
    assert_eq!(
        outcome,
        PipelineOutcome::RiskDenied("order_velocity_exceeded".to_string())
    );
    assert_eq!(engine.open_position_count().await, 0);
}

#[tokio::test]
async fn test_correlation_guard_denies_candidate() {
    let (engine, _broker) = engine_with(PipelineConfig::default(), &["AAA", "BBB"]).await;

    // Open a position in AAA
    let opened = engine
        .process(raw_signal("AAA", SignalSource::EmaCloud, 85.0))
        .await;
    assert!(matches!(opened, PipelineOutcome::Executed { .. }));

    // Feed lockstep prices so AAA and BBB correlate perfectly, staying
    // inside the stop/target band so no exit triggers
    for i in 0..15 {
        let price = dec!(100) + rust_decimal::Decimal::from(i) / dec!(4);
        let mut quotes = HashMap::new();
        quotes.insert("AAA".to_string(), price);
        quotes.insert("BBB".to_string(), price);
        engine.sweep_positions(&quotes).await;
    }
    engine.refresh_snapshot().await;

    let outcome = engine
        .process(raw_signal("BBB", SignalSource::Sentiment, 85.0))
        .await;
    assert_eq!(
        outcome,
        PipelineOutcome::RiskDenied("correlation_cap_exceeded".to_string())
    );
}

#[tokio::test]
async fn test_three_losses_open_the_breaker() {
    let mut config = PipelineConfig::default();
    config.breaker.consecutive_loss_trip = 3;
    let tickers = ["AAA", "BBB", "CCC", "DDD"];
    let (engine, broker) = engine_with(config, &tickers).await;

    let sources = [
        SignalSource::EmaCloud,
        SignalSource::MeanReversion,
        SignalSource::Sentiment,
    ];
    for (ticker, source) in tickers.iter().take(3).zip(sources) {
        let outcome = engine.process(raw_signal(ticker, source, 85.0)).await;
        assert!(matches!(outcome, PipelineOutcome::Executed { .. }));
    }

    // Stops breach on all three; each exit fills at the fallen quote and
    // realizes a loss
    let mut quotes = HashMap::new();
    for ticker in tickers.iter().take(3) {
        broker.set_quote(ticker, dec!(95));
        quotes.insert(ticker.to_string(), dec!(95));
    }
    engine.sweep_positions(&quotes).await;

    assert_eq!(engine.open_position_count().await, 0);
    assert_eq!(engine.circuit_state().await, CircuitState::Open);

    // New entries are blocked at size multiplier zero
    let blocked = engine
        .process(raw_signal("DDD", SignalSource::MlRanking, 85.0))
        .await;
    assert_eq!(blocked, PipelineOutcome::BreakerBlocked);
}

#[tokio::test]
async fn test_kill_switch_closes_all_and_blocks_admission() {
    let tickers = ["AAA", "BBB", "CCC", "DDD", "EEE"];
    let (engine, _broker) = engine_with(PipelineConfig::default(), &tickers).await;

    let sources = [
        SignalSource::EmaCloud,
        SignalSource::MeanReversion,
        SignalSource::Sentiment,
        SignalSource::MlRanking,
    ];
    for (ticker, source) in tickers.iter().take(4).zip(sources) {
        let outcome = engine.process(raw_signal(ticker, source, 85.0)).await;
        assert!(matches!(outcome, PipelineOutcome::Executed { .. }));
    }
    assert_eq!(engine.open_position_count().await, 4);

    engine.trigger_kill_switch("operator halt").await;

    assert_eq!(engine.kill_state().await, KillState::Triggered);
    assert_eq!(engine.open_position_count().await, 0);

    let blocked = engine
        .process(raw_signal("EEE", SignalSource::EmaCloud, 85.0))
        .await;
    assert_eq!(blocked, PipelineOutcome::KillSwitchBlocked);

    // Manual rearm restores admission. The blocked attempt above already
    // holds the (ticker, type, direction) dedup slot, so the retry comes
    // in under a different signal type.
    engine.rearm_kill_switch().await;
    assert_eq!(engine.kill_state().await, KillState::Armed);
    engine.refresh_snapshot().await;
    let mut retry = raw_signal("EEE", SignalSource::EmaCloud, 85.0);
    retry.signal_type = SignalType::Reversal;
    let resumed = engine.process(retry).await;
    assert!(matches!(resumed, PipelineOutcome::Executed { .. }));

    assert!(engine.audit_ledger().verify().is_ok());
}

#[tokio::test]
async fn test_target_exit_feeds_equity() {
    let (engine, broker) = engine_with(PipelineConfig::default(), &["AAPL"]).await;
    let starting_equity = engine.equity();

    let outcome = engine
        .process(raw_signal("AAPL", SignalSource::EmaCloud, 85.0))
        .await;
    assert!(matches!(outcome, PipelineOutcome::Executed { .. }));

    broker.set_quote("AAPL", dec!(113));
    let mut quotes = HashMap::new();
    quotes.insert("AAPL".to_string(), dec!(113));
    engine.sweep_positions(&quotes).await;

    assert_eq!(engine.open_position_count().await, 0);
    assert!(engine.equity() > starting_equity);
    assert!(engine.audit_ledger().verify().is_ok());
}
