use anyhow::Result;
use chrono::Utc;
use common::{AssetClass, SignalDirection, SignalSource, SignalType};
use execution::{FeeSchedule, OrderRouter, PaperBroker};
use pipeline::{load_config, PipelineConfig, PipelineEngine};
use regime_router::{Bar, MarketSample};
use rust_decimal_macros::dec;
use signal_fusion::RawProducerOutput;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::fmt;

mod tasks;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    fmt().with_max_level(Level::INFO).init();

    let config_path =
        std::env::var("PIPELINE_CONFIG").unwrap_or_else(|_| "pipeline.toml".to_string());
    let config: PipelineConfig = load_config(&config_path).unwrap_or_else(|err| {
        info!(error = %err, "No usable config file, running with defaults");
        PipelineConfig::default()
    });

    info!("Starting signal-to-execution pipeline");

    // Register paper venues covering the supported asset classes
    let mut router = OrderRouter::new(config.router.clone());

    let equities = Arc::new(PaperBroker::new(
        "paper-equities",
        vec![AssetClass::Equity, AssetClass::FractionalEquity],
        FeeSchedule::default(),
    ));
    let crypto = Arc::new(PaperBroker::new(
        "paper-crypto",
        vec![AssetClass::Crypto],
        FeeSchedule {
            per_order: 0.0,
            per_share: 0.0,
            bps_of_notional: 10.0,
        },
    ));
    let options = Arc::new(PaperBroker::new(
        "paper-options",
        vec![AssetClass::Option],
        FeeSchedule {
            per_order: 0.65,
            per_share: 0.0,
            bps_of_notional: 0.0,
        },
    ));

    for (broker, tickers) in [
        (equities.clone(), vec!["AAPL", "MSFT", "NVDA"]),
        (crypto.clone(), vec!["BTC-USD", "ETH-USD"]),
        (options.clone(), vec![]),
    ] {
        broker.connect().await.ok();
        for ticker in tickers {
            broker.set_quote(ticker, dec!(100));
        }
    }

    router.register(equities.clone());
    router.register(crypto);
    router.register(options);

    let engine = Arc::new(PipelineEngine::new(config.clone(), router));

    // Periodic side channels: snapshot refresh, lifecycle sweep, guard prune
    let quote_board: tasks::QuoteBoard = Arc::new(std::sync::RwLock::new(HashMap::new()));
    let _background = tasks::spawn_background_tasks(engine.clone(), &config, quote_board.clone());

    // Demonstration feed: a trending market and a burst of producer signals
    for i in 0..40 {
        let close = 100.0 + i as f64;
        engine.observe_market(
            &MarketSample {
                trailing_return: 0.06,
                realized_vol: 0.18,
                drawdown: 0.01,
                taken_at: Utc::now(),
            },
            Some(Bar {
                high: close + 1.0,
                low: close - 0.5,
                close,
            }),
        );
    }

    // Each producer speaks its own signal type, so the guard's dedup map
    // admits all three and fusion builds a multi-source consensus
    let producers = [
        (SignalSource::EmaCloud, SignalType::Momentum, 82.0),
        (SignalSource::MomentumBreakout, SignalType::Breakout, 74.0),
        (SignalSource::MlRanking, SignalType::Sentiment, 65.0),
    ];
    for (source, signal_type, conviction) in producers {
        let outcome = engine
            .process(RawProducerOutput {
                source,
                ticker: "AAPL".to_string(),
                direction: SignalDirection::Long,
                conviction,
                signal_type,
                entry_price: dec!(100),
                stop_loss: dec!(96),
                target_price: dec!(112),
                generated_at: None,
                metadata: serde_json::json!({ "demo": true }),
            })
            .await;
        info!(?outcome, source = source.as_str(), "Signal processed");
    }

    // Let the mark move and the sweep run an exit check
    equities.set_quote("AAPL", dec!(113));
    let quotes = {
        let mut board = quote_board
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        board.insert("AAPL".to_string(), dec!(113));
        board.clone()
    };
    engine.sweep_positions(&quotes).await;

    engine.refresh_snapshot().await;

    info!(
        equity = engine.equity(),
        open_positions = engine.open_position_count().await,
        audit_records = engine.audit_ledger().len(),
        "Pipeline demo complete"
    );

    match engine.audit_ledger().verify() {
        Ok(()) => info!("Audit chain verified"),
        Err(break_point) => anyhow::bail!("audit chain broken at seq {}", break_point.seq),
    }

    Ok(())
}
