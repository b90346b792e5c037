//! Broker adapter interface
//!
//! Each venue is an opaque adapter behind this trait; wire protocols live
//! outside the pipeline. The in-repo `PaperBroker` fills orders against
//! set quotes and supports scripted failures for failover testing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{AssetClass, PipelineError, PipelineOrder, Position};
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Broker-level errors. Transient failures are eligible for failover;
/// terminal ones are not retried at the same venue.
#[derive(Debug, Clone, Error)]
pub enum BrokerError {
    #[error("transient broker error: {0}")]
    Transient(String),
    #[error("terminal broker error: {0}")]
    Terminal(String),
}

impl From<BrokerError> for PipelineError {
    fn from(err: BrokerError) -> Self {
        match err {
            BrokerError::Transient(msg) => PipelineError::BrokerTransient(msg),
            BrokerError::Terminal(msg) => PipelineError::BrokerFailure(msg),
        }
    }
}

/// Account state reported by a broker
#[derive(Debug, Clone)]
pub struct BrokerAccount {
    pub equity: f64,
    pub cash: f64,
    pub buying_power: f64,
}

/// Quote for one symbol
#[derive(Debug, Clone)]
pub struct Quote {
    pub ticker: String,
    pub bid: Decimal,
    pub ask: Decimal,
    pub last: Decimal,
    pub as_of: DateTime<Utc>,
}

/// Fill confirmation returned by a successful submission
#[derive(Debug, Clone)]
pub struct FillReport {
    pub order_id: Uuid,
    pub broker: String,
    pub fill_price: Decimal,
    pub filled_quantity: Decimal,
    pub filled_at: DateTime<Utc>,
}

/// Per-venue fee schedule used by the router's cost scoring
#[derive(Debug, Clone, Copy)]
pub struct FeeSchedule {
    pub per_order: f64,
    pub per_share: f64,
    pub bps_of_notional: f64,
}

impl FeeSchedule {
    pub fn cost(&self, notional: f64, quantity: f64) -> f64 {
        self.per_order + self.per_share * quantity + self.bps_of_notional / 10_000.0 * notional
    }
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            per_order: 0.0,
            per_share: 0.005,
            bps_of_notional: 1.0,
        }
    }
}

/// The venue interface consumed by the router and lifecycle manager
#[async_trait]
pub trait BrokerAdapter: Send + Sync {
    async fn connect(&self) -> Result<(), BrokerError>;

    async fn get_account(&self) -> Result<BrokerAccount, BrokerError>;

    async fn get_positions(&self) -> Result<Vec<Position>, BrokerError>;

    /// Submit an order. Must be idempotent on the client-assigned order id:
    /// resubmitting a filled id returns the original fill rather than
    /// executing twice.
    async fn place_order(&self, order: &PipelineOrder) -> Result<FillReport, BrokerError>;

    async fn cancel_order(&self, order_id: Uuid) -> Result<(), BrokerError>;

    async fn get_quote(&self, symbol: &str) -> Result<Quote, BrokerError>;

    /// Asset classes this venue can execute, for router eligibility
    fn supported_assets(&self) -> &[AssetClass];

    fn fee_schedule(&self) -> FeeSchedule;

    fn name(&self) -> &str;
}

/// Simulated broker used in tests and paper trading
pub struct PaperBroker {
    name: String,
    supported: Vec<AssetClass>,
    fees: FeeSchedule,
    latency: Duration,
    quotes: DashMap<String, Decimal>,
    fills: DashMap<Uuid, FillReport>,
    fail_next: AtomicUsize,
    connected: AtomicBool,
}

impl PaperBroker {
    pub fn new(name: &str, supported: Vec<AssetClass>, fees: FeeSchedule) -> Self {
        Self {
            name: name.to_string(),
            supported,
            fees,
            latency: Duration::from_millis(5),
            quotes: DashMap::new(),
            fills: DashMap::new(),
            fail_next: AtomicUsize::new(0),
            connected: AtomicBool::new(false),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn set_quote(&self, ticker: &str, price: Decimal) {
        self.quotes.insert(ticker.to_string(), price);
    }

    /// Script the next `n` submissions to fail transiently
    pub fn fail_next_orders(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    pub fn fill_count(&self) -> usize {
        self.fills.len()
    }
}

#[async_trait]
impl BrokerAdapter for PaperBroker {
    async fn connect(&self) -> Result<(), BrokerError> {
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn get_account(&self) -> Result<BrokerAccount, BrokerError> {
        Ok(BrokerAccount {
            equity: 100_000.0,
            cash: 100_000.0,
            buying_power: 200_000.0,
        })
    }

    async fn get_positions(&self) -> Result<Vec<Position>, BrokerError> {
        Ok(Vec::new())
    }

    async fn place_order(&self, order: &PipelineOrder) -> Result<FillReport, BrokerError> {
        // Idempotency on the client order id: a retry of an already-filled
        // order returns the original fill
        if let Some(existing) = self.fills.get(&order.id) {
            return Ok(existing.clone());
        }

        let outstanding = self.fail_next.load(Ordering::SeqCst);
        if outstanding > 0
            && self
                .fail_next
                .compare_exchange(
                    outstanding,
                    outstanding - 1,
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                )
                .is_ok()
        {
            return Err(BrokerError::Transient(format!(
                "{} rejected submission (scripted)",
                self.name
            )));
        }

        tokio::time::sleep(self.latency).await;

        let price = match order.limit_price {
            Some(limit) => limit,
            None => match self.quotes.get(&order.ticker) {
                Some(quote) => *quote,
                None => {
                    return Err(BrokerError::Transient(format!(
                        "no quote for {} at {}",
                        order.ticker, self.name
                    )))
                }
            },
        };

        let fill = FillReport {
            order_id: order.id,
            broker: self.name.clone(),
            fill_price: price,
            filled_quantity: order.quantity,
            filled_at: Utc::now(),
        };
        self.fills.insert(order.id, fill.clone());

        tracing::debug!(
            order_id = %order.id,
            broker = %self.name,
            price = %price,
            "Paper fill"
        );

        Ok(fill)
    }

    async fn cancel_order(&self, order_id: Uuid) -> Result<(), BrokerError> {
        if self.fills.remove(&order_id).is_some() {
            Ok(())
        } else {
            Err(BrokerError::Terminal(format!(
                "order {order_id} not open at {}",
                self.name
            )))
        }
    }

    async fn get_quote(&self, symbol: &str) -> Result<Quote, BrokerError> {
        let price = self
            .quotes
            .get(symbol)
            .map(|q| *q)
            .ok_or_else(|| BrokerError::Transient(format!("no quote for {symbol}")))?;

        Ok(Quote {
            ticker: symbol.to_string(),
            bid: price,
            ask: price,
            last: price,
            as_of: Utc::now(),
        })
    }

    fn supported_assets(&self) -> &[AssetClass] {
        &self.supported
    }

    fn fee_schedule(&self) -> FeeSchedule {
        self.fees
    }

    fn name(&self) -> &str {
        &self.name
    }
}
