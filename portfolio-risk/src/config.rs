//! Risk gate and sizing configuration

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use common::AssetClass;

/// Overall risk configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Portfolio-level gate limits
    pub limits: RiskLimits,

    /// Position sizing parameters
    #[serde(default)]
    pub sizer: SizerConfig,

    /// Instrument reference data (sector and asset class per ticker)
    #[serde(default)]
    pub instruments: HashMap<String, InstrumentInfo>,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            limits: RiskLimits::default(),
            sizer: SizerConfig::default(),
            instruments: HashMap::new(),
        }
    }
}

/// Gate limits checked on every candidate order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskLimits {
    /// Deny all entries past this drawdown fraction
    #[serde(default = "default_max_drawdown")]
    pub max_drawdown_pct: f64,

    /// Maximum exposure in a single instrument as a fraction of equity
    #[serde(default = "default_instrument_cap")]
    pub max_instrument_exposure_pct: f64,

    /// Maximum exposure in a single sector as a fraction of equity
    #[serde(default = "default_sector_cap")]
    pub max_sector_exposure_pct: f64,

    /// Deny orders that would push average pairwise correlation above this
    #[serde(default = "default_correlation_cap")]
    pub correlation_cap: f64,

    /// Order velocity limit (orders per minute)
    #[serde(default = "default_order_velocity")]
    pub max_orders_per_minute: usize,

    /// Deny rather than decide on a snapshot older than this (seconds)
    #[serde(default = "default_staleness")]
    pub snapshot_staleness_secs: u64,
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            max_drawdown_pct: default_max_drawdown(),
            max_instrument_exposure_pct: default_instrument_cap(),
            max_sector_exposure_pct: default_sector_cap(),
            correlation_cap: default_correlation_cap(),
            max_orders_per_minute: default_order_velocity(),
            snapshot_staleness_secs: default_staleness(),
        }
    }
}

fn default_max_drawdown() -> f64 {
    0.10
}

fn default_instrument_cap() -> f64 {
    0.10
}

fn default_sector_cap() -> f64 {
    0.30
}

fn default_correlation_cap() -> f64 {
    0.70
}

fn default_order_velocity() -> usize {
    30
}

fn default_staleness() -> u64 {
    2
}

/// Position sizing parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SizerConfig {
    /// Equity fraction risked per trade at full conviction
    #[serde(default = "default_risk_per_trade")]
    pub risk_per_trade_pct: f64,

    /// Fraction of full Kelly to use (0.25 = quarter-Kelly)
    #[serde(default = "default_kelly_multiplier")]
    pub kelly_multiplier: f64,

    /// Hard cap on a single position as a fraction of equity
    #[serde(default = "default_max_position")]
    pub max_position_pct: f64,
}

impl Default for SizerConfig {
    fn default() -> Self {
        Self {
            risk_per_trade_pct: default_risk_per_trade(),
            kelly_multiplier: default_kelly_multiplier(),
            max_position_pct: default_max_position(),
        }
    }
}

fn default_risk_per_trade() -> f64 {
    0.01
}

fn default_kelly_multiplier() -> f64 {
    0.25
}

fn default_max_position() -> f64 {
    0.10
}

/// Reference data for one tradable instrument
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentInfo {
    pub sector: String,
    pub asset_class: AssetClass,
    #[serde(default = "default_beta")]
    pub beta: f64,
}

fn default_beta() -> f64 {
    1.0
}

impl InstrumentInfo {
    /// Fallback used for tickers missing from the catalog
    pub fn unknown() -> Self {
        Self {
            sector: "uncategorized".to_string(),
            asset_class: AssetClass::Equity,
            beta: 1.0,
        }
    }
}

/// Load configuration from TOML file
pub fn load_config(path: &str) -> anyhow::Result<RiskConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: RiskConfig = toml::from_str(&content)?;
    Ok(config)
}

/// Save configuration to TOML file
pub fn save_config(config: &RiskConfig, path: &str) -> anyhow::Result<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}
