//! Top-level pipeline configuration
//!
//! Aggregates every component's config into one TOML surface. The file can
//! be re-read at runtime and the hot-swappable pieces (risk limits, regime
//! table, fusion weights) republished without a restart.

use execution::{BreakerConfig, KillSwitchConfig, RouterConfig};
use feedback::FeedbackConfig;
use portfolio_risk::RiskConfig;
use regime_router::{DetectorConfig, RegimeProfileTable, SelectorConfig};
use serde::{Deserialize, Serialize};
use signal_fusion::{FusionConfig, GuardConfig};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Starting account equity
    #[serde(default = "default_equity")]
    pub initial_equity: f64,

    /// Alert dedup window (seconds)
    #[serde(default = "default_alert_suppression")]
    pub alert_suppression_secs: u64,

    /// Risk snapshot refresh cadence (seconds)
    #[serde(default = "default_snapshot_refresh")]
    pub snapshot_refresh_secs: u64,

    /// Lifecycle sweep cadence (seconds)
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Guard rejections per check interval that raise a spike alert
    #[serde(default = "default_guard_spike")]
    pub guard_rejection_spike: u64,

    #[serde(default)]
    pub guard: GuardConfig,

    #[serde(default)]
    pub fusion: FusionConfig,

    #[serde(default)]
    pub detector: DetectorConfig,

    #[serde(default)]
    pub regimes: RegimeProfileTable,

    #[serde(default)]
    pub selector: SelectorConfig,

    #[serde(default)]
    pub risk: RiskConfig,

    #[serde(default)]
    pub router: RouterConfig,

    #[serde(default)]
    pub breaker: BreakerConfig,

    #[serde(default)]
    pub kill_switch: KillSwitchConfig,

    #[serde(default)]
    pub feedback: FeedbackConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            initial_equity: default_equity(),
            guard: GuardConfig::default(),
            fusion: FusionConfig::default(),
            detector: DetectorConfig::default(),
            regimes: RegimeProfileTable::default(),
            selector: SelectorConfig::default(),
            risk: RiskConfig::default(),
            router: RouterConfig::default(),
            breaker: BreakerConfig::default(),
            kill_switch: KillSwitchConfig::default(),
            feedback: FeedbackConfig::default(),
            alert_suppression_secs: default_alert_suppression(),
            snapshot_refresh_secs: default_snapshot_refresh(),
            sweep_interval_secs: default_sweep_interval(),
            guard_rejection_spike: default_guard_spike(),
        }
    }
}

fn default_equity() -> f64 {
    100_000.0
}

fn default_alert_suppression() -> u64 {
    300
}

fn default_snapshot_refresh() -> u64 {
    1
}

fn default_sweep_interval() -> u64 {
    5
}

fn default_guard_spike() -> u64 {
    25
}

/// Load configuration from a TOML file, falling back to defaults for any
/// missing section; environment variables prefixed `PIPELINE_` override
/// file values
pub fn load_config(path: &str) -> anyhow::Result<PipelineConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name(path).required(false))
        .add_source(config::Environment::with_prefix("PIPELINE").separator("__"))
        .build()?;

    let config = settings.try_deserialize::<PipelineConfig>()?;
    Ok(config)
}

/// Save configuration to TOML file
pub fn save_config(config: &PipelineConfig, path: &str) -> anyhow::Result<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}
