//! Kill switch
//!
//! Stricter, manually-rearmed counterpart to the circuit breaker. Armed
//! state watches hard triggers: equity floor breach, extreme daily
//! drawdown, and consecutive broker/API errors. Triggering directs an
//! emergency close-all and blocks new order admission until an operator
//! rearms.

use chrono::{DateTime, Utc};
use common::KillState;
use serde::{Deserialize, Serialize};

/// Hard auto-trigger thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KillSwitchConfig {
    /// Trigger when equity falls to or below this floor
    #[serde(default = "default_equity_floor")]
    pub equity_floor: f64,

    /// Trigger on daily drawdown at or past this fraction
    #[serde(default = "default_daily_drawdown")]
    pub max_daily_drawdown_pct: f64,

    /// Trigger after this many consecutive broker/API errors
    #[serde(default = "default_broker_errors")]
    pub max_consecutive_broker_errors: usize,
}

impl Default for KillSwitchConfig {
    fn default() -> Self {
        Self {
            equity_floor: default_equity_floor(),
            max_daily_drawdown_pct: default_daily_drawdown(),
            max_consecutive_broker_errors: default_broker_errors(),
        }
    }
}

fn default_equity_floor() -> f64 {
    50_000.0
}

fn default_daily_drawdown() -> f64 {
    0.10
}

fn default_broker_errors() -> usize {
    5
}

/// One recorded kill switch transition with its trading context
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KillTransition {
    pub from: KillState,
    pub to: KillState,
    pub reason: String,
    pub equity: f64,
    pub daily_pnl: f64,
    pub at: DateTime<Utc>,
}

pub struct KillSwitch {
    config: KillSwitchConfig,
    state: KillState,
    day_start_equity: f64,
    consecutive_broker_errors: usize,
    transitions: Vec<KillTransition>,
}

impl KillSwitch {
    pub fn new(config: KillSwitchConfig, initial_equity: f64) -> Self {
        Self {
            config,
            state: KillState::Disarmed,
            day_start_equity: initial_equity,
            consecutive_broker_errors: 0,
            transitions: Vec::new(),
        }
    }

    pub fn state(&self) -> KillState {
        self.state
    }

    pub fn is_triggered(&self) -> bool {
        self.state == KillState::Triggered
    }

    /// Rejection reason for new order admission, when blocked
    pub fn admission_block_reason(&self) -> Option<&'static str> {
        if self.is_triggered() {
            Some("kill_switch_triggered")
        } else {
            None
        }
    }

    /// DISARMED -> ARMED: begin watching the auto-triggers
    pub fn arm(&mut self, equity: f64) -> Option<KillTransition> {
        if self.state != KillState::Disarmed {
            return None;
        }
        Some(self.transition(KillState::Armed, "armed".to_string(), equity))
    }

    /// Evaluate equity-based auto-triggers. Only fires while armed.
    pub fn check_equity(&mut self, equity: f64) -> Option<KillTransition> {
        if self.state != KillState::Armed {
            return None;
        }

        if equity <= self.config.equity_floor {
            return Some(self.transition(
                KillState::Triggered,
                format!("equity floor breached ({equity:.0})"),
                equity,
            ));
        }

        if self.day_start_equity > 0.0 {
            let daily_dd = (self.day_start_equity - equity) / self.day_start_equity;
            if daily_dd >= self.config.max_daily_drawdown_pct {
                return Some(self.transition(
                    KillState::Triggered,
                    format!("extreme daily drawdown {:.2}%", daily_dd * 100.0),
                    equity,
                ));
            }
        }

        None
    }

    /// Count a broker/API failure toward the consecutive-error trigger
    pub fn record_broker_error(&mut self, equity: f64) -> Option<KillTransition> {
        self.consecutive_broker_errors += 1;
        if self.state == KillState::Armed
            && self.consecutive_broker_errors >= self.config.max_consecutive_broker_errors
        {
            return Some(self.transition(
                KillState::Triggered,
                format!(
                    "{} consecutive broker errors",
                    self.consecutive_broker_errors
                ),
                equity,
            ));
        }
        None
    }

    /// A successful broker call resets the consecutive-error count
    pub fn record_broker_success(&mut self) {
        self.consecutive_broker_errors = 0;
    }

    /// Operator-initiated trigger
    pub fn trigger_manual(&mut self, reason: &str, equity: f64) -> Option<KillTransition> {
        if self.state == KillState::Triggered {
            return None;
        }
        Some(self.transition(KillState::Triggered, format!("manual: {reason}"), equity))
    }

    /// Manual rearm after an incident: TRIGGERED -> ARMED
    pub fn rearm(&mut self, equity: f64) -> Option<KillTransition> {
        if self.state != KillState::Triggered {
            return None;
        }
        self.consecutive_broker_errors = 0;
        self.day_start_equity = equity;
        Some(self.transition(KillState::Armed, "manual rearm".to_string(), equity))
    }

    /// Reset daily accounting at session start
    pub fn start_session(&mut self, equity: f64) {
        self.day_start_equity = equity;
    }

    /// Swap auto-trigger thresholds without restarting
    pub fn set_config(&mut self, config: KillSwitchConfig) {
        self.config = config;
    }

    /// Full immutable transition history
    pub fn transitions(&self) -> &[KillTransition] {
        &self.transitions
    }

    fn transition(&mut self, to: KillState, reason: String, equity: f64) -> KillTransition {
        let transition = KillTransition {
            from: self.state,
            to,
            reason,
            equity,
            daily_pnl: equity - self.day_start_equity,
            at: Utc::now(),
        };

        tracing::error!(
            from = ?transition.from,
            to = ?transition.to,
            reason = %transition.reason,
            equity = equity,
            "Kill switch transition"
        );

        self.state = to;
        self.transitions.push(transition.clone());
        transition
    }
}
