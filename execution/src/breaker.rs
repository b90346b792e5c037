//! Trading circuit breaker
//!
//! Three-state machine over realized trade outcomes: CLOSED trips to OPEN
//! on consecutive losses, daily drawdown, or hourly loss rate; OPEN cools
//! down into HALF_OPEN; a probationary win closes the breaker, a loss
//! reopens it. Every transition is appended to an immutable log with the
//! equity and P&L context at transition time.

use chrono::{DateTime, Utc};
use common::CircuitState;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Trip conditions and cooldown
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Consecutive losing trades that trip the breaker
    #[serde(default = "default_consecutive_losses")]
    pub consecutive_loss_trip: usize,

    /// Daily drawdown fraction that trips the breaker
    #[serde(default = "default_daily_drawdown")]
    pub daily_drawdown_trip_pct: f64,

    /// Realized losses within one hour that trip the breaker (account
    /// currency)
    #[serde(default = "default_hourly_loss")]
    pub hourly_loss_trip: f64,

    /// Cooldown before OPEN relaxes to HALF_OPEN (seconds)
    #[serde(default = "default_cooldown")]
    pub cooldown_secs: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            consecutive_loss_trip: default_consecutive_losses(),
            daily_drawdown_trip_pct: default_daily_drawdown(),
            hourly_loss_trip: default_hourly_loss(),
            cooldown_secs: default_cooldown(),
        }
    }
}

fn default_consecutive_losses() -> usize {
    5
}

fn default_daily_drawdown() -> f64 {
    0.05
}

fn default_hourly_loss() -> f64 {
    5_000.0
}

fn default_cooldown() -> u64 {
    900
}

/// One recorded state transition with its trading context
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerTransition {
    pub from: CircuitState,
    pub to: CircuitState,
    pub reason: String,
    pub equity: f64,
    pub daily_pnl: f64,
    pub at: DateTime<Utc>,
}

pub struct TradingCircuitBreaker {
    config: BreakerConfig,
    state: CircuitState,
    consecutive_losses: usize,
    day_start_equity: f64,
    last_equity: f64,
    hourly_losses: VecDeque<(Instant, f64)>,
    opened_at: Option<Instant>,
    transitions: Vec<BreakerTransition>,
}

impl TradingCircuitBreaker {
    pub fn new(config: BreakerConfig, initial_equity: f64) -> Self {
        Self {
            config,
            state: CircuitState::Closed,
            consecutive_losses: 0,
            day_start_equity: initial_equity,
            last_equity: initial_equity,
            hourly_losses: VecDeque::new(),
            opened_at: None,
            transitions: Vec::new(),
        }
    }

    /// Current state, relaxing OPEN to HALF_OPEN once the cooldown has
    /// elapsed
    pub fn state(&mut self) -> CircuitState {
        if self.state == CircuitState::Open {
            if let Some(opened_at) = self.opened_at {
                if opened_at.elapsed() >= Duration::from_secs(self.config.cooldown_secs) {
                    self.transition(
                        CircuitState::HalfOpen,
                        "cooldown_elapsed".to_string(),
                    );
                }
            }
        }
        self.state
    }

    /// Size multiplier for new entries in the current state
    pub fn size_multiplier(&mut self) -> f64 {
        self.state().size_multiplier()
    }

    /// Record a realized trade outcome and evaluate trip conditions.
    /// Returns the transition when one fired.
    pub fn record_outcome(&mut self, pnl: f64, equity: f64) -> Option<BreakerTransition> {
        self.last_equity = equity;

        if pnl < 0.0 {
            self.consecutive_losses += 1;
            self.hourly_losses.push_back((Instant::now(), -pnl));
        } else if pnl > 0.0 {
            self.consecutive_losses = 0;
        }
        self.prune_hourly();

        match self.state() {
            CircuitState::Closed => self.check_trip_conditions(equity),
            CircuitState::HalfOpen => {
                if pnl > 0.0 {
                    Some(self.transition(CircuitState::Closed, "probation_win".to_string()))
                } else if pnl < 0.0 {
                    Some(self.transition(CircuitState::Open, "probation_loss".to_string()))
                } else {
                    None
                }
            }
            CircuitState::Open => None,
        }
    }

    /// Reset daily accounting at session start
    pub fn start_session(&mut self, equity: f64) {
        self.day_start_equity = equity;
        self.last_equity = equity;
    }

    /// Swap trip conditions without restarting
    pub fn set_config(&mut self, config: BreakerConfig) {
        self.config = config;
    }

    /// Full immutable transition history
    pub fn transitions(&self) -> &[BreakerTransition] {
        &self.transitions
    }

    fn check_trip_conditions(&mut self, equity: f64) -> Option<BreakerTransition> {
        if self.consecutive_losses >= self.config.consecutive_loss_trip {
            return Some(self.transition(
                CircuitState::Open,
                format!("{} consecutive losses", self.consecutive_losses),
            ));
        }

        if self.day_start_equity > 0.0 {
            let daily_dd = (self.day_start_equity - equity) / self.day_start_equity;
            if daily_dd >= self.config.daily_drawdown_trip_pct {
                return Some(self.transition(
                    CircuitState::Open,
                    format!("daily drawdown {:.2}%", daily_dd * 100.0),
                ));
            }
        }

        let hourly: f64 = self.hourly_losses.iter().map(|(_, loss)| loss).sum();
        if hourly >= self.config.hourly_loss_trip {
            return Some(self.transition(
                CircuitState::Open,
                format!("hourly loss rate {hourly:.0}"),
            ));
        }

        None
    }

    fn transition(&mut self, to: CircuitState, reason: String) -> BreakerTransition {
        let transition = BreakerTransition {
            from: self.state,
            to,
            reason,
            equity: self.last_equity,
            daily_pnl: self.last_equity - self.day_start_equity,
            at: Utc::now(),
        };

        tracing::warn!(
            from = ?transition.from,
            to = ?transition.to,
            reason = %transition.reason,
            equity = transition.equity,
            "Circuit breaker transition"
        );

        self.state = to;
        self.opened_at = if to == CircuitState::Open {
            Some(Instant::now())
        } else {
            None
        };
        if to == CircuitState::Closed {
            self.consecutive_losses = 0;
        }
        self.transitions.push(transition.clone());
        transition
    }

    fn prune_hourly(&mut self) {
        while let Some((at, _)) = self.hourly_losses.front() {
            if at.elapsed() > Duration::from_secs(3600) {
                self.hourly_losses.pop_front();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(trip: usize) -> TradingCircuitBreaker {
        TradingCircuitBreaker::new(
            BreakerConfig {
                consecutive_loss_trip: trip,
                hourly_loss_trip: 1_000_000.0,
                ..Default::default()
            },
            100_000.0,
        )
    }

    #[test]
    fn test_exactly_trip_threshold_losses_opens() {
        let mut breaker = breaker(3);

        assert!(breaker.record_outcome(-100.0, 99_900.0).is_none());
        assert!(breaker.record_outcome(-100.0, 99_800.0).is_none());
        let transition = breaker.record_outcome(-100.0, 99_700.0).unwrap();

        assert_eq!(transition.from, CircuitState::Closed);
        assert_eq!(transition.to, CircuitState::Open);
        assert_eq!(breaker.state(), CircuitState::Open);
        assert_eq!(breaker.size_multiplier(), 0.0);
    }

    #[test]
    fn test_win_resets_consecutive_count() {
        let mut breaker = breaker(3);

        breaker.record_outcome(-100.0, 99_900.0);
        breaker.record_outcome(-100.0, 99_800.0);
        breaker.record_outcome(50.0, 99_850.0);
        assert!(breaker.record_outcome(-100.0, 99_750.0).is_none());
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn test_half_open_win_closes() {
        let mut breaker = TradingCircuitBreaker::new(
            BreakerConfig {
                consecutive_loss_trip: 2,
                cooldown_secs: 0,
                hourly_loss_trip: 1_000_000.0,
                ..Default::default()
            },
            100_000.0,
        );

        breaker.record_outcome(-100.0, 99_900.0);
        breaker.record_outcome(-100.0, 99_800.0);
        assert_eq!(breaker.state(), CircuitState::HalfOpen); // zero cooldown
        assert_eq!(breaker.size_multiplier(), 0.5);

        let transition = breaker.record_outcome(25.0, 99_825.0).unwrap();
        assert_eq!(transition.to, CircuitState::Closed);
        assert_eq!(breaker.size_multiplier(), 1.0);
    }

    #[test]
    fn test_half_open_loss_reopens() {
        let mut breaker = TradingCircuitBreaker::new(
            BreakerConfig {
                consecutive_loss_trip: 2,
                cooldown_secs: 0,
                hourly_loss_trip: 1_000_000.0,
                ..Default::default()
            },
            100_000.0,
        );

        breaker.record_outcome(-100.0, 99_900.0);
        breaker.record_outcome(-100.0, 99_800.0);
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        let transition = breaker.record_outcome(-10.0, 99_790.0).unwrap();
        assert_eq!(transition.to, CircuitState::Open);
    }

    #[test]
    fn test_daily_drawdown_trips() {
        let mut breaker = TradingCircuitBreaker::new(
            BreakerConfig {
                consecutive_loss_trip: 100,
                daily_drawdown_trip_pct: 0.05,
                hourly_loss_trip: 1_000_000.0,
                ..Default::default()
            },
            100_000.0,
        );

        let transition = breaker.record_outcome(-6_000.0, 94_000.0).unwrap();
        assert!(transition.reason.contains("daily drawdown"));
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[test]
    fn test_hourly_loss_rate_trips() {
        let mut breaker = TradingCircuitBreaker::new(
            BreakerConfig {
                consecutive_loss_trip: 100,
                daily_drawdown_trip_pct: 0.50,
                hourly_loss_trip: 500.0,
                ..Default::default()
            },
            100_000.0,
        );

        breaker.record_outcome(-300.0, 99_700.0);
        let transition = breaker.record_outcome(-300.0, 99_400.0).unwrap();
        assert!(transition.reason.contains("hourly loss rate"));
    }

    #[test]
    fn test_transition_log_carries_context() {
        let mut breaker = breaker(1);
        breaker.record_outcome(-500.0, 99_500.0);

        let log = breaker.transitions();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].equity, 99_500.0);
        assert!((log[0].daily_pnl + 500.0).abs() < 1e-9);
    }
}
