// Signal Guard
// Rejects stale and duplicate signals before they reach fusion

use chrono::Utc;
use common::{Signal, SignalDirection, SignalType};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Guard configuration
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct GuardConfig {
    /// Signals older than this are rejected as stale (seconds)
    #[serde(default = "default_max_age")]
    pub max_age_secs: u64,
    /// Window within which an equivalent signal counts as a duplicate
    /// (seconds)
    #[serde(default = "default_dedup_window")]
    pub dedup_window_secs: u64,
    /// Hard cap on dedup entries; prune sweeps below this
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

fn default_max_age() -> u64 {
    120
}

fn default_dedup_window() -> u64 {
    300
}

fn default_max_entries() -> usize {
    10_000
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            max_age_secs: default_max_age(),
            dedup_window_secs: default_dedup_window(),
            max_entries: default_max_entries(),
        }
    }
}

/// Why a signal was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    Stale,
    Duplicate,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::Stale => "STALE",
            RejectReason::Duplicate => "DUPLICATE",
        }
    }
}

/// Guard verdict for one signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Accepted,
    Rejected(RejectReason),
}

impl Admission {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Admission::Accepted)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct DedupKey {
    ticker_hash: u64,
    signal_type: SignalType,
    direction: SignalDirection,
}

impl DedupKey {
    fn new(signal: &Signal) -> Self {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        signal.ticker.hash(&mut hasher);
        Self {
            ticker_hash: hasher.finish(),
            signal_type: signal.signal_type,
            direction: signal.direction,
        }
    }
}

/// Running guard counters, used by the orchestrator to detect rejection
/// spikes
#[derive(Debug, Clone, Copy, Default)]
pub struct GuardStats {
    pub admitted: u64,
    pub rejected_stale: u64,
    pub rejected_duplicate: u64,
}

impl GuardStats {
    pub fn rejected_total(&self) -> u64 {
        self.rejected_stale + self.rejected_duplicate
    }
}

/// Stale/duplicate filter in front of fusion. The dedup state is a sharded
/// recency map keyed by (ticker, signal_type, direction) holding the
/// last-admitted monotonic timestamp, so concurrent admits for different
/// keys only contend on their own shard.
pub struct SignalGuard {
    config: GuardConfig,
    seen: DashMap<DedupKey, Instant>,
    admitted: AtomicU64,
    rejected_stale: AtomicU64,
    rejected_duplicate: AtomicU64,
}

impl SignalGuard {
    pub fn new(config: GuardConfig) -> Self {
        Self {
            config,
            seen: DashMap::new(),
            admitted: AtomicU64::new(0),
            rejected_stale: AtomicU64::new(0),
            rejected_duplicate: AtomicU64::new(0),
        }
    }

    /// Admit or reject one signal
    pub fn admit(&self, signal: &Signal) -> Admission {
        let age = signal.age_secs(Utc::now());
        if age > self.config.max_age_secs as f64 {
            self.rejected_stale.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(
                signal_id = %signal.id,
                ticker = %signal.ticker,
                age_secs = age,
                "Signal rejected: STALE"
            );
            return Admission::Rejected(RejectReason::Stale);
        }

        let window = Duration::from_secs(self.config.dedup_window_secs);
        let key = DedupKey::new(signal);

        // The entry API holds the shard lock across check-and-set, so two
        // concurrent equivalents cannot both be admitted.
        let verdict = match self.seen.entry(key) {
            dashmap::mapref::entry::Entry::Occupied(mut occupied) => {
                if occupied.get().elapsed() <= window {
                    Admission::Rejected(RejectReason::Duplicate)
                } else {
                    occupied.insert(Instant::now());
                    Admission::Accepted
                }
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(Instant::now());
                Admission::Accepted
            }
        };

        match verdict {
            Admission::Accepted => {
                self.admitted.fetch_add(1, Ordering::Relaxed);
            }
            Admission::Rejected(reason) => {
                self.rejected_duplicate.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    signal_id = %signal.id,
                    ticker = %signal.ticker,
                    reason = reason.as_str(),
                    "Signal rejected"
                );
            }
        }

        verdict
    }

    /// Expire entries past the dedup window; enforce the entry cap
    pub fn prune(&self) {
        let window = Duration::from_secs(self.config.dedup_window_secs);
        self.seen.retain(|_, admitted_at| admitted_at.elapsed() <= window);

        if self.seen.len() > self.config.max_entries {
            // Oversized even after expiry: drop the oldest entries first
            let mut entries: Vec<(DedupKey, Instant)> = self
                .seen
                .iter()
                .map(|e| (*e.key(), *e.value()))
                .collect();
            entries.sort_by_key(|(_, at)| *at);

            let excess = entries.len() - self.config.max_entries;
            for (key, _) in entries.into_iter().take(excess) {
                self.seen.remove(&key);
            }
        }
    }

    pub fn stats(&self) -> GuardStats {
        GuardStats {
            admitted: self.admitted.load(Ordering::Relaxed),
            rejected_stale: self.rejected_stale.load(Ordering::Relaxed),
            rejected_duplicate: self.rejected_duplicate.load(Ordering::Relaxed),
        }
    }

    pub fn tracked_keys(&self) -> usize {
        self.seen.len()
    }
}

impl Default for SignalGuard {
    fn default() -> Self {
        Self::new(GuardConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{SignalDirection, SignalSource, SignalType};
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn make_signal(ticker: &str, direction: SignalDirection, age_secs: i64) -> Signal {
        let (stop, target) = match direction {
            SignalDirection::Long => (dec!(95), dec!(110)),
            SignalDirection::Short => (dec!(105), dec!(90)),
        };
        Signal {
            id: Uuid::new_v4(),
            ticker: ticker.to_string(),
            source: SignalSource::EmaCloud,
            direction,
            conviction: 70.0,
            signal_type: SignalType::Momentum,
            entry_price: dec!(100),
            stop_loss: stop,
            target_price: target,
            created_at: Utc::now() - chrono::Duration::seconds(age_secs),
            metadata: serde_json::json!({}),
        }
    }

    #[test]
    fn test_first_admitted_second_duplicate() {
        let guard = SignalGuard::default();

        let s1 = make_signal("AAPL", SignalDirection::Long, 0);
        let s2 = make_signal("AAPL", SignalDirection::Long, 0);

        assert_eq!(guard.admit(&s1), Admission::Accepted);
        assert_eq!(
            guard.admit(&s2),
            Admission::Rejected(RejectReason::Duplicate)
        );

        let stats = guard.stats();
        assert_eq!(stats.admitted, 1);
        assert_eq!(stats.rejected_duplicate, 1);
    }

    #[test]
    fn test_different_keys_do_not_collide() {
        let guard = SignalGuard::default();

        let long = make_signal("AAPL", SignalDirection::Long, 0);
        let short = make_signal("AAPL", SignalDirection::Short, 0);
        let other = make_signal("MSFT", SignalDirection::Long, 0);

        assert_eq!(guard.admit(&long), Admission::Accepted);
        assert_eq!(guard.admit(&short), Admission::Accepted);
        assert_eq!(guard.admit(&other), Admission::Accepted);
    }

    #[test]
    fn test_stale_rejected() {
        let guard = SignalGuard::default();
        let old = make_signal("AAPL", SignalDirection::Long, 121);

        assert_eq!(guard.admit(&old), Admission::Rejected(RejectReason::Stale));
        assert_eq!(guard.stats().rejected_stale, 1);
    }

    #[test]
    fn test_prune_respects_entry_cap() {
        let guard = SignalGuard::new(GuardConfig {
            max_entries: 5,
            ..Default::default()
        });

        for i in 0..20 {
            let signal = make_signal(&format!("T{i}"), SignalDirection::Long, 0);
            guard.admit(&signal);
        }

        guard.prune();
        assert!(guard.tracked_keys() <= 5);
    }
}
