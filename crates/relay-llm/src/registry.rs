//! Instance health registry
//!
//! Tracks failure streaks per provider instance and takes instances out of
//! rotation, either temporarily (cooldown with exponential backoff) or
//! permanently (authentication blacklist). Cooldown expiry is lazy: there
//! are no timers, availability is evaluated at selection time.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use serde::Serialize;
use tracing::warn;

use relay_config::HealthConfig;

use crate::error::FailureKind;

/// Availability of one instance at a point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    /// In rotation
    Healthy,
    /// Out of rotation until the given epoch second
    Cooldown {
        /// When the cooldown lapses
        until_secs: u64,
    },
    /// Permanently out of rotation for the process lifetime
    Blacklisted,
}

/// Lifetime request counters for one instance
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct InstanceCounters {
    /// Calls recorded, success or failure
    pub total_requests: u64,
    /// Successful calls
    pub success_count: u64,
    /// Failed calls of any kind
    pub failure_count: u64,
    /// Authentication failures (feed the blacklist threshold)
    pub auth_failures: u32,
    /// Upstream rate-limit responses
    pub rate_limit_failures: u32,
    /// Transport-level failures
    pub network_failures: u32,
}

#[derive(Debug, Default)]
struct InstanceHealth {
    total_requests: AtomicU64,
    success_count: AtomicU64,
    failure_count: AtomicU64,
    rate_limit_failures: AtomicU32,
    network_failures: AtomicU32,
    consecutive_failures: AtomicU32,
    auth_failures: AtomicU32,
    cooldown_until: AtomicU64,
    cooldown_round: AtomicU32,
    blacklisted: AtomicBool,
}

impl InstanceHealth {
    fn counters(&self) -> InstanceCounters {
        InstanceCounters {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            success_count: self.success_count.load(Ordering::Relaxed),
            failure_count: self.failure_count.load(Ordering::Relaxed),
            auth_failures: self.auth_failures.load(Ordering::Relaxed),
            rate_limit_failures: self.rate_limit_failures.load(Ordering::Relaxed),
            network_failures: self.network_failures.load(Ordering::Relaxed),
        }
    }
}

/// Shared health registry keyed by instance id
#[derive(Debug)]
pub struct HealthRegistry {
    instances: DashMap<String, InstanceHealth>,
    config: HealthConfig,
}

impl HealthRegistry {
    /// Create a registry with the given thresholds
    pub fn new(config: HealthConfig) -> Self {
        Self {
            instances: DashMap::new(),
            config,
        }
    }

    /// Record a successful call
    ///
    /// Clears the failure streak and any pending cooldown. A blacklist is
    /// terminal and is never cleared.
    pub fn record_success(&self, instance_id: &str) {
        let entry = self.instances.entry(instance_id.to_owned()).or_default();
        entry.total_requests.fetch_add(1, Ordering::Relaxed);
        entry.success_count.fetch_add(1, Ordering::Relaxed);
        entry.consecutive_failures.store(0, Ordering::Relaxed);
        entry.cooldown_until.store(0, Ordering::Relaxed);
        entry.cooldown_round.store(0, Ordering::Relaxed);
    }

    /// Record a failed call
    pub fn record_failure(&self, instance_id: &str, kind: FailureKind) {
        self.record_failure_at(instance_id, kind, now_secs());
    }

    fn record_failure_at(&self, instance_id: &str, kind: FailureKind, now: u64) {
        let entry = self.instances.entry(instance_id.to_owned()).or_default();
        entry.total_requests.fetch_add(1, Ordering::Relaxed);
        entry.failure_count.fetch_add(1, Ordering::Relaxed);

        match kind {
            FailureKind::Authentication => {
                let auth = entry.auth_failures.fetch_add(1, Ordering::Relaxed) + 1;
                if auth >= self.config.auth_failure_limit {
                    entry.blacklisted.store(true, Ordering::Relaxed);
                    warn!(instance = instance_id, auth_failures = auth, "instance blacklisted");
                }
            }
            FailureKind::RateLimit => {
                entry.rate_limit_failures.fetch_add(1, Ordering::Relaxed);
                entry
                    .cooldown_until
                    .store(now + self.config.rate_limit_cooldown_secs, Ordering::Relaxed);
                warn!(
                    instance = instance_id,
                    cooldown_secs = self.config.rate_limit_cooldown_secs,
                    "instance rate limited"
                );
            }
            FailureKind::Upstream
            | FailureKind::Timeout
            | FailureKind::Network
            | FailureKind::Decode => {
                if kind == FailureKind::Network {
                    entry.network_failures.fetch_add(1, Ordering::Relaxed);
                }
                let streak = entry.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
                if streak >= self.config.failure_threshold {
                    // The streak is deliberately not reset on cooldown entry:
                    // the first failure after expiry re-enters cooldown
                    // immediately, with the backoff doubled.
                    let round = entry.cooldown_round.fetch_add(1, Ordering::Relaxed);
                    let secs = self
                        .config
                        .failure_cooldown_secs
                        .saturating_mul(1_u64 << round.min(32))
                        .min(self.config.max_cooldown_secs);
                    entry.cooldown_until.store(now + secs, Ordering::Relaxed);
                    warn!(
                        instance = instance_id,
                        failure = %kind,
                        streak,
                        cooldown_secs = secs,
                        "instance entering cooldown"
                    );
                }
            }
        }
    }

    /// Whether an instance is eligible for selection right now
    pub fn is_available(&self, instance_id: &str) -> bool {
        self.state_at(instance_id, now_secs()) == InstanceState::Healthy
    }

    /// Current state of an instance
    pub fn state(&self, instance_id: &str) -> InstanceState {
        self.state_at(instance_id, now_secs())
    }

    fn state_at(&self, instance_id: &str, now: u64) -> InstanceState {
        let Some(entry) = self.instances.get(instance_id) else {
            return InstanceState::Healthy;
        };
        if entry.blacklisted.load(Ordering::Relaxed) {
            return InstanceState::Blacklisted;
        }
        let until = entry.cooldown_until.load(Ordering::Relaxed);
        if until > now {
            return InstanceState::Cooldown { until_secs: until };
        }
        InstanceState::Healthy
    }

    /// Lifetime counters for one instance
    pub fn counters(&self, instance_id: &str) -> InstanceCounters {
        self.instances
            .get(instance_id)
            .map(|entry| entry.counters())
            .unwrap_or_default()
    }

    /// States and counters of all instances the registry has seen
    pub fn snapshot(&self) -> Vec<(String, InstanceState, InstanceCounters)> {
        let now = now_secs();
        self.instances
            .iter()
            .map(|entry| {
                (entry.key().clone(), self.state_at(entry.key(), now), entry.counters())
            })
            .collect()
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> HealthRegistry {
        HealthRegistry::new(HealthConfig {
            auth_failure_limit: 2,
            failure_threshold: 3,
            failure_cooldown_secs: 60,
            rate_limit_cooldown_secs: 30,
            max_cooldown_secs: 600,
        })
    }

    #[test]
    fn unknown_instance_is_healthy() {
        assert!(registry().is_available("fresh"));
    }

    #[test]
    fn threshold_failures_trigger_cooldown() {
        let reg = registry();
        reg.record_failure_at("a", FailureKind::Upstream, 1000);
        reg.record_failure_at("a", FailureKind::Network, 1000);
        assert_eq!(reg.state_at("a", 1000), InstanceState::Healthy);

        reg.record_failure_at("a", FailureKind::Timeout, 1000);
        assert_eq!(reg.state_at("a", 1000), InstanceState::Cooldown { until_secs: 1060 });
        // lazy expiry
        assert_eq!(reg.state_at("a", 1061), InstanceState::Healthy);
    }

    #[test]
    fn failure_after_expiry_doubles_backoff() {
        let reg = registry();
        for _ in 0..3 {
            reg.record_failure_at("a", FailureKind::Upstream, 1000);
        }
        assert_eq!(reg.state_at("a", 1000), InstanceState::Cooldown { until_secs: 1060 });

        // one probe failure after the window lapses is enough to re-enter,
        // and the window doubles
        reg.record_failure_at("a", FailureKind::Upstream, 1100);
        assert_eq!(reg.state_at("a", 1100), InstanceState::Cooldown { until_secs: 1220 });
    }

    #[test]
    fn backoff_is_capped() {
        let reg = registry();
        for _ in 0..3 {
            reg.record_failure_at("a", FailureKind::Upstream, 0);
        }
        for _ in 0..10 {
            reg.record_failure_at("a", FailureKind::Upstream, 10_000);
        }
        match reg.state_at("a", 10_000) {
            InstanceState::Cooldown { until_secs } => assert_eq!(until_secs, 10_600),
            other => panic!("expected capped cooldown, got {other:?}"),
        }
    }

    #[test]
    fn success_resets_streak_and_cooldown() {
        let reg = registry();
        for _ in 0..3 {
            reg.record_failure_at("a", FailureKind::Upstream, 1000);
        }
        reg.record_success("a");
        assert_eq!(reg.state_at("a", 1000), InstanceState::Healthy);

        // streak starts over after a success
        reg.record_failure_at("a", FailureKind::Upstream, 1000);
        reg.record_failure_at("a", FailureKind::Upstream, 1000);
        assert_eq!(reg.state_at("a", 1000), InstanceState::Healthy);
    }

    #[test]
    fn auth_failures_blacklist_permanently() {
        let reg = registry();
        reg.record_failure_at("a", FailureKind::Authentication, 1000);
        assert_eq!(reg.state_at("a", 1000), InstanceState::Healthy);
        reg.record_failure_at("a", FailureKind::Authentication, 1000);
        assert_eq!(reg.state_at("a", 1000), InstanceState::Blacklisted);

        // success does not clear a blacklist
        reg.record_success("a");
        assert_eq!(reg.state_at("a", 1000), InstanceState::Blacklisted);
    }

    #[test]
    fn rate_limit_cools_down_without_counting_toward_streak() {
        let reg = registry();
        reg.record_failure_at("a", FailureKind::RateLimit, 1000);
        assert_eq!(reg.state_at("a", 1000), InstanceState::Cooldown { until_secs: 1030 });
        assert_eq!(reg.state_at("a", 1031), InstanceState::Healthy);
    }

    #[test]
    fn counters_accumulate_per_kind() {
        let reg = registry();
        reg.record_success("a");
        reg.record_failure_at("a", FailureKind::Network, 1000);
        reg.record_failure_at("a", FailureKind::RateLimit, 1000);
        reg.record_failure_at("a", FailureKind::Authentication, 1000);
        reg.record_success("a");

        let counters = reg.counters("a");
        assert_eq!(counters.total_requests, 5);
        assert_eq!(counters.success_count, 2);
        assert_eq!(counters.failure_count, 3);
        assert_eq!(counters.network_failures, 1);
        assert_eq!(counters.rate_limit_failures, 1);
        assert_eq!(counters.auth_failures, 1);

        // never-seen instances report zeroed counters
        assert_eq!(reg.counters("b"), InstanceCounters::default());
    }

    #[test]
    fn instances_are_tracked_independently() {
        let reg = registry();
        for _ in 0..3 {
            reg.record_failure_at("a", FailureKind::Upstream, 1000);
        }
        assert!(matches!(reg.state_at("a", 1000), InstanceState::Cooldown { .. }));
        assert_eq!(reg.state_at("b", 1000), InstanceState::Healthy);
    }
}
