//! Round-robin selection over healthy instances
//!
//! Each provider keeps its own counter. The counter advances on every
//! selection and indexes into the currently-healthy subset, so rotation
//! stays fair as instances drop out and return.

use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;

use crate::error::GatewayError;
use crate::registry::HealthRegistry;

/// Round-robin load balancer over provider instances
#[derive(Debug, Default)]
pub struct LoadBalancer {
    counters: DashMap<String, AtomicUsize>,
}

impl LoadBalancer {
    /// Create an empty balancer
    pub fn new() -> Self {
        Self::default()
    }

    /// Pick the next healthy instance of a provider
    ///
    /// `instance_ids` is the provider's configured instance list in config
    /// order; unavailable instances are filtered out before rotation.
    ///
    /// # Errors
    ///
    /// Returns `NoHealthyProvider` when every instance is blacklisted or
    /// cooling down.
    pub fn select<'a>(
        &self,
        provider: &str,
        instance_ids: &'a [String],
        registry: &HealthRegistry,
    ) -> Result<&'a str, GatewayError> {
        let healthy: Vec<&str> = instance_ids
            .iter()
            .map(String::as_str)
            .filter(|id| registry.is_available(id))
            .collect();

        if healthy.is_empty() {
            return Err(GatewayError::NoHealthyProvider {
                provider: provider.to_owned(),
            });
        }

        let counter = self
            .counters
            .entry(provider.to_owned())
            .or_insert_with(|| AtomicUsize::new(0));
        let turn = counter.fetch_add(1, Ordering::Relaxed);
        Ok(healthy[turn % healthy.len()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use relay_config::HealthConfig;

    fn registry() -> HealthRegistry {
        HealthRegistry::new(HealthConfig {
            auth_failure_limit: 1,
            failure_threshold: 1,
            failure_cooldown_secs: 60,
            rate_limit_cooldown_secs: 60,
            max_cooldown_secs: 600,
        })
    }

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| (*s).to_owned()).collect()
    }

    #[test]
    fn rotation_is_fair_over_healthy_set() {
        let lb = LoadBalancer::new();
        let reg = registry();
        let ids = ids(&["a", "b", "c"]);

        let mut counts = std::collections::HashMap::new();
        for _ in 0..30 {
            let picked = lb.select("p", &ids, &reg).unwrap().to_owned();
            *counts.entry(picked).or_insert(0) += 1;
        }
        assert_eq!(counts["a"], 10);
        assert_eq!(counts["b"], 10);
        assert_eq!(counts["c"], 10);
    }

    #[test]
    fn unhealthy_instances_are_skipped() {
        let lb = LoadBalancer::new();
        let reg = registry();
        let ids = ids(&["a", "b"]);
        reg.record_failure("a", FailureKind::Upstream);

        for _ in 0..5 {
            assert_eq!(lb.select("p", &ids, &reg).unwrap(), "b");
        }
    }

    #[test]
    fn all_out_is_no_healthy_provider() {
        let lb = LoadBalancer::new();
        let reg = registry();
        let ids = ids(&["a"]);
        reg.record_failure("a", FailureKind::Authentication);

        assert!(matches!(
            lb.select("p", &ids, &reg),
            Err(GatewayError::NoHealthyProvider { provider }) if provider == "p"
        ));
    }

    #[test]
    fn providers_rotate_independently() {
        let lb = LoadBalancer::new();
        let reg = registry();
        let p_ids = ids(&["a", "b"]);
        let q_ids = ids(&["x", "y"]);

        assert_eq!(lb.select("p", &p_ids, &reg).unwrap(), "a");
        assert_eq!(lb.select("q", &q_ids, &reg).unwrap(), "x");
        assert_eq!(lb.select("p", &p_ids, &reg).unwrap(), "b");
        assert_eq!(lb.select("q", &q_ids, &reg).unwrap(), "y");
    }
}
