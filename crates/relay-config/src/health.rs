use serde::Deserialize;

/// Health registry thresholds and cooldown durations
///
/// Exact numbers are operator-tunable, not protocol-fixed, so every
/// field is required.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HealthConfig {
    /// Authentication failures before an instance is permanently
    /// blacklisted for the process lifetime
    pub auth_failure_limit: u32,
    /// Consecutive network/server/timeout failures before cooldown
    pub failure_threshold: u32,
    /// Base cooldown after hitting the failure threshold, in seconds
    pub failure_cooldown_secs: u64,
    /// Cooldown applied on a rate-limit response, in seconds
    pub rate_limit_cooldown_secs: u64,
    /// Upper bound for exponential cooldown backoff, in seconds
    pub max_cooldown_secs: u64,
}
