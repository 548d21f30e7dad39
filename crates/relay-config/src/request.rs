use serde::Deserialize;

/// Per-request pipeline tunables
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RequestConfig {
    /// Deadline for a single provider call, in seconds
    pub timeout_secs: u64,
    /// Total attempts per request, including the first (re-selection
    /// stays within the routed provider's instances)
    pub max_attempts: usize,
}
