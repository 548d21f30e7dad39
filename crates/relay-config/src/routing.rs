use indexmap::IndexMap;
use serde::Deserialize;

/// Category routing table and classification tunables
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoutingConfig {
    /// Regex matched against the caller's original model name to detect
    /// lightweight-model requests (the `background` category)
    pub background_model_pattern: String,
    /// Estimated token count above which a request is `long_context`
    pub long_context_threshold: u32,
    /// Category -> target rules, keyed by category name
    /// (`default`, `background`, `thinking`, `long_context`, `search`)
    pub rules: IndexMap<String, RouteRule>,
}

/// Target for one routing category
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RouteRule {
    /// Provider name (key in the provider registry)
    pub provider: String,
    /// Model identifier to rewrite the request to
    pub model: String,
}
