//! Configuration for the relay gateway
//!
//! Every operational tunable (thresholds, cooldowns, the long-context
//! cutoff) is a required field: a missing key fails `Config::load` rather
//! than falling back to a built-in default. Silent defaulting of routing
//! or provider settings is a correctness bug here, not a convenience.

#![allow(clippy::must_use_candidate)]

mod env;
pub mod health;
mod loader;
pub mod providers;
pub mod request;
pub mod routing;
pub mod server;

use serde::Deserialize;

pub use health::HealthConfig;
pub use providers::{InstanceConfig, ProviderConfig, ProviderFamily};
pub use request::RequestConfig;
pub use routing::{RouteRule, RoutingConfig};
pub use server::ServerConfig;

/// Top-level relay configuration
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// HTTP listener configuration
    pub server: ServerConfig,
    /// Per-request deadline and retry tunables
    pub request: RequestConfig,
    /// Category routing table and classification tunables
    pub routing: RoutingConfig,
    /// Provider registry keyed by provider name
    pub providers: indexmap::IndexMap<String, ProviderConfig>,
    /// Health registry thresholds and cooldown durations
    pub health: HealthConfig,
}
