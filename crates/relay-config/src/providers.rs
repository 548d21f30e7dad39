use std::collections::HashMap;

use secrecy::SecretString;
use serde::Deserialize;
use url::Url;

/// Configuration for one logical provider (a family plus its instances)
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    /// Wire protocol family spoken by every instance of this provider
    pub family: ProviderFamily,
    /// Independently health-tracked endpoint+credential pairs
    pub instances: Vec<InstanceConfig>,
}

/// Supported provider wire protocol families
///
/// A closed set: adding a provider means adding a variant and its
/// transformer, not a new string constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderFamily {
    /// Anthropic Messages API (the unified dialect is its wire dialect)
    Anthropic,
    /// OpenAI-compatible chat completions API
    Openai,
    /// Google Gemini generative language API
    Gemini,
    /// CodeWhisperer-style buffered conversation API
    Codewhisperer,
}

/// One configured provider instance
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InstanceConfig {
    /// Unique instance identifier (health is tracked per id)
    pub id: String,
    /// Base endpoint URL
    pub endpoint: Url,
    /// Static API key (OpenAI-compatible, Gemini, Anthropic)
    #[serde(default)]
    pub api_key: Option<SecretString>,
    /// Refresh token for token-based providers (CodeWhisperer)
    #[serde(default)]
    pub refresh_token: Option<SecretString>,
    /// Token refresh endpoint for token-based providers
    #[serde(default)]
    pub token_url: Option<Url>,
    /// Profile ARN forwarded on CodeWhisperer requests
    #[serde(default)]
    pub profile_arn: Option<String>,
    /// Routed model id -> provider-native model id
    #[serde(default)]
    pub model_aliases: HashMap<String, String>,
}
