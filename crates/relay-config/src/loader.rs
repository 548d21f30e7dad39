use std::collections::HashSet;
use std::path::Path;

use crate::Config;

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Reads the file, expands `{{ env.VAR }}` placeholders, then
    /// deserializes and validates the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, environment variable
    /// expansion fails, TOML parsing fails, or validation fails
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;

        Self::from_toml(&raw)
    }

    /// Parse and validate configuration from a raw TOML string
    ///
    /// # Errors
    ///
    /// Returns an error on expansion, parse, or validation failure
    pub fn from_toml(raw: &str) -> anyhow::Result<Self> {
        let expanded =
            crate::env::expand_env(raw).map_err(|e| anyhow::anyhow!("config variable expansion failed: {e}"))?;

        let config: Self = toml::from_str(&expanded).map_err(|e| anyhow::anyhow!("failed to parse config: {e}"))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate that the configuration is internally consistent
    ///
    /// Fails fast on anything that would otherwise require a silent
    /// fallback at request time.
    ///
    /// # Errors
    ///
    /// Returns an error if the routing table, provider registry, or
    /// tunables are inconsistent
    pub fn validate(&self) -> anyhow::Result<()> {
        self.validate_request()?;
        self.validate_routing()?;
        self.validate_providers()?;
        Ok(())
    }

    fn validate_request(&self) -> anyhow::Result<()> {
        if self.request.max_attempts == 0 {
            anyhow::bail!("request.max_attempts must be at least 1");
        }
        if self.request.timeout_secs == 0 {
            anyhow::bail!("request.timeout_secs must be at least 1");
        }
        Ok(())
    }

    fn validate_routing(&self) -> anyhow::Result<()> {
        regex::Regex::new(&self.routing.background_model_pattern)
            .map_err(|e| anyhow::anyhow!("invalid routing.background_model_pattern: {e}"))?;

        if !self.routing.rules.contains_key("default") {
            anyhow::bail!("routing.rules must contain a `default` rule");
        }

        const KNOWN_CATEGORIES: &[&str] = &["default", "background", "thinking", "long_context", "search"];
        for (category, rule) in &self.routing.rules {
            if !KNOWN_CATEGORIES.contains(&category.as_str()) {
                anyhow::bail!("unknown routing category `{category}`");
            }
            if !self.providers.contains_key(&rule.provider) {
                anyhow::bail!("routing rule `{category}` targets unknown provider `{}`", rule.provider);
            }
            if rule.model.is_empty() {
                anyhow::bail!("routing rule `{category}` has an empty model");
            }
        }

        Ok(())
    }

    fn validate_providers(&self) -> anyhow::Result<()> {
        if self.providers.is_empty() {
            anyhow::bail!("at least one provider must be configured");
        }

        let mut seen_ids = HashSet::new();
        for (name, provider) in &self.providers {
            if provider.instances.is_empty() {
                anyhow::bail!("provider `{name}` has no instances");
            }

            for instance in &provider.instances {
                if !seen_ids.insert(instance.id.as_str()) {
                    anyhow::bail!("duplicate provider instance id `{}`", instance.id);
                }

                match provider.family {
                    crate::ProviderFamily::Codewhisperer => {
                        if instance.refresh_token.is_none() || instance.token_url.is_none() {
                            anyhow::bail!(
                                "instance `{}` requires refresh_token and token_url for its family",
                                instance.id
                            );
                        }
                    }
                    _ => {
                        if instance.api_key.is_none() {
                            anyhow::bail!("instance `{}` requires api_key for its family", instance.id);
                        }
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_toml() -> String {
        r#"
[server]
listen = "127.0.0.1:8787"

[request]
timeout_secs = 60
max_attempts = 2

[routing]
background_model_pattern = "haiku"
long_context_threshold = 60000

[routing.rules.default]
provider = "openrouter"
model = "big-model"

[providers.openrouter]
family = "openai"

[[providers.openrouter.instances]]
id = "openrouter-a"
endpoint = "https://openrouter.ai/api/v1"
api_key = "sk-test"

[health]
auth_failure_limit = 3
failure_threshold = 5
failure_cooldown_secs = 30
rate_limit_cooldown_secs = 60
max_cooldown_secs = 600
"#
        .to_owned()
    }

    #[test]
    fn valid_config_loads() {
        let config = Config::from_toml(&base_toml()).unwrap();
        assert_eq!(config.request.max_attempts, 2);
        assert_eq!(config.providers.len(), 1);
    }

    #[test]
    fn missing_tunable_fails() {
        // Drop a required health field; no built-in default may step in
        let toml = base_toml().replace("max_cooldown_secs = 600\n", "");
        let err = Config::from_toml(&toml).unwrap_err();
        assert!(err.to_string().contains("parse"), "{err}");
    }

    #[test]
    fn missing_default_rule_fails() {
        let toml = base_toml().replace("[routing.rules.default]", "[routing.rules.search]");
        let err = Config::from_toml(&toml).unwrap_err();
        assert!(err.to_string().contains("default"));
    }

    #[test]
    fn unknown_routing_target_fails() {
        let toml = base_toml().replace("provider = \"openrouter\"\nmodel", "provider = \"ghost\"\nmodel");
        let err = Config::from_toml(&toml).unwrap_err();
        assert!(err.to_string().contains("unknown provider"));
    }

    #[test]
    fn duplicate_instance_id_fails() {
        let extra = r#"
[[providers.openrouter.instances]]
id = "openrouter-a"
endpoint = "https://other.example/v1"
api_key = "sk-test-2"
"#;
        let toml = format!("{}{extra}", base_toml());
        let err = Config::from_toml(&toml).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn token_provider_requires_refresh_credentials() {
        let extra = r#"
[providers.kiro]
family = "codewhisperer"

[[providers.kiro.instances]]
id = "kiro-a"
endpoint = "https://codewhisperer.example"
"#;
        let toml = format!("{}{extra}", base_toml());
        let err = Config::from_toml(&toml).unwrap_err();
        assert!(err.to_string().contains("refresh_token"));
    }

    #[test]
    fn zero_attempts_fails() {
        let toml = base_toml().replace("max_attempts = 2", "max_attempts = 0");
        let err = Config::from_toml(&toml).unwrap_err();
        assert!(err.to_string().contains("max_attempts"));
    }
}
