//! Category routing engine
//!
//! Classifies each request into exactly one category, then rewrites the
//! model to the category's configured target. Precedence is fixed:
//! background pattern, thinking flag, long context, search, default.

use regex::Regex;
use serde::Serialize;

use relay_config::RoutingConfig;

use crate::error::GatewayError;
use crate::types::ChatRequest;

/// Routing category a request classifies into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteCategory {
    /// No other category matched
    Default,
    /// Model name matches the background pattern
    Background,
    /// Extended reasoning explicitly enabled
    Thinking,
    /// Estimated prompt tokens exceed the threshold
    LongContext,
    /// Request carries a non-empty tool set
    Search,
}

impl RouteCategory {
    /// Rule-table key for this category
    pub const fn key(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Background => "background",
            Self::Thinking => "thinking",
            Self::LongContext => "long_context",
            Self::Search => "search",
        }
    }
}

impl std::fmt::Display for RouteCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// Where a classified request goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteDecision {
    /// Category that matched
    pub category: RouteCategory,
    /// Provider name the rule targets
    pub provider: String,
    /// Model name the rule targets
    pub model: String,
}

/// Compiled routing table
#[derive(Debug)]
pub struct RouteTable {
    background_pattern: Regex,
    long_context_threshold: u32,
    rules: Vec<(RouteCategory, String, String)>,
}

impl RouteTable {
    /// Compile a routing table from configuration
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if the background pattern is not a valid
    /// regex or a rule names an unknown category.
    pub fn from_config(config: &RoutingConfig) -> Result<Self, GatewayError> {
        let background_pattern = Regex::new(&config.background_model_pattern).map_err(|e| {
            GatewayError::Configuration(format!("invalid background_model_pattern: {e}"))
        })?;

        let mut rules = Vec::with_capacity(config.rules.len());
        for (key, rule) in &config.rules {
            let category = match key.as_str() {
                "default" => RouteCategory::Default,
                "background" => RouteCategory::Background,
                "thinking" => RouteCategory::Thinking,
                "long_context" => RouteCategory::LongContext,
                "search" => RouteCategory::Search,
                other => {
                    return Err(GatewayError::Configuration(format!(
                        "unknown routing category `{other}`"
                    )));
                }
            };
            rules.push((category, rule.provider.clone(), rule.model.clone()));
        }

        Ok(Self {
            background_pattern,
            long_context_threshold: config.long_context_threshold,
            rules,
        })
    }

    /// Classify a request into exactly one category
    ///
    /// Precedence is strict: the first matching predicate wins, so a
    /// background-pattern model with thinking enabled still routes as
    /// background.
    pub fn classify(&self, request: &ChatRequest) -> RouteCategory {
        if self.background_pattern.is_match(&request.model) {
            return RouteCategory::Background;
        }
        if request.thinking_enabled() {
            return RouteCategory::Thinking;
        }
        if estimate_tokens(request) > self.long_context_threshold {
            return RouteCategory::LongContext;
        }
        if request.has_tools() {
            return RouteCategory::Search;
        }
        RouteCategory::Default
    }

    /// Look up the rule for a category
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if no rule is defined for the category.
    pub fn resolve(&self, category: RouteCategory) -> Result<RouteDecision, GatewayError> {
        self.rules
            .iter()
            .find(|(c, _, _)| *c == category)
            .map(|(c, provider, model)| RouteDecision {
                category: *c,
                provider: provider.clone(),
                model: model.clone(),
            })
            .ok_or_else(|| {
                GatewayError::Configuration(format!(
                    "no routing rule for category `{category}`"
                ))
            })
    }

    /// Classify the request, record routing metadata, and rewrite its model
    ///
    /// The only mutation of `request.model` in the pipeline happens here;
    /// the caller's original model is preserved in the request metadata.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if the matched category has no rule.
    pub fn classify_and_route(&self, request: &mut ChatRequest) -> Result<RouteDecision, GatewayError> {
        let category = self.classify(request);
        let decision = self.resolve(category)?;

        request.metadata.original_model = Some(request.model.clone());
        request.metadata.routing_category = Some(category);
        request.metadata.target_provider = Some(decision.provider.clone());
        request.model = decision.model.clone();

        Ok(decision)
    }
}

/// Rough prompt size estimate: total UTF-8 bytes of system, message text,
/// and tool schemas, divided by four.
fn estimate_tokens(request: &ChatRequest) -> u32 {
    let mut bytes = request.system.as_ref().map_or(0, String::len);

    for message in &request.messages {
        bytes += match &message.content {
            crate::types::MessageContent::Text(text) => text.len(),
            crate::types::MessageContent::Blocks(blocks) => blocks
                .iter()
                .map(|b| serde_json::to_string(b).map_or(0, |s| s.len()))
                .sum(),
        };
    }

    if let Some(tools) = &request.tools {
        bytes += tools
            .iter()
            .map(|t| serde_json::to_string(t).map_or(0, |s| s.len()))
            .sum::<usize>();
    }

    u32::try_from(bytes / 4).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Message, RequestMetadata, Role, ThinkingConfig, ToolDefinition};
    use indexmap::IndexMap;
    use relay_config::RouteRule;

    fn table() -> RouteTable {
        let mut rules = IndexMap::new();
        for (key, provider, model) in [
            ("default", "p-main", "m-large"),
            ("background", "p-cheap", "m-small"),
            ("thinking", "p-main", "m-reasoner"),
            ("long_context", "p-ctx", "m-long"),
            ("search", "p-main", "m-tools"),
        ] {
            rules.insert(
                key.to_owned(),
                RouteRule {
                    provider: provider.to_owned(),
                    model: model.to_owned(),
                },
            );
        }
        RouteTable::from_config(&RoutingConfig {
            background_model_pattern: "haiku".to_owned(),
            long_context_threshold: 60_000,
            rules,
        })
        .unwrap()
    }

    fn request(model: &str) -> ChatRequest {
        ChatRequest {
            model: model.to_owned(),
            max_tokens: 128,
            system: None,
            messages: vec![Message::text(Role::User, "hello")],
            tools: None,
            stream: false,
            thinking: None,
            metadata: RequestMetadata::default(),
        }
    }

    #[test]
    fn background_pattern_routes_and_records_original_model() {
        let table = table();
        let mut req = request("claude-3-5-haiku-20241022");
        let decision = table.classify_and_route(&mut req).unwrap();
        assert_eq!(decision.category, RouteCategory::Background);
        assert_eq!(decision.provider, "p-cheap");
        assert_eq!(req.model, "m-small");
        assert_eq!(
            req.metadata.original_model.as_deref(),
            Some("claude-3-5-haiku-20241022")
        );
    }

    #[test]
    fn background_wins_over_thinking() {
        let table = table();
        let mut req = request("haiku-x");
        req.thinking = Some(ThinkingConfig {
            mode: "enabled".to_owned(),
            budget_tokens: Some(1024),
        });
        assert_eq!(table.classify(&req), RouteCategory::Background);
    }

    #[test]
    fn thinking_wins_over_search() {
        let table = table();
        let mut req = request("m");
        req.thinking = Some(ThinkingConfig {
            mode: "enabled".to_owned(),
            budget_tokens: None,
        });
        req.tools = Some(vec![ToolDefinition {
            name: "lookup".to_owned(),
            description: None,
            input_schema: serde_json::json!({}),
        }]);
        assert_eq!(table.classify(&req), RouteCategory::Thinking);
    }

    #[test]
    fn disabled_thinking_does_not_classify() {
        let table = table();
        let mut req = request("m");
        req.thinking = Some(ThinkingConfig {
            mode: "disabled".to_owned(),
            budget_tokens: None,
        });
        assert_eq!(table.classify(&req), RouteCategory::Default);
    }

    #[test]
    fn long_context_by_byte_estimate() {
        let table = table();
        let mut req = request("m");
        // 60_000 token threshold, 4 bytes per token
        req.messages = vec![Message::text(Role::User, "x".repeat(60_001 * 4))];
        assert_eq!(table.classify(&req), RouteCategory::LongContext);
    }

    #[test]
    fn empty_tool_list_is_not_search() {
        let table = table();
        let mut req = request("m");
        req.tools = Some(Vec::new());
        assert_eq!(table.classify(&req), RouteCategory::Default);

        req.tools = Some(vec![ToolDefinition {
            name: "lookup".to_owned(),
            description: None,
            input_schema: serde_json::json!({}),
        }]);
        assert_eq!(table.classify(&req), RouteCategory::Search);
    }

    #[test]
    fn missing_rule_is_configuration_error() {
        let mut rules = IndexMap::new();
        rules.insert(
            "default".to_owned(),
            RouteRule {
                provider: "p".to_owned(),
                model: "m".to_owned(),
            },
        );
        let table = RouteTable::from_config(&RoutingConfig {
            background_model_pattern: "haiku".to_owned(),
            long_context_threshold: 60_000,
            rules,
        })
        .unwrap();

        let mut req = request("m");
        req.thinking = Some(ThinkingConfig {
            mode: "enabled".to_owned(),
            budget_tokens: None,
        });
        assert!(matches!(
            table.classify_and_route(&mut req),
            Err(GatewayError::Configuration(_))
        ));
    }
}
