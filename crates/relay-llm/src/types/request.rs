use serde::{Deserialize, Serialize};

use super::message::Message;
use super::tool::ToolDefinition;
use crate::error::GatewayError;
use crate::route::RouteCategory;

/// Unified chat request
///
/// `model` is mutated exactly once, by the routing engine, which records
/// the caller's original model in `metadata` first. Every other field is
/// read-only after the inbound edge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Model identifier (rewritten to the routed target model)
    pub model: String,
    /// Maximum tokens to generate
    pub max_tokens: u32,
    /// System prompt (top-level, not in messages)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    /// Conversation messages
    pub messages: Vec<Message>,
    /// Tool definitions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDefinition>>,
    /// Whether to stream the response
    #[serde(default)]
    pub stream: bool,
    /// Extended reasoning configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<ThinkingConfig>,
    /// Routing metadata, never populated from the wire
    #[serde(skip)]
    pub metadata: RequestMetadata,
}

impl ChatRequest {
    /// Whether the request carries a non-empty tool set
    pub fn has_tools(&self) -> bool {
        self.tools.as_ref().is_some_and(|t| !t.is_empty())
    }

    /// Whether extended reasoning is explicitly enabled
    pub fn thinking_enabled(&self) -> bool {
        self.thinking.as_ref().is_some_and(ThinkingConfig::enabled)
    }

    /// Validate inbound request shape
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` for empty messages or duplicate tool names.
    pub fn validate(&self) -> Result<(), GatewayError> {
        if self.messages.is_empty() {
            return Err(GatewayError::InvalidRequest("messages must not be empty".to_owned()));
        }

        if let Some(tools) = &self.tools {
            let mut seen = std::collections::HashSet::new();
            for tool in tools {
                if !seen.insert(tool.name.as_str()) {
                    return Err(GatewayError::InvalidRequest(format!(
                        "duplicate tool name `{}`",
                        tool.name
                    )));
                }
            }
        }

        Ok(())
    }
}

/// Extended reasoning configuration (Anthropic `thinking` shape)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThinkingConfig {
    /// "enabled" or "disabled"
    #[serde(rename = "type")]
    pub mode: String,
    /// Token budget for reasoning
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget_tokens: Option<u32>,
}

impl ThinkingConfig {
    /// Whether the flag is explicitly set to enabled
    pub fn enabled(&self) -> bool {
        self.mode == "enabled"
    }
}

/// Routing metadata attached to a request after classification
///
/// `original_model` is immutable once set; downstream stages read the
/// caller's model only through it.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RequestMetadata {
    /// Model name as supplied by the caller
    pub original_model: Option<String>,
    /// Category the request classified into
    pub routing_category: Option<RouteCategory>,
    /// Provider name the category resolved to
    pub target_provider: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::message::Role;

    #[test]
    fn duplicate_tool_names_rejected() {
        let tool = ToolDefinition {
            name: "lookup".to_owned(),
            description: None,
            input_schema: serde_json::json!({"type": "object"}),
        };
        let req = ChatRequest {
            model: "m".to_owned(),
            max_tokens: 16,
            system: None,
            messages: vec![Message::text(Role::User, "hi")],
            tools: Some(vec![tool.clone(), tool]),
            stream: false,
            thinking: None,
            metadata: RequestMetadata::default(),
        };
        assert!(matches!(req.validate(), Err(GatewayError::InvalidRequest(_))));
    }

    #[test]
    fn metadata_never_deserializes_from_wire() {
        let req: ChatRequest = serde_json::from_str(
            r#"{"model":"m","max_tokens":1,"messages":[{"role":"user","content":"hi"}]}"#,
        )
        .unwrap();
        assert!(req.metadata.original_model.is_none());
        assert!(req.metadata.routing_category.is_none());
    }
}
