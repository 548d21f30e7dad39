use serde::{Deserialize, Serialize};

/// Definition of a tool the model can call
///
/// Names must be unique within one request's tool set; the inbound edge
/// validates this before routing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name
    pub name: String,
    /// Human-readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema for input parameters
    pub input_schema: serde_json::Value,
}
