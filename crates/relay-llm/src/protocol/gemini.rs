//! Gemini `generateContent` API wire format types

use serde::{Deserialize, Serialize};

/// Gemini generate-content request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiRequest {
    /// Conversation turns
    pub contents: Vec<GeminiContent>,
    /// Tool groups
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<GeminiToolGroup>>,
    /// Generation parameters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GeminiGenerationConfig>,
}

/// One conversation turn
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiContent {
    /// Turn role: "user" or "model"
    pub role: String,
    /// Ordered parts of the turn
    pub parts: Vec<GeminiPart>,
}

/// One part of a turn; exactly one field is populated
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiPart {
    /// Text content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Function call requested by the model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<GeminiFunctionCall>,
    /// Function result supplied by the caller
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_response: Option<GeminiFunctionResponse>,
}

/// Function call emitted by the model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiFunctionCall {
    /// Function name
    pub name: String,
    /// Structured arguments
    pub args: serde_json::Value,
}

/// Function result returned to the model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiFunctionResponse {
    /// Function name the result responds to
    pub name: String,
    /// Structured result payload
    pub response: serde_json::Value,
}

/// Tool group wrapping function declarations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiToolGroup {
    /// Declared functions
    pub function_declarations: Vec<GeminiFunctionDeclaration>,
}

/// Declared function
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiFunctionDeclaration {
    /// Function name
    pub name: String,
    /// Human-readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Cleaned parameter schema
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<serde_json::Value>,
}

/// Generation parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiGenerationConfig {
    /// Maximum tokens to generate
    pub max_output_tokens: u32,
}

// -- Response types --

/// Gemini generate-content response (terminal or one stream chunk)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiResponse {
    /// Candidate completions; the gateway only reads the first
    #[serde(default)]
    pub candidates: Vec<GeminiCandidate>,
    /// Token usage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_metadata: Option<GeminiUsage>,
}

/// One candidate completion
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiCandidate {
    /// Generated content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<GeminiContent>,
    /// Why generation stopped
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

/// Token usage metadata
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiUsage {
    /// Tokens consumed by the prompt
    #[serde(default)]
    pub prompt_token_count: u32,
    /// Tokens generated across candidates
    #[serde(default)]
    pub candidates_token_count: u32,
}
