use serde::{Deserialize, Serialize};

use super::message::ContentBlock;

/// Reason the model stopped generating
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Natural end of the assistant turn
    EndTurn,
    /// Model requested one or more tool invocations
    ToolUse,
    /// Hit the `max_tokens` limit
    MaxTokens,
}

/// Token usage statistics
///
/// Both sides default to zero: upstream `message_delta` events report only
/// `output_tokens`, and a partial report must still deserialize.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Tokens consumed by the prompt
    #[serde(default)]
    pub input_tokens: u32,
    /// Tokens generated in the response
    #[serde(default)]
    pub output_tokens: u32,
}

/// Unified terminal chat response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Unique response identifier
    pub id: String,
    /// Object type (always "message")
    #[serde(rename = "type")]
    pub response_type: String,
    /// Role (always "assistant")
    pub role: String,
    /// Model that produced the response
    pub model: String,
    /// Ordered content blocks
    pub content: Vec<ContentBlock>,
    /// Why generation stopped
    pub stop_reason: Option<StopReason>,
    /// Token usage
    pub usage: Usage,
}

impl ChatResponse {
    /// Create a response with the standard envelope fields filled in
    pub fn new(id: String, model: String, content: Vec<ContentBlock>, stop_reason: Option<StopReason>, usage: Usage) -> Self {
        Self {
            id,
            response_type: "message".to_owned(),
            role: "assistant".to_owned(),
            model,
            content,
            stop_reason,
            usage,
        }
    }

    /// Whether any block is a tool use request
    pub fn has_tool_use(&self) -> bool {
        self.content.iter().any(|b| matches!(b, ContentBlock::ToolUse { .. }))
    }
}
