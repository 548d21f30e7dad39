//! CodeWhisperer-style conversational API wire format types
//!
//! The request nests one current message plus conversation history inside a
//! `conversationState` envelope. The context object inside the current
//! message must always be present, even when it is empty. The response is
//! one buffered payload of concatenated JSON frames, not true SSE; see
//! [`crate::reconstruct`] for how it is consumed.

use serde::{Deserialize, Serialize};

/// Top-level request envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CwRequest {
    /// Conversation state for this turn
    pub conversation_state: CwConversationState,
    /// Profile ARN the credential is scoped to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_arn: Option<String>,
}

/// Conversation state
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CwConversationState {
    /// Trigger type (always "MANUAL")
    pub chat_trigger_type: String,
    /// Conversation identifier, fresh per request
    pub conversation_id: String,
    /// The message being sent this turn
    pub current_message: CwCurrentMessage,
    /// Prior turns, oldest first
    pub history: Vec<CwHistoryEntry>,
}

/// Wrapper around the current user input message
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CwCurrentMessage {
    /// The user input message
    pub user_input_message: CwUserInputMessage,
}

/// User input message
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CwUserInputMessage {
    /// Message text
    pub content: String,
    /// Target model identifier
    pub model_id: String,
    /// Request origin tag
    pub origin: String,
    /// Tool context; always present, possibly empty
    pub user_input_message_context: CwUserInputMessageContext,
}

/// Context attached to a user input message
///
/// Serialized even when both lists are empty; the upstream rejects
/// requests without it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CwUserInputMessageContext {
    /// Available tools
    #[serde(default)]
    pub tools: Vec<CwTool>,
    /// Results for tool calls from the previous assistant turn
    #[serde(default)]
    pub tool_results: Vec<CwToolResult>,
}

/// One history entry; exactly one side is populated
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CwHistoryEntry {
    /// A prior user turn
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_input_message: Option<CwUserInputMessage>,
    /// A prior assistant turn
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assistant_response_message: Option<CwAssistantResponseMessage>,
}

/// Assistant turn within history
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CwAssistantResponseMessage {
    /// Assistant text
    pub content: String,
    /// Tool calls the assistant made in that turn
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_uses: Option<Vec<CwToolUse>>,
}

/// Tool definition wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CwTool {
    /// The tool specification
    pub tool_specification: CwToolSpecification,
}

/// Tool specification
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CwToolSpecification {
    /// Tool name
    pub name: String,
    /// Human-readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Input schema wrapper
    pub input_schema: CwInputSchema,
}

/// Schema wrapper; the upstream nests the actual schema under `json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CwInputSchema {
    /// The JSON Schema
    pub json: serde_json::Value,
}

/// Tool call within an assistant history turn
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CwToolUse {
    /// Tool use identifier
    pub tool_use_id: String,
    /// Tool name
    pub name: String,
    /// Structured input
    pub input: serde_json::Value,
}

/// Tool result sent back with the current message
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CwToolResult {
    /// Tool use ID this result responds to
    pub tool_use_id: String,
    /// Result content parts
    pub content: Vec<CwToolResultContent>,
    /// "success" or "error"
    pub status: String,
}

/// One tool result content part
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CwToolResultContent {
    /// Text payload
    pub text: String,
}

// -- Response frames --

/// One JSON frame extracted from the buffered response body
///
/// Frames arrive as concatenated JSON objects without framing delimiters
/// the gateway can rely on; [`crate::reconstruct`] extracts them by brace
/// matching and deserializes each into this enum.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CwEvent {
    /// Structured tool call fragment
    ToolUseFragment {
        /// Tool use identifier
        #[serde(rename = "toolUseId")]
        tool_use_id: String,
        /// Tool name
        name: String,
        /// Fragment of the serialized input
        #[serde(default)]
        input: Option<String>,
        /// Set on the fragment that closes the call
        #[serde(default)]
        stop: Option<bool>,
    },
    /// Assistant text fragment
    AssistantText {
        /// Text content
        content: String,
    },
}
