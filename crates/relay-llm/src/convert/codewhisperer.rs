//! Encoding of unified requests into the CodeWhisperer-style wire format
//!
//! The decode direction lives in [`crate::reconstruct`]: responses from
//! this family arrive as one buffered payload and go through full-response
//! reconstruction rather than a chunk-by-chunk decoder.

use uuid::Uuid;

use crate::error::GatewayError;
use crate::protocol::codewhisperer::{
    CwAssistantResponseMessage, CwConversationState, CwCurrentMessage, CwHistoryEntry,
    CwInputSchema, CwRequest, CwTool, CwToolResult, CwToolResultContent, CwToolSpecification,
    CwToolUse, CwUserInputMessage, CwUserInputMessageContext,
};
use crate::types::{ChatRequest, ContentBlock, Message, Role};

const CHAT_TRIGGER_MANUAL: &str = "MANUAL";
const ORIGIN: &str = "AI_EDITOR";

/// Encode a unified request into a conversation-state envelope
///
/// The final message must be a user turn; it becomes `currentMessage` and
/// everything before it becomes `history`. The message context is always
/// serialized, even with no tools and no tool results.
///
/// # Errors
///
/// Returns `InvalidRequest` when the conversation does not end with a user
/// turn, and `UnsupportedContent` for blocks the dialect cannot express.
pub fn encode_request(
    request: &ChatRequest,
    profile_arn: Option<&str>,
) -> Result<CwRequest, GatewayError> {
    let Some((current, prior)) = request.messages.split_last() else {
        return Err(GatewayError::InvalidRequest("messages must not be empty".to_owned()));
    };
    if current.role != Role::User {
        return Err(GatewayError::InvalidRequest(
            "conversation must end with a user message".to_owned(),
        ));
    }

    let mut history = Vec::with_capacity(prior.len());
    for message in prior {
        history.push(encode_history_entry(message, &request.model)?);
    }

    let tools = request
        .tools
        .as_ref()
        .map(|tools| {
            tools
                .iter()
                .map(|t| CwTool {
                    tool_specification: CwToolSpecification {
                        name: t.name.clone(),
                        description: t.description.clone(),
                        input_schema: CwInputSchema { json: t.input_schema.clone() },
                    },
                })
                .collect()
        })
        .unwrap_or_default();

    let mut content = current.content.as_text();
    if let Some(system) = &request.system {
        content = if content.is_empty() {
            system.clone()
        } else {
            format!("{system}\n\n{content}")
        };
    }

    let tool_results = current
        .content
        .to_blocks()
        .into_iter()
        .filter_map(|block| match block {
            ContentBlock::ToolResult { tool_use_id, content } => Some(CwToolResult {
                tool_use_id,
                content: vec![CwToolResultContent { text: content.unwrap_or_default() }],
                status: "success".to_owned(),
            }),
            _ => None,
        })
        .collect();

    Ok(CwRequest {
        conversation_state: CwConversationState {
            chat_trigger_type: CHAT_TRIGGER_MANUAL.to_owned(),
            conversation_id: Uuid::new_v4().to_string(),
            current_message: CwCurrentMessage {
                user_input_message: CwUserInputMessage {
                    content,
                    model_id: request.model.clone(),
                    origin: ORIGIN.to_owned(),
                    user_input_message_context: CwUserInputMessageContext { tools, tool_results },
                },
            },
            history,
        },
        profile_arn: profile_arn.map(str::to_owned),
    })
}

fn encode_history_entry(message: &Message, model: &str) -> Result<CwHistoryEntry, GatewayError> {
    match message.role {
        Role::User | Role::System => Ok(CwHistoryEntry {
            user_input_message: Some(CwUserInputMessage {
                content: message.content.as_text(),
                model_id: model.to_owned(),
                origin: ORIGIN.to_owned(),
                user_input_message_context: CwUserInputMessageContext::default(),
            }),
            assistant_response_message: None,
        }),
        Role::Assistant => {
            let mut tool_uses = Vec::new();
            for block in message.content.to_blocks() {
                match block {
                    ContentBlock::Text { .. } => {}
                    ContentBlock::ToolUse { id, name, input } => {
                        tool_uses.push(CwToolUse { tool_use_id: id, name, input });
                    }
                    ContentBlock::ToolResult { .. } => {
                        return Err(GatewayError::UnsupportedContent(
                            "tool_result block in assistant message".to_owned(),
                        ));
                    }
                }
            }
            Ok(CwHistoryEntry {
                user_input_message: None,
                assistant_response_message: Some(CwAssistantResponseMessage {
                    content: message.content.as_text(),
                    tool_uses: if tool_uses.is_empty() { None } else { Some(tool_uses) },
                }),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RequestMetadata, ToolDefinition};

    fn request() -> ChatRequest {
        ChatRequest {
            model: "cw-model".to_owned(),
            max_tokens: 256,
            system: Some("be brief".to_owned()),
            messages: vec![
                Message::text(Role::User, "weather in Beijing?"),
                Message::blocks(
                    Role::Assistant,
                    vec![
                        ContentBlock::Text { text: "Checking.".to_owned() },
                        ContentBlock::ToolUse {
                            id: "toolu_1".to_owned(),
                            name: "get_weather".to_owned(),
                            input: serde_json::json!({"city": "Beijing"}),
                        },
                    ],
                ),
                Message::blocks(
                    Role::User,
                    vec![ContentBlock::ToolResult {
                        tool_use_id: "toolu_1".to_owned(),
                        content: Some("sunny".to_owned()),
                    }],
                ),
            ],
            tools: Some(vec![ToolDefinition {
                name: "get_weather".to_owned(),
                description: None,
                input_schema: serde_json::json!({"type": "object"}),
            }]),
            stream: true,
            thinking: None,
            metadata: RequestMetadata::default(),
        }
    }

    #[test]
    fn current_message_and_history_split_correctly() {
        let wire = encode_request(&request(), Some("arn:profile")).unwrap();
        let state = &wire.conversation_state;

        assert_eq!(state.chat_trigger_type, "MANUAL");
        assert_eq!(state.history.len(), 2);
        assert!(state.history[0].user_input_message.is_some());
        let assistant = state.history[1].assistant_response_message.as_ref().unwrap();
        assert_eq!(assistant.content, "Checking.");
        assert_eq!(assistant.tool_uses.as_ref().unwrap()[0].name, "get_weather");

        let current = &state.current_message.user_input_message;
        assert_eq!(current.model_id, "cw-model");
        assert_eq!(current.user_input_message_context.tool_results[0].tool_use_id, "toolu_1");
        assert_eq!(wire.profile_arn.as_deref(), Some("arn:profile"));
    }

    #[test]
    fn encoded_request_maps_back_to_the_unified_conversation() {
        let original = request();
        let wire = encode_request(&original, None).unwrap();
        let state = &wire.conversation_state;

        let first = state.history[0].user_input_message.as_ref().unwrap();
        assert_eq!(first.content, original.messages[0].content.as_text());

        let second = state.history[1].assistant_response_message.as_ref().unwrap();
        assert_eq!(second.content, "Checking.");
        let tool_use = &second.tool_uses.as_ref().unwrap()[0];
        assert_eq!(
            ContentBlock::ToolUse {
                id: tool_use.tool_use_id.clone(),
                name: tool_use.name.clone(),
                input: tool_use.input.clone(),
            },
            original.messages[1].content.to_blocks()[1]
        );

        // the current turn carries the system prefix and the tool results
        let current = &state.current_message.user_input_message;
        assert_eq!(current.content, "be brief");
        let result = &current.user_input_message_context.tool_results[0];
        assert_eq!(
            ContentBlock::ToolResult {
                tool_use_id: result.tool_use_id.clone(),
                content: Some(result.content[0].text.clone()),
            },
            original.messages[2].content.to_blocks()[0]
        );

        let spec = &current.user_input_message_context.tools[0].tool_specification;
        let original_tool = &original.tools.as_ref().unwrap()[0];
        assert_eq!(spec.name, original_tool.name);
        assert_eq!(spec.input_schema.json, original_tool.input_schema);
    }

    #[test]
    fn context_is_present_even_when_empty() {
        let req = ChatRequest {
            model: "cw-model".to_owned(),
            max_tokens: 16,
            system: None,
            messages: vec![Message::text(Role::User, "hi")],
            tools: None,
            stream: false,
            thinking: None,
            metadata: RequestMetadata::default(),
        };
        let wire = encode_request(&req, None).unwrap();
        let json = serde_json::to_value(&wire).unwrap();
        let context = &json["conversationState"]["currentMessage"]["userInputMessage"]
            ["userInputMessageContext"];
        assert_eq!(context["tools"], serde_json::json!([]));
        assert_eq!(context["toolResults"], serde_json::json!([]));
    }

    #[test]
    fn conversation_must_end_with_user_turn() {
        let mut req = request();
        req.messages.pop();
        assert!(matches!(
            encode_request(&req, None),
            Err(GatewayError::InvalidRequest(_))
        ));
    }
}
