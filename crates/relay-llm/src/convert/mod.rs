//! Conversion between the unified dialect and provider wire formats
//!
//! Each dialect module owns encode (unified request to wire request) and
//! decode (wire response or stream chunk to unified response or events).
//! Decoders never substitute defaults for required upstream fields; a
//! missing field is a `MalformedResponse`.

pub mod codewhisperer;
pub mod gemini;
pub mod openai;

use uuid::Uuid;

use crate::types::{
    BlockDelta, ChatResponse, ContentBlock, MessageDeltaBody, MessageStart, StartBlock, StreamEvent,
    Usage,
};

/// Synthesize a tool use id for upstreams that omit one
pub(crate) fn synthesize_tool_id() -> String {
    format!("toolu_{}", Uuid::new_v4().simple())
}

/// Synthesize a response id for upstreams that omit one
pub(crate) fn synthesize_message_id() -> String {
    format!("msg_{}", Uuid::new_v4().simple())
}

/// Re-emit a terminal response as a compliant event stream
///
/// Used when the caller asked for streaming but the upstream path only
/// yields a buffered response. Event order matches what a native stream
/// would produce: one start, per-block start/delta/stop, message delta,
/// one stop.
pub fn replay_as_stream(response: &ChatResponse) -> Vec<StreamEvent> {
    let mut events = Vec::with_capacity(response.content.len() * 3 + 3);

    events.push(StreamEvent::MessageStart {
        message: MessageStart::new(
            response.id.clone(),
            response.model.clone(),
            Usage {
                input_tokens: response.usage.input_tokens,
                output_tokens: 0,
            },
        ),
    });

    for (index, block) in response.content.iter().enumerate() {
        match block {
            ContentBlock::Text { text } => {
                events.push(StreamEvent::ContentBlockStart {
                    index,
                    content_block: StartBlock::Text { text: String::new() },
                });
                events.push(StreamEvent::ContentBlockDelta {
                    index,
                    delta: BlockDelta::TextDelta { text: text.clone() },
                });
            }
            ContentBlock::ToolUse { id, name, input } => {
                events.push(StreamEvent::ContentBlockStart {
                    index,
                    content_block: StartBlock::ToolUse {
                        id: id.clone(),
                        name: name.clone(),
                        input: serde_json::json!({}),
                    },
                });
                events.push(StreamEvent::ContentBlockDelta {
                    index,
                    delta: BlockDelta::InputJsonDelta {
                        partial_json: input.to_string(),
                    },
                });
            }
            // tool results never appear in an assistant response
            ContentBlock::ToolResult { .. } => continue,
        }
        events.push(StreamEvent::ContentBlockStop { index });
    }

    events.push(StreamEvent::MessageDelta {
        delta: MessageDeltaBody {
            stop_reason: response.stop_reason,
        },
        usage: Some(response.usage),
    });
    events.push(StreamEvent::MessageStop);

    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StopReason;

    #[test]
    fn replay_preserves_block_order_and_framing() {
        let response = ChatResponse::new(
            "msg_1".to_owned(),
            "m".to_owned(),
            vec![
                ContentBlock::Text { text: "Let me check.".to_owned() },
                ContentBlock::ToolUse {
                    id: "toolu_1".to_owned(),
                    name: "get_weather".to_owned(),
                    input: serde_json::json!({"city": "Beijing"}),
                },
            ],
            Some(StopReason::ToolUse),
            Usage { input_tokens: 10, output_tokens: 5 },
        );

        let events = replay_as_stream(&response);
        let names: Vec<&str> = events.iter().map(StreamEvent::event_name).collect();
        assert_eq!(
            names,
            [
                "message_start",
                "content_block_start",
                "content_block_delta",
                "content_block_stop",
                "content_block_start",
                "content_block_delta",
                "content_block_stop",
                "message_delta",
                "message_stop",
            ]
        );

        // the tool block's deltas concatenate to valid JSON
        let StreamEvent::ContentBlockDelta {
            delta: BlockDelta::InputJsonDelta { partial_json },
            ..
        } = &events[5]
        else {
            panic!("expected input json delta");
        };
        let parsed: serde_json::Value = serde_json::from_str(partial_json).unwrap();
        assert_eq!(parsed, serde_json::json!({"city": "Beijing"}));
    }

    #[test]
    fn synthesized_ids_are_unique() {
        assert_ne!(synthesize_tool_id(), synthesize_tool_id());
        assert!(synthesize_tool_id().starts_with("toolu_"));
    }
}
