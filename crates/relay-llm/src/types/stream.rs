use serde::{Deserialize, Serialize};

use super::response::{StopReason, Usage};

/// Unified streaming event
///
/// Events follow a strict order on every stream: `message_start`, then per
/// block `content_block_start` / deltas / `content_block_stop` with
/// monotonically increasing indices, then `message_delta`, then
/// `message_stop`. Transformers emit into this order regardless of how the
/// upstream dialect fragments its output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Stream opened, envelope metadata known
    MessageStart {
        /// Response envelope skeleton
        message: MessageStart,
    },
    /// A content block begins
    ContentBlockStart {
        /// Block index within the response
        index: usize,
        /// Initial block shape
        content_block: StartBlock,
    },
    /// Incremental content for an open block
    ContentBlockDelta {
        /// Block index the delta applies to
        index: usize,
        /// The incremental payload
        delta: BlockDelta,
    },
    /// A content block is complete
    ContentBlockStop {
        /// Block index being closed
        index: usize,
    },
    /// Terminal metadata for the message
    MessageDelta {
        /// Stop reason carrier
        delta: MessageDeltaBody,
        /// Final usage, when the upstream reports it
        #[serde(default, skip_serializing_if = "Option::is_none")]
        usage: Option<Usage>,
    },
    /// Stream is finished
    MessageStop,
}

impl StreamEvent {
    /// SSE event name for this variant
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::MessageStart { .. } => "message_start",
            Self::ContentBlockStart { .. } => "content_block_start",
            Self::ContentBlockDelta { .. } => "content_block_delta",
            Self::ContentBlockStop { .. } => "content_block_stop",
            Self::MessageDelta { .. } => "message_delta",
            Self::MessageStop => "message_stop",
        }
    }
}

/// Envelope skeleton carried by `message_start`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageStart {
    /// Response identifier
    pub id: String,
    /// Object type (always "message")
    #[serde(rename = "type")]
    pub message_type: String,
    /// Role (always "assistant")
    pub role: String,
    /// Model producing the stream
    pub model: String,
    /// Content is always empty at stream start
    pub content: Vec<serde_json::Value>,
    /// Usage known so far (input side)
    pub usage: Usage,
}

impl MessageStart {
    /// Standard envelope for a new stream
    pub fn new(id: String, model: String, usage: Usage) -> Self {
        Self {
            id,
            message_type: "message".to_owned(),
            role: "assistant".to_owned(),
            model,
            content: Vec::new(),
            usage,
        }
    }
}

/// Initial shape of a content block in `content_block_start`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StartBlock {
    /// Text block, opens empty
    Text {
        /// Always empty at start
        text: String,
    },
    /// Tool use block; id and name are known at start, input streams after
    ToolUse {
        /// Tool use identifier
        id: String,
        /// Tool name
        name: String,
        /// Always an empty object at start
        input: serde_json::Value,
    },
}

/// Incremental payload in `content_block_delta`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlockDelta {
    /// Text fragment
    TextDelta {
        /// The fragment
        text: String,
    },
    /// Fragment of a tool input's JSON serialization
    InputJsonDelta {
        /// The fragment; concatenation over the block yields valid JSON
        partial_json: String,
    },
}

/// Body of a `message_delta` event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageDeltaBody {
    /// Final stop reason
    pub stop_reason: Option<StopReason>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_names_match_wire_tags() {
        let event = StreamEvent::ContentBlockDelta {
            index: 0,
            delta: BlockDelta::TextDelta { text: "hi".to_owned() },
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], event.event_name());
        assert_eq!(json["delta"]["type"], "text_delta");
    }

    #[test]
    fn message_delta_accepts_output_only_usage() {
        // upstream message_delta events omit input_tokens entirely
        let wire = r#"{"type":"message_delta","delta":{"stop_reason":"end_turn","stop_sequence":null},"usage":{"output_tokens":15}}"#;
        let event: StreamEvent = serde_json::from_str(wire).unwrap();
        let StreamEvent::MessageDelta { delta, usage } = event else {
            panic!("expected message delta");
        };
        assert_eq!(delta.stop_reason, Some(StopReason::EndTurn));
        assert_eq!(usage, Some(Usage { input_tokens: 0, output_tokens: 15 }));
    }

    #[test]
    fn message_stop_serializes_bare() {
        let json = serde_json::to_value(StreamEvent::MessageStop).unwrap();
        assert_eq!(json, serde_json::json!({"type": "message_stop"}));
    }
}
