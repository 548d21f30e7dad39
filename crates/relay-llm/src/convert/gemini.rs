//! Conversion between the unified dialect and the Gemini wire format
//!
//! Gemini has no system role: the system prompt is merged as a text prefix
//! into the first user turn. Tool schemas are cleaned before encoding
//! because the upstream rejects JSON Schema keywords it does not know.

use crate::error::GatewayError;
use crate::protocol::gemini::{
    GeminiContent, GeminiFunctionCall, GeminiFunctionDeclaration, GeminiFunctionResponse,
    GeminiGenerationConfig, GeminiPart, GeminiRequest, GeminiResponse, GeminiToolGroup, GeminiUsage,
};
use crate::types::{
    BlockDelta, ChatRequest, ChatResponse, ContentBlock, MessageDeltaBody, MessageStart, Role,
    StartBlock, StopReason, StreamEvent, Usage,
};

use super::{synthesize_message_id, synthesize_tool_id};

/// JSON Schema keywords the upstream rejects
const UNSUPPORTED_SCHEMA_KEYS: [&str; 5] =
    ["$schema", "additionalProperties", "minLength", "maxLength", "format"];

/// Recursively strip schema keywords Gemini rejects
///
/// Covers nested objects and array items. Idempotent: cleaning a cleaned
/// schema is a no-op.
pub fn clean_schema(schema: &serde_json::Value) -> serde_json::Value {
    match schema {
        serde_json::Value::Object(map) => serde_json::Value::Object(
            map.iter()
                .filter(|(key, _)| !UNSUPPORTED_SCHEMA_KEYS.contains(&key.as_str()))
                .map(|(key, value)| (key.clone(), clean_schema(value)))
                .collect(),
        ),
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(clean_schema).collect())
        }
        other => other.clone(),
    }
}

// -- Outbound: unified request -> Gemini wire request --

/// Encode a unified request for a Gemini endpoint
///
/// # Errors
///
/// Returns `UnsupportedContent` for block/role combinations the dialect
/// cannot express.
pub fn encode_request(request: &ChatRequest) -> Result<GeminiRequest, GatewayError> {
    let mut contents = Vec::with_capacity(request.messages.len());

    for message in &request.messages {
        let role = match message.role {
            Role::User | Role::System => "user",
            Role::Assistant => "model",
        };

        let mut parts = Vec::new();
        for block in message.content.to_blocks() {
            parts.push(encode_block(message.role, block)?);
        }
        if parts.is_empty() {
            continue;
        }
        contents.push(GeminiContent { role: role.to_owned(), parts });
    }

    if let Some(system) = &request.system {
        merge_system_prompt(&mut contents, system);
    }

    let tools = request.tools.as_ref().filter(|t| !t.is_empty()).map(|tools| {
        vec![GeminiToolGroup {
            function_declarations: tools
                .iter()
                .map(|t| GeminiFunctionDeclaration {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: Some(clean_schema(&t.input_schema)),
                })
                .collect(),
        }]
    });

    Ok(GeminiRequest {
        contents,
        tools,
        generation_config: Some(GeminiGenerationConfig {
            max_output_tokens: request.max_tokens,
        }),
    })
}

fn encode_block(role: Role, block: ContentBlock) -> Result<GeminiPart, GatewayError> {
    match block {
        ContentBlock::Text { text } => Ok(GeminiPart {
            text: Some(text),
            ..GeminiPart::default()
        }),
        ContentBlock::ToolUse { name, input, .. } => {
            if role != Role::Assistant {
                return Err(GatewayError::UnsupportedContent(
                    "tool_use block outside assistant message".to_owned(),
                ));
            }
            Ok(GeminiPart {
                function_call: Some(GeminiFunctionCall { name, args: input }),
                ..GeminiPart::default()
            })
        }
        ContentBlock::ToolResult { tool_use_id, content } => {
            if role != Role::User {
                return Err(GatewayError::UnsupportedContent(
                    "tool_result block outside user message".to_owned(),
                ));
            }
            // Gemini correlates results by function name, not id; the id
            // carries the name of the originating call for round trips
            // through the unified dialect, so fall back to it.
            Ok(GeminiPart {
                function_response: Some(GeminiFunctionResponse {
                    name: tool_use_id,
                    response: serde_json::json!({"result": content.unwrap_or_default()}),
                }),
                ..GeminiPart::default()
            })
        }
    }
}

/// Prefix the system prompt onto the first user turn's first text part
fn merge_system_prompt(contents: &mut Vec<GeminiContent>, system: &str) {
    if let Some(turn) = contents.iter_mut().find(|c| c.role == "user") {
        if let Some(part) = turn.parts.iter_mut().find(|p| p.text.is_some()) {
            let existing = part.text.take().unwrap_or_default();
            part.text = Some(format!("{system}\n\n{existing}"));
            return;
        }
        turn.parts.insert(
            0,
            GeminiPart {
                text: Some(system.to_owned()),
                ..GeminiPart::default()
            },
        );
        return;
    }
    contents.insert(
        0,
        GeminiContent {
            role: "user".to_owned(),
            parts: vec![GeminiPart {
                text: Some(system.to_owned()),
                ..GeminiPart::default()
            }],
        },
    );
}

// -- Inbound: Gemini wire response -> unified response --

/// Decode a terminal Gemini response
///
/// # Errors
///
/// Returns `MalformedResponse` when no candidate content is present.
pub fn decode_response(response: GeminiResponse, model: &str) -> Result<ChatResponse, GatewayError> {
    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| GatewayError::MalformedResponse("response has no candidates".to_owned()))?;

    let wire_content = candidate
        .content
        .ok_or_else(|| GatewayError::MalformedResponse("candidate has no content".to_owned()))?;

    let mut content = Vec::new();
    for part in wire_content.parts {
        if let Some(text) = part.text
            && !text.is_empty()
        {
            content.push(ContentBlock::Text { text });
        }
        if let Some(call) = part.function_call {
            content.push(ContentBlock::ToolUse {
                id: synthesize_tool_id(),
                name: call.name,
                input: call.args,
            });
        }
    }

    let has_tool_use = content.iter().any(|b| matches!(b, ContentBlock::ToolUse { .. }));
    let stop_reason = if has_tool_use {
        Some(StopReason::ToolUse)
    } else {
        match candidate.finish_reason.as_deref() {
            Some("STOP") => Some(StopReason::EndTurn),
            Some("MAX_TOKENS") => Some(StopReason::MaxTokens),
            _ => None,
        }
    };

    Ok(ChatResponse::new(
        synthesize_message_id(),
        model.to_owned(),
        content,
        stop_reason,
        response.usage_metadata.map_or_else(Usage::default, usage_from_wire),
    ))
}

const fn usage_from_wire(usage: GeminiUsage) -> Usage {
    Usage {
        input_tokens: usage.prompt_token_count,
        output_tokens: usage.candidates_token_count,
    }
}

// -- Streaming --

/// Stateful assembler turning Gemini stream chunks into unified events
///
/// Gemini streams whole parts per chunk: text fragments stay within one
/// open text block, while each `functionCall` part arrives complete and
/// becomes a self-contained tool block with a single input delta.
pub struct GeminiStreamState {
    started: bool,
    model: String,
    next_index: usize,
    text_open: bool,
    saw_tool_use: bool,
    finish_reason: Option<String>,
    usage: Option<Usage>,
}

impl GeminiStreamState {
    /// Create an assembler for one request's stream
    pub const fn new(model: String) -> Self {
        Self {
            started: false,
            model,
            next_index: 0,
            text_open: false,
            saw_tool_use: false,
            finish_reason: None,
            usage: None,
        }
    }

    /// Consume one upstream chunk, yielding zero or more unified events
    pub fn on_chunk(&mut self, chunk: GeminiResponse) -> Vec<StreamEvent> {
        let mut events = Vec::new();

        if !self.started {
            self.started = true;
            events.push(StreamEvent::MessageStart {
                message: MessageStart::new(
                    synthesize_message_id(),
                    self.model.clone(),
                    Usage::default(),
                ),
            });
        }

        if let Some(usage) = chunk.usage_metadata {
            self.usage = Some(usage_from_wire(usage));
        }

        let Some(candidate) = chunk.candidates.into_iter().next() else {
            return events;
        };
        if let Some(reason) = candidate.finish_reason {
            self.finish_reason = Some(reason);
        }
        let Some(content) = candidate.content else {
            return events;
        };

        for part in content.parts {
            if let Some(text) = part.text {
                if text.is_empty() {
                    continue;
                }
                if !self.text_open {
                    events.push(StreamEvent::ContentBlockStart {
                        index: self.next_index,
                        content_block: StartBlock::Text { text: String::new() },
                    });
                    self.text_open = true;
                }
                events.push(StreamEvent::ContentBlockDelta {
                    index: self.next_index,
                    delta: BlockDelta::TextDelta { text },
                });
            }
            if let Some(call) = part.function_call {
                self.close_text(&mut events);
                self.saw_tool_use = true;
                events.push(StreamEvent::ContentBlockStart {
                    index: self.next_index,
                    content_block: StartBlock::ToolUse {
                        id: synthesize_tool_id(),
                        name: call.name,
                        input: serde_json::json!({}),
                    },
                });
                events.push(StreamEvent::ContentBlockDelta {
                    index: self.next_index,
                    delta: BlockDelta::InputJsonDelta {
                        partial_json: call.args.to_string(),
                    },
                });
                events.push(StreamEvent::ContentBlockStop { index: self.next_index });
                self.next_index += 1;
            }
        }

        events
    }

    /// Close the stream, yielding the trailing events
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        self.close_text(&mut events);

        let stop_reason = if self.saw_tool_use {
            Some(StopReason::ToolUse)
        } else {
            match self.finish_reason.as_deref() {
                Some("STOP") => Some(StopReason::EndTurn),
                Some("MAX_TOKENS") => Some(StopReason::MaxTokens),
                _ => None,
            }
        };

        events.push(StreamEvent::MessageDelta {
            delta: MessageDeltaBody { stop_reason },
            usage: self.usage.take(),
        });
        events.push(StreamEvent::MessageStop);
        events
    }

    fn close_text(&mut self, events: &mut Vec<StreamEvent>) {
        if self.text_open {
            events.push(StreamEvent::ContentBlockStop { index: self.next_index });
            self.next_index += 1;
            self.text_open = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::gemini::GeminiCandidate;
    use crate::types::{Message, RequestMetadata, ToolDefinition};

    #[test]
    fn schema_cleaning_strips_recursively_and_is_idempotent() {
        let schema = serde_json::json!({
            "$schema": "http://json-schema.org/draft-07/schema#",
            "type": "object",
            "additionalProperties": false,
            "properties": {
                "city": {"type": "string", "minLength": 1, "format": "name"},
                "tags": {
                    "type": "array",
                    "items": {"type": "string", "maxLength": 32}
                }
            }
        });

        let cleaned = clean_schema(&schema);
        assert_eq!(
            cleaned,
            serde_json::json!({
                "type": "object",
                "properties": {
                    "city": {"type": "string"},
                    "tags": {"type": "array", "items": {"type": "string"}}
                }
            })
        );
        assert_eq!(clean_schema(&cleaned), cleaned);
    }

    #[test]
    fn system_prompt_merges_into_first_user_turn() {
        let req = ChatRequest {
            model: "gemini-x".to_owned(),
            max_tokens: 128,
            system: Some("be brief".to_owned()),
            messages: vec![
                Message::text(Role::Assistant, "earlier answer"),
                Message::text(Role::User, "hello"),
            ],
            tools: None,
            stream: false,
            thinking: None,
            metadata: RequestMetadata::default(),
        };

        let wire = encode_request(&req).unwrap();
        assert_eq!(wire.contents[0].role, "model");
        assert_eq!(wire.contents[1].role, "user");
        assert_eq!(wire.contents[1].parts[0].text.as_deref(), Some("be brief\n\nhello"));
    }

    #[test]
    fn tools_encode_as_cleaned_function_declarations() {
        let req = ChatRequest {
            model: "gemini-x".to_owned(),
            max_tokens: 128,
            system: None,
            messages: vec![Message::text(Role::User, "hi")],
            tools: Some(vec![ToolDefinition {
                name: "get_weather".to_owned(),
                description: Some("look up weather".to_owned()),
                input_schema: serde_json::json!({
                    "type": "object",
                    "additionalProperties": false
                }),
            }]),
            stream: false,
            thinking: None,
            metadata: RequestMetadata::default(),
        };

        let wire = encode_request(&req).unwrap();
        let decl = &wire.tools.unwrap()[0].function_declarations[0];
        assert_eq!(decl.name, "get_weather");
        assert_eq!(decl.parameters, Some(serde_json::json!({"type": "object"})));
    }

    #[test]
    fn encoded_request_maps_back_to_the_unified_conversation() {
        let original = ChatRequest {
            model: "gemini-x".to_owned(),
            max_tokens: 128,
            system: None,
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
                description: Some("look up weather".to_owned()),
                input_schema: serde_json::json!({"type": "object"}),
            }]),
            stream: false,
            thinking: None,
            metadata: RequestMetadata::default(),
        };

        let wire = encode_request(&original).unwrap();

        let roles: Vec<Role> = wire
            .contents
            .iter()
            .map(|c| if c.role == "model" { Role::Assistant } else { Role::User })
            .collect();
        assert_eq!(roles, [Role::User, Role::Assistant, Role::User]);

        assert_eq!(wire.contents[0].parts[0].text.as_deref(), Some("weather in Beijing?"));
        assert_eq!(wire.contents[1].parts[0].text.as_deref(), Some("Checking."));

        // the call keeps name and input; the id is not expressible in this
        // dialect and is re-synthesized on decode
        let call = wire.contents[1].parts[1].function_call.as_ref().unwrap();
        assert_eq!(call.name, "get_weather");
        assert_eq!(call.args, serde_json::json!({"city": "Beijing"}));

        let response = wire.contents[2].parts[0].function_response.as_ref().unwrap();
        assert_eq!(response.name, "toolu_1");
        assert_eq!(response.response["result"], "sunny");

        let decl = &wire.tools.unwrap()[0].function_declarations[0];
        let original_tool = &original.tools.as_ref().unwrap()[0];
        assert_eq!(decl.name, original_tool.name);
        assert_eq!(decl.description, original_tool.description);
        assert_eq!(decl.parameters.as_ref(), Some(&original_tool.input_schema));
    }

    #[test]
    fn decode_maps_function_call_to_tool_use() {
        let response = GeminiResponse {
            candidates: vec![GeminiCandidate {
                content: Some(GeminiContent {
                    role: "model".to_owned(),
                    parts: vec![
                        GeminiPart {
                            text: Some("Checking.".to_owned()),
                            ..GeminiPart::default()
                        },
                        GeminiPart {
                            function_call: Some(GeminiFunctionCall {
                                name: "get_weather".to_owned(),
                                args: serde_json::json!({"city": "Beijing"}),
                            }),
                            ..GeminiPart::default()
                        },
                    ],
                }),
                finish_reason: Some("STOP".to_owned()),
            }],
            usage_metadata: Some(GeminiUsage {
                prompt_token_count: 9,
                candidates_token_count: 4,
            }),
        };

        let unified = decode_response(response, "gemini-x").unwrap();
        assert_eq!(unified.content.len(), 2);
        // a tool call overrides the upstream finish reason
        assert_eq!(unified.stop_reason, Some(StopReason::ToolUse));
        assert_eq!(unified.usage, Usage { input_tokens: 9, output_tokens: 4 });
    }

    #[test]
    fn decode_rejects_missing_content() {
        let response = GeminiResponse {
            candidates: vec![GeminiCandidate { content: None, finish_reason: None }],
            usage_metadata: None,
        };
        assert!(matches!(
            decode_response(response, "gemini-x"),
            Err(GatewayError::MalformedResponse(_))
        ));
    }

    #[test]
    fn stream_emits_compliant_event_order() {
        let mut state = GeminiStreamState::new("gemini-x".to_owned());
        let mut events = Vec::new();

        events.extend(state.on_chunk(GeminiResponse {
            candidates: vec![GeminiCandidate {
                content: Some(GeminiContent {
                    role: "model".to_owned(),
                    parts: vec![GeminiPart {
                        text: Some("Let me check.".to_owned()),
                        ..GeminiPart::default()
                    }],
                }),
                finish_reason: None,
            }],
            usage_metadata: None,
        }));
        events.extend(state.on_chunk(GeminiResponse {
            candidates: vec![GeminiCandidate {
                content: Some(GeminiContent {
                    role: "model".to_owned(),
                    parts: vec![GeminiPart {
                        function_call: Some(GeminiFunctionCall {
                            name: "get_weather".to_owned(),
                            args: serde_json::json!({"city": "Beijing"}),
                        }),
                        ..GeminiPart::default()
                    }],
                }),
                finish_reason: Some("STOP".to_owned()),
            }],
            usage_metadata: Some(GeminiUsage {
                prompt_token_count: 9,
                candidates_token_count: 4,
            }),
        }));
        events.extend(state.finish());

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

        let StreamEvent::MessageDelta { delta, usage } = &events[7] else {
            panic!("expected message delta");
        };
        assert_eq!(delta.stop_reason, Some(StopReason::ToolUse));
        assert_eq!(*usage, Some(Usage { input_tokens: 9, output_tokens: 4 }));
    }
}
