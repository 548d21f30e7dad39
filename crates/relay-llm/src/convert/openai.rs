//! Conversion between the unified dialect and the `OpenAI` wire format

use crate::error::GatewayError;
use crate::protocol::openai::{
    OpenAiFunction, OpenAiFunctionCall, OpenAiMessage, OpenAiRequest, OpenAiResponse,
    OpenAiStreamChunk, OpenAiTool, OpenAiToolCall, OpenAiUsage,
};
use crate::types::{
    BlockDelta, ChatRequest, ChatResponse, ContentBlock, Message, MessageDeltaBody, MessageStart,
    Role, StartBlock, StopReason, StreamEvent, Usage,
};

use super::{synthesize_message_id, synthesize_tool_id};

// -- Outbound: unified request -> OpenAI wire request --

/// Encode a unified request for an `OpenAI`-compatible endpoint
///
/// # Errors
///
/// Returns `UnsupportedContent` for block/role combinations the dialect
/// cannot express.
pub fn encode_request(request: &ChatRequest) -> Result<OpenAiRequest, GatewayError> {
    let mut messages = Vec::with_capacity(request.messages.len() + 1);

    if let Some(system) = &request.system {
        messages.push(OpenAiMessage {
            role: "system".to_owned(),
            content: Some(system.clone()),
            tool_calls: None,
            tool_call_id: None,
        });
    }

    for message in &request.messages {
        encode_message(message, &mut messages)?;
    }

    let tools = request.tools.as_ref().map(|tools| {
        tools
            .iter()
            .map(|t| OpenAiTool {
                tool_type: "function".to_owned(),
                function: OpenAiFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: Some(t.input_schema.clone()),
                },
            })
            .collect()
    });

    Ok(OpenAiRequest {
        model: request.model.clone(),
        messages,
        max_tokens: Some(request.max_tokens),
        stream: if request.stream { Some(true) } else { None },
        tools,
    })
}

fn encode_message(message: &Message, out: &mut Vec<OpenAiMessage>) -> Result<(), GatewayError> {
    let role = match message.role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    };

    let blocks = message.content.to_blocks();
    let mut text = String::new();
    let mut tool_calls = Vec::new();

    for block in &blocks {
        match block {
            ContentBlock::Text { text: t } => text.push_str(t),
            ContentBlock::ToolUse { id, name, input } => {
                if message.role != Role::Assistant {
                    return Err(GatewayError::UnsupportedContent(format!(
                        "{} block in {role} message",
                        block.kind()
                    )));
                }
                tool_calls.push(OpenAiToolCall {
                    id: Some(id.clone()),
                    tool_type: "function".to_owned(),
                    function: OpenAiFunctionCall {
                        name: name.clone(),
                        arguments: input.to_string(),
                    },
                });
            }
            ContentBlock::ToolResult { tool_use_id, content } => {
                if message.role != Role::User {
                    return Err(GatewayError::UnsupportedContent(format!(
                        "{} block in {role} message",
                        block.kind()
                    )));
                }
                // tool results become dedicated `tool` role messages
                out.push(OpenAiMessage {
                    role: "tool".to_owned(),
                    content: Some(content.clone().unwrap_or_default()),
                    tool_calls: None,
                    tool_call_id: Some(tool_use_id.clone()),
                });
            }
        }
    }

    if !text.is_empty() || !tool_calls.is_empty() {
        out.push(OpenAiMessage {
            role: role.to_owned(),
            content: if text.is_empty() { None } else { Some(text) },
            tool_calls: if tool_calls.is_empty() { None } else { Some(tool_calls) },
            tool_call_id: None,
        });
    }

    Ok(())
}

// -- Inbound: OpenAI wire response -> unified response --

/// Decode a terminal `OpenAI` response
///
/// # Errors
///
/// Returns `MalformedResponse` when the response has no choices or a tool
/// call's arguments are not valid JSON.
pub fn decode_response(response: OpenAiResponse) -> Result<ChatResponse, GatewayError> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| GatewayError::MalformedResponse("response has no choices".to_owned()))?;

    let mut content = Vec::new();
    if let Some(text) = choice.message.content
        && !text.is_empty()
    {
        content.push(ContentBlock::Text { text });
    }
    if let Some(calls) = choice.message.tool_calls {
        for call in calls {
            content.push(decode_tool_call(call)?);
        }
    }

    let stop_reason = match choice.finish_reason.as_deref() {
        Some("stop") => Some(StopReason::EndTurn),
        Some("length") => Some(StopReason::MaxTokens),
        Some("tool_calls") => Some(StopReason::ToolUse),
        _ => None,
    };

    Ok(ChatResponse::new(
        response.id,
        response.model,
        content,
        stop_reason,
        response.usage.map_or_else(Usage::default, usage_from_wire),
    ))
}

fn decode_tool_call(call: OpenAiToolCall) -> Result<ContentBlock, GatewayError> {
    let input: serde_json::Value = serde_json::from_str(&call.function.arguments)
        .map_err(|e| GatewayError::MalformedResponse(format!("invalid tool call arguments: {e}")))?;
    Ok(ContentBlock::ToolUse {
        id: call.id.unwrap_or_else(synthesize_tool_id),
        name: call.function.name,
        input,
    })
}

const fn usage_from_wire(usage: OpenAiUsage) -> Usage {
    Usage {
        input_tokens: usage.prompt_tokens,
        output_tokens: usage.completion_tokens,
    }
}

// -- Streaming --

enum OpenBlock {
    Text,
    ToolUse,
}

/// Stateful assembler turning `OpenAI` stream chunks into unified events
///
/// Tracks the currently open content block; a chunk switching between text
/// and tool-call content closes the open block before starting the next,
/// so indices stay monotonic and start/stop pairs nest.
pub struct OpenAiStreamState {
    started: bool,
    model: String,
    next_index: usize,
    open: Option<OpenBlock>,
    stop_reason: Option<StopReason>,
    usage: Option<Usage>,
}

impl OpenAiStreamState {
    /// Create an assembler for one request's stream
    pub const fn new(model: String) -> Self {
        Self {
            started: false,
            model,
            next_index: 0,
            open: None,
            stop_reason: None,
            usage: None,
        }
    }

    /// Consume one upstream chunk, yielding zero or more unified events
    pub fn on_chunk(&mut self, chunk: OpenAiStreamChunk) -> Vec<StreamEvent> {
        let mut events = Vec::new();

        if !self.started {
            self.started = true;
            let id = if chunk.id.is_empty() { synthesize_message_id() } else { chunk.id.clone() };
            events.push(StreamEvent::MessageStart {
                message: MessageStart::new(id, self.model.clone(), Usage::default()),
            });
        }

        if let Some(usage) = chunk.usage {
            self.usage = Some(usage_from_wire(usage));
        }

        let Some(choice) = chunk.choices.into_iter().next() else {
            return events;
        };

        if let Some(calls) = choice.delta.tool_calls {
            for call in calls {
                let opens_new_call = call.function.as_ref().is_some_and(|f| f.name.is_some());
                if opens_new_call {
                    self.close_open(&mut events);
                    let function = call.function.as_ref();
                    events.push(StreamEvent::ContentBlockStart {
                        index: self.next_index,
                        content_block: StartBlock::ToolUse {
                            id: call.id.clone().unwrap_or_else(synthesize_tool_id),
                            name: function
                                .and_then(|f| f.name.clone())
                                .unwrap_or_default(),
                            input: serde_json::json!({}),
                        },
                    });
                    self.open = Some(OpenBlock::ToolUse);
                }
                if let Some(arguments) = call.function.and_then(|f| f.arguments)
                    && !arguments.is_empty()
                    && self.open.is_some()
                {
                    events.push(StreamEvent::ContentBlockDelta {
                        index: self.next_index,
                        delta: BlockDelta::InputJsonDelta { partial_json: arguments },
                    });
                }
            }
        } else if let Some(text) = choice.delta.content {
            if !text.is_empty() {
                if !matches!(self.open, Some(OpenBlock::Text)) {
                    self.close_open(&mut events);
                    events.push(StreamEvent::ContentBlockStart {
                        index: self.next_index,
                        content_block: StartBlock::Text { text: String::new() },
                    });
                    self.open = Some(OpenBlock::Text);
                }
                events.push(StreamEvent::ContentBlockDelta {
                    index: self.next_index,
                    delta: BlockDelta::TextDelta { text },
                });
            }
        }

        if let Some(reason) = choice.finish_reason.as_deref() {
            self.stop_reason = match reason {
                "stop" => Some(StopReason::EndTurn),
                "length" => Some(StopReason::MaxTokens),
                "tool_calls" => Some(StopReason::ToolUse),
                _ => self.stop_reason,
            };
        }

        events
    }

    /// Close the stream, yielding the trailing events
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        self.close_open(&mut events);
        events.push(StreamEvent::MessageDelta {
            delta: MessageDeltaBody { stop_reason: self.stop_reason },
            usage: self.usage.take(),
        });
        events.push(StreamEvent::MessageStop);
        events
    }

    fn close_open(&mut self, events: &mut Vec<StreamEvent>) {
        if self.open.take().is_some() {
            events.push(StreamEvent::ContentBlockStop { index: self.next_index });
            self.next_index += 1;
        }
    }
}
