//! Buffered response reconstruction
//!
//! The CodeWhisperer family can split one logical tool invocation across
//! arbitrarily many transport chunks, sometimes as plain embedded text
//! (`Tool call: Name({...})`) rather than a structured event. Interpreting
//! chunks incrementally risks false positives, so nothing is interpreted
//! until the entire raw response has been received: accumulate, extract
//! frames, de-fragment tool calls, then re-emit as a compliant unified
//! stream. Full-response latency is the accepted cost of exact tool-call
//! fidelity.

use std::sync::LazyLock;

use regex::Regex;

use crate::convert::synthesize_message_id;
use crate::protocol::codewhisperer::CwEvent;
use crate::types::{ChatResponse, ContentBlock, StopReason, Usage};

static TOOL_CALL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Tool call:\s*(\w+)\s*\(").unwrap_or_else(|e| panic!("invalid pattern: {e}"))
});

/// Request-scoped buffer for one in-flight upstream response
#[derive(Debug, Default)]
pub struct ResponseBuffer {
    raw: Vec<u8>,
}

impl ResponseBuffer {
    /// Create an empty buffer
    pub const fn new() -> Self {
        Self { raw: Vec::new() }
    }

    /// Append one transport chunk
    pub fn push(&mut self, chunk: &[u8]) {
        self.raw.extend_from_slice(chunk);
    }

    /// Reconstruct the buffered payload into a unified response
    ///
    /// Frames are extracted by brace matching over the raw body, since the
    /// upstream interleaves JSON objects with binary framing the gateway
    /// does not otherwise need. Text fragments are concatenated and scanned
    /// for embedded tool-call syntax; structured tool fragments are
    /// re-assembled by id.
    pub fn into_response(self, model: &str) -> ChatResponse {
        let body = String::from_utf8_lossy(&self.raw).into_owned();
        let fragments = collect_fragments(&extract_frames(&body));
        let content = reconstruct_blocks(fragments);

        let has_tool_use = content.iter().any(|b| matches!(b, ContentBlock::ToolUse { .. }));
        // a tool call never ends the turn, whatever the upstream signalled
        let stop_reason = if has_tool_use { StopReason::ToolUse } else { StopReason::EndTurn };

        let output_bytes: usize = content
            .iter()
            .map(|b| match b {
                ContentBlock::Text { text } => text.len(),
                ContentBlock::ToolUse { input, .. } => input.to_string().len(),
                ContentBlock::ToolResult { .. } => 0,
            })
            .sum();

        ChatResponse::new(
            synthesize_message_id(),
            model.to_owned(),
            content,
            Some(stop_reason),
            Usage {
                input_tokens: 0,
                // the upstream reports no usage; rough bytes-per-token estimate
                output_tokens: u32::try_from(output_bytes / 4).unwrap_or(u32::MAX),
            },
        )
    }
}

/// An ordered piece of the upstream response before block assembly
#[derive(Debug, PartialEq)]
enum Fragment {
    Text(String),
    Tool {
        id: String,
        name: String,
        input: serde_json::Value,
    },
}

/// Extract brace-balanced JSON objects from the raw body
///
/// The scan is string- and escape-aware, so braces inside JSON string
/// values do not truncate a frame. Byte runs that do not parse as JSON are
/// skipped; they are upstream framing, not content.
fn extract_frames(body: &str) -> Vec<CwEvent> {
    let mut frames = Vec::new();
    let bytes = body.as_bytes();
    let mut pos = 0;

    while let Some(offset) = body[pos..].find('{') {
        let start = pos + offset;
        match balanced_end(bytes, start) {
            Some(end) => {
                let candidate = &body[start..end];
                if let Ok(event) = serde_json::from_str::<CwEvent>(candidate) {
                    frames.push(event);
                    pos = end;
                } else {
                    pos = start + 1;
                }
            }
            None => break,
        }
    }

    frames
}

/// Find the byte index just past the brace that balances `bytes[start]`
fn balanced_end(bytes: &[u8], start: usize) -> Option<usize> {
    let mut depth = 0_usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

/// Fold frames into ordered fragments, re-assembling split tool calls
///
/// Structured tool fragments for one call share a `toolUseId`; their input
/// pieces concatenate into one serialized JSON value, closed by the
/// fragment carrying `stop`. Text frames between an open tool call's
/// fragments keep their position relative to the call.
fn collect_fragments(frames: &[CwEvent]) -> Vec<Fragment> {
    let mut fragments: Vec<Fragment> = Vec::new();
    let mut open_tool: Option<(String, String, String)> = None;

    let mut push_text = |fragments: &mut Vec<Fragment>, text: &str| {
        if text.is_empty() {
            return;
        }
        if let Some(Fragment::Text(existing)) = fragments.last_mut() {
            existing.push_str(text);
        } else {
            fragments.push(Fragment::Text(text.to_owned()));
        }
    };

    for frame in frames {
        match frame {
            CwEvent::AssistantText { content } => push_text(&mut fragments, content),
            CwEvent::ToolUseFragment { tool_use_id, name, input, stop } => {
                let (id, tool_name, buffer) = open_tool.get_or_insert_with(|| {
                    (tool_use_id.clone(), name.clone(), String::new())
                });
                // a new id closes the previous call implicitly
                if *id != *tool_use_id {
                    let (done_id, done_name, done_buffer) =
                        (id.clone(), tool_name.clone(), std::mem::take(buffer));
                    fragments.push(finish_tool(done_id, done_name, &done_buffer));
                    open_tool = Some((tool_use_id.clone(), name.clone(), String::new()));
                }
                if let Some((_, _, buffer)) = open_tool.as_mut() {
                    if let Some(piece) = input {
                        buffer.push_str(piece);
                    }
                }
                if stop.unwrap_or(false)
                    && let Some((id, name, buffer)) = open_tool.take()
                {
                    fragments.push(finish_tool(id, name, &buffer));
                }
            }
        }
    }

    if let Some((id, name, buffer)) = open_tool.take() {
        fragments.push(finish_tool(id, name, &buffer));
    }

    fragments
}

fn finish_tool(id: String, name: String, buffer: &str) -> Fragment {
    let input = if buffer.is_empty() {
        serde_json::json!({})
    } else {
        serde_json::from_str(buffer).unwrap_or_else(|_| serde_json::json!({}))
    };
    Fragment::Tool { id, name, input }
}

/// Turn ordered fragments into content blocks, converting embedded
/// tool-call text into structured blocks
fn reconstruct_blocks(fragments: Vec<Fragment>) -> Vec<ContentBlock> {
    let mut blocks = Vec::new();

    for fragment in fragments {
        match fragment {
            Fragment::Text(text) => scan_embedded_tool_calls(&text, &mut blocks),
            Fragment::Tool { id, name, input } => {
                blocks.push(ContentBlock::ToolUse { id, name, input });
            }
        }
    }

    blocks
}

/// Scan text for `Tool call: Name({...})` spans
///
/// Each well-formed span becomes a `ToolUse` block; surrounding narrative
/// stays as separate `Text` blocks. A span whose arguments fail to parse
/// as JSON is left verbatim; garbled syntax is expected upstream noise,
/// not an error.
fn scan_embedded_tool_calls(text: &str, blocks: &mut Vec<ContentBlock>) {
    let mut cursor = 0;
    let mut plain = String::new();

    while let Some(found) = TOOL_CALL_PATTERN.captures(&text[cursor..]) {
        let whole = found.get(0).unwrap_or_else(|| unreachable!());
        let match_start = cursor + whole.start();
        let args_start = cursor + whole.end();

        match parse_call_arguments(&text[args_start..]) {
            Some((input, consumed)) => {
                plain.push_str(&text[cursor..match_start]);
                if !plain.is_empty() {
                    blocks.push(ContentBlock::Text { text: std::mem::take(&mut plain) });
                }
                blocks.push(ContentBlock::ToolUse {
                    id: crate::convert::synthesize_tool_id(),
                    name: found[1].to_owned(),
                    input,
                });
                cursor = args_start + consumed;
            }
            None => {
                // leave the span untouched and keep scanning after it
                plain.push_str(&text[cursor..args_start]);
                cursor = args_start;
            }
        }
    }

    plain.push_str(&text[cursor..]);
    if !plain.is_empty() {
        blocks.push(ContentBlock::Text { text: plain });
    }
}

/// Parse `{json}` followed by `)` at the head of `rest`
///
/// Returns the parsed arguments and how many bytes were consumed, or
/// `None` when the span is not a well-formed call.
fn parse_call_arguments(rest: &str) -> Option<(serde_json::Value, usize)> {
    let trimmed_offset = rest.len() - rest.trim_start().len();
    let bytes = rest.as_bytes();
    if bytes.get(trimmed_offset) != Some(&b'{') {
        return None;
    }

    let end = balanced_end(bytes, trimmed_offset)?;
    let input: serde_json::Value = serde_json::from_str(&rest[trimmed_offset..end]).ok()?;

    let after = rest[end..].trim_start();
    if !after.starts_with(')') {
        return None;
    }
    let close = end + (rest.len() - end - after.len()) + 1;

    Some((input, close))
}
