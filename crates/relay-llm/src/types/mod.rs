//! Unified dialect types shared by every transformer
//!
//! The unified dialect is Anthropic-messages-shaped: these types are both
//! the gateway's wire format toward callers and the normalized internal
//! representation all provider dialects convert to and from.

pub mod message;
pub mod request;
pub mod response;
pub mod stream;
pub mod tool;

pub use message::{ContentBlock, Message, MessageContent, Role};
pub use request::{ChatRequest, RequestMetadata, ThinkingConfig};
pub use response::{ChatResponse, StopReason, Usage};
pub use stream::{BlockDelta, MessageDeltaBody, MessageStart, StartBlock, StreamEvent};
pub use tool::ToolDefinition;
