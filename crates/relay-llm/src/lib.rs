//! Core routing-and-translation pipeline for the relay gateway
//!
//! Accepts chat requests in one unified (Anthropic-messages-shaped)
//! dialect and forwards them to backend providers with distinct wire
//! protocols: category-based routing, per-instance health tracking with
//! round-robin balancing, bidirectional protocol transformation, and
//! buffered stream reconstruction for the provider family that fragments
//! tool calls across chunks.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

pub mod balance;
pub mod convert;
pub mod error;
pub mod protocol;
pub mod provider;
pub mod reconstruct;
pub mod registry;
pub mod route;
pub mod router;
pub mod state;
pub mod types;

pub use error::{FailureKind, GatewayError};
pub use registry::{HealthRegistry, InstanceCounters, InstanceState};
pub use route::{RouteCategory, RouteDecision, RouteTable};
pub use router::gateway_router;
pub use state::GatewayState;
pub use types::{ChatRequest, ChatResponse, ContentBlock, Message, StopReason, StreamEvent};
