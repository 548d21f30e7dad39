//! Shared primitives for the relay gateway
//!
//! Keeps domain errors and per-request context decoupled from the HTTP
//! layer so feature crates never depend on axum directly.

#![allow(clippy::must_use_candidate)]

mod context;
mod error;

pub use context::RequestContext;
pub use error::HttpError;
