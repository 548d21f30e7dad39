//! Provider backends
//!
//! One backend per configured provider instance. A backend owns its
//! transport client and credentials and speaks exactly one wire dialect;
//! everything upstream of it deals only in the unified types.

pub mod anthropic;
pub mod codewhisperer;
pub mod gemini;
pub mod openai;

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;
use relay_config::ProviderFamily;
use relay_core::RequestContext;

use crate::error::{FailureKind, GatewayError};
use crate::types::{ChatRequest, ChatResponse, StreamEvent};

/// Boxed unified event stream
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, GatewayError>> + Send>>;

/// One configured provider instance
#[async_trait]
pub trait Backend: Send + Sync {
    /// Configured instance id
    fn instance_id(&self) -> &str;

    /// Wire dialect this backend speaks
    fn family(&self) -> ProviderFamily;

    /// Perform a buffered completion
    async fn complete(
        &self,
        request: &ChatRequest,
        context: &RequestContext,
    ) -> Result<ChatResponse, GatewayError>;

    /// Perform a streaming completion
    async fn complete_stream(
        &self,
        request: &ChatRequest,
        context: &RequestContext,
    ) -> Result<EventStream, GatewayError>;
}

/// Resolve a model name through an instance's alias map
pub(crate) fn resolve_model<'a>(
    aliases: &'a std::collections::HashMap<String, String>,
    model: &'a str,
) -> &'a str {
    aliases.get(model).map_or(model, String::as_str)
}

/// Classify a transport-level reqwest error
pub(crate) fn classify_transport_error(error: &reqwest::Error) -> FailureKind {
    if error.is_timeout() {
        FailureKind::Timeout
    } else {
        FailureKind::Network
    }
}

/// Turn a non-success upstream status into a classified provider error
pub(crate) async fn status_error(response: reqwest::Response) -> GatewayError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    GatewayError::provider(
        FailureKind::from_status(status),
        format!("upstream returned {status}: {body}"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn alias_map_falls_through_to_requested_model() {
        let mut aliases = HashMap::new();
        aliases.insert("m-large".to_owned(), "vendor/large-v2".to_owned());

        assert_eq!(resolve_model(&aliases, "m-large"), "vendor/large-v2");
        assert_eq!(resolve_model(&aliases, "m-other"), "m-other");
    }
}
