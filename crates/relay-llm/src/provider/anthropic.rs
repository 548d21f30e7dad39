//! Anthropic backend
//!
//! The unified dialect is this family's wire dialect, so there is no
//! conversion layer: requests and responses pass through as-is, with only
//! the model alias applied.

use std::collections::HashMap;

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures_util::StreamExt;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use url::Url;

use relay_config::{InstanceConfig, ProviderFamily};
use relay_core::RequestContext;

use super::{Backend, EventStream, classify_transport_error, resolve_model, status_error};
use crate::error::GatewayError;
use crate::types::{ChatRequest, ChatResponse, StreamEvent};

const API_VERSION: &str = "2023-06-01";

/// Anthropic backend instance
pub struct AnthropicBackend {
    instance_id: String,
    client: Client,
    endpoint: Url,
    api_key: SecretString,
    model_aliases: HashMap<String, String>,
}

impl AnthropicBackend {
    /// Create from instance configuration
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if the instance has no API key.
    pub fn new(config: &InstanceConfig, client: Client) -> Result<Self, GatewayError> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            GatewayError::Configuration(format!("instance `{}` has no api_key", config.id))
        })?;

        Ok(Self {
            instance_id: config.id.clone(),
            client,
            endpoint: config.endpoint.clone(),
            api_key,
            model_aliases: config.model_aliases.clone(),
        })
    }

    fn messages_url(&self) -> String {
        let base = self.endpoint.as_str().trim_end_matches('/');
        format!("{base}/v1/messages")
    }

    async fn send(
        &self,
        request: &ChatRequest,
        stream: bool,
        context: &RequestContext,
    ) -> Result<reqwest::Response, GatewayError> {
        let mut wire_request = request.clone();
        wire_request.model = resolve_model(&self.model_aliases, &request.model).to_owned();
        wire_request.stream = stream;

        let response = self
            .client
            .post(self.messages_url())
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", API_VERSION)
            .json(&wire_request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(
                    request_id = %context.request_id,
                    instance = %self.instance_id,
                    error = %e,
                    "upstream request failed"
                );
                GatewayError::provider(classify_transport_error(&e), e.to_string())
            })?;

        if !response.status().is_success() {
            tracing::warn!(
                request_id = %context.request_id,
                instance = %self.instance_id,
                status = %response.status(),
                "upstream returned error"
            );
            return Err(status_error(response).await);
        }

        Ok(response)
    }
}

#[async_trait]
impl Backend for AnthropicBackend {
    fn instance_id(&self) -> &str {
        &self.instance_id
    }

    fn family(&self) -> ProviderFamily {
        ProviderFamily::Anthropic
    }

    async fn complete(
        &self,
        request: &ChatRequest,
        context: &RequestContext,
    ) -> Result<ChatResponse, GatewayError> {
        let response = self.send(request, false, context).await?;

        response
            .json()
            .await
            .map_err(|e| GatewayError::MalformedResponse(format!("failed to parse response: {e}")))
    }

    async fn complete_stream(
        &self,
        request: &ChatRequest,
        context: &RequestContext,
    ) -> Result<EventStream, GatewayError> {
        let response = self.send(request, true, context).await?;

        let mapped = response
            .bytes_stream()
            .eventsource()
            .filter_map(|item| {
                let out = match item {
                    Ok(event) => match serde_json::from_str::<StreamEvent>(&event.data) {
                        Ok(unified) => Some(Ok(unified)),
                        Err(e) => {
                            // ping and other non-content events pass by
                            tracing::debug!(error = %e, event = %event.event, "skipping SSE event");
                            None
                        }
                    },
                    Err(e) => Some(Err(GatewayError::Streaming(e.to_string()))),
                };
                futures_util::future::ready(out)
            });

        Ok(Box::pin(mapped))
    }
}
