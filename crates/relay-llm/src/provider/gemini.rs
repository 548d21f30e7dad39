//! Gemini backend

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
use crate::convert::gemini::{GeminiStreamState, decode_response, encode_request};
use crate::error::GatewayError;
use crate::protocol::gemini::GeminiResponse;
use crate::types::{ChatRequest, ChatResponse, StreamEvent};

/// Gemini backend instance
pub struct GeminiBackend {
    instance_id: String,
    client: Client,
    endpoint: Url,
    api_key: SecretString,
    model_aliases: HashMap<String, String>,
}

impl GeminiBackend {
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

    fn generate_url(&self, model: &str, stream: bool) -> String {
        let base = self.endpoint.as_str().trim_end_matches('/');
        if stream {
            format!("{base}/v1beta/models/{model}:streamGenerateContent?alt=sse")
        } else {
            format!("{base}/v1beta/models/{model}:generateContent")
        }
    }

    async fn send(
        &self,
        request: &ChatRequest,
        stream: bool,
        context: &RequestContext,
    ) -> Result<reqwest::Response, GatewayError> {
        let wire_request = encode_request(request)?;
        let model = resolve_model(&self.model_aliases, &request.model);

        let response = self
            .client
            .post(self.generate_url(model, stream))
            .header("x-goog-api-key", self.api_key.expose_secret())
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
impl Backend for GeminiBackend {
    fn instance_id(&self) -> &str {
        &self.instance_id
    }

    fn family(&self) -> ProviderFamily {
        ProviderFamily::Gemini
    }

    async fn complete(
        &self,
        request: &ChatRequest,
        context: &RequestContext,
    ) -> Result<ChatResponse, GatewayError> {
        let response = self.send(request, false, context).await?;

        let wire_response: GeminiResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::MalformedResponse(format!("failed to parse response: {e}")))?;

        decode_response(wire_response, &request.model)
    }

    async fn complete_stream(
        &self,
        request: &ChatRequest,
        context: &RequestContext,
    ) -> Result<EventStream, GatewayError> {
        let response = self.send(request, true, context).await?;
        let state = GeminiStreamState::new(request.model.clone());

        let mapped = response
            .bytes_stream()
            .eventsource()
            .map(Some)
            .chain(futures_util::stream::once(async { None }))
            .scan(state, |state, item| {
                let out: Vec<Result<StreamEvent, GatewayError>> = match item {
                    Some(Ok(event)) => match serde_json::from_str::<GeminiResponse>(&event.data) {
                        Ok(chunk) => state.on_chunk(chunk).into_iter().map(Ok).collect(),
                        Err(e) => {
                            tracing::debug!(error = %e, "skipping unparseable SSE chunk");
                            Vec::new()
                        }
                    },
                    Some(Err(e)) => vec![Err(GatewayError::Streaming(e.to_string()))],
                    None => state.finish().into_iter().map(Ok).collect(),
                };
                futures_util::future::ready(Some(out))
            })
            .flat_map(futures_util::stream::iter);

        Ok(Box::pin(mapped))
    }
}
