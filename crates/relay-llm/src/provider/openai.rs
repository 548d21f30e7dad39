//! OpenAI-compatible backend

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
use crate::convert::openai::{OpenAiStreamState, decode_response, encode_request};
use crate::error::GatewayError;
use crate::protocol::openai::{OpenAiResponse, OpenAiStreamChunk};
use crate::types::{ChatRequest, ChatResponse, StreamEvent};

/// OpenAI-compatible backend instance
pub struct OpenAiBackend {
    instance_id: String,
    client: Client,
    endpoint: Url,
    api_key: SecretString,
    model_aliases: HashMap<String, String>,
}

impl OpenAiBackend {
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

    fn completions_url(&self) -> String {
        let base = self.endpoint.as_str().trim_end_matches('/');
        format!("{base}/chat/completions")
    }

    async fn send(
        &self,
        request: &ChatRequest,
        stream: bool,
        context: &RequestContext,
    ) -> Result<reqwest::Response, GatewayError> {
        let mut wire_request = encode_request(request)?;
        wire_request.model = resolve_model(&self.model_aliases, &request.model).to_owned();
        wire_request.stream = if stream { Some(true) } else { None };

        let response = self
            .client
            .post(self.completions_url())
            .bearer_auth(self.api_key.expose_secret())
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
impl Backend for OpenAiBackend {
    fn instance_id(&self) -> &str {
        &self.instance_id
    }

    fn family(&self) -> ProviderFamily {
        ProviderFamily::Openai
    }

    async fn complete(
        &self,
        request: &ChatRequest,
        context: &RequestContext,
    ) -> Result<ChatResponse, GatewayError> {
        let response = self.send(request, false, context).await?;

        let wire_response: OpenAiResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::MalformedResponse(format!("failed to parse response: {e}")))?;

        decode_response(wire_response)
    }

    async fn complete_stream(
        &self,
        request: &ChatRequest,
        context: &RequestContext,
    ) -> Result<EventStream, GatewayError> {
        let response = self.send(request, true, context).await?;
        let state = OpenAiStreamState::new(request.model.clone());

        let mapped = response
            .bytes_stream()
            .eventsource()
            .map(Some)
            .chain(futures_util::stream::once(async { None }))
            .scan(state, |state, item| {
                let out: Vec<Result<StreamEvent, GatewayError>> = match item {
                    Some(Ok(event)) => {
                        let data = event.data.trim().to_owned();
                        if data == "[DONE]" {
                            Vec::new()
                        } else {
                            match serde_json::from_str::<OpenAiStreamChunk>(&data) {
                                Ok(chunk) => state.on_chunk(chunk).into_iter().map(Ok).collect(),
                                Err(e) => {
                                    tracing::debug!(error = %e, data = %data, "skipping unparseable SSE chunk");
                                    Vec::new()
                                }
                            }
                        }
                    }
                    Some(Err(e)) => vec![Err(GatewayError::Streaming(e.to_string()))],
                    None => state.finish().into_iter().map(Ok).collect(),
                };
                futures_util::future::ready(Some(out))
            })
            .flat_map(futures_util::stream::iter);

        Ok(Box::pin(mapped))
    }
}
