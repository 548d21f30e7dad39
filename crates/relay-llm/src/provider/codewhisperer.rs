//! CodeWhisperer-style backend
//!
//! Authentication is token-based: a long-lived refresh token is exchanged
//! for a short-lived access token, cached and refreshed on expiry. The
//! response body is fully buffered and reconstructed before any event is
//! emitted; a caller asking for streaming gets the reconstructed response
//! replayed as a compliant event stream.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::Mutex;
use url::Url;

use relay_config::{InstanceConfig, ProviderFamily};
use relay_core::RequestContext;

use super::{Backend, EventStream, classify_transport_error, resolve_model, status_error};
use crate::convert::codewhisperer::encode_request;
use crate::convert::replay_as_stream;
use crate::error::{FailureKind, GatewayError};
use crate::reconstruct::ResponseBuffer;
use crate::types::{ChatRequest, ChatResponse};

/// Refresh this long before the token actually expires
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

struct CachedToken {
    access_token: SecretString,
    expires_at: Instant,
}

/// Access token cache with single-flighted refresh
///
/// The mutex is held across the refresh call, so concurrent requests that
/// find the token stale wait for the first refresh instead of issuing
/// their own.
struct TokenManager {
    client: Client,
    token_url: Url,
    refresh_token: SecretString,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenManager {
    async fn bearer(&self, context: &RequestContext) -> Result<SecretString, GatewayError> {
        let mut cached = self.cached.lock().await;

        if let Some(token) = cached.as_ref()
            && token.expires_at > Instant::now() + EXPIRY_MARGIN
        {
            return Ok(token.access_token.clone());
        }

        tracing::debug!(request_id = %context.request_id, "refreshing access token");
        let response = self
            .client
            .post(self.token_url.clone())
            .json(&serde_json::json!({
                "refreshToken": self.refresh_token.expose_secret(),
            }))
            .send()
            .await
            .map_err(|e| GatewayError::provider(classify_transport_error(&e), e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(GatewayError::provider(
                FailureKind::Authentication,
                format!("token refresh returned {status}"),
            ));
        }

        let token: TokenResponse = response.json().await.map_err(|e| {
            GatewayError::provider(
                FailureKind::Authentication,
                format!("invalid token refresh response: {e}"),
            )
        })?;

        let access_token = SecretString::from(token.access_token);
        *cached = Some(CachedToken {
            access_token: access_token.clone(),
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        });

        Ok(access_token)
    }
}

/// CodeWhisperer-style backend instance
pub struct CodeWhispererBackend {
    instance_id: String,
    client: Client,
    endpoint: Url,
    profile_arn: Option<String>,
    model_aliases: HashMap<String, String>,
    tokens: TokenManager,
}

impl CodeWhispererBackend {
    /// Create from instance configuration
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if the instance lacks a refresh token or
    /// token URL.
    pub fn new(config: &InstanceConfig, client: Client) -> Result<Self, GatewayError> {
        let refresh_token = config.refresh_token.clone().ok_or_else(|| {
            GatewayError::Configuration(format!("instance `{}` has no refresh_token", config.id))
        })?;
        let token_url = config.token_url.clone().ok_or_else(|| {
            GatewayError::Configuration(format!("instance `{}` has no token_url", config.id))
        })?;

        Ok(Self {
            instance_id: config.id.clone(),
            client: client.clone(),
            endpoint: config.endpoint.clone(),
            profile_arn: config.profile_arn.clone(),
            model_aliases: config.model_aliases.clone(),
            tokens: TokenManager {
                client,
                token_url,
                refresh_token,
                cached: Mutex::new(None),
            },
        })
    }

    fn conversation_url(&self) -> String {
        let base = self.endpoint.as_str().trim_end_matches('/');
        format!("{base}/generateAssistantResponse")
    }
}

#[async_trait]
impl Backend for CodeWhispererBackend {
    fn instance_id(&self) -> &str {
        &self.instance_id
    }

    fn family(&self) -> ProviderFamily {
        ProviderFamily::Codewhisperer
    }

    async fn complete(
        &self,
        request: &ChatRequest,
        context: &RequestContext,
    ) -> Result<ChatResponse, GatewayError> {
        let mut aliased = request.clone();
        aliased.model = resolve_model(&self.model_aliases, &request.model).to_owned();
        let wire_request = encode_request(&aliased, self.profile_arn.as_deref())?;

        let token = self.tokens.bearer(context).await?;
        let response = self
            .client
            .post(self.conversation_url())
            .bearer_auth(token.expose_secret())
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

        let body = response
            .bytes()
            .await
            .map_err(|e| GatewayError::provider(classify_transport_error(&e), e.to_string()))?;

        let mut buffer = ResponseBuffer::new();
        buffer.push(&body);
        Ok(buffer.into_response(&request.model))
    }

    async fn complete_stream(
        &self,
        request: &ChatRequest,
        context: &RequestContext,
    ) -> Result<EventStream, GatewayError> {
        // buffered by contract; replay the reconstructed response
        let response = self.complete(request, context).await?;
        let events = replay_as_stream(&response);
        Ok(Box::pin(futures_util::stream::iter(events.into_iter().map(Ok))))
    }
}
