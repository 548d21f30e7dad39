//! Gateway state and the request pipeline
//!
//! [`GatewayState`] owns the routing table, the health registry, the load
//! balancer, and one backend per configured instance. A request flows
//! classify, select, call, with failures reported to the registry and
//! bounded re-selection against other instances of the same provider.
//! Cross-provider fallback is never implicit; it only happens through the
//! routing table.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;

use relay_config::{Config, ProviderFamily};
use relay_core::RequestContext;

use crate::balance::LoadBalancer;
use crate::error::{FailureKind, GatewayError};
use crate::provider::{
    Backend, EventStream, anthropic::AnthropicBackend, codewhisperer::CodeWhispererBackend,
    gemini::GeminiBackend, openai::OpenAiBackend,
};
use crate::registry::{HealthRegistry, InstanceCounters, InstanceState};
use crate::route::RouteTable;
use crate::types::{ChatRequest, ChatResponse};

/// Shared gateway state, cheap to clone
#[derive(Clone)]
pub struct GatewayState {
    inner: Arc<Inner>,
}

struct Inner {
    route_table: RouteTable,
    registry: HealthRegistry,
    balancer: LoadBalancer,
    backends: HashMap<String, Arc<dyn Backend>>,
    /// Provider name -> instance ids in config order
    provider_instances: HashMap<String, Vec<String>>,
    timeout: Duration,
    max_attempts: usize,
}

impl GatewayState {
    /// Build gateway state from validated configuration
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if the routing table does not compile or an
    /// instance is missing the credentials its family requires.
    pub fn from_config(config: &Config) -> Result<Self, GatewayError> {
        let client = Client::new();
        let mut backends: HashMap<String, Arc<dyn Backend>> = HashMap::new();
        let mut provider_instances = HashMap::new();

        for (provider_name, provider) in &config.providers {
            let mut ids = Vec::with_capacity(provider.instances.len());
            for instance in &provider.instances {
                let backend: Arc<dyn Backend> = match provider.family {
                    ProviderFamily::Anthropic => {
                        Arc::new(AnthropicBackend::new(instance, client.clone())?)
                    }
                    ProviderFamily::Openai => {
                        Arc::new(OpenAiBackend::new(instance, client.clone())?)
                    }
                    ProviderFamily::Gemini => {
                        Arc::new(GeminiBackend::new(instance, client.clone())?)
                    }
                    ProviderFamily::Codewhisperer => {
                        Arc::new(CodeWhispererBackend::new(instance, client.clone())?)
                    }
                };
                ids.push(instance.id.clone());
                backends.insert(instance.id.clone(), backend);
            }
            provider_instances.insert(provider_name.clone(), ids);
        }

        Ok(Self::from_parts(
            RouteTable::from_config(&config.routing)?,
            HealthRegistry::new(config.health.clone()),
            backends,
            provider_instances,
            Duration::from_secs(config.request.timeout_secs),
            config.request.max_attempts,
        ))
    }

    /// Assemble state from already-built components
    pub fn from_parts(
        route_table: RouteTable,
        registry: HealthRegistry,
        backends: HashMap<String, Arc<dyn Backend>>,
        provider_instances: HashMap<String, Vec<String>>,
        timeout: Duration,
        max_attempts: usize,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                route_table,
                registry,
                balancer: LoadBalancer::new(),
                backends,
                provider_instances,
                timeout,
                max_attempts,
            }),
        }
    }

    /// Run a buffered completion through the pipeline
    ///
    /// # Errors
    ///
    /// Surfaces routing, selection, and provider errors; retryable provider
    /// failures are retried against other instances of the same provider
    /// up to the configured attempt limit.
    pub async fn complete(
        &self,
        mut request: ChatRequest,
        context: &RequestContext,
    ) -> Result<ChatResponse, GatewayError> {
        request.validate()?;
        let decision = self.inner.route_table.classify_and_route(&mut request)?;
        let instance_ids = self.instances_of(&decision.provider)?;

        let mut last_error: Option<GatewayError> = None;
        for attempt in 1..=self.inner.max_attempts {
            let instance_id = self
                .inner
                .balancer
                .select(&decision.provider, instance_ids, &self.inner.registry)?
                .to_owned();
            let backend = self.backend(&instance_id)?;

            match self.call_buffered(&*backend, &request, context).await {
                Ok(response) => {
                    self.inner.registry.record_success(&instance_id);
                    tracing::info!(
                        request_id = %context.request_id,
                        category = %decision.category,
                        provider = %decision.provider,
                        instance = %instance_id,
                        model = %request.model,
                        attempt,
                        "completion succeeded"
                    );
                    return Ok(response);
                }
                Err(error) => {
                    self.report_failure(&instance_id, &error);
                    tracing::warn!(
                        request_id = %context.request_id,
                        category = %decision.category,
                        provider = %decision.provider,
                        instance = %instance_id,
                        attempt,
                        error = %error,
                        "completion attempt failed"
                    );
                    if !error.is_retryable() {
                        return Err(error);
                    }
                    last_error = Some(error);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            GatewayError::Internal(anyhow::anyhow!("no completion attempt was made"))
        }))
    }

    /// Run a streaming completion through the pipeline
    ///
    /// The deadline and retry loop cover stream establishment only; once
    /// events are flowing, a mid-stream failure surfaces as a stream error
    /// rather than a re-selection.
    ///
    /// # Errors
    ///
    /// Same surface as [`GatewayState::complete`].
    pub async fn complete_stream(
        &self,
        mut request: ChatRequest,
        context: &RequestContext,
    ) -> Result<EventStream, GatewayError> {
        request.validate()?;
        let decision = self.inner.route_table.classify_and_route(&mut request)?;
        let instance_ids = self.instances_of(&decision.provider)?;

        let mut last_error: Option<GatewayError> = None;
        for attempt in 1..=self.inner.max_attempts {
            let instance_id = self
                .inner
                .balancer
                .select(&decision.provider, instance_ids, &self.inner.registry)?
                .to_owned();
            let backend = self.backend(&instance_id)?;

            let result = tokio::time::timeout(
                self.inner.timeout,
                backend.complete_stream(&request, context),
            )
            .await
            .unwrap_or_else(|_| {
                Err(GatewayError::provider(FailureKind::Timeout, "provider deadline exceeded"))
            });

            match result {
                Ok(stream) => {
                    self.inner.registry.record_success(&instance_id);
                    tracing::info!(
                        request_id = %context.request_id,
                        category = %decision.category,
                        provider = %decision.provider,
                        instance = %instance_id,
                        model = %request.model,
                        attempt,
                        "stream established"
                    );
                    return Ok(stream);
                }
                Err(error) => {
                    self.report_failure(&instance_id, &error);
                    tracing::warn!(
                        request_id = %context.request_id,
                        category = %decision.category,
                        provider = %decision.provider,
                        instance = %instance_id,
                        attempt,
                        error = %error,
                        "stream attempt failed"
                    );
                    if !error.is_retryable() {
                        return Err(error);
                    }
                    last_error = Some(error);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            GatewayError::Internal(anyhow::anyhow!("no stream attempt was made"))
        }))
    }

    /// Health states and lifetime counters of every tracked instance
    pub fn health_snapshot(&self) -> Vec<(String, InstanceState, InstanceCounters)> {
        self.inner.registry.snapshot()
    }

    async fn call_buffered(
        &self,
        backend: &dyn Backend,
        request: &ChatRequest,
        context: &RequestContext,
    ) -> Result<ChatResponse, GatewayError> {
        tokio::time::timeout(self.inner.timeout, backend.complete(request, context))
            .await
            .unwrap_or_else(|_| {
                Err(GatewayError::provider(FailureKind::Timeout, "provider deadline exceeded"))
            })
    }

    fn instances_of(&self, provider: &str) -> Result<&[String], GatewayError> {
        self.inner
            .provider_instances
            .get(provider)
            .map(Vec::as_slice)
            .ok_or_else(|| {
                GatewayError::Configuration(format!("routing targets unknown provider `{provider}`"))
            })
    }

    fn backend(&self, instance_id: &str) -> Result<Arc<dyn Backend>, GatewayError> {
        self.inner
            .backends
            .get(instance_id)
            .cloned()
            .ok_or_else(|| {
                GatewayError::Configuration(format!("no backend for instance `{instance_id}`"))
            })
    }

    fn report_failure(&self, instance_id: &str, error: &GatewayError) {
        if let Some(kind) = error.failure_kind() {
            self.inner.registry.record_failure(instance_id, kind);
        }
    }
}
