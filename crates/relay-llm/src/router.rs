//! Axum route handlers for the gateway surface

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing};
use futures_util::{Stream, StreamExt};

use relay_core::{HttpError, RequestContext};

use crate::error::GatewayError;
use crate::provider::EventStream;
use crate::registry::InstanceState;
use crate::state::GatewayState;
use crate::types::ChatRequest;

/// Build the gateway router
pub fn gateway_router(state: GatewayState) -> Router {
    Router::new()
        .route("/v1/messages", routing::post(messages))
        .route("/health", routing::get(health))
        .with_state(state)
}

/// Handle `POST /v1/messages`
async fn messages(State(state): State<GatewayState>, Json(request): Json<ChatRequest>) -> Response {
    let context = RequestContext::new();
    let is_stream = request.stream;

    tracing::debug!(
        request_id = %context.request_id,
        model = %request.model,
        stream = is_stream,
        "inbound request"
    );

    if is_stream {
        match state.complete_stream(request, &context).await {
            Ok(stream) => stream_response(stream).into_response(),
            Err(e) => error_response(&e),
        }
    } else {
        match state.complete(request, &context).await {
            Ok(response) => Json(response).into_response(),
            Err(e) => error_response(&e),
        }
    }
}

/// Handle `GET /health`
#[allow(clippy::unused_async)]
async fn health(State(state): State<GatewayState>) -> Response {
    let instances: Vec<serde_json::Value> = state
        .health_snapshot()
        .into_iter()
        .map(|(id, health, counters)| {
            let state_name = match health {
                InstanceState::Healthy => "healthy",
                InstanceState::Cooldown { .. } => "cooldown",
                InstanceState::Blacklisted => "blacklisted",
            };
            serde_json::json!({ "instance": id, "state": state_name, "counters": counters })
        })
        .collect();

    Json(serde_json::json!({ "instances": instances })).into_response()
}

/// Build a streaming SSE response with named unified events
fn stream_response(stream: EventStream) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let event_stream = stream.map(|result| match result {
        Ok(event) => {
            let name = event.event_name();
            let data = serde_json::to_string(&event).unwrap_or_default();
            Ok(Event::default().event(name).data(data))
        }
        Err(e) => {
            let error_data = serde_json::json!({
                "type": "error",
                "error": {
                    "type": e.error_type(),
                    "message": e.client_message(),
                }
            });
            Ok(Event::default().event("error").data(error_data.to_string()))
        }
    });

    Sse::new(event_stream).keep_alive(KeepAlive::default())
}

/// Convert a gateway error to an Anthropic-style JSON error response
fn error_response(error: &GatewayError) -> Response {
    let status = error.status_code();
    let body = serde_json::json!({
        "type": "error",
        "error": {
            "type": error.error_type(),
            "message": error.client_message(),
        }
    });

    (status, Json(body)).into_response()
}
