use http::StatusCode;
use relay_core::HttpError;
use thiserror::Error;

/// Classification of an upstream failure
///
/// Drives both retry behavior and health accounting. `Authentication` is
/// terminal for an instance; the other kinds feed the cooldown counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Credential rejected (401/403)
    Authentication,
    /// Upstream rate limit (429)
    RateLimit,
    /// Upstream server error (5xx)
    Upstream,
    /// Request deadline exceeded
    Timeout,
    /// Connection could not be established or was dropped
    Network,
    /// Upstream responded with a body the transformer cannot decode
    Decode,
}

impl FailureKind {
    /// Classify an HTTP status from an upstream provider
    pub fn from_status(status: StatusCode) -> Self {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Self::Authentication,
            StatusCode::TOO_MANY_REQUESTS => Self::RateLimit,
            _ => Self::Upstream,
        }
    }

    /// Whether another instance of the same provider is worth trying
    ///
    /// A decode failure means the instance answered with an unexpected
    /// shape, which another attempt will not fix.
    pub const fn is_retryable(self) -> bool {
        !matches!(self, Self::Authentication | Self::Decode)
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Authentication => "authentication",
            Self::RateLimit => "rate_limit",
            Self::Upstream => "upstream",
            Self::Timeout => "timeout",
            Self::Network => "network",
            Self::Decode => "decode",
        };
        f.write_str(name)
    }
}

/// Gateway error type
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Configuration is inconsistent with the request (e.g. missing route rule)
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Request failed validation at the inbound edge
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Request contains content the target dialect cannot express
    #[error("unsupported content: {0}")]
    UnsupportedContent(String),

    /// Upstream response could not be decoded into the unified dialect
    #[error("malformed upstream response: {0}")]
    MalformedResponse(String),

    /// Every instance of the routed provider is unavailable
    #[error("no healthy instance for provider `{provider}`")]
    NoHealthyProvider {
        /// Provider whose instances are all out
        provider: String,
    },

    /// Upstream provider call failed
    #[error("provider failure ({kind}): {message}")]
    Provider {
        /// Failure classification
        kind: FailureKind,
        /// Upstream detail
        message: String,
    },

    /// Error occurred mid-stream after headers were sent
    #[error("stream error: {0}")]
    Streaming(String),

    /// Unexpected internal failure
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl GatewayError {
    /// Shorthand for a provider failure
    pub fn provider(kind: FailureKind, message: impl Into<String>) -> Self {
        Self::Provider {
            kind,
            message: message.into(),
        }
    }

    /// Whether retrying against another instance can help
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Provider { kind, .. } => kind.is_retryable(),
            _ => false,
        }
    }

    /// Failure classification for health accounting, if this error has one
    pub const fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::Provider { kind, .. } => Some(*kind),
            Self::MalformedResponse(_) => Some(FailureKind::Decode),
            _ => None,
        }
    }
}

impl HttpError for GatewayError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) | Self::UnsupportedContent(_) => StatusCode::BAD_REQUEST,
            Self::NoHealthyProvider { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::Provider { kind, .. } => match kind {
                FailureKind::Authentication => StatusCode::UNAUTHORIZED,
                FailureKind::RateLimit => StatusCode::TOO_MANY_REQUESTS,
                FailureKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
                FailureKind::Upstream | FailureKind::Network | FailureKind::Decode => {
                    StatusCode::BAD_GATEWAY
                }
            },
            Self::MalformedResponse(_) => StatusCode::BAD_GATEWAY,
            Self::Configuration(_) | Self::Streaming(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_type(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) | Self::UnsupportedContent(_) => "invalid_request_error",
            Self::NoHealthyProvider { .. } => "overloaded_error",
            Self::Provider { kind, .. } => match kind {
                FailureKind::Authentication => "authentication_error",
                FailureKind::RateLimit => "rate_limit_error",
                _ => "api_error",
            },
            Self::MalformedResponse(_)
            | Self::Configuration(_)
            | Self::Streaming(_)
            | Self::Internal(_) => "api_error",
        }
    }

    fn client_message(&self) -> String {
        match self {
            Self::Internal(_) => "internal server error".to_owned(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert_eq!(
            FailureKind::from_status(StatusCode::UNAUTHORIZED),
            FailureKind::Authentication
        );
        assert_eq!(
            FailureKind::from_status(StatusCode::FORBIDDEN),
            FailureKind::Authentication
        );
        assert_eq!(
            FailureKind::from_status(StatusCode::TOO_MANY_REQUESTS),
            FailureKind::RateLimit
        );
        assert_eq!(
            FailureKind::from_status(StatusCode::BAD_GATEWAY),
            FailureKind::Upstream
        );
    }

    #[test]
    fn auth_failures_are_not_retryable() {
        assert!(!FailureKind::Authentication.is_retryable());
        assert!(FailureKind::RateLimit.is_retryable());
        assert!(FailureKind::Timeout.is_retryable());

        let err = GatewayError::provider(FailureKind::Authentication, "bad key");
        assert!(!err.is_retryable());
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn malformed_responses_are_not_retryable() {
        let err = GatewayError::MalformedResponse("no choices".to_owned());
        assert!(!err.is_retryable());
        assert_eq!(err.failure_kind(), Some(FailureKind::Decode));
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn no_healthy_provider_maps_to_503() {
        let err = GatewayError::NoHealthyProvider {
            provider: "openai".to_owned(),
        };
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.error_type(), "overloaded_error");
    }

    #[test]
    fn internal_errors_do_not_leak_detail() {
        let err = GatewayError::Internal(anyhow::anyhow!("db socket /tmp/x gone"));
        assert_eq!(err.client_message(), "internal server error");
    }
}
