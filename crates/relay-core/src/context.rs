/// Runtime context threaded through one inbound request
///
/// Carries the correlation id that every log line, provider call, and
/// error surface references. Created once at the HTTP edge.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Unique request identifier (`req_` prefix + UUID)
    pub request_id: String,
}

impl RequestContext {
    /// Create a context with a freshly generated request id
    pub fn new() -> Self {
        Self {
            request_id: format!("req_{}", uuid::Uuid::new_v4().simple()),
        }
    }

    /// Create a context with a caller-supplied id (useful in tests)
    pub fn with_id(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
        }
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}
