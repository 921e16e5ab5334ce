//! Request-scoped diagnostic types shared across Gatehouse components.

use uuid::Uuid;

/// Diagnostic context for one inbound request.
///
/// Passed by reference through the validation pipeline purely so that a
/// classified error can carry correlation metadata. Nothing here ever
/// influences a validation decision.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Correlation id supplied by the transport layer, if any. When
    /// absent, the error classifier generates one at the failure site.
    pub request_id: Option<String>,

    /// Remote address as reported by the transport layer.
    pub caller_ip: Option<String>,

    /// User-Agent header value.
    pub user_agent: Option<String>,

    /// Request path.
    pub endpoint: Option<String>,

    /// HTTP method.
    pub method: Option<String>,
}

impl RequestContext {
    /// Create an empty context. A request id will be generated on first
    /// classification.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context pre-seeded with a fresh request id.
    #[must_use]
    pub fn with_generated_id() -> Self {
        Self {
            request_id: Some(Uuid::new_v4().to_string()),
            ..Self::default()
        }
    }

    /// The context's request id, or a freshly generated one.
    #[must_use]
    pub fn request_id_or_new(&self) -> String {
        self.request_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string())
    }
}
