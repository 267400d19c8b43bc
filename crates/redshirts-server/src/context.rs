//! Per-request context carried from the HTTP layer into outbound calls.

use axum::{
    extract::Request,
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use tracing::Instrument;
use uuid::Uuid;

/// Header used to trace one logical request across services.
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

/// Used in place of a missing or malformed correlation id.
pub const FALLBACK_CORRELATION_ID: &str = "WRONG FORMAT";

/// Request-scoped values that must accompany every outbound call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub correlation_id: String,
}

impl RequestContext {
    pub fn new(correlation_id: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
        }
    }

    /// Build the context from inbound headers.
    ///
    /// The correlation id must be a UUID; anything else is replaced by
    /// [`FALLBACK_CORRELATION_ID`] instead of failing the request.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let raw = headers
            .get(CORRELATION_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");

        match Uuid::parse_str(raw.trim()) {
            Ok(id) => Self::new(id.to_string()),
            Err(e) => {
                tracing::warn!(
                    value = %raw,
                    error = %e,
                    "Correlation id is not a UUID, using fallback"
                );
                Self::new(FALLBACK_CORRELATION_ID)
            }
        }
    }
}

/// Attach a [`RequestContext`] to the request and run the rest of the stack
/// inside a span tagged with its correlation id.
pub async fn correlation_middleware(mut req: Request, next: Next) -> Response {
    let ctx = RequestContext::from_headers(req.headers());
    let span = tracing::info_span!(
        "request",
        correlation_id = %ctx.correlation_id,
        method = %req.method(),
        path = %req.uri().path(),
    );
    req.extensions_mut().insert(ctx);

    next.run(req).instrument(span).await
}
