//! Request spans.
//!
//! Every request runs inside a span carrying its method, URI and request ID,
//! so log lines from the gateway can be tied back to the request that
//! spawned the interpreter.

use axum::http::Request;
use tracing::Span;

use crate::http::request::request_id_of;

/// Span factory for `TraceLayer::make_span_with`.
pub fn request_span<B>(request: &Request<B>) -> Span {
    let request_id = request_id_of(request).unwrap_or("unknown");

    tracing::info_span!(
        "request",
        method = %request.method(),
        uri = %request.uri(),
        request_id = %request_id,
    )
}
