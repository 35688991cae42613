//! Response conversion.
//!
//! # Responsibilities
//! - Turn the bridge's `OutboundResponse` into an axum `Response`
//! - Map request-level failures (body too large, unreadable body, unbridged
//!   method) onto the same `{error, details}` envelope the bridge uses
//! - Rewrap rejections produced by middleware (body limit, request timeout)
//!
//! # Design Decisions
//! - Clients never see a bare status or a stack trace; every failure is JSON

use axum::extract::rejection::BytesRejection;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::bridge::{OutboundResponse, UnsupportedMethod};

impl IntoResponse for OutboundResponse {
    fn into_response(self) -> Response {
        let mut response = (self.status, self.body).into_response();
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(self.content_kind.mime()),
        );
        response
    }
}

/// Failures that happen before the bridge runs.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum BridgeError {
    /// The request body could not be read (too large, aborted, ...).
    #[error("invalid request body: {0}")]
    Body(#[from] BytesRejection),

    /// The method has no bridge equivalent.
    #[error(transparent)]
    Method(#[from] UnsupportedMethod),
}

impl BridgeError {
    fn status(&self) -> StatusCode {
        match self {
            BridgeError::Body(rejection) => rejection.status(),
            BridgeError::Method(_) => StatusCode::METHOD_NOT_ALLOWED,
        }
    }
}

impl IntoResponse for BridgeError {
    fn into_response(self) -> Response {
        let status = self.status();
        let details = match &self {
            BridgeError::Body(rejection) => rejection.body_text(),
            BridgeError::Method(e) => e.to_string(),
        };
        OutboundResponse::error(status, "Invalid request", &details).into_response()
    }
}

/// Upper bound when reading a middleware rejection's own body.
const REJECTION_BODY_LIMIT: usize = 4096;

/// Give middleware rejections the bridge's JSON envelope.
///
/// Only 413 and 408 are touched, and only when they are not JSON already.
pub async fn envelope_rejections(response: Response) -> Response {
    let status = response.status();
    let error = match status {
        StatusCode::PAYLOAD_TOO_LARGE => "Invalid request",
        StatusCode::REQUEST_TIMEOUT => "Request timeout",
        _ => return response,
    };
    let is_json = response
        .headers()
        .get(header::CONTENT_TYPE)
        .is_some_and(|v| v.as_bytes().starts_with(b"application/json"));
    if is_json {
        return response;
    }

    let details = match axum::body::to_bytes(response.into_body(), REJECTION_BODY_LIMIT).await {
        Ok(bytes) if !bytes.is_empty() => String::from_utf8_lossy(&bytes).into_owned(),
        _ => status.canonical_reason().unwrap_or_default().to_string(),
    };
    OutboundResponse::error(status, error, &details).into_response()
}
