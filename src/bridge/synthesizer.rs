//! Response synthesis.
//!
//! Turns an [`ExecutionResult`] into an [`OutboundResponse`]. The content type
//! is never declared by the script; it is decided by [`classify`], which
//! checks whether stdout parses as JSON.

use axum::body::Bytes;
use axum::http::StatusCode;
use serde_json::{json, Value};

use crate::bridge::gateway::{ExecutionFailure, ExecutionResult};

/// Content types the bridge can answer with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Structured,
    PlainText,
}

impl ContentKind {
    pub fn mime(&self) -> &'static str {
        match self {
            ContentKind::Structured => "application/json",
            ContentKind::PlainText => "text/plain; charset=utf-8",
        }
    }
}

/// What the bridge sends back for one request.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundResponse {
    pub status: StatusCode,
    pub content_kind: ContentKind,
    pub body: Bytes,
}

impl OutboundResponse {
    /// Empty 200, used for cross-origin preflight.
    pub fn preflight() -> Self {
        Self {
            status: StatusCode::OK,
            content_kind: ContentKind::PlainText,
            body: Bytes::new(),
        }
    }

    /// JSON `{error, details}` envelope.
    pub fn error(status: StatusCode, error: &str, details: &str) -> Self {
        let body = json!({ "error": error, "details": details });
        Self {
            status,
            content_kind: ContentKind::Structured,
            body: Bytes::from(body.to_string()),
        }
    }
}

/// Script output, tagged by whether it is a JSON document.
#[derive(Debug, Clone, PartialEq)]
pub enum Classified {
    Structured(Value),
    PlainText(Bytes),
}

pub fn classify(stdout: &Bytes) -> Classified {
    match serde_json::from_slice::<Value>(stdout) {
        Ok(value) => Classified::Structured(value),
        Err(_) => Classified::PlainText(stdout.clone()),
    }
}

/// Map a finished run onto an HTTP answer.
pub fn synthesize(result: ExecutionResult) -> OutboundResponse {
    if let Some(failure) = &result.failure {
        return match failure {
            ExecutionFailure::Timeout { .. } => {
                OutboundResponse::error(StatusCode::GATEWAY_TIMEOUT, "Backend timeout", &failure.to_string())
            }
            ExecutionFailure::Spawn { source, .. } => OutboundResponse::error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to start interpreter",
                &source.to_string(),
            ),
            ExecutionFailure::Io(e) => {
                OutboundResponse::error(StatusCode::INTERNAL_SERVER_ERROR, "Backend I/O error", &e.to_string())
            }
        };
    }

    if result.exit_status != 0 {
        // stdout is discarded on this path.
        return OutboundResponse::error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Backend error",
            &String::from_utf8_lossy(&result.stderr),
        );
    }

    let content_kind = match classify(&result.stdout) {
        Classified::Structured(_) => ContentKind::Structured,
        Classified::PlainText(_) => ContentKind::PlainText,
    };
    OutboundResponse {
        status: StatusCode::OK,
        content_kind,
        body: result.stdout,
    }
}
