//! Inbound request model.
//!
//! The HTTP layer converts whatever axum hands it into an [`InboundRequest`]
//! once; every later stage of the pipeline only sees this type.

use axum::body::Bytes;
use axum::http::{HeaderMap, Method};

/// Methods the bridge accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestMethod {
    Get,
    Post,
    Put,
    Delete,
    Options,
}

impl RequestMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestMethod::Get => "GET",
            RequestMethod::Post => "POST",
            RequestMethod::Put => "PUT",
            RequestMethod::Delete => "DELETE",
            RequestMethod::Options => "OPTIONS",
        }
    }

    /// Whether a body sent with this method is handed to the script.
    pub fn carries_body(&self) -> bool {
        matches!(self, RequestMethod::Post | RequestMethod::Put)
    }
}

impl std::fmt::Display for RequestMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when an HTTP method has no bridge equivalent.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("method {0} is not bridged")]
pub struct UnsupportedMethod(pub String);

impl TryFrom<&Method> for RequestMethod {
    type Error = UnsupportedMethod;

    fn try_from(method: &Method) -> Result<Self, Self::Error> {
        match *method {
            Method::GET => Ok(RequestMethod::Get),
            Method::POST => Ok(RequestMethod::Post),
            Method::PUT => Ok(RequestMethod::Put),
            Method::DELETE => Ok(RequestMethod::Delete),
            Method::OPTIONS => Ok(RequestMethod::Options),
            ref other => Err(UnsupportedMethod(other.to_string())),
        }
    }
}

/// A request on its way into the bridge.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub method: RequestMethod,
    target_path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl InboundRequest {
    /// Build a request for `endpoint` under the API namespace `api_prefix`.
    ///
    /// The target path is always `<api_prefix>/<endpoint>`, whatever slashes
    /// either side carries.
    pub fn new(
        method: RequestMethod,
        api_prefix: &str,
        endpoint: &str,
        headers: HeaderMap,
        body: Bytes,
    ) -> Self {
        let target_path = format!(
            "{}/{}",
            api_prefix.trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        );
        Self {
            method,
            target_path,
            query: None,
            headers,
            body,
        }
    }

    /// Attach the raw query string (without the leading `?`).
    pub fn with_query(mut self, query: Option<&str>) -> Self {
        self.query = query.filter(|q| !q.is_empty()).map(str::to_string);
        self
    }

    /// Namespaced path, e.g. `/api/public_config.php`.
    pub fn target_path(&self) -> &str {
        &self.target_path
    }

    /// Path plus query, the way a CGI script expects `REQUEST_URI`.
    pub fn request_uri(&self) -> String {
        match &self.query {
            Some(q) => format!("{}?{}", self.target_path, q),
            None => self.target_path.clone(),
        }
    }
}
