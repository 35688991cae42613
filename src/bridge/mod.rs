//! HTTP → CGI-style interpreter bridge.
//!
//! # Data Flow
//! ```text
//! InboundRequest
//!     → environment.rs (REQUEST_METHOD, REQUEST_URI, HTTP_*)   ─┐
//!     → body.rs        (body for POST/PUT only)                 ├→ script.rs (ScriptPayload)
//!                                                               ─┘
//!     → gateway.rs     (spawn interpreter, payload on stdin, body file, timeout)
//!     → synthesizer.rs (exit status + stdout sniffing → OutboundResponse)
//! ```
//!
//! # Design Decisions
//! - Every stage is request-local; nothing is shared between requests except
//!   the gateway's concurrency permits
//! - OPTIONS never reaches any stage; it is answered before materialization
//! - The pipeline is strictly sequential per request

pub mod body;
pub mod environment;
pub mod gateway;
pub mod request;
pub mod script;
pub mod synthesizer;

pub use body::{relay_body, BodyInstall};
pub use environment::{materialize, AmbientEnvironment};
pub use gateway::{ExecutionFailure, ExecutionResult, ProcessGateway};
pub use request::{InboundRequest, RequestMethod, UnsupportedMethod};
pub use script::{ScriptAssembler, ScriptPayload};
pub use synthesizer::{classify, synthesize, Classified, ContentKind, OutboundResponse};

use crate::config::BridgeConfig;

/// One configured bridge: an assembler and a gateway sharing the same root.
#[derive(Debug, Clone)]
pub struct Bridge {
    assembler: ScriptAssembler,
    gateway: ProcessGateway,
}

impl Bridge {
    pub fn new(config: &BridgeConfig) -> Self {
        Self::from_gateway(ProcessGateway::new(config), config)
    }

    /// A bridge for `config` that keeps sharing this one's concurrency cap.
    pub fn reconfigured(&self, config: &BridgeConfig) -> Self {
        Self::from_gateway(self.gateway.reconfigured(config), config)
    }

    fn from_gateway(gateway: ProcessGateway, config: &BridgeConfig) -> Self {
        // The gateway owns the resolved root; the payload must name the same directory.
        let assembler = ScriptAssembler::new(
            gateway.root().to_path_buf(),
            config.entry_point.clone(),
            config.body_encoding,
        );
        Self { assembler, gateway }
    }

    pub fn gateway(&self) -> &ProcessGateway {
        &self.gateway
    }

    /// Build the payload for a request without running it.
    pub fn prepare(&self, request: &InboundRequest) -> (AmbientEnvironment, ScriptPayload) {
        let (env, _, payload) = self.stage(request);
        (env, payload)
    }

    fn stage(&self, request: &InboundRequest) -> (AmbientEnvironment, Option<BodyInstall>, ScriptPayload) {
        let env = materialize(request);
        let body = relay_body(request.method, &request.body);
        let payload = self.assembler.assemble(&env, body.as_ref());
        (env, body, payload)
    }

    /// Run the whole pipeline for one request.
    pub async fn dispatch(&self, request: InboundRequest) -> OutboundResponse {
        if request.method == RequestMethod::Options {
            return OutboundResponse::preflight();
        }

        let (env, body, payload) = self.stage(&request);
        tracing::debug!(
            method = %request.method,
            uri = %request.request_uri(),
            env_vars = env.len(),
            payload_bytes = payload.len(),
            "Dispatching to interpreter"
        );

        let result = self.gateway.execute(&payload, &env, body.as_ref()).await;
        synthesize(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BodyEncoding;
    use axum::body::Bytes;
    use axum::http::{HeaderMap, StatusCode};

    #[tokio::test]
    async fn test_options_never_runs_the_interpreter() {
        let config = BridgeConfig {
            interpreter: "/nonexistent/interpreter-binary".into(),
            ..BridgeConfig::default()
        };
        let bridge = Bridge::new(&config);
        let request = InboundRequest::new(
            RequestMethod::Options,
            &config.api_prefix,
            "anything",
            HeaderMap::new(),
            Bytes::from_static(b"ignored"),
        );

        let response = bridge.dispatch(request).await;

        assert_eq!(response, OutboundResponse::preflight());
    }

    #[tokio::test]
    async fn test_dispatch_maps_spawn_failure() {
        let config = BridgeConfig {
            interpreter: "/nonexistent/interpreter-binary".into(),
            interpreter_root: std::env::temp_dir(),
            ..BridgeConfig::default()
        };
        let bridge = Bridge::new(&config);
        let request = InboundRequest::new(RequestMethod::Get, "/api", "x", HeaderMap::new(), Bytes::new());

        let response = bridge.dispatch(request).await;

        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.content_kind, ContentKind::Structured);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_dispatch_streams_assembled_payload() {
        let config = BridgeConfig {
            interpreter: "cat".into(),
            interpreter_root: std::env::temp_dir(),
            ..BridgeConfig::default()
        };
        let bridge = Bridge::new(&config);
        let request = InboundRequest::new(
            RequestMethod::Post,
            "/api",
            "admin_login_simple.php",
            HeaderMap::new(),
            Bytes::from_static(b"{\"username\":\"admin\"}"),
        );
        let (_, expected) = bridge.prepare(&request);

        let response = bridge.dispatch(request).await;

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.content_kind, ContentKind::PlainText);
        assert_eq!(response.body.as_ref(), expected.as_bytes());
    }

    #[test]
    fn test_relative_root_is_resolved_once() {
        let config = BridgeConfig {
            interpreter_root: "backend".into(),
            ..BridgeConfig::default()
        };
        let bridge = Bridge::new(&config);
        let request = InboundRequest::new(RequestMethod::Get, "/api", "x", HeaderMap::new(), Bytes::new());

        let (_, payload) = bridge.prepare(&request);

        let root = std::env::current_dir().unwrap().join("backend");
        assert_eq!(bridge.gateway().root(), root);
        assert!(payload.as_str().contains(&format!("chdir('{}');\n", root.display())));
        assert!(payload.as_str().contains(&format!("include '{}';\n", root.join("index.php").display())));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_post_body_readable_without_program_text() {
        let config = BridgeConfig {
            interpreter: "sh".into(),
            interpreter_args: vec![
                "-c".into(),
                r#"printf '%s|%s' "$(cat "$REQUEST_BODY_FILE")" "$CONTENT_LENGTH""#.into(),
            ],
            interpreter_root: std::env::temp_dir(),
            body_encoding: BodyEncoding::File,
            ..BridgeConfig::default()
        };
        let bridge = Bridge::new(&config);
        let request = InboundRequest::new(
            RequestMethod::Post,
            "/api",
            "login.php",
            HeaderMap::new(),
            Bytes::from_static(b"SECRETBODY"),
        );
        let (_, payload) = bridge.prepare(&request);
        assert!(!payload.as_str().contains("SECRETBODY"));

        let response = bridge.dispatch(request).await;

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body.as_ref(), b"SECRETBODY|10");
    }
}
