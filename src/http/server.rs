//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (tracing, limits, request ID, CORS)
//! - Bind server to listener
//! - Dispatch `/api/*` requests to the interpreter bridge
//! - Apply hot-reloaded bridge settings
//! - Observability (metrics, correlation IDs)

use axum::{
    body::{Body, Bytes},
    extract::{rejection::BytesRejection, DefaultBodyLimit, Path, State},
    middleware::map_response,
    http::{header, HeaderMap, HeaderValue, Method, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use arc_swap::ArcSwap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower_http::{
    cors::CorsLayer,
    limit::RequestBodyLimitLayer,
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    set_header::SetResponseHeaderLayer,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::bridge::{Bridge, InboundRequest, OutboundResponse, RequestMethod};
use crate::config::BridgeServerConfig;
use crate::http::health::health;
use crate::http::request::UuidRequestId;
use crate::http::response::{envelope_rejections, BridgeError};
use crate::http::static_files::spa_service;
use crate::observability::metrics;
use crate::observability::tracing::request_span;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    /// Current bridge; swapped wholesale on config reload.
    pub bridge: Arc<ArcSwap<Bridge>>,
    pub api_prefix: Arc<str>,
    pub service_name: Arc<str>,
}

/// HTTP server for the bridge.
pub struct HttpServer {
    router: Router,
    config: BridgeServerConfig,
    bridge: Arc<ArcSwap<Bridge>>,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: BridgeServerConfig) -> Self {
        let bridge = Arc::new(ArcSwap::from_pointee(Bridge::new(&config.bridge)));

        let state = AppState {
            bridge: bridge.clone(),
            api_prefix: Arc::from(config.bridge.api_prefix.as_str()),
            service_name: Arc::from(config.service_name.as_str()),
        };

        let router = Self::build_router(&config, state);
        Self {
            router,
            config,
            bridge,
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &BridgeServerConfig, state: AppState) -> Router {
        let api_route = format!("{}/{{*endpoint}}", config.bridge.api_prefix);

        let mut router = Router::new()
            .route(
                &api_route,
                get(bridge_handler)
                    .post(bridge_handler)
                    .put(bridge_handler)
                    .delete(bridge_handler)
                    .options(bridge_handler)
                    // Unbridged methods still reach the handler and get the JSON 405.
                    .fallback(bridge_handler),
            )
            .route("/health", get(health));

        if let Some(spa) = spa_service(&config.static_files) {
            router = router.fallback_service(spa);
        }

        let mut router = router
            .with_state(state)
            .layer(DefaultBodyLimit::disable())
            .layer(RequestBodyLimitLayer::new(config.security.max_body_size))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(map_response(envelope_rejections))
            .layer(CorsLayer::permissive());

        if config.security.enable_headers {
            router = router.layer(SetResponseHeaderLayer::if_not_present(
                header::X_CONTENT_TYPE_OPTIONS,
                HeaderValue::from_static("nosniff"),
            ));
        }

        router
            .layer(TraceLayer::new_for_http().make_span_with(request_span::<Body>))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
    }

    /// Run the server, accepting connections on the given listener.
    ///
    /// Config revisions arriving on `config_updates` replace the bridge for
    /// new requests. The server drains and stops when `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<BridgeServerConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            api_prefix = %self.config.bridge.api_prefix,
            interpreter = %self.config.bridge.interpreter,
            "HTTP server starting"
        );

        let bridge = self.bridge.clone();
        let active_prefix = self.config.bridge.api_prefix.clone();
        let reloader = tokio::spawn(async move {
            while let Some(new_config) = config_updates.recv().await {
                reload_bridge(&bridge, &active_prefix, &new_config);
            }
        });

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received, draining connections");
            })
            .await?;

        reloader.abort();
        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// The fully layered router, for driving requests without a socket.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &BridgeServerConfig {
        &self.config
    }
}

/// Swap in a bridge built from `config`.
///
/// Only the bridge section takes effect; the API prefix is baked into the
/// router, so a changed prefix is reported and ignored until restart. The
/// new bridge shares the old one's concurrency permits.
pub fn reload_bridge(current: &ArcSwap<Bridge>, active_prefix: &str, config: &BridgeServerConfig) {
    if config.bridge.api_prefix != active_prefix {
        tracing::warn!(
            active = %active_prefix,
            requested = %config.bridge.api_prefix,
            "api_prefix changes require a restart"
        );
    }
    let next = current.load().reconfigured(&config.bridge);
    current.store(Arc::new(next));
    tracing::info!(
        interpreter = %config.bridge.interpreter,
        root = ?config.bridge.interpreter_root,
        script_timeout_secs = config.bridge.script_timeout_secs,
        "Bridge configuration reloaded"
    );
}

/// `METHOD /api/{*endpoint}`: run the request through the interpreter.
async fn bridge_handler(
    State(state): State<AppState>,
    Path(endpoint): Path<String>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let start_time = Instant::now();
    let method_str = method.to_string();

    let response = match bridge_request(&state, &endpoint, &method, &uri, headers, body).await {
        Ok(response) => response.into_response(),
        Err(e) => {
            tracing::warn!(error = %e, endpoint = %endpoint, "Rejected bridge request");
            e.into_response()
        }
    };

    metrics::record_request(&method_str, response.status().as_u16(), start_time);
    response
}

async fn bridge_request(
    state: &AppState,
    endpoint: &str,
    method: &Method,
    uri: &Uri,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<OutboundResponse, BridgeError> {
    let method = RequestMethod::try_from(method)?;
    if method == RequestMethod::Options {
        return Ok(OutboundResponse::preflight());
    }

    let body = body?;
    let request = InboundRequest::new(method, &state.api_prefix, endpoint, headers, body)
        .with_query(uri.query());

    // Snapshot: a reload mid-request does not affect this request.
    let bridge = state.bridge.load_full();
    Ok(bridge.dispatch(request).await)
}
