//! HTTP to CGI-style interpreter bridge library.
//!
//! Requests under the API prefix are turned into a self-contained PHP
//! program (server variables, raw body, entry-point include) and run by a
//! fresh interpreter process; its output becomes the HTTP response.

// Core subsystems
pub mod bridge;
pub mod config;
pub mod http;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use bridge::Bridge;
pub use config::schema::BridgeServerConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
