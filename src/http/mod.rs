//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware, routing)
//!     → request.rs (request ID)
//!     → /api/*   → bridge (interpreter pipeline)
//!       /health  → health.rs
//!       other    → static_files.rs (SPA fallback)
//!     → response.rs (OutboundResponse / errors → HTTP)
//!     → Send to client
//! ```

pub mod health;
pub mod request;
pub mod response;
pub mod server;
pub mod static_files;

pub use request::{UuidRequestId, X_REQUEST_ID};
pub use response::BridgeError;
pub use server::{AppState, HttpServer};
