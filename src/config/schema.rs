//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the bridge.
//! All types derive Serde traits for deserialization from config files.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration for the bridge server.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BridgeServerConfig {
    /// Name reported by the health endpoint.
    pub service_name: String,

    /// Listener configuration.
    pub listener: ListenerConfig,

    /// Interpreter bridge settings.
    pub bridge: BridgeConfig,

    /// Static SPA asset serving.
    pub static_files: StaticFilesConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Request limits and response hardening.
    pub security: SecurityConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl Default for BridgeServerConfig {
    fn default() -> Self {
        Self {
            service_name: "eco-ctf-platform".to_string(),
            listener: ListenerConfig::default(),
            bridge: BridgeConfig::default(),
            static_files: StaticFilesConfig::default(),
            timeouts: TimeoutConfig::default(),
            security: SecurityConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:5000").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:5000".to_string(),
        }
    }
}

/// How the request body is embedded into the script payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BodyEncoding {
    /// Base64 literal decoded by the interpreter. Binary-safe.
    #[default]
    Base64,
    /// Escaped text literal. Non UTF-8 bytes are replaced.
    Literal,
    /// Read from the body file at run time; the body never enters the program text.
    File,
}

/// Interpreter bridge configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Interpreter executable (looked up on `PATH` when not absolute).
    pub interpreter: String,

    /// Extra arguments passed before the program is streamed on stdin.
    pub interpreter_args: Vec<String>,

    /// Working directory of every script run. Relative paths are resolved
    /// against the server's working directory when the bridge is built.
    pub interpreter_root: PathBuf,

    /// Entry point included at the end of every payload, relative to the root.
    pub entry_point: String,

    /// Namespace segment every bridged path lives under.
    pub api_prefix: String,

    /// Wall-clock budget for a single script run, in seconds.
    pub script_timeout_secs: u64,

    /// Maximum number of scripts running at the same time.
    pub max_concurrent_scripts: usize,

    /// Cap on captured stdout and stderr, per stream.
    pub max_output_bytes: usize,

    /// Body embedding mode.
    pub body_encoding: BodyEncoding,

    /// Server environment variables copied into the script's environment.
    pub inherit_env: Vec<String>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            interpreter: "php".to_string(),
            interpreter_args: Vec::new(),
            interpreter_root: PathBuf::from("./backend"),
            entry_point: "index.php".to_string(),
            api_prefix: "/api".to_string(),
            script_timeout_secs: 30,
            max_concurrent_scripts: 64,
            max_output_bytes: 10 * 1024 * 1024, // 10 MiB
            body_encoding: BodyEncoding::Base64,
            inherit_env: vec!["PATH".to_string()],
        }
    }
}

/// Static single-page-app serving.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StaticFilesConfig {
    /// Asset root. Static serving is disabled when unset.
    pub root: Option<PathBuf>,

    /// File served for paths that do not resolve, relative to the root.
    pub index: String,
}

impl Default for StaticFilesConfig {
    fn default() -> Self {
        Self {
            root: None,
            index: "index.html".to_string(),
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 60 }
    }
}

/// Security hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Add `X-Content-Type-Options: nosniff` to every response.
    pub enable_headers: bool,
    /// Maximum body size in bytes.
    pub max_body_size: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            enable_headers: true,
            max_body_size: 2 * 1024 * 1024, // 2MB
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log line format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
