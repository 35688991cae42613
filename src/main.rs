//! HTTP to CGI-style interpreter bridge.
//!
//! Serves a single-page app and forwards every `/api/*` request to a PHP
//! interpreter, one short-lived process per request.
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌──────────────────────────────────────────────────────┐
//!                      │                      BRIDGE                           │
//!                      │                                                       │
//!   Client Request     │  ┌─────────┐    ┌──────────────┐    ┌─────────────┐  │
//!   ───────────────────┼─▶│  http   │───▶│  environment │───▶│   script    │  │
//!                      │  │ server  │    │  + body      │    │  assembler  │  │
//!                      │  └────┬────┘    └──────────────┘    └──────┬──────┘  │
//!                      │       │ /health, SPA                       │ stdin   │
//!                      │       ▼                                    ▼         │
//!   Client Response    │  ┌─────────┐    ┌──────────────┐    ┌─────────────┐  │
//!   ◀──────────────────┼──│response │◀───│ synthesizer  │◀───│  process    │──┼──▶ php
//!                      │  └─────────┘    └──────────────┘    │  gateway    │  │
//!                      │                                     └─────────────┘  │
//!                      │  ┌────────────────────────────────────────────────┐  │
//!                      │  │ config + hot reload │ observability │ lifecycle│  │
//!                      │  └────────────────────────────────────────────────┘  │
//!                      └──────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use cgi_bridge::config::{load_config, validate_config, BridgeServerConfig, ConfigError, ConfigWatcher};
use cgi_bridge::lifecycle::{wait_for_signal, Shutdown};
use cgi_bridge::observability::{logging, metrics};
use cgi_bridge::HttpServer;

#[derive(Parser)]
#[command(name = "cgi-bridge")]
#[command(about = "Bridge HTTP requests to a PHP interpreter", long_about = None)]
struct Args {
    /// TOML configuration file. Watched for changes while running.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override `listener.bind_address`.
    #[arg(short, long)]
    bind: Option<String>,

    /// Validate the configuration and exit.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => BridgeServerConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.listener.bind_address = bind;
    }
    validate_config(&config).map_err(ConfigError::Validation)?;
    config.bridge.interpreter_root = std::path::absolute(&config.bridge.interpreter_root)?;

    if args.check {
        println!("configuration OK");
        return Ok(());
    }

    logging::init_logging(&config.observability);
    tracing::info!("cgi-bridge v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        bind_address = %config.listener.bind_address,
        interpreter = %config.bridge.interpreter,
        root = ?config.bridge.interpreter_root,
        script_timeout_secs = config.bridge.script_timeout_secs,
        max_concurrent_scripts = config.bridge.max_concurrent_scripts,
        "Configuration loaded"
    );

    if !config.bridge.interpreter_root.is_dir() {
        tracing::warn!(
            root = ?config.bridge.interpreter_root,
            "Interpreter root does not exist; every API request will fail"
        );
    }

    if config.observability.metrics_enabled {
        // Already validated.
        if let Ok(addr) = config.observability.metrics_address.parse::<SocketAddr>() {
            metrics::init_metrics(addr);
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    // The watcher handle must outlive the server or notifications stop.
    let (_watcher, config_updates) = match &args.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            match watcher.run() {
                Ok(handle) => (Some(handle), updates),
                Err(e) => {
                    tracing::warn!(error = %e, "Config hot reload disabled");
                    (None, updates)
                }
            }
        }
        None => {
            let (_tx, updates) = mpsc::unbounded_channel();
            (None, updates)
        }
    };

    let shutdown = Shutdown::new();
    tokio::spawn(wait_for_signal(shutdown.clone()));

    let server = HttpServer::new(config);
    server.run(listener, config_updates, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
