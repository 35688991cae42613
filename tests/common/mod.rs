//! Shared utilities for integration and load testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use cgi_bridge::config::BridgeServerConfig;
use cgi_bridge::http::HttpServer;
use cgi_bridge::lifecycle::Shutdown;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

/// A config whose interpreter is `program args...`, rooted at `root`.
pub fn config_for(root: &Path, program: &str, args: &[&str]) -> BridgeServerConfig {
    let mut config = BridgeServerConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.bridge.interpreter = program.into();
    config.bridge.interpreter_args = args.iter().map(|a| a.to_string()).collect();
    config.bridge.interpreter_root = root.to_path_buf();
    config
}

/// Shell interpreter running `script`; the payload on stdin is ignored.
pub fn shell_config(root: &Path, script: &str) -> BridgeServerConfig {
    config_for(root, "sh", &["-c", script])
}

/// Running server plus the handles a test needs to drive it.
pub struct TestServer {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub config_tx: mpsc::UnboundedSender<BridgeServerConfig>,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Bind an ephemeral port and serve `config` on it in the background.
pub async fn start_server(config: BridgeServerConfig) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let (config_tx, config_rx) = mpsc::unbounded_channel();
    let server = HttpServer::new(config);
    let rx = shutdown.subscribe();
    tokio::spawn(async move {
        server.run(listener, config_rx, rx).await.unwrap();
    });

    // Give the server a moment to start accepting.
    tokio::time::sleep(Duration::from_millis(50)).await;

    TestServer {
        addr,
        shutdown,
        config_tx,
    }
}

/// Client that never reuses connections between tests.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}
