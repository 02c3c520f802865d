//! Test server harness for integration tests.
//!
//! Spins up the real HTTP-mode router on a random port, wired to a
//! [`MediaApiClient`] that talks to a mock upstream.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use genmedia_core::{Catalog, CostTracker};
use genmedia_mcp::{GenMediaMcpServer, ToolContext};
use genmedia_server::{build_router, AppState, MediaApiClient, RetryConfig};
use secrecy::SecretString;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use url::Url;

/// A test server instance with control handles.
pub struct TestServer {
    addr: SocketAddr,
    costs: Arc<CostTracker>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl TestServer {
    /// Start a server whose upstream is `upstream_url`.
    ///
    /// # Panics
    ///
    /// Panics if no port is available or server fails to bind.
    pub async fn start(upstream_url: &str, api_key: Option<&str>, output_dir: &Path) -> Self {
        let port = portpicker::pick_unused_port().expect("no available port");
        let addr = SocketAddr::from(([127, 0, 0, 1], port));

        let client = MediaApiClient::with_retry_config(
            Url::parse(upstream_url).expect("upstream url"),
            api_key.map(|k| SecretString::from(k.to_string())),
            RetryConfig::new(1, 10, 20, 0.0),
            Duration::from_secs(5),
        )
        .expect("client");

        let costs = Arc::new(CostTracker::new());
        let catalog = Arc::new(Catalog::builtin().expect("catalog"));
        let ctx = ToolContext::new(catalog, Arc::new(client))
            .with_costs(Arc::clone(&costs))
            .with_output_dir(output_dir);
        let state = AppState::new(Arc::new(GenMediaMcpServer::new(ctx)), api_key.is_some());
        let app = build_router(state, None);

        let listener = TcpListener::bind(addr).await.expect("failed to bind");
        let actual_addr = listener.local_addr().expect("failed to get local addr");

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .expect("server error");
        });

        // Give the server a moment to start
        tokio::time::sleep(Duration::from_millis(10)).await;

        Self {
            addr: actual_addr,
            costs,
            shutdown_tx: Some(shutdown_tx),
            handle,
        }
    }

    /// Base URL of the server.
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    /// Cost tracker shared with the tools.
    #[allow(dead_code)]
    pub fn costs(&self) -> &CostTracker {
        &self.costs
    }

    /// Gracefully shut down the server.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        let _ = tokio::time::timeout(Duration::from_secs(5), self.handle).await;
    }
}
