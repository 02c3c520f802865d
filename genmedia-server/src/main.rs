//! # genmedia-mcp
//!
//! MCP server for image, video, audio and music generation.
//! Speaks JSON-RPC over stdio by default; `--http-port` serves the same
//! protocol on localhost instead.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use clap::Parser;
use genmedia_core::{Catalog, CostTracker, RawSettings, Settings};
use genmedia_mcp::{GenMediaMcpServer, ToolContext};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use genmedia_server::{build_router, metrics, stdio, AppState, MediaApiClient};

/// Command-line and environment configuration.
#[derive(Debug, Parser)]
#[command(name = "genmedia-mcp", version, about)]
struct Args {
    /// API key for the generation service.
    #[arg(long, env = "GENMEDIA_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Base URL of the generation API.
    #[arg(long, env = "GENMEDIA_BASE_URL")]
    base_url: Option<String>,

    /// Log level: trace, debug, info, warn or error.
    #[arg(long, env = "GENMEDIA_LOG_LEVEL")]
    log_level: Option<String>,

    /// Default directory for generated files.
    #[arg(long, env = "GENMEDIA_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// Upper bound for a single upstream call, in seconds.
    #[arg(long, env = "GENMEDIA_TIMEOUT_SECS")]
    timeout_secs: Option<u64>,

    /// Retries for transient upstream failures.
    #[arg(long, env = "GENMEDIA_MAX_RETRIES")]
    max_retries: Option<u32>,

    /// File to persist observed per-model costs in.
    #[arg(long, env = "GENMEDIA_COST_FILE")]
    cost_file: Option<PathBuf>,

    /// Include upstream details in error results.
    #[arg(long, env = "GENMEDIA_DEBUG")]
    debug: bool,

    /// Serve MCP over HTTP on 127.0.0.1 at this port instead of stdio.
    #[arg(long, env = "GENMEDIA_HTTP_PORT")]
    http_port: Option<u16>,
}

impl Args {
    fn raw_settings(&self) -> RawSettings {
        RawSettings {
            api_key: self.api_key.clone(),
            base_url: self.base_url.clone(),
            log_level: self.log_level.clone(),
            output_dir: self.output_dir.clone(),
            timeout_secs: self.timeout_secs,
            max_retries: self.max_retries,
            cost_file: self.cost_file.clone(),
            debug: self.debug,
        }
    }
}

/// Initialize structured tracing on stderr.
///
/// `RUST_LOG` overrides the configured level.
/// Set `GENMEDIA_LOG_FORMAT=json` for JSON output.
fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    // stdout carries the protocol in stdio mode
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true);

    if std::env::var("GENMEDIA_LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer.json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let args = Args::parse();

    init_tracing(&args.log_level.as_deref().unwrap_or("info").to_lowercase());

    let settings = Settings::from_raw(args.raw_settings()).context("invalid configuration")?;
    if !settings.has_api_key() {
        tracing::warn!("GENMEDIA_API_KEY is not set; generation calls will fail");
    }

    let catalog = Arc::new(Catalog::builtin().context("failed to load model catalog")?);
    let costs = match &settings.cost_file {
        Some(path) => CostTracker::with_file(path)
            .with_context(|| format!("failed to load cost file {}", path.display()))?,
        None => CostTracker::new(),
    };
    let client = MediaApiClient::new(&settings)?;
    tracing::info!(
        "loaded {} models, upstream {}",
        catalog.len(),
        client.base_url()
    );

    let ctx = ToolContext::new(catalog, Arc::new(client))
        .with_settings(&settings)
        .with_costs(Arc::new(costs));
    let mut server = GenMediaMcpServer::new(ctx);
    server.set_on_tool_call(|tool, result| {
        metrics::record_tool_call(tool, !result.is_error);
    });
    let server = Arc::new(server);

    match args.http_port {
        Some(port) => serve_http(server, port, settings.has_api_key()).await,
        None => {
            tracing::info!("genmedia-mcp {} ready on stdio", env!("CARGO_PKG_VERSION"));
            stdio::run(server).await
        }
    }
}

async fn serve_http(
    server: Arc<GenMediaMcpServer>,
    port: u16,
    has_key: bool,
) -> anyhow::Result<()> {
    let metrics_handle = metrics::init_metrics()
        .map_err(|e| anyhow::anyhow!("Failed to initialize Prometheus metrics: {}", e))?;
    tracing::info!("Prometheus metrics initialized");

    let app = build_router(AppState::new(server, has_key), Some(metrics_handle));

    // Bind to localhost only
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("genmedia-mcp listening on http://{}/mcp", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
