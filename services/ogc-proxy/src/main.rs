//! Lizmap OGC proxy service.
//!
//! HTTP server forwarding OGC WMS, WFS and WMTS requests to the QGIS map
//! server, with per-layer tile caching and cache invalidation endpoints.

use anyhow::{Context, Result};
use axum::{extract::Extension, routing::get, Router};
use clap::Parser;
use std::{env, net::SocketAddr, path::PathBuf, sync::Arc};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use ogc_proxy::{config::ProxyConfig, handlers, ProxyContext};

#[derive(Parser, Debug)]
#[command(name = "ogc-proxy")]
#[command(about = "Lizmap OGC proxy and tile cache")]
struct Args {
    /// Listen address
    #[arg(short, long, default_value = "0.0.0.0:8080")]
    listen: String,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// YAML configuration file
    #[arg(short, long, env = "LIZMAP_PROXY_CONFIG")]
    config: Option<PathBuf>,

    /// Number of tokio worker threads (default: number of CPU cores)
    #[arg(long)]
    worker_threads: Option<usize>,
}

fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let mut runtime_builder = tokio::runtime::Builder::new_multi_thread();
    runtime_builder.enable_all();

    if let Some(threads) = args.worker_threads {
        runtime_builder.worker_threads(threads);
    } else if let Some(threads) = env::var("TOKIO_WORKER_THREADS")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
    {
        runtime_builder.worker_threads(threads);
    }

    let runtime = runtime_builder.build()?;
    runtime.block_on(async_main(args))?;
    Ok(())
}

async fn async_main(args: Args) -> Result<()> {
    // Initialize tracing
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .json()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let prometheus_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install Prometheus recorder")?;

    info!("Prometheus metrics exporter initialized");

    let config = ProxyConfig::load(args.config.as_deref())?;
    info!(
        wms_server_url = %config.wms_server_url,
        cache_storage = ?config.cache.storage_type,
        backend = ?config.proxy_http_backend,
        "Starting Lizmap OGC proxy"
    );

    let ctx = Arc::new(ProxyContext::new(config)?);
    if ctx.transport.echo().is_enabled() {
        info!(path = %ctx.transport.echo().path().display(), "Echo log enabled");
    }

    let app: Router = ogc_proxy::app(ctx)
        .route("/metrics", get(handlers::metrics_handler))
        .layer(Extension(prometheus_handle))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = args.listen.parse()?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
