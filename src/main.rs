use std::net::SocketAddr;
use std::path::PathBuf;

use axum::routing::get;
use axum::{Json, Router};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use windowgate::config::WindowgateConfig;
use windowgate::http::{HttpServer, ShutdownSignals};

/// Command line arguments. Flags override the configuration file.
#[derive(Parser, Debug)]
#[command(name = "windowgate")]
#[command(about = "HTTP service protected by fixed-window admission control")]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Admits allowed per key per window
    #[arg(long)]
    max_admits: Option<u64>,

    /// Window length in milliseconds
    #[arg(long)]
    window_ms: Option<u64>,

    /// Share counters through this Redis server instead of in process
    #[arg(long)]
    redis_url: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_thread_ids(true)
        .init();

    info!("Starting Windowgate");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let args = Args::parse();
    let config = load_config(&args)?;
    info!(
        listen_addr = %config.server.listen_addr,
        store = ?config.limiter.store,
        "Configuration loaded"
    );

    let limiter = config.build_limiter()?;
    info!(
        max_admits = limiter.spec().max_admits(),
        window = ?limiter.spec().window(),
        "Limiter initialized"
    );

    let signals = ShutdownSignals::install()?;
    let routes = Router::new()
        .route("/", get(index_handler))
        .route("/health", get(health_handler));

    HttpServer::new(config.server.listen_addr, routes, limiter)
        .serve_with_shutdown(async move {
            let signal = signals.recv().await;
            info!(%signal, "Initiating graceful shutdown");
        })
        .await?;

    info!("Windowgate stopped");
    Ok(())
}

fn load_config(args: &Args) -> anyhow::Result<WindowgateConfig> {
    let mut config = match &args.config {
        Some(path) => WindowgateConfig::from_file(path)?,
        None => WindowgateConfig::default(),
    };

    if let Some(listen) = args.listen {
        config.server.listen_addr = listen;
    }
    if let Some(max_admits) = args.max_admits {
        config.limiter.max_admits = max_admits;
    }
    if let Some(window_ms) = args.window_ms {
        config.limiter.window_ms = window_ms;
    }
    if let Some(url) = &args.redis_url {
        config.limiter.store = config.limiter.store.with_redis_url(url.as_str());
    }

    config.validate()?;
    Ok(config)
}

async fn index_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "message": "admitted" }))
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "healthy" }))
}
