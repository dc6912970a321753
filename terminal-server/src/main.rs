//! Terminal server - HTTP binding for the sandboxed execution engine.

mod routes;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use axum::Router;
use clap::Parser;
use sandbox_engine::io::config::load_config;
use sandbox_engine::terminal::TerminalService;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::state::AppState;

#[derive(Parser)]
#[command(name = "terminal-server")]
#[command(about = "HTTP API for per-learner sandboxed terminals and lesson progress")]
struct Args {
    /// Address to bind the server to
    #[arg(long, default_value = "127.0.0.1")]
    bind: String,

    /// Port to listen on
    #[arg(long, default_value = "3000")]
    port: u16,

    /// Engine config file (relative paths inside resolve against its directory)
    #[arg(long, default_value = "engine.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("terminal_server=info".parse()?),
        )
        .init();

    let args = Args::parse();

    let base = args
        .config
        .parent()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    let config = load_config(&args.config)
        .with_context(|| format!("load config {}", args.config.display()))?
        .resolve_paths(&base);
    info!(
        config = %args.config.display(),
        catalog = %config.catalog_path.display(),
        image = %config.runtime.image,
        "starting terminal-server"
    );

    let service = TerminalService::from_config(&config)?;
    let invalid = service.catalog().invalid_checks().len();
    if invalid > 0 {
        warn!(count = invalid, "catalog has lesson checks that never pass");
    }
    let state = AppState::new(service);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .nest("/api", routes::api_router())
        .layer(cors)
        .with_state(state);

    let addr: SocketAddr = format!("{}:{}", args.bind, args.port).parse()?;
    info!(addr = %addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
